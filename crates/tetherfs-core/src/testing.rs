//! In-memory remote service for tests.
//!
//! [`InMemoryRemote`] answers the transport contract against plain byte
//! vectors, one per open handle, and keeps enough bookkeeping (operation
//! log, outstanding tickets, injectable faults) for tests to assert not
//! just outcomes but the exchanges that produced them.

use crate::error::BridgeError;
use crate::transport::{TicketId, Transport};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tetherfs_proto::{
    Credentials, ReadReply, Reply, Request, TransportLimits, WriteReply,
};

/// A misbehavior injected into the next exchange of its kind.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// The wait is interrupted; the operation does not happen.
    Interrupt,
    /// The wait times out; the operation does not happen.
    Timeout,
    /// The service reports this errno; the operation does not happen.
    Errno(i32),
    /// A read answers at most this many bytes even if more exist.
    ShortRead(u32),
    /// A write accepts at most this many bytes.
    ShortWrite(u32),
    /// A write acknowledges this many bytes more than were sent.
    OverAck(u32),
}

#[derive(Default)]
struct RemoteState {
    files: HashMap<u64, Vec<u8>>,
    pending: HashMap<u64, Result<Reply, BridgeError>>,
    next_ticket: u64,
    read_faults: VecDeque<Fault>,
    write_faults: VecDeque<Fault>,
    reads: u64,
    writes: u64,
    write_ops: Vec<(u64, usize)>,
}

/// Transport test double backed by in-memory files.
pub struct InMemoryRemote {
    limits: TransportLimits,
    state: Mutex<RemoteState>,
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemote {
    /// A remote with 64 KiB exchange limits and 4 KiB preferred I/O.
    pub fn new() -> Self {
        Self::with_limits(TransportLimits {
            max_read: 65536,
            max_write: 65536,
            io_size: 4096,
        })
    }

    /// A remote announcing the given limits.
    pub fn with_limits(limits: TransportLimits) -> Self {
        Self { limits, state: Mutex::new(RemoteState::default()) }
    }

    /// The limits this remote announces at mount time.
    pub fn limits(&self) -> TransportLimits {
        self.limits
    }

    /// Binds `handle` to a file with the given content.
    pub fn open_file(&self, handle: u64, content: Vec<u8>) {
        self.state.lock().files.insert(handle, content);
    }

    /// Current content of the file behind `handle`.
    ///
    /// # Panics
    ///
    /// Panics when the handle was never opened.
    pub fn file(&self, handle: u64) -> Vec<u8> {
        self.state.lock().files[&handle].clone()
    }

    /// Queues a fault for the next read exchange.
    pub fn push_read_fault(&self, fault: Fault) {
        self.state.lock().read_faults.push_back(fault);
    }

    /// Queues a fault for the next write exchange.
    pub fn push_write_fault(&self, fault: Fault) {
        self.state.lock().write_faults.push_back(fault);
    }

    /// Number of reads that were actually served.
    pub fn read_count(&self) -> u64 {
        self.state.lock().reads
    }

    /// Number of writes that were actually applied.
    pub fn write_count(&self) -> u64 {
        self.state.lock().writes
    }

    /// Applied writes as `(offset, bytes accepted)`, in order.
    pub fn write_ops(&self) -> Vec<(u64, usize)> {
        self.state.lock().write_ops.clone()
    }

    /// True when every submitted ticket has been released.
    pub fn all_released(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    fn answer_read(
        state: &mut RemoteState,
        limits: &TransportLimits,
        req: &tetherfs_proto::ReadRequest,
    ) -> Result<Reply, BridgeError> {
        debug_assert!(req.size <= limits.max_read, "chunk exceeds negotiated max_read");
        match state.read_faults.pop_front() {
            Some(Fault::Interrupt) => return Err(BridgeError::Interrupted),
            Some(Fault::Timeout) => return Err(BridgeError::TimedOut),
            Some(Fault::Errno(errno)) => return Err(BridgeError::Remote(errno)),
            Some(Fault::ShortRead(cap)) => {
                return Self::serve_read(state, req, Some(cap as usize));
            }
            Some(Fault::ShortWrite(_) | Fault::OverAck(_)) | None => {}
        }
        Self::serve_read(state, req, None)
    }

    fn serve_read(
        state: &mut RemoteState,
        req: &tetherfs_proto::ReadRequest,
        cap: Option<usize>,
    ) -> Result<Reply, BridgeError> {
        let Some(file) = state.files.get(&req.handle) else {
            return Err(BridgeError::Remote(9));
        };
        let off = usize::try_from(req.offset).map_err(|_| BridgeError::Remote(27))?;
        let mut n = (req.size as usize).min(file.len().saturating_sub(off));
        if let Some(cap) = cap {
            n = n.min(cap);
        }
        let payload = Bytes::copy_from_slice(&file[off..off + n]);
        state.reads += 1;
        Ok(Reply::Read(ReadReply { size: n as u32, payload }))
    }

    fn answer_write(
        state: &mut RemoteState,
        limits: &TransportLimits,
        req: &tetherfs_proto::WriteRequest,
    ) -> Result<Reply, BridgeError> {
        debug_assert!(req.size <= limits.max_write, "chunk exceeds negotiated max_write");
        let mut accept = req.size;
        let mut over = 0u32;
        match state.write_faults.pop_front() {
            Some(Fault::Interrupt) => return Err(BridgeError::Interrupted),
            Some(Fault::Timeout) => return Err(BridgeError::TimedOut),
            Some(Fault::Errno(errno)) => return Err(BridgeError::Remote(errno)),
            Some(Fault::ShortWrite(cap)) => accept = accept.min(cap),
            Some(Fault::OverAck(extra)) => over = extra,
            Some(Fault::ShortRead(_)) | None => {}
        }

        let Some(file) = state.files.get_mut(&req.handle) else {
            return Err(BridgeError::Remote(9));
        };
        let off = usize::try_from(req.offset).map_err(|_| BridgeError::Remote(27))?;
        let n = accept as usize;
        if file.len() < off + n {
            file.resize(off + n, 0);
        }
        file[off..off + n].copy_from_slice(&req.payload[..n]);
        state.writes += 1;
        state.write_ops.push((req.offset, n));
        Ok(Reply::Write(WriteReply { written: accept + over }))
    }
}

impl Transport for InMemoryRemote {
    fn submit(&self, request: Request, _cred: &Credentials) -> Result<TicketId, BridgeError> {
        let mut state = self.state.lock();
        let outcome = match &request {
            Request::Read(req) => Self::answer_read(&mut state, &self.limits, req),
            Request::Write(req) => Self::answer_write(&mut state, &self.limits, req),
        };
        let ticket = TicketId(state.next_ticket);
        state.next_ticket += 1;
        state.pending.insert(ticket.0, outcome);
        Ok(ticket)
    }

    fn wait(&self, ticket: TicketId) -> Result<Reply, BridgeError> {
        self.state
            .lock()
            .pending
            .get(&ticket.0)
            .cloned()
            .unwrap_or(Err(BridgeError::Protocol(
                crate::error::ProtocolViolation::ReplyMismatch { expected: "known ticket" },
            )))
    }

    fn release(&self, ticket: TicketId) {
        self.state.lock().pending.remove(&ticket.0);
    }
}
