//! Direct backend: chunked exchanges with no cache in between.
//!
//! Reads stop early on a short answer (end-of-stream). Writes re-issue
//! any tail the service did not acknowledge, so a successful return
//! means every byte was accepted.

use crate::error::{BridgeError, ProtocolViolation};
use crate::handle::OpenHandle;
use crate::io::cursor::{ReadCursor, WriteCursor};
use crate::io::IoBridge;
use crate::transport::{Exchange, Transport};
use bytes::Bytes;
use tetherfs_proto::{Credentials, ReadRequest, Reply, Request, WriteRequest};
use tracing::{debug, trace};

impl<T: Transport> IoBridge<T> {
    /// Reads through `handle` until the buffer is full or the service
    /// answers short.
    pub(super) fn direct_read(
        &self,
        handle: OpenHandle,
        cursor: &mut ReadCursor<'_>,
        cred: &Credentials,
    ) -> Result<(), BridgeError> {
        while cursor.residual() > 0 {
            let chunk = cursor.residual().min(self.limits.max_read as usize) as u32;
            let request = Request::Read(ReadRequest {
                handle: handle.id,
                offset: cursor.position(),
                size: chunk,
            });
            let exchange = Exchange::begin(self.transport.as_ref(), request, cred)?;
            let Reply::Read(answer) = exchange.wait()? else {
                return Err(BridgeError::Protocol(ProtocolViolation::ReplyMismatch {
                    expected: "READ",
                }));
            };

            // The reported size and the delivered payload can disagree;
            // only bytes that actually arrived count.
            let delivered = (answer.size as usize).min(answer.payload.len());
            let copied = cursor.copy_in(&answer.payload[..delivered]);
            trace!(requested = chunk, copied, "read chunk answered");

            if copied < chunk as usize {
                // Short answer: end of the remote stream.
                break;
            }
        }
        Ok(())
    }

    /// Writes through `handle` until the buffer is drained. Partial
    /// acknowledgements rewind the cursor and go again; `tracked_size`
    /// is pushed forward as acknowledged bytes extend the file.
    pub(super) fn direct_write(
        &self,
        handle: OpenHandle,
        cursor: &mut WriteCursor<'_>,
        tracked_size: &mut u64,
        cred: &Credentials,
    ) -> Result<(), BridgeError> {
        while cursor.residual() > 0 {
            let chunk = cursor.residual().min(self.limits.max_write as usize) as u32;
            let offset = cursor.position();
            let payload = Bytes::copy_from_slice(cursor.take(chunk as usize));
            let request = Request::Write(WriteRequest {
                handle: handle.id,
                offset,
                size: chunk,
                payload,
            });
            let exchange = Exchange::begin(self.transport.as_ref(), request, cred)?;
            let Reply::Write(answer) = exchange.wait()? else {
                return Err(BridgeError::Protocol(ProtocolViolation::ReplyMismatch {
                    expected: "WRITE",
                }));
            };

            if answer.written > chunk {
                return Err(BridgeError::Protocol(ProtocolViolation::OverAckedWrite {
                    sent: chunk,
                    acked: answer.written,
                }));
            }
            let shortfall = chunk - answer.written;
            if shortfall > 0 {
                debug!(offset, chunk, acked = answer.written, "partial write, reissuing tail");
                cursor.rewind(shortfall as usize);
            }
            if cursor.position() > *tracked_size {
                *tracked_size = cursor.position();
            }
        }
        Ok(())
    }
}
