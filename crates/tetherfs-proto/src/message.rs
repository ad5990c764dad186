//! Request/reply message shapes for the data path.
//!
//! Each request is paired 1:1 with one reply. The wire encoding is the
//! transport's concern; these are the semantic shapes the core builds and
//! consumes.

use bytes::Bytes;

/// One outbound data-path request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Read a byte range through an open handle.
    Read(ReadRequest),
    /// Write a byte range through an open handle.
    Write(WriteRequest),
}

impl Request {
    /// Short opcode name, for logging.
    pub fn opcode(&self) -> &'static str {
        match self {
            Request::Read(_) => "READ",
            Request::Write(_) => "WRITE",
        }
    }
}

/// The remote service's answer to one [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Answer to a [`ReadRequest`].
    Read(ReadReply),
    /// Answer to a [`WriteRequest`].
    Write(WriteReply),
}

/// Read `size` bytes at `offset` through `handle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    /// Remote-assigned handle id the file was opened with.
    pub handle: u64,
    /// Absolute byte offset in the file.
    pub offset: u64,
    /// Number of bytes requested. Bounded by the negotiated `max_read`.
    pub size: u32,
}

/// Answer to a read.
///
/// `size` is the byte count the service claims to have read; `payload`
/// holds the bytes that actually arrived. The two can disagree, so
/// consumers copy `min(size, payload.len())` bytes. A `size` smaller than
/// the requested chunk signals end-of-stream, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReply {
    /// Byte count reported by the service.
    pub size: u32,
    /// Bytes delivered with the answer.
    pub payload: Bytes,
}

/// Write `payload` at `offset` through `handle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    /// Remote-assigned handle id the file was opened with.
    pub handle: u64,
    /// Absolute byte offset in the file.
    pub offset: u64,
    /// Length of `payload`. Bounded by the negotiated `max_write`.
    pub size: u32,
    /// Bytes to write.
    pub payload: Bytes,
}

/// Answer to a write. The service may acknowledge fewer bytes than sent
/// (a partial write); acknowledging more is a protocol violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReply {
    /// Byte count the service durably accepted.
    pub written: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_names() {
        let r = Request::Read(ReadRequest { handle: 1, offset: 0, size: 16 });
        let w = Request::Write(WriteRequest {
            handle: 1,
            offset: 0,
            size: 3,
            payload: Bytes::from_static(b"abc"),
        });
        assert_eq!(r.opcode(), "READ");
        assert_eq!(w.opcode(), "WRITE");
    }
}
