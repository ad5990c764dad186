//! Progress cursors over caller buffers.
//!
//! Both data-path directions walk a caller-owned buffer in chunks; the
//! cursors track how far the transfer has advanced so the loops can ask
//! "where am I" and "how much is left" without recomputing offsets.

/// Tracks a read filling a caller buffer.
#[derive(Debug)]
pub struct ReadCursor<'a> {
    offset: u64,
    buf: &'a mut [u8],
    filled: usize,
}

impl<'a> ReadCursor<'a> {
    /// Starts a read of `buf.len()` bytes at object offset `offset`.
    pub fn new(offset: u64, buf: &'a mut [u8]) -> Self {
        Self { offset, buf, filled: 0 }
    }

    /// Object offset of the next byte to fill.
    #[inline]
    pub fn position(&self) -> u64 {
        self.offset + self.filled as u64
    }

    /// Bytes still wanted.
    #[inline]
    pub fn residual(&self) -> usize {
        self.buf.len() - self.filled
    }

    /// Bytes delivered so far.
    #[inline]
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Copies as much of `src` as fits, returning the amount taken.
    pub fn copy_in(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.residual());
        self.buf[self.filled..self.filled + n].copy_from_slice(&src[..n]);
        self.filled += n;
        n
    }
}

/// Tracks a write draining a caller buffer.
#[derive(Debug)]
pub struct WriteCursor<'a> {
    offset: u64,
    data: &'a [u8],
    taken: usize,
}

impl<'a> WriteCursor<'a> {
    /// Starts a write of `data` at object offset `offset`.
    pub fn new(offset: u64, data: &'a [u8]) -> Self {
        Self { offset, data, taken: 0 }
    }

    /// Object offset of the next byte to send.
    #[inline]
    pub fn position(&self) -> u64 {
        self.offset + self.taken as u64
    }

    /// Bytes still to send.
    #[inline]
    pub fn residual(&self) -> usize {
        self.data.len() - self.taken
    }

    /// Bytes accepted so far.
    #[inline]
    pub fn taken(&self) -> usize {
        self.taken
    }

    /// Advances past the next `n` bytes (clamped to the residual) and
    /// returns them.
    pub fn take(&mut self, n: usize) -> &'a [u8] {
        let n = n.min(self.residual());
        let chunk = &self.data[self.taken..self.taken + n];
        self.taken += n;
        chunk
    }

    /// Walks progress back by `n` bytes after a partial acceptance, so
    /// the unaccepted tail is reissued.
    pub fn rewind(&mut self, n: usize) {
        debug_assert!(n <= self.taken);
        self.taken -= n;
    }
}
