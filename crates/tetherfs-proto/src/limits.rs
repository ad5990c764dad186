//! Negotiated transport limits and the block layout derived from them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest block the cache will materialize, regardless of what the
/// remote service negotiates.
pub const MAX_BLOCK_SIZE: u32 = 64 * 1024;

/// Per-exchange limits the remote service announces at mount time.
///
/// Every chunk the direct backend builds is bounded by these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportLimits {
    /// Largest read payload the service will answer in one exchange.
    pub max_read: u32,
    /// Largest write payload the service will accept in one exchange.
    pub max_write: u32,
    /// Preferred I/O granularity. The cache block size is derived from
    /// this; must be a power of two.
    pub io_size: u32,
}

impl TransportLimits {
    /// Validates the negotiated values and derives the block layout.
    pub fn block_layout(&self) -> Result<BlockLayout, LimitsError> {
        if self.max_read == 0 || self.max_write == 0 {
            return Err(LimitsError::ZeroLimit);
        }
        let size = self.io_size.min(MAX_BLOCK_SIZE);
        if size == 0 || !size.is_power_of_two() {
            return Err(LimitsError::NotPowerOfTwo(self.io_size));
        }
        Ok(BlockLayout { block_size: size })
    }
}

/// Rejection of an invalid mount-time negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LimitsError {
    /// The negotiated io size cannot produce a power-of-two block size.
    #[error("negotiated io size {0} is not a power of two")]
    NotPowerOfTwo(u32),
    /// A zero read or write limit would make every exchange empty.
    #[error("negotiated read/write limit is zero")]
    ZeroLimit,
}

/// Fixed power-of-two block geometry for the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    block_size: u32,
}

impl BlockLayout {
    /// Block size in bytes. Power of two, at most [`MAX_BLOCK_SIZE`].
    #[inline]
    pub fn block_size(&self) -> u64 {
        u64::from(self.block_size)
    }

    /// Index of the block containing `offset`.
    #[inline]
    pub fn block_index(&self, offset: u64) -> u64 {
        offset / self.block_size()
    }

    /// Offset of `offset` within its block.
    #[inline]
    pub fn offset_in_block(&self, offset: u64) -> usize {
        (offset & (self.block_size() - 1)) as usize
    }

    /// Absolute byte offset where block `index` starts.
    #[inline]
    pub fn block_start(&self, index: u64) -> u64 {
        index * self.block_size()
    }

    /// Valid length of block `index` for a file of `file_size` bytes:
    /// the full block size clamped against end-of-file, zero for a block
    /// entirely past it.
    pub fn valid_len(&self, index: u64, file_size: u64) -> usize {
        let start = self.block_start(index);
        if start >= file_size {
            0
        } else {
            (file_size - start).min(self.block_size()) as usize
        }
    }
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Index/offset decomposition must invert block_start.
        #[test]
        fn block_decomposition_round_trips(
            offset in 0u64..1 << 40,
            shift in 9u32..16,
        ) {
            let l = TransportLimits {
                max_read: 4096,
                max_write: 4096,
                io_size: 1 << shift,
            }
            .block_layout()
            .unwrap();
            let idx = l.block_index(offset);
            let off = l.offset_in_block(offset);
            prop_assert_eq!(l.block_start(idx) + off as u64, offset);
            prop_assert!((off as u64) < l.block_size());
        }

        /// valid_len never exceeds the block size and covers exactly the
        /// bytes of the file that fall inside the block.
        #[test]
        fn valid_len_matches_reference(
            file_size in 0u64..1 << 30,
            index in 0u64..1 << 16,
        ) {
            let l = TransportLimits {
                max_read: 4096,
                max_write: 4096,
                io_size: 4096,
            }
            .block_layout()
            .unwrap();
            let start = l.block_start(index);
            let end = (start + l.block_size()).min(file_size);
            let expected = end.saturating_sub(start) as usize;
            prop_assert_eq!(l.valid_len(index, file_size), expected);
        }
    }
}
