//! Block cache: fixed-size windows of object data with dirty tracking.
//!
//! Blocks are keyed by `(object, block index)`. Acquiring a block is a
//! serialization point: a second caller wanting the same block parks on
//! the slot's mutex until the first releases it, which gives at-most-one
//! active operation per block without any extra locking. Eviction policy
//! is a collaborator's concern; the cache only drops a node's blocks when
//! explicitly asked.

use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tetherfs_proto::FileId;
use tracing::trace;

/// Identifies one block of one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockKey {
    /// Owning object.
    pub node: FileId,
    /// Block index within the object.
    pub index: u64,
}

/// One cached window of object data.
///
/// The allocated length may be shorter than the nominal block size for
/// the final block of a file. The dirty interval, while non-empty, is
/// always one contiguous run; the write path flushes before accepting a
/// write that would make it discontiguous.
#[derive(Debug, Default)]
pub struct CacheBlock {
    data: Vec<u8>,
    valid: bool,
    dirty: Option<(usize, usize)>,
}

impl CacheBlock {
    /// Creates a not-yet-valid block of `len` zero bytes.
    pub fn with_len(len: usize) -> Self {
        Self { data: vec![0; len], valid: false, dirty: None }
    }

    /// Allocated length.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the allocation is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the block's content reflects the remote data.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Marks the content authoritative (after a fill, or a write that
    /// covers the whole allocation).
    #[inline]
    pub fn set_valid(&mut self) {
        self.valid = true;
    }

    /// Marks the content unusable. Dirty bookkeeping is separate; the
    /// strategy clears it explicitly on unrecoverable flush failure.
    #[inline]
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Current dirty interval `[off, end)`, if any.
    #[inline]
    pub fn dirty(&self) -> Option<(usize, usize)> {
        self.dirty
    }

    /// Clears the dirty interval (after a successful flush).
    #[inline]
    pub fn clear_dirty(&mut self) {
        self.dirty = None;
    }

    /// Resizes the allocation. Growing zero-extends and drops validity
    /// (the new bytes have no authoritative content); shrinking keeps
    /// validity and chops the dirty interval down with the data.
    pub fn set_len(&mut self, len: usize) {
        if len > self.data.len() {
            self.data.resize(len, 0);
            self.valid = false;
        } else if len < self.data.len() {
            self.data.truncate(len);
            self.reconcile_dirty();
        }
    }

    /// Grows the allocation while keeping the valid flag, for the append
    /// path where the pre-extension content is known good.
    pub fn grow_preserving_valid(&mut self, len: usize) {
        debug_assert!(len >= self.data.len());
        let was_valid = self.valid;
        self.data.resize(len, 0);
        self.valid = was_valid;
    }

    /// Chops a dirty interval that outgrew the allocation (append race)
    /// and resets a degenerate one.
    pub fn reconcile_dirty(&mut self) {
        if let Some((off, end)) = self.dirty {
            let end = end.min(self.data.len());
            self.dirty = if off < end { Some((off, end)) } else { None };
        }
    }

    /// True when `[off, end)` does not touch the existing dirty interval
    /// (a gap before or after it). Adjacent ranges are not disjoint.
    pub fn dirty_disjoint_from(&self, off: usize, end: usize) -> bool {
        match self.dirty {
            Some((doff, dend)) => off > dend || end < doff,
            None => false,
        }
    }

    /// Extends the dirty interval to the union of the old interval and
    /// `[off, end)`. The caller must have resolved disjointness first;
    /// a dirty interval never spans two runs.
    pub fn mark_dirty(&mut self, off: usize, end: usize) {
        debug_assert!(off < end && end <= self.data.len());
        debug_assert!(!self.dirty_disjoint_from(off, end), "dirty interval would split");
        self.dirty = Some(match self.dirty {
            Some((doff, dend)) => (doff.min(off), dend.max(end)),
            None => (off, end),
        });
    }

    /// Block content.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable block content.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Exclusive hold on one cached block. Dropping it releases the block.
pub struct BlockGuard {
    key: BlockKey,
    inner: ArcMutexGuard<RawMutex, CacheBlock>,
}

impl BlockGuard {
    /// The key this guard holds.
    #[inline]
    pub fn key(&self) -> BlockKey {
        self.key
    }
}

impl Deref for BlockGuard {
    type Target = CacheBlock;

    fn deref(&self) -> &CacheBlock {
        &self.inner
    }
}

impl DerefMut for BlockGuard {
    fn deref_mut(&mut self) -> &mut CacheBlock {
        &mut self.inner
    }
}

/// Mount-wide block cache with per-slot mutual exclusion.
#[derive(Debug, Default)]
pub struct BlockCache {
    slots: DashMap<BlockKey, Arc<Mutex<CacheBlock>>>,
}

impl BlockCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires (creating if absent) the block for `(node, index)`,
    /// sized to `len`. Blocks until any other holder releases it.
    pub fn acquire(&self, node: FileId, index: u64, len: usize) -> BlockGuard {
        let key = BlockKey { node, index };
        let slot = Arc::clone(
            self.slots
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(CacheBlock::default())))
                .value(),
        );
        // The map reference is gone here; parking on the slot mutex must
        // not hold a shard lock.
        let mut guard = Mutex::lock_arc(&slot);
        guard.set_len(len);
        trace!(node = %node, index, len, "block acquired");
        BlockGuard { key, inner: guard }
    }

    /// Drops every cached block of `node` (reclaim hook). The caller
    /// must guarantee no operation is active on the node.
    pub fn remove_node(&self, node: FileId) {
        self.slots.retain(|key, _| key.node != node);
    }

    /// Number of materialized blocks.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no block is materialized.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Any sequence of merges that each touch the current interval
        /// leaves exactly the union, still contiguous.
        #[test]
        fn dirty_union_is_min_max(
            seed_off in 0usize..3000,
            extents in prop::collection::vec((0usize..500, 1usize..200), 1..20),
        ) {
            let mut b = CacheBlock::with_len(4096);
            let seed_end = (seed_off + 16).min(4096);
            b.mark_dirty(seed_off, seed_end);
            let (mut lo, mut hi) = (seed_off, seed_end);

            for (gap, len) in extents {
                // Anchor each new range inside or adjacent to the union
                // so it is never disjoint.
                let off = lo.saturating_sub(gap.min(lo)).min(hi);
                let end = (off + len).max(lo).min(4096);
                if off >= end {
                    continue;
                }
                b.mark_dirty(off, end);
                lo = lo.min(off);
                hi = hi.max(end);
            }
            prop_assert_eq!(b.dirty(), Some((lo, hi)));
        }

        /// Resizing never leaves the dirty interval reaching past the
        /// allocation.
        #[test]
        fn resize_keeps_dirty_in_bounds(
            initial in 1usize..8192,
            dirty_off in 0usize..8192,
            dirty_len in 1usize..8192,
            resized in 0usize..8192,
        ) {
            let mut b = CacheBlock::with_len(initial);
            let off = dirty_off.min(initial - 1);
            let end = (off + dirty_len).min(initial);
            b.mark_dirty(off, end);

            b.set_len(resized);
            if let Some((doff, dend)) = b.dirty() {
                prop_assert!(doff < dend);
                prop_assert!(dend <= b.len());
            }
        }
    }
}
