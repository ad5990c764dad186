//! Block strategy: fill and flush, the cache's two remote operations.
//!
//! Both resolve the handle themselves and drive the direct backend over
//! the block's byte range. A fill that comes back short is not an error;
//! the remainder of the block is zeroed and the block declared valid
//! (reads past end-of-file see holes, not failures). A flush clamps its
//! dirty interval against the tracked file size so write-back can never
//! grow the remote file.

use crate::block::CacheBlock;
use crate::error::BridgeError;
use crate::handle::AccessIntent;
use crate::io::cursor::{ReadCursor, WriteCursor};
use crate::io::IoBridge;
use crate::node::Node;
use crate::transport::Transport;
use tetherfs_proto::Credentials;
use tracing::{debug, trace};

/// Which remote operation to run against a held block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCmd {
    /// Populate the block's content from the remote file.
    Fill,
    /// Write the block's dirty interval back to the remote file.
    Flush,
}

impl<T: Transport> IoBridge<T> {
    /// Runs `cmd` for block `index` of `node` against a held block.
    ///
    /// Entry point for collaborators that hold a block guard outside the
    /// read/write paths (reclaim, background write-back). `file_size` is
    /// the tracked size, which the caller must read before taking the
    /// block guard; the node's data lock is ordered before block guards
    /// and is never taken here.
    ///
    /// # Errors
    ///
    /// See [`BridgeError`]; a retryable flush failure leaves the dirty
    /// interval in place.
    pub fn execute(
        &self,
        node: &Node,
        index: u64,
        block: &mut CacheBlock,
        cmd: BlockCmd,
        file_size: u64,
        cred: &Credentials,
    ) -> Result<(), BridgeError> {
        match cmd {
            BlockCmd::Fill => self.refill_block(node, index, block, file_size, cred),
            BlockCmd::Flush => self.flush_block(node, index, block, file_size, cred),
        }
    }

    /// Brings an invalid block's content up to date with the remote
    /// file.
    ///
    /// A dirty interval left behind by an earlier failed flush still
    /// holds the only copy of those bytes, so it is written back before
    /// the fill overwrites the buffer. A retryable flush failure
    /// propagates with the interval intact.
    pub(super) fn refill_block(
        &self,
        node: &Node,
        index: u64,
        block: &mut CacheBlock,
        file_size: u64,
        cred: &Credentials,
    ) -> Result<(), BridgeError> {
        block.reconcile_dirty();
        self.flush_block(node, index, block, file_size, cred)?;
        self.fill_block(node, index, block, cred)
    }

    /// Reads the whole allocation from the remote file. A short answer
    /// zero-fills the tail. On success the block is valid.
    pub(super) fn fill_block(
        &self,
        node: &Node,
        index: u64,
        block: &mut CacheBlock,
        cred: &Credentials,
    ) -> Result<(), BridgeError> {
        debug_assert!(block.dirty().is_none(), "filling over unwritten data");
        let handle = node.handles().get(AccessIntent::ReadOnly)?;
        let start = self.layout.block_start(index);

        let filled = {
            let mut cursor = ReadCursor::new(start, block.data_mut());
            self.direct_read(handle, &mut cursor, cred)?;
            cursor.filled()
        };
        block.data_mut()[filled..].fill(0);
        block.set_valid();
        trace!(node = %node.id(), index, filled, "block filled");
        Ok(())
    }

    /// Writes the dirty interval back through the write handle.
    ///
    /// The interval is first clamped to the tracked file size; a dirty
    /// tail wholly past end-of-file describes bytes a truncation already
    /// discarded, so it is dropped without an exchange. On a retryable
    /// failure the interval stays for a retry; on any other failure it
    /// is dropped and the block invalidated, because its content no
    /// longer matches anything the service acknowledged.
    pub(super) fn flush_block(
        &self,
        node: &Node,
        index: u64,
        block: &mut CacheBlock,
        file_size: u64,
        cred: &Credentials,
    ) -> Result<(), BridgeError> {
        let Some((dirty_off, dirty_end)) = block.dirty() else {
            return Ok(());
        };
        let start = self.layout.block_start(index);
        let in_file = file_size.saturating_sub(start).min(block.len() as u64) as usize;
        let dirty_end = dirty_end.min(in_file);
        if dirty_off >= dirty_end {
            block.clear_dirty();
            return Ok(());
        }

        let handle = node.handles().get(AccessIntent::WriteOnly)?;
        let outcome = {
            let mut cursor =
                WriteCursor::new(start + dirty_off as u64, &block.data()[dirty_off..dirty_end]);
            // The range is below the tracked size already; the sink is a
            // throwaway copy.
            let mut size_sink = file_size;
            self.direct_write(handle, &mut cursor, &mut size_sink, cred)
        };

        match outcome {
            Ok(()) => {
                block.clear_dirty();
                trace!(node = %node.id(), index, dirty_off, dirty_end, "block flushed");
                Ok(())
            }
            Err(err) if err.is_retryable() => {
                debug!(node = %node.id(), index, %err, "flush interrupted, dirty data retained");
                Err(err)
            }
            Err(err) => {
                debug!(node = %node.id(), index, %err, "flush failed, block discarded");
                block.clear_dirty();
                block.invalidate();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MountParams;
    use crate::testing::{Fault, InMemoryRemote};
    use std::sync::Arc;
    use tetherfs_proto::{FileId, NodeKind, TransportLimits};

    fn setup(content: &[u8]) -> (Arc<InMemoryRemote>, IoBridge<InMemoryRemote>, Node) {
        let limits = TransportLimits { max_read: 4096, max_write: 4096, io_size: 4096 };
        let remote = Arc::new(InMemoryRemote::with_limits(limits));
        remote.open_file(1, content.to_vec());
        let bridge = IoBridge::new(Arc::clone(&remote), &MountParams::new(limits)).unwrap();
        let node = Node::new(FileId(1), None, NodeKind::Regular, content.len() as u64);
        node.handles().register(AccessIntent::ReadOnly, 1);
        node.handles().register(AccessIntent::WriteOnly, 1);
        (remote, bridge, node)
    }

    #[test]
    fn test_fill_zero_fills_short_answer() {
        let (_, bridge, node) = setup(b"hello");
        let mut block = CacheBlock::with_len(16);
        block.data_mut().fill(0xAA);

        let size = node.read_data().size;
        bridge
            .execute(&node, 0, &mut block, BlockCmd::Fill, size, &Credentials::default())
            .unwrap();
        assert!(block.is_valid());
        assert_eq!(&block.data()[..5], b"hello");
        assert!(block.data()[5..].iter().all(|&b| b == 0), "tail is holes, not stale bytes");
    }

    #[test]
    fn test_flush_clean_block_is_a_no_op() {
        let (remote, bridge, node) = setup(b"data");
        let mut block = CacheBlock::with_len(4);

        let size = node.read_data().size;
        bridge
            .execute(&node, 0, &mut block, BlockCmd::Flush, size, &Credentials::default())
            .unwrap();
        assert_eq!(remote.write_count(), 0);
    }

    #[test]
    fn test_flush_writes_only_the_dirty_interval() {
        let (remote, bridge, node) = setup(&[0u8; 100]);
        let mut block = CacheBlock::with_len(100);
        block.data_mut()[30..60].fill(7);
        block.set_valid();
        block.mark_dirty(30, 60);

        let size = node.read_data().size;
        bridge
            .execute(&node, 0, &mut block, BlockCmd::Flush, size, &Credentials::default())
            .unwrap();
        assert_eq!(block.dirty(), None);
        assert_eq!(remote.write_ops(), vec![(30, 30)]);
        let file = remote.file(1);
        assert!(file[30..60].iter().all(|&b| b == 7));
        assert!(file[..30].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_flush_clamps_to_file_size() {
        let (remote, bridge, node) = setup(&[1u8; 50]);
        let mut block = CacheBlock::with_len(100);
        block.set_valid();
        block.mark_dirty(40, 90);

        // Tracked size says only 50 bytes exist; the rest was truncated
        // away after the write landed in cache.
        let size = node.read_data().size;
        bridge
            .execute(&node, 0, &mut block, BlockCmd::Flush, size, &Credentials::default())
            .unwrap();
        assert_eq!(remote.write_ops(), vec![(40, 10)]);
        assert_eq!(remote.file(1).len(), 50);
    }

    #[test]
    fn test_flush_wholly_past_eof_drops_dirty_without_exchange() {
        let (remote, bridge, node) = setup(&[1u8; 10]);
        let mut block = CacheBlock::with_len(100);
        block.set_valid();
        block.mark_dirty(60, 80);

        let size = node.read_data().size;
        bridge
            .execute(&node, 0, &mut block, BlockCmd::Flush, size, &Credentials::default())
            .unwrap();
        assert_eq!(block.dirty(), None);
        assert_eq!(remote.write_count(), 0);
    }

    #[test]
    fn test_retryable_flush_failure_keeps_dirty() {
        let (remote, bridge, node) = setup(&[0u8; 20]);
        remote.push_write_fault(Fault::Timeout);
        let mut block = CacheBlock::with_len(20);
        block.set_valid();
        block.mark_dirty(0, 10);

        let size = node.read_data().size;
        let err = bridge
            .execute(&node, 0, &mut block, BlockCmd::Flush, size, &Credentials::default())
            .unwrap_err();
        assert_eq!(err, BridgeError::TimedOut);
        assert_eq!(block.dirty(), Some((0, 10)), "retryable failure must not lose data");
        assert!(block.is_valid());

        // A retry with the fault gone succeeds.
        let size = node.read_data().size;
        bridge
            .execute(&node, 0, &mut block, BlockCmd::Flush, size, &Credentials::default())
            .unwrap();
        assert_eq!(block.dirty(), None);
    }

    #[test]
    fn test_fill_retires_a_retained_dirty_interval_first() {
        let (remote, bridge, node) = setup(&[0u8; 100]);
        let mut block = CacheBlock::with_len(100);
        block.data_mut()[30..40].fill(7);
        block.mark_dirty(30, 40);

        // An invalid block can still carry the only copy of bytes a
        // failed flush left behind; the fill must not clobber them.
        let size = node.read_data().size;
        bridge
            .execute(&node, 0, &mut block, BlockCmd::Fill, size, &Credentials::default())
            .unwrap();
        assert_eq!(remote.write_ops(), vec![(30, 10)]);
        assert!(block.is_valid());
        assert_eq!(block.dirty(), None);
        assert!(block.data()[30..40].iter().all(|&b| b == 7), "flushed bytes read back");
    }

    #[test]
    fn test_execute_never_takes_the_node_data_lock() {
        let (remote, bridge, node) = setup(&[0u8; 20]);
        let mut block = CacheBlock::with_len(20);
        block.set_valid();
        block.mark_dirty(0, 10);

        // A collaborator reads the size before taking the block guard;
        // holding the data lock across the flush must not wedge it.
        let data = node.write_data();
        bridge
            .execute(&node, 0, &mut block, BlockCmd::Flush, data.size, &Credentials::default())
            .unwrap();
        drop(data);
        assert_eq!(remote.write_ops(), vec![(0, 10)]);
    }

    #[test]
    fn test_fatal_flush_failure_discards_the_block() {
        let (remote, bridge, node) = setup(&[0u8; 20]);
        remote.push_write_fault(Fault::Errno(5));
        let mut block = CacheBlock::with_len(20);
        block.set_valid();
        block.mark_dirty(0, 10);

        let size = node.read_data().size;
        let err = bridge
            .execute(&node, 0, &mut block, BlockCmd::Flush, size, &Credentials::default())
            .unwrap_err();
        assert_eq!(err, BridgeError::Remote(5));
        assert_eq!(block.dirty(), None);
        assert!(!block.is_valid());
    }
}
