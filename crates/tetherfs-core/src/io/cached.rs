//! Cached backend: block-granular reads and write-through writes.
//!
//! Reads clamp each block against the tracked file size, fill on miss,
//! and stop at end-of-file. Writes are read-modify-write against the
//! block cache with synchronous write-back, so a successful return means
//! the remote service acknowledged every byte. A write landing at the
//! tracked end-of-file takes the append path: the tracked size moves
//! first, then the block allocation grows under it without losing the
//! cached content.

use crate::error::BridgeError;
use crate::io::cursor::{ReadCursor, WriteCursor};
use crate::io::IoBridge;
use crate::node::{Node, NodeData};
use crate::transport::Transport;
use tetherfs_proto::Credentials;
use tracing::trace;

impl<T: Transport> IoBridge<T> {
    /// Reads through the block cache until the buffer is full or the
    /// tracked end-of-file is reached.
    pub(super) fn cached_read(
        &self,
        node: &Node,
        data: &NodeData,
        cursor: &mut ReadCursor<'_>,
        cred: &Credentials,
    ) -> Result<(), BridgeError> {
        while cursor.residual() > 0 {
            let position = cursor.position();
            let index = self.layout.block_index(position);
            let on = self.layout.offset_in_block(position);
            let bcount = self.layout.valid_len(index, data.size);
            if bcount == 0 {
                // Wholly past the tracked end-of-file; nothing to
                // materialize in the cache.
                break;
            }

            let mut block = self.cache.acquire(node.id(), index, bcount);
            if !block.is_valid() {
                self.refill_block(node, index, &mut block, data.size, cred)?;
            }

            let n = if on < bcount {
                (bcount - on).min(cursor.residual())
            } else {
                0
            };
            if n == 0 {
                // At or past the tracked end-of-file.
                break;
            }
            cursor.copy_in(&block.data()[on..on + n]);
            trace!(node = %node.id(), index, on, n, "cached read copied");
        }
        Ok(())
    }

    /// Writes through the block cache, flushing each touched block
    /// before moving on.
    pub(super) fn cached_write(
        &self,
        node: &Node,
        data: &mut NodeData,
        cursor: &mut WriteCursor<'_>,
        cred: &Credentials,
    ) -> Result<(), BridgeError> {
        let block_size = self.layout.block_size() as usize;

        while cursor.residual() > 0 {
            let position = cursor.position();
            let index = self.layout.block_index(position);
            let on = self.layout.offset_in_block(position);
            let n = (block_size - on).min(cursor.residual());

            let mut block = if position == data.size {
                // Appending. Take the block at its pre-extension length,
                // move the tracked size, then grow the allocation under
                // it; the bytes already cached stay authoritative.
                let _truncate = node.lock_truncate();
                let mut block = self.cache.acquire(node.id(), index, on);
                data.size = position + n as u64;
                block.grow_preserving_valid(on + n);
                block
            } else {
                let mut bcount = on + n;
                if self.layout.block_start(index) + (bcount as u64) < data.size {
                    bcount = self.layout.valid_len(index, data.size);
                }
                let block = self.cache.acquire(node.id(), index, bcount);
                if position + n as u64 > data.size {
                    let _truncate = node.lock_truncate();
                    data.size = position + n as u64;
                }
                block
            };

            if on == 0 && n == block.len() {
                // Full-allocation overwrite needs no remote content.
                block.set_valid();
            }
            if !block.is_valid() {
                self.refill_block(node, index, &mut block, data.size, cred)?;
            }

            // An append on another path may have left a dirty interval
            // reaching past this allocation.
            block.reconcile_dirty();
            if block.dirty_disjoint_from(on, on + n) {
                // Accepting this write would split the dirty interval;
                // retire the existing one first.
                self.flush_block(node, index, &mut block, data.size, cred)?;
            }

            let chunk = cursor.take(n);
            block.data_mut()[on..on + n].copy_from_slice(chunk);
            block.mark_dirty(on, on + n);
            trace!(node = %node.id(), index, on, n, "cached write staged");

            self.flush_block(node, index, &mut block, data.size, cred)?;
        }
        Ok(())
    }
}
