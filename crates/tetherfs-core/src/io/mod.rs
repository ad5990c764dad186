//! The data path: dispatch, cached and direct backends.
//!
//! [`IoBridge`] is the single entry point for moving object bytes. Each
//! call names a live object, a direction, and a caller buffer; the
//! bridge picks the cached or direct backend, drives however many
//! transport exchanges the transfer needs, and reports bytes moved.
//!
//! Lock order on a node is data lock, then truncate lock, then block
//! guards in ascending index order. Every path here takes them that way.

mod cached;
pub mod cursor;
mod direct;
mod strategy;

pub use strategy::BlockCmd;

use crate::block::BlockCache;
use crate::config::MountParams;
use crate::io::cursor::{ReadCursor, WriteCursor};
use crate::error::BridgeError;
use crate::handle::AccessIntent;
use crate::node::Node;
use crate::transport::Transport;
use std::sync::Arc;
use tetherfs_proto::{BlockLayout, Credentials, LimitsError, NodeKind, TransportLimits};
use tracing::trace;

/// Direction and buffer for one data-path call.
#[derive(Debug)]
pub enum IoData<'a> {
    /// Fill the buffer from the object.
    Read(&'a mut [u8]),
    /// Send the buffer's bytes to the object.
    Write(&'a [u8]),
}

impl IoData<'_> {
    fn intent(&self) -> AccessIntent {
        match self {
            IoData::Read(_) => AccessIntent::ReadOnly,
            IoData::Write(_) => AccessIntent::WriteOnly,
        }
    }

    fn len(&self) -> usize {
        match self {
            IoData::Read(buf) => buf.len(),
            IoData::Write(data) => data.len(),
        }
    }
}

/// One data-path call.
#[derive(Debug)]
pub struct IoRequest<'a> {
    /// Starting object offset. Negative offsets are rejected.
    pub offset: i64,
    /// Direction and caller buffer.
    pub data: IoData<'a>,
    /// Force the direct backend regardless of caching eligibility.
    pub direct: bool,
}

/// Data-path front end over one transport connection.
pub struct IoBridge<T: Transport> {
    transport: Arc<T>,
    limits: TransportLimits,
    layout: BlockLayout,
    cache: BlockCache,
    cache_enabled: bool,
}

impl<T: Transport> IoBridge<T> {
    /// Builds a bridge from negotiated mount parameters.
    ///
    /// # Errors
    ///
    /// Fails when the negotiated exchange ceiling cannot produce a
    /// usable block layout.
    pub fn new(transport: Arc<T>, params: &MountParams) -> Result<Self, LimitsError> {
        let layout = params.limits.block_layout()?;
        Ok(Self {
            transport,
            limits: params.limits,
            layout,
            cache: BlockCache::new(),
            cache_enabled: params.cache_enabled,
        })
    }

    /// Negotiated block layout.
    #[inline]
    pub fn layout(&self) -> BlockLayout {
        self.layout
    }

    /// The block cache, for reclaim collaborators and introspection.
    #[inline]
    pub fn cache(&self) -> &BlockCache {
        &self.cache
    }

    /// Moves data between the caller buffer and `node`, returning the
    /// number of bytes transferred.
    ///
    /// Uses the cached backend unless the call, the mount, or the node
    /// opts out of caching. Attribute knowledge for the node is dropped
    /// on every return, success or failure, so the next attribute query
    /// refetches sizes the service may have changed underneath us.
    ///
    /// # Errors
    ///
    /// Anything from [`BridgeError`]; retryable variants leave cached
    /// dirty data in place for a later retry.
    pub fn dispatch(
        &self,
        node: &Node,
        req: IoRequest<'_>,
        cred: &Credentials,
    ) -> Result<usize, BridgeError> {
        if node.kind() != NodeKind::Regular {
            return Err(BridgeError::InvalidArgument("data i/o on non-regular object"));
        }
        let offset = u64::try_from(req.offset)
            .map_err(|_| BridgeError::InvalidArgument("negative offset"))?;

        // Handle resolution failure precedes any state change.
        let handle = node.handles().get(req.data.intent())?;
        let direct = req.direct || !self.cache_enabled || !node.cache_enabled();

        trace!(
            node = %node.id(),
            op = match req.data { IoData::Read(_) => "read", IoData::Write(_) => "write" },
            offset,
            len = req.data.len(),
            direct,
            "dispatching i/o"
        );

        let result = match req.data {
            IoData::Read(buf) => {
                let mut cursor = ReadCursor::new(offset, buf);
                let outcome = if direct {
                    self.direct_read(handle, &mut cursor, cred)
                } else {
                    let data = node.read_data();
                    self.cached_read(node, &data, &mut cursor, cred)
                };
                outcome.map(|()| cursor.filled())
            }
            IoData::Write(src) => {
                let mut cursor = WriteCursor::new(offset, src);
                let outcome = if direct {
                    let mut data = node.write_data();
                    self.direct_write(handle, &mut cursor, &mut data.size, cred)
                } else {
                    let mut data = node.write_data();
                    self.cached_write(node, &mut data, &mut cursor, cred)
                };
                outcome.map(|()| cursor.taken())
            }
        };

        node.invalidate_attrs();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::FileAttr;
    use crate::testing::InMemoryRemote;
    use tetherfs_proto::FileId;

    fn bridge(remote: Arc<InMemoryRemote>) -> IoBridge<InMemoryRemote> {
        let params = MountParams::new(remote.limits());
        IoBridge::new(remote, &params).unwrap()
    }

    fn regular_node(id: u64, size: u64) -> Node {
        let node = Node::new(FileId(id), None, NodeKind::Regular, size);
        node.handles().register(AccessIntent::ReadOnly, id);
        node.handles().register(AccessIntent::WriteOnly, id);
        node
    }

    #[test]
    fn test_negative_offset_rejected_before_any_exchange() {
        let remote = Arc::new(InMemoryRemote::new());
        remote.open_file(1, b"hello".to_vec());
        let bridge = bridge(Arc::clone(&remote));
        let node = regular_node(1, 5);

        let mut buf = [0u8; 4];
        let err = bridge
            .dispatch(
                &node,
                IoRequest { offset: -1, data: IoData::Read(&mut buf), direct: false },
                &Credentials::default(),
            )
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
        assert_eq!(remote.read_count(), 0);
    }

    #[test]
    fn test_missing_handle_is_reported_for_the_needed_intent() {
        let remote = Arc::new(InMemoryRemote::new());
        let bridge = bridge(remote);
        let node = Node::new(FileId(1), None, NodeKind::Regular, 0);

        let err = bridge
            .dispatch(
                &node,
                IoRequest { offset: 0, data: IoData::Write(b"x"), direct: false },
                &Credentials::default(),
            )
            .unwrap_err();
        assert_eq!(err, BridgeError::NoHandle(AccessIntent::WriteOnly));
    }

    #[test]
    fn test_non_regular_object_rejected() {
        let remote = Arc::new(InMemoryRemote::new());
        let bridge = bridge(remote);
        let node = Node::new(FileId(1), None, NodeKind::Directory, 0);

        let mut buf = [0u8; 4];
        let err = bridge
            .dispatch(
                &node,
                IoRequest { offset: 0, data: IoData::Read(&mut buf), direct: false },
                &Credentials::default(),
            )
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
    }

    #[test]
    fn test_dispatch_drops_attribute_knowledge() {
        let remote = Arc::new(InMemoryRemote::new());
        remote.open_file(1, b"abc".to_vec());
        let bridge = bridge(remote);
        let node = regular_node(1, 3);
        node.install_attrs(FileAttr::default(), std::time::Duration::from_secs(60));
        assert!(node.valid_attrs().is_some());

        let mut buf = [0u8; 3];
        bridge
            .dispatch(
                &node,
                IoRequest { offset: 0, data: IoData::Read(&mut buf), direct: true },
                &Credentials::default(),
            )
            .unwrap();
        assert!(node.valid_attrs().is_none());
    }
}
