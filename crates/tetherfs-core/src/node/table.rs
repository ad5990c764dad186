//! Mount-wide identity table.
//!
//! Maps each remote [`FileId`] to exactly one live [`Node`]. The table is
//! the only mount-wide shared structure on the data path, so its
//! lookup/insert paths must hold up under arbitrary concurrent callers.
//! Lifetime beyond the lookup counter is the reclamation collaborator's
//! concern.

use super::Node;
use crate::error::{BridgeError, ProtocolViolation};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tetherfs_proto::{FileId, NodeKind};
use tracing::{debug, trace};

/// Name under which an identity was reached, registered for fast
/// subsequent lookups.
#[derive(Debug, Clone, Copy)]
pub struct NamingContext<'a> {
    /// Directory the name lives in.
    pub parent: FileId,
    /// The entry name.
    pub name: &'a str,
}

/// Concurrent map from remote identity to local object.
#[derive(Debug, Default)]
pub struct NodeTable {
    nodes: DashMap<FileId, Arc<Node>>,
    names: DashMap<(FileId, String), FileId>,
}

impl NodeTable {
    /// Creates an empty table with the root object pre-bound.
    pub fn new(root_size: u64) -> Self {
        let table = Self { nodes: DashMap::new(), names: DashMap::new() };
        table.nodes.insert(
            FileId::ROOT,
            Arc::new(Node::new(FileId::ROOT, None, NodeKind::Directory, root_size)),
        );
        table
    }

    /// Returns the object bound to `id`, creating it if absent.
    ///
    /// An existing object whose kind disagrees with `kind` is a fatal
    /// consistency violation: identity reuse across incompatible kinds is
    /// unsupported. The lookup counter is incremented on every successful
    /// return, creation or cache hit; when that counter licenses
    /// reclamation belongs to the reclamation collaborator.
    pub fn get_or_create(
        &self,
        id: FileId,
        parent: Option<FileId>,
        kind: NodeKind,
        size: u64,
        naming: Option<NamingContext<'_>>,
    ) -> Result<Arc<Node>, BridgeError> {
        if id.is_null() {
            return Err(BridgeError::InvalidArgument("null identity"));
        }

        // The entry API makes check-and-insert atomic, so a racing
        // second insert for the same identity lands in the Occupied arm
        // instead of producing a duplicate object.
        let node = match self.nodes.entry(id) {
            Entry::Occupied(entry) => {
                let node = Arc::clone(entry.get());
                if node.kind() != kind {
                    return Err(BridgeError::Protocol(ProtocolViolation::KindMismatch {
                        id,
                        have: node.kind(),
                        want: kind,
                    }));
                }
                trace!(id = %id, "identity table hit");
                node
            }
            Entry::Vacant(entry) => {
                let node = Arc::new(Node::new(id, parent, kind, size));
                entry.insert(Arc::clone(&node));
                debug!(id = %id, ?kind, size, "identity table insert");
                node
            }
        };

        if let Some(ctx) = naming {
            self.names.insert((ctx.parent, ctx.name.to_owned()), id);
        }

        node.inc_lookups();
        Ok(node)
    }

    /// Binds a freshly created identity whose remote creation is still in
    /// flight. The identity must not already have a live object; a
    /// collision here means two creators raced past the remote service,
    /// which the mount cannot recover from.
    pub fn register_creating(
        &self,
        id: FileId,
        parent: Option<FileId>,
        kind: NodeKind,
        naming: Option<NamingContext<'_>>,
    ) -> Result<Arc<Node>, BridgeError> {
        if id.is_null() {
            return Err(BridgeError::InvalidArgument("null identity"));
        }

        let node = Arc::new(Node::new_creating(id, parent, kind));
        match self.nodes.entry(id) {
            Entry::Occupied(_) => {
                debug_assert!(false, "duplicate object for identity {id}");
                return Err(BridgeError::Protocol(ProtocolViolation::DuplicateIdentity(id)));
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&node));
            }
        }

        if let Some(ctx) = naming {
            self.names.insert((ctx.parent, ctx.name.to_owned()), id);
        }

        node.inc_lookups();
        Ok(node)
    }

    /// Looks up a live object without touching the lookup counter.
    pub fn get(&self, id: FileId) -> Option<Arc<Node>> {
        self.nodes.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Resolves a registered `(parent, name)` pair to its identity.
    pub fn lookup_name(&self, parent: FileId, name: &str) -> Option<FileId> {
        self.names.get(&(parent, name.to_owned())).map(|e| *e.value())
    }

    /// Drops the `(parent, name)` registration (unlink/rename path). The
    /// object itself stays live until the reclamation collaborator drops
    /// its last reference.
    pub fn invalidate_name(&self, parent: FileId, name: &str) {
        self.names.remove(&(parent, name.to_owned()));
    }

    /// Decrements `id`'s lookup count by `n`; removes the object once the
    /// count reaches zero. The root is never removed. Returns true if the
    /// object was removed.
    ///
    /// Must not race an active lookup on the same identity; the
    /// reclamation collaborator guarantees that.
    pub fn forget(&self, id: FileId, n: u64) -> bool {
        if id == FileId::ROOT {
            return false;
        }
        let Some(node) = self.get(id) else { return false };
        if node.dec_lookups(n) == 0 {
            self.nodes.remove(&id);
            self.names.retain(|_, bound| *bound != id);
            debug!(id = %id, "identity table evict");
            true
        } else {
            false
        }
    }

    /// Number of live objects, the root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when only the root object is live.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn table() -> NodeTable {
        NodeTable::new(0)
    }

    #[test]
    fn test_root_prebound() {
        let t = table();
        let root = t.get(FileId::ROOT).expect("root exists");
        assert_eq!(root.kind(), NodeKind::Directory);
        assert!(t.is_empty());
    }

    #[test]
    fn test_get_or_create_returns_same_instance() {
        let t = table();
        let a = t
            .get_or_create(FileId(5), Some(FileId::ROOT), NodeKind::Regular, 10, None)
            .unwrap();
        let b = t
            .get_or_create(FileId(5), Some(FileId::ROOT), NodeKind::Regular, 999, None)
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        // Hit path must not clobber the tracked size.
        assert_eq!(a.read_data().size, 10);
        assert_eq!(a.lookups(), 2);
    }

    #[test]
    fn test_kind_mismatch_is_fatal() {
        let t = table();
        t.get_or_create(FileId(5), None, NodeKind::Regular, 0, None).unwrap();
        let err = t
            .get_or_create(FileId(5), None, NodeKind::Directory, 0, None)
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::Protocol(ProtocolViolation::KindMismatch {
                id: FileId(5),
                have: NodeKind::Regular,
                want: NodeKind::Directory,
            })
        );
    }

    #[test]
    fn test_null_identity_rejected() {
        let t = table();
        assert!(matches!(
            t.get_or_create(FileId::NULL, None, NodeKind::Regular, 0, None),
            Err(BridgeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_naming_context_registration() {
        let t = table();
        t.get_or_create(
            FileId(7),
            Some(FileId::ROOT),
            NodeKind::Regular,
            0,
            Some(NamingContext { parent: FileId::ROOT, name: "notes.txt" }),
        )
        .unwrap();

        assert_eq!(t.lookup_name(FileId::ROOT, "notes.txt"), Some(FileId(7)));
        t.invalidate_name(FileId::ROOT, "notes.txt");
        assert_eq!(t.lookup_name(FileId::ROOT, "notes.txt"), None);
        // The object outlives its name.
        assert!(t.get(FileId(7)).is_some());
    }

    #[test]
    fn test_forget_evicts_at_zero() {
        let t = table();
        t.get_or_create(
            FileId(7),
            None,
            NodeKind::Regular,
            0,
            Some(NamingContext { parent: FileId::ROOT, name: "f" }),
        )
        .unwrap();
        t.get_or_create(FileId(7), None, NodeKind::Regular, 0, None).unwrap();

        assert!(!t.forget(FileId(7), 1));
        assert!(t.get(FileId(7)).is_some());

        assert!(t.forget(FileId(7), 1));
        assert!(t.get(FileId(7)).is_none());
        // Name registrations pointing at the evicted object go with it.
        assert_eq!(t.lookup_name(FileId::ROOT, "f"), None);
    }

    #[test]
    fn test_forget_never_evicts_root() {
        let t = table();
        assert!(!t.forget(FileId::ROOT, u64::MAX));
        assert!(t.get(FileId::ROOT).is_some());
    }

    #[test]
    fn test_register_creating_gates_visibility() {
        let t = table();
        let node = t
            .register_creating(FileId(8), Some(FileId::ROOT), NodeKind::Regular, None)
            .unwrap();
        assert!(node.flags().creating);
        node.mark_created();
        assert!(!node.flags().creating);
    }

    #[test]
    fn test_concurrent_get_or_create_single_instance() {
        let t = Arc::new(table());
        let mut workers = Vec::new();

        for _ in 0..16 {
            let t = Arc::clone(&t);
            workers.push(thread::spawn(move || {
                t.get_or_create(FileId(42), Some(FileId::ROOT), NodeKind::Regular, 0, None)
                    .unwrap()
            }));
        }

        let nodes: Vec<Arc<Node>> = workers.into_iter().map(|w| w.join().unwrap()).collect();
        for node in &nodes[1..] {
            assert!(Arc::ptr_eq(&nodes[0], node), "one live object per identity");
        }
        assert_eq!(nodes[0].lookups(), 16);
        assert_eq!(t.len(), 2); // root + one file
    }

    #[test]
    fn test_concurrent_distinct_identities() {
        let t = Arc::new(table());
        let mut workers = Vec::new();

        for i in 0..32u64 {
            let t = Arc::clone(&t);
            workers.push(thread::spawn(move || {
                t.get_or_create(FileId(100 + i), None, NodeKind::Regular, 0, None).unwrap().id()
            }));
        }

        let mut ids: Vec<FileId> = workers.into_iter().map(|w| w.join().unwrap()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 32);
        assert_eq!(t.len(), 33);
    }
}
