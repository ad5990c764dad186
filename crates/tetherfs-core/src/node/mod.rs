//! Local objects backing remote file identities.
//!
//! A [`Node`] is the in-memory representation of one remote file: its
//! identity, kind, tracked size, cached attribute snapshot, open-handle
//! slots, and the locks serializing access to all of that. Exactly one
//! live `Node` exists per [`FileId`] for the lifetime of the mount; the
//! [`NodeTable`](table::NodeTable) enforces that.

pub mod table;

use crate::handle::HandleSlots;
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tetherfs_proto::{FileId, NodeKind};

/// Attribute snapshot as last reported by the remote service.
///
/// Population is a collaborator's concern; the data path only consumes
/// the tracked size and invalidates the snapshot after I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileAttr {
    /// File size in bytes as reported by the service.
    pub size: u64,
    /// Permission bits.
    pub mode: u32,
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// Link count.
    pub nlink: u32,
}

/// A cached [`FileAttr`] plus the deadline it is trusted until.
#[derive(Debug, Clone, Copy)]
pub struct AttrSnapshot {
    /// The cached attributes.
    pub attr: FileAttr,
    /// Instant after which the snapshot must not be used.
    pub valid_until: Instant,
}

/// State guarded by the node lock: anything reading or mutating the
/// tracked size or the attribute snapshot must hold it.
#[derive(Debug, Default)]
pub struct NodeData {
    /// Tracked file size. Never decreases as a side effect of a write.
    pub size: u64,
    /// Cached attribute snapshot, `None` once invalidated.
    pub attrs: Option<AttrSnapshot>,
}

/// Explicit per-node state flags.
///
/// The original kernel code kept these as overlapping bit masks; they
/// are individual fields here so each one's meaning is visible.
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeFlags {
    /// Remote creation has been issued but the object is not yet visible.
    pub creating: bool,
    /// The remote identity was revoked; the object is unusable.
    pub revoked: bool,
    /// Local modifications exist since the last size sync.
    pub modified: bool,
    /// The remote file was deleted while the object was still referenced.
    pub deleted: bool,
    /// The object is reachable through more than one name.
    pub hard_linked: bool,
    /// Tracked size must be pushed to the service before it is trusted.
    pub needs_size_sync: bool,
}

/// Completion signal for an in-flight, not-yet-visible object creation.
///
/// A single producer calls [`begin`](Self::begin) and later
/// [`complete`](Self::complete); any other caller that reaches the object
/// in the meantime parks in [`wait_visible`](Self::wait_visible) instead
/// of polling a flag.
#[derive(Debug)]
pub struct CreationGate {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl CreationGate {
    fn new(pending: bool) -> Self {
        Self { pending: Mutex::new(pending), cond: Condvar::new() }
    }

    /// Marks creation in flight.
    pub fn begin(&self) {
        *self.pending.lock() = true;
    }

    /// Marks the object visible and wakes all waiters.
    pub fn complete(&self) {
        let mut pending = self.pending.lock();
        *pending = false;
        self.cond.notify_all();
    }

    /// Blocks until the object is visible.
    pub fn wait_visible(&self) {
        let mut pending = self.pending.lock();
        while *pending {
            self.cond.wait(&mut pending);
        }
    }
}

/// Local representation of one remote file.
///
/// Lock ordering: the node data lock is acquired before the truncate
/// lock; collaborators resizing a file must follow the same order.
#[derive(Debug)]
pub struct Node {
    id: FileId,
    /// Best-effort parent identity. Documented upstream as going stale
    /// across rename; nothing in the core corrects it.
    parent: Mutex<Option<FileId>>,
    kind: NodeKind,
    data: RwLock<NodeData>,
    truncate_lock: Mutex<()>,
    handles: HandleSlots,
    flags: Mutex<NodeFlags>,
    creation: CreationGate,
    lookups: AtomicU64,
    cache_enabled: AtomicBool,
}

impl Node {
    /// Creates a visible node with the given tracked size.
    pub fn new(id: FileId, parent: Option<FileId>, kind: NodeKind, size: u64) -> Self {
        Self {
            id,
            parent: Mutex::new(parent),
            kind,
            data: RwLock::new(NodeData { size, attrs: None }),
            truncate_lock: Mutex::new(()),
            handles: HandleSlots::new(),
            flags: Mutex::new(NodeFlags::default()),
            creation: CreationGate::new(false),
            lookups: AtomicU64::new(0),
            cache_enabled: AtomicBool::new(true),
        }
    }

    /// Creates a node whose remote creation is still in flight. Callers
    /// other than the creator must [`CreationGate::wait_visible`] before
    /// using it.
    pub fn new_creating(id: FileId, parent: Option<FileId>, kind: NodeKind) -> Self {
        let node = Self::new(id, parent, kind, 0);
        node.flags.lock().creating = true;
        node.creation.begin();
        node
    }

    /// The remote identity this object is bound to.
    #[inline]
    pub fn id(&self) -> FileId {
        self.id
    }

    /// Object kind. Immutable; a kind change for a live identity is a
    /// protocol violation caught by the node table.
    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Best-effort parent identity (may be stale across rename).
    pub fn parent(&self) -> Option<FileId> {
        *self.parent.lock()
    }

    /// Overwrites the parent hint. Exists for a rename collaborator; the
    /// core never calls it.
    pub fn set_parent(&self, parent: Option<FileId>) {
        *self.parent.lock() = parent;
    }

    /// Open-handle slots for this object.
    #[inline]
    pub fn handles(&self) -> &HandleSlots {
        &self.handles
    }

    /// Acquires the node lock shared (read paths).
    pub fn read_data(&self) -> RwLockReadGuard<'_, NodeData> {
        self.data.read()
    }

    /// Acquires the node lock exclusive (any mutation of size, attrs, or
    /// dirty state routed through this node).
    pub fn write_data(&self) -> RwLockWriteGuard<'_, NodeData> {
        self.data.write()
    }

    /// Holds the truncate lock for a sequence that needs a stable size
    /// across several steps. Take after the node data lock.
    pub fn lock_truncate(&self) -> MutexGuard<'_, ()> {
        self.truncate_lock.lock()
    }

    /// Per-node state flags.
    pub fn flags(&self) -> MutexGuard<'_, NodeFlags> {
        self.flags.lock()
    }

    /// Creation-in-progress gate.
    #[inline]
    pub fn creation(&self) -> &CreationGate {
        &self.creation
    }

    /// Marks the in-flight creation finished and wakes waiters.
    pub fn mark_created(&self) {
        self.flags.lock().creating = false;
        self.creation.complete();
    }

    /// Drops the cached attribute snapshot. Called unconditionally after
    /// every dispatched I/O: the remote size or mtime may have changed
    /// regardless of outcome.
    pub fn invalidate_attrs(&self) {
        self.data.write().attrs = None;
    }

    /// Installs a fresh attribute snapshot (population hook for the
    /// attribute collaborator) and adopts its size as the tracked size.
    pub fn install_attrs(&self, attr: FileAttr, ttl: Duration) {
        let mut data = self.data.write();
        data.size = attr.size;
        data.attrs = Some(AttrSnapshot { attr, valid_until: Instant::now() + ttl });
    }

    /// Returns the snapshot if it is still within its validity window.
    pub fn valid_attrs(&self) -> Option<FileAttr> {
        let data = self.data.read();
        data.attrs
            .filter(|snap| Instant::now() < snap.valid_until)
            .map(|snap| snap.attr)
    }

    /// Whether cached (block-granular) I/O is enabled for this object.
    #[inline]
    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled.load(Ordering::Relaxed)
    }

    /// Disables or re-enables cached I/O (the open-time direct-io option
    /// a remote service can request per file).
    pub fn set_cache_enabled(&self, enabled: bool) {
        self.cache_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Current lookup count.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    pub(crate) fn inc_lookups(&self) -> u64 {
        self.lookups.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrements the lookup count by `n`, saturating at zero, and
    /// returns the new value. When it licenses reclamation is the
    /// reclamation collaborator's decision.
    pub(crate) fn dec_lookups(&self, n: u64) -> u64 {
        let old = self.lookups.fetch_sub(n, Ordering::AcqRel);
        if old < n {
            self.lookups.fetch_add(n - old, Ordering::Relaxed);
            0
        } else {
            old - n
        }
    }
}
