//! Per-node open-handle slots.
//!
//! The remote service assigns a handle id when a file is opened for a
//! given access intent. Read and write intents are tracked independently
//! so concurrent readers and writers on one object use distinct handles.
//! Handle retirement (close) is driven by the owning collaborator.

use crate::error::BridgeError;
use parking_lot::RwLock;

/// Access intent a handle was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessIntent {
    /// Opened for reading.
    ReadOnly,
    /// Opened for writing.
    WriteOnly,
}

impl AccessIntent {
    const COUNT: usize = 2;

    #[inline]
    fn slot(self) -> usize {
        match self {
            AccessIntent::ReadOnly => 0,
            AccessIntent::WriteOnly => 1,
        }
    }
}

impl std::fmt::Display for AccessIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AccessIntent::ReadOnly => "read-only",
            AccessIntent::WriteOnly => "write-only",
        })
    }
}

/// A remote-assigned open handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenHandle {
    /// Handle id assigned by the remote service at open time.
    pub id: u64,
    /// Intent the handle was opened with.
    pub intent: AccessIntent,
}

/// One node's open handles, one optional slot per access intent.
#[derive(Debug, Default)]
pub struct HandleSlots {
    slots: RwLock<[Option<OpenHandle>; AccessIntent::COUNT]>,
}

impl HandleSlots {
    /// Creates an empty slot set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the handle the remote service assigned for `intent`,
    /// returning the handle it replaces, if any.
    pub fn register(&self, intent: AccessIntent, id: u64) -> Option<OpenHandle> {
        self.slots.write()[intent.slot()].replace(OpenHandle { id, intent })
    }

    /// Removes and returns the handle for `intent` (close path; owned by
    /// the collaborator).
    pub fn retire(&self, intent: AccessIntent) -> Option<OpenHandle> {
        self.slots.write()[intent.slot()].take()
    }

    /// Resolves the handle for `intent`, failing with
    /// [`BridgeError::NoHandle`] when none is registered.
    pub fn get(&self, intent: AccessIntent) -> Result<OpenHandle, BridgeError> {
        self.slots.read()[intent.slot()].ok_or(BridgeError::NoHandle(intent))
    }

    /// True if any intent currently has an open handle.
    pub fn any_open(&self) -> bool {
        self.slots.read().iter().any(Option::is_some)
    }
}
