//! Wire vocabulary shared between the tetherfs data-path core and the
//! transport that carries its messages.
//!
//! The remote filesystem service assigns every file an opaque 64-bit
//! identity and every open instance a handle id. This crate defines those
//! identifiers, the read/write message shapes exchanged with the remote
//! service, the limits negotiated at mount time, and the block layout
//! derived from them. It performs no I/O of its own.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod limits;
mod message;

pub use limits::{BlockLayout, LimitsError, TransportLimits, MAX_BLOCK_SIZE};
pub use message::{ReadReply, ReadRequest, Reply, Request, WriteReply, WriteRequest};

use serde::{Deserialize, Serialize};

/// Opaque identity the remote service assigns to a file.
///
/// Immutable once assigned and unique for the lifetime of the mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub u64);

impl FileId {
    /// Reserved invalid identity. Never names a file.
    pub const NULL: FileId = FileId(0);
    /// Identity of the mount's root object.
    pub const ROOT: FileId = FileId(1);

    /// Returns true for the reserved invalid identity.
    #[inline]
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of object a [`FileId`] names, as reported by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Regular file.
    Regular,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
}

/// Caller credentials accompanying each exchange.
///
/// The core forwards these to the transport untouched; permission policy
/// is the remote service's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// Effective user id of the caller.
    pub uid: u32,
    /// Effective group id of the caller.
    pub gid: u32,
    /// Process id of the caller.
    pub pid: u32,
}
