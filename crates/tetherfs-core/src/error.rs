//! Error taxonomy for the data path.
//!
//! Backends surface errors upward untranslated; the only downgrade in the
//! whole core is the strategy bridge turning a short read with no error
//! into a zero-fill. Retryable errors (interruption, timeout) must leave
//! dirty cache state intact so the write can be re-driven.

use crate::handle::AccessIntent;
use tetherfs_proto::{FileId, NodeKind};
use thiserror::Error;

/// Any failure the data path can report to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Malformed request rejected before any I/O was issued.
    #[error("invalid i/o argument: {0}")]
    InvalidArgument(&'static str),

    /// No open handle exists for the required access intent.
    #[error("no open {0} handle")]
    NoHandle(AccessIntent),

    /// The blocking wait for an answer was interrupted by an external
    /// cancellation signal. Retryable; dirty data is retained.
    #[error("exchange interrupted")]
    Interrupted,

    /// The blocking wait for an answer timed out. Retryable; dirty data
    /// is retained.
    #[error("exchange timed out")]
    TimedOut,

    /// The remote service broke the protocol contract. Fatal for the
    /// current call; the operation cannot be completed.
    #[error("protocol violation: {0}")]
    Protocol(ProtocolViolation),

    /// Failure reported by the remote service, passed through untouched.
    #[error("remote i/o error (errno {0})")]
    Remote(i32),
}

impl BridgeError {
    /// True for errors a caller may retry without losing state: the
    /// write path keeps a block's dirty interval across these.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::Interrupted | BridgeError::TimedOut)
    }
}

/// The specific contract breach behind a [`BridgeError::Protocol`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// The service acknowledged more write bytes than were sent.
    OverAckedWrite {
        /// Bytes in the chunk that was sent.
        sent: u32,
        /// Bytes the service claims to have written.
        acked: u32,
    },
    /// An identity was returned with a kind incompatible with the live
    /// object already bound to it.
    KindMismatch {
        /// The identity in question.
        id: FileId,
        /// Kind of the live object.
        have: NodeKind,
        /// Kind the remote service now reports.
        want: NodeKind,
    },
    /// A second live object was about to be created for an identity.
    DuplicateIdentity(FileId),
    /// The transport delivered an answer of the wrong kind for the
    /// request it was correlated with.
    ReplyMismatch {
        /// Operation the request asked for.
        expected: &'static str,
    },
}

impl std::fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolViolation::OverAckedWrite { sent, acked } => {
                write!(f, "write over-acknowledged ({acked} > {sent} bytes)")
            }
            ProtocolViolation::KindMismatch { id, have, want } => {
                write!(f, "identity {id} kind changed ({have:?} -> {want:?})")
            }
            ProtocolViolation::DuplicateIdentity(id) => {
                write!(f, "duplicate object for identity {id}")
            }
            ProtocolViolation::ReplyMismatch { expected } => {
                write!(f, "mismatched answer for {expected} request")
            }
        }
    }
}
