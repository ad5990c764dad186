//! Data-path core of the tetherfs bridge.
//!
//! tetherfs backs local file objects with a remote filesystem service
//! reached over a synchronous exchange transport. This crate is the part
//! that moves bytes: a block cache with dirty-interval coalescing and
//! write-through flushing, a chunked direct backend for uncacheable
//! traffic, and the table binding each remote identity to exactly one
//! live object.
//!
//! The transport itself and the outer filesystem surface (lookup
//! protocol handlers, permission checks, mount plumbing) live elsewhere;
//! this crate talks to them through the [`transport::Transport`] trait
//! and the [`node::Node`] objects it manages.
//!
//! # Entry points
//!
//! - [`io::IoBridge`] dispatches reads and writes for one mount.
//! - [`node::table::NodeTable`] resolves identities to live nodes.
//! - [`testing::InMemoryRemote`] answers the transport contract from
//!   in-memory byte vectors, for tests.

#![warn(missing_docs)]

pub mod block;
pub mod config;
pub mod error;
pub mod handle;
pub mod io;
pub mod node;
pub mod testing;
pub mod transport;

pub use block::{BlockCache, BlockGuard, CacheBlock};
pub use config::MountParams;
pub use error::{BridgeError, ProtocolViolation};
pub use handle::{AccessIntent, HandleSlots, OpenHandle};
pub use io::{BlockCmd, IoBridge, IoData, IoRequest};
pub use node::table::{NamingContext, NodeTable};
pub use node::Node;
pub use transport::{Exchange, TicketId, Transport};
