//! Transport collaborator interface and the exchange lifecycle.
//!
//! The transport that actually moves messages over the wire is not part
//! of this core; it is assumed to provide a submit/wait/release primitive
//! with 1:1 request/answer correlation. [`Exchange`] wraps one in-flight
//! request so the underlying resource is released exactly once on every
//! exit path, success or failure.

use crate::error::BridgeError;
use tetherfs_proto::{Credentials, Reply, Request};
use tracing::trace;

/// Correlation token for one in-flight exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TicketId(pub u64);

/// The send/receive primitive the data path is built on.
///
/// `wait` blocks the calling thread for the full round trip. The wait may
/// be interrupted by an externally delivered cancellation signal
/// ([`BridgeError::Interrupted`]) or time out ([`BridgeError::TimedOut`]);
/// both are retryable. There is no mid-exchange cancellation: once a
/// request is submitted, its specific answer (or failure) is always
/// awaited.
pub trait Transport: Send + Sync {
    /// Sends one request, returning the ticket its answer will arrive on.
    fn submit(&self, request: Request, cred: &Credentials) -> Result<TicketId, BridgeError>;

    /// Blocks until the answer for `ticket` arrives, is interrupted, or
    /// times out.
    fn wait(&self, ticket: TicketId) -> Result<Reply, BridgeError>;

    /// Frees the exchange resource. Called exactly once per ticket.
    fn release(&self, ticket: TicketId);
}

/// One request/answer exchange, scoped so the ticket is released on drop.
pub struct Exchange<'t, T: Transport + ?Sized> {
    transport: &'t T,
    ticket: TicketId,
}

impl<'t, T: Transport + ?Sized> Exchange<'t, T> {
    /// Submits `request` and returns the in-flight exchange.
    pub fn begin(
        transport: &'t T,
        request: Request,
        cred: &Credentials,
    ) -> Result<Self, BridgeError> {
        let opcode = request.opcode();
        let ticket = transport.submit(request, cred)?;
        trace!(ticket = ticket.0, opcode, "exchange submitted");
        Ok(Self { transport, ticket })
    }

    /// Blocks for this exchange's answer.
    pub fn wait(&self) -> Result<Reply, BridgeError> {
        self.transport.wait(self.ticket)
    }
}

impl<T: Transport + ?Sized> Drop for Exchange<'_, T> {
    fn drop(&mut self) {
        self.transport.release(self.ticket);
    }
}
