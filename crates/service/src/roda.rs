//! The RODA/RODAN transport contract.
//!
//! RODA is the surface a client calls into; RODAN is the surface the
//! server (or a multiplexer port acting as a server towards its own
//! downstream client) calls back on. Both sides of a connection implement
//! one of each: a [`RemoteAccessServer`](crate::server::RemoteAccessServer)
//! implements `Roda` and holds a registered `Rodan`; a
//! [`Port`](crate::mux::Port) implements both, forwarding `Roda` calls
//! upstream and `Rodan` calls downstream.

use std::sync::Arc;

use codec::{request::Request, response::Response};

use crate::errors::CoreError;

/// A `send` that was rejected. Carries the request back to the caller,
/// matching the strong exception guarantee: on failure, ownership never
/// left the caller's hands.
#[derive(Debug)]
pub struct SendError {
    pub error: CoreError,
    pub request: Request,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for SendError {}

/// Calls a client or forwarder makes against a server.
pub trait Roda: Send + Sync {
    /// Install the callback interface that will receive notifications.
    /// Fails if a client is already registered.
    fn register(&self, rodan: Arc<dyn Rodan>) -> Result<(), CoreError>;

    /// Remove the registered client, if any, and drop any queued work.
    /// Blocks until any in-flight RODAN callback to that client returns;
    /// no callback fires after this returns.
    fn unregister(&self);

    /// Submit a request for processing. Ownership of `request` transfers
    /// to the pipeline on success; on error the caller keeps it back via
    /// [`SendError::request`].
    fn send(&self, request: Request) -> Result<(), SendError>;

    /// Ask for [`Rodan::loan_execution_context`] to be invoked on the
    /// worker thread at the next opportunity.
    fn request_execution_context(&self) -> Result<(), CoreError>;
}

/// Calls a server or forwarder makes back into its registered client.
///
/// Every method here is part of the noexcept barrier: implementations must
/// not panic except to report a genuine, unrecoverable invariant violation,
/// since the core relies on these calls succeeding unconditionally once
/// delivered.
pub trait Rodan: Send + Sync {
    /// The interface is ready to accept `send`/`request_execution_context`.
    /// `max_request_size`/`max_response_size` bound what may be sent.
    fn on_ready(&self, max_request_size: u32, max_response_size: u32);

    /// The interface has stopped accepting calls; no further notification
    /// will arrive until a subsequent `on_ready`.
    fn on_disconnected(&self);

    /// Delivery of a response to a previously sent request. The RSI stack
    /// on `response` equals the one that was attached to the request.
    fn on_request_processed(&self, response: Response);

    /// Fires once per outstanding [`Roda::request_execution_context`]
    /// call (coalesced: multiple pending calls may be satisfied by one
    /// invocation). Re-requesting from inside this callback re-arms it
    /// exactly once.
    fn loan_execution_context(&self);
}
