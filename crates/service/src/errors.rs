//! Error taxonomy surfaced at the `Roda`/mux boundary.
//!
//! Everything here is a caller-facing rejection with the strong guarantee:
//! on error, state is unchanged and nothing was enqueued. Protocol and
//! invariant violations are not represented here - they panic, since a
//! RODAN callback must never observe them as a recoverable error.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    /// No client is registered for this instance.
    NotRegistered,
    /// A client is registered but hasn't completed `on_ready` yet (or has
    /// since been torn down).
    NotReady,
    /// `on_start` called on an instance that is already running.
    AlreadyRunning,
    /// `on_stop` called on an instance that isn't running.
    AlreadyStopped,
    /// `register` called on an instance that already has a client.
    AlreadyRegistered,
    /// Serialized request exceeds `server_max_request_size`.
    RequestTooLarge,
    /// Requested `max_response_size` exceeds `server_max_response_size`.
    ResponseTooLarge,
    /// `max_response_size` minus the RSI stack leaves less than
    /// `min_useful_response_size` for the payload.
    MinResponseSizeNotMet,
    /// The multiplexer's session-ID ring is exhausted for this port.
    NoSessionIdAvailable,
}

impl std::error::Error for CoreError {}

impl std::fmt::Display for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            CoreError::NotRegistered => "no client is registered",
            CoreError::NotReady => "client is registered but not yet ready",
            CoreError::AlreadyRunning => "instance is already running",
            CoreError::AlreadyStopped => "instance is already stopped",
            CoreError::AlreadyRegistered => "a client is already registered",
            CoreError::RequestTooLarge => "request exceeds the server's maximum request size",
            CoreError::ResponseTooLarge => "requested max_response_size exceeds the server's limit",
            CoreError::MinResponseSizeNotMet => {
                "max_response_size leaves no room for a useful response after the RSI stack"
            }
            CoreError::NoSessionIdAvailable => "session id ring exhausted, retry once pending pings drain",
        };

        write!(f, "{message}")
    }
}
