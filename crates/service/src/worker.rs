//! The single hook a `RemoteAccessServer` needs from whatever drives its
//! worker thread.
//!
//! Concrete strategies - a dedicated thread that blocks on a condvar, or a
//! shared work queue serving many servers - are drivers of this contract
//! and live outside the core; only the contract itself does.

/// Causes [`RemoteAccessServer::work`](crate::server::RemoteAccessServer::work)
/// to be invoked on the worker thread at the next opportunity.
///
/// Must tolerate repeated calls: multiple unprocessed requests may coalesce
/// into a single invocation of `work()`, and a spurious call to `work()`
/// when there is nothing to do is harmless.
pub trait WorkerHook: Send + Sync {
    fn request_work_invocation(&self);
}
