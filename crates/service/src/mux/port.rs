//! A single downstream-facing port of a [`Multiplexer`].

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use codec::{request::Request, response::Response};

use crate::{
    errors::CoreError,
    roda::{Roda, Rodan, SendError},
};

use super::{MuxState, Multiplexer, flush_ping, stamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PortState {
    NoClient,
    NotReady,
    Ready,
}

struct PortInner {
    state: PortState,
    session_id: u8,
    oldest_used_session_id: u8,
    session_id_used: bool,
    loan_requested: bool,
    /// Set when `register` negotiated a session id against an already-`Ready`
    /// mux and is waiting for the loaned execution context to fire before
    /// announcing `on_ready` downstream.
    pending_ready: bool,
    client: Option<Arc<dyn Rodan>>,
    max_request_size: u32,
    max_response_size: u32,
}

/// One of up to 256 isolated RODA server roles a [`Multiplexer`] exposes
/// downstream. Jointly owned by the mux and whoever holds a handle to it.
pub struct Port {
    mux: Weak<Multiplexer>,
    index: u8,
    inner: Mutex<PortInner>,
}

impl Port {
    pub(crate) fn new(mux: Weak<Multiplexer>, index: u8) -> Arc<Self> {
        Arc::new(Self {
            mux,
            index,
            inner: Mutex::new(PortInner {
                state: PortState::NoClient,
                session_id: 0,
                oldest_used_session_id: 0,
                session_id_used: false,
                loan_requested: false,
                pending_ready: false,
                client: None,
                max_request_size: 0,
                max_response_size: 0,
            }),
        })
    }

    pub(crate) fn on_upstream_ready(&self, adjusted_max_request_size: u32, adjusted_max_response_size: u32) {
        let (client, announce) = {
            let mut inner = self.inner.lock();
            inner.max_request_size = adjusted_max_request_size;
            inner.max_response_size = adjusted_max_response_size;

            if inner.client.is_some() && inner.state == PortState::NotReady {
                inner.state = PortState::Ready;
                (inner.client.clone(), true)
            } else {
                (None, false)
            }
        };

        if announce {
            if let Some(client) = client {
                client.on_ready(adjusted_max_request_size, adjusted_max_response_size);
            }
        }
    }

    /// Finish a registration that was negotiated against an already-`Ready`
    /// mux: fires once the loaned execution context this port asked for at
    /// `register` time comes back around, per §4.3's "`P = NotReady` until
    /// the loaned execution context fires" rule.
    pub(crate) fn complete_pending_ready(&self) {
        let (client, sizes) = {
            let mut inner = self.inner.lock();
            if inner.pending_ready && inner.state == PortState::NotReady {
                inner.pending_ready = false;
                inner.state = PortState::Ready;
                (inner.client.clone(), (inner.max_request_size, inner.max_response_size))
            } else {
                return;
            }
        };

        if let Some(client) = client {
            client.on_ready(sizes.0, sizes.1);
        }
    }

    pub(crate) fn on_upstream_disconnected(&self) {
        let client = {
            let mut inner = self.inner.lock();
            if inner.state == PortState::Ready {
                inner.state = PortState::NotReady;
                inner.loan_requested = false;
                inner.client.clone()
            } else {
                None
            }
        };

        if let Some(client) = client {
            client.on_disconnected();
        }
    }

    pub(crate) fn on_response(&self, session_id: u8, response: Response) {
        let client = {
            let inner = self.inner.lock();
            if inner.state == PortState::Ready && session_id == inner.session_id {
                inner.client.clone()
            } else {
                None
            }
        };

        if let Some(client) = client {
            client.on_request_processed(response);
        }
    }

    pub(crate) fn on_ping_flush_returned(&self, session_id: u8) {
        let mut inner = self.inner.lock();
        inner.oldest_used_session_id = session_id;
    }

    /// Run this port's pending loan, if any. Returns whether the handler
    /// re-armed it (meaning another upstream loan must be requested).
    pub(crate) fn run_pending_loan(&self) -> bool {
        let client = {
            let mut inner = self.inner.lock();
            if inner.loan_requested && inner.state == PortState::Ready {
                inner.loan_requested = false;
                inner.client.clone()
            } else {
                None
            }
        };

        let Some(client) = client else {
            return false;
        };

        client.loan_execution_context();
        self.inner.lock().loan_requested
    }
}

impl Roda for Port {
    fn register(&self, rodan: Arc<dyn Rodan>) -> Result<(), CoreError> {
        let Some(mux) = self.mux.upgrade() else {
            return Err(CoreError::NotRegistered);
        };

        // connect_mutex, released before mux_mutex/port_mutex are taken.
        let upstream = mux.upstream();

        let mux_state = mux.mux.lock();
        let mut inner = self.inner.lock();

        if inner.client.is_some() {
            return Err(CoreError::AlreadyRegistered);
        }

        if mux_state.state == MuxState::Ready {
            let next = inner.session_id.wrapping_add(1);
            if next == inner.oldest_used_session_id {
                return Err(CoreError::NoSessionIdAvailable);
            }

            if let Some(upstream) = &upstream {
                let _ = upstream.request_execution_context();

                if inner.session_id_used {
                    let ping = flush_ping(mux.owner_id, self.index, next, mux_state.adjusted_max_response_size);
                    let _ = upstream.send(ping);
                }
            }

            inner.session_id = next;
            inner.session_id_used = false;
            inner.max_request_size = mux_state.adjusted_max_request_size;
            inner.max_response_size = mux_state.adjusted_max_response_size;
            inner.pending_ready = upstream.is_some();
        }

        inner.client = Some(rodan);
        inner.state = PortState::NotReady;
        Ok(())
    }

    fn unregister(&self) {
        let client = {
            let mut inner = self.inner.lock();
            inner.state = PortState::NoClient;
            inner.loan_requested = false;
            inner.client.take()
        };

        drop(client);
    }

    fn send(&self, mut request: Request) -> Result<(), SendError> {
        let rsi = {
            let inner = self.inner.lock();
            if inner.state != PortState::Ready {
                return Err(SendError {
                    error: CoreError::NotReady,
                    request,
                });
            }

            let Some(mux) = self.mux.upgrade() else {
                return Err(SendError {
                    error: CoreError::NotReady,
                    request,
                });
            };

            stamp(mux.owner_id, self.index, inner.session_id, false)
        };

        if request.rsi_mut().push(rsi).is_err() {
            return Err(SendError {
                error: CoreError::RequestTooLarge,
                request,
            });
        }

        let Some(mux) = self.mux.upgrade() else {
            request.rsi_mut().pop();
            return Err(SendError {
                error: CoreError::NotReady,
                request,
            });
        };
        let Some(upstream) = mux.upstream() else {
            request.rsi_mut().pop();
            return Err(SendError {
                error: CoreError::NotReady,
                request,
            });
        };

        match upstream.send(request) {
            Ok(()) => {
                self.inner.lock().session_id_used = true;
                Ok(())
            }
            Err(mut err) => {
                err.request.rsi_mut().pop();
                Err(err)
            }
        }
    }

    fn request_execution_context(&self) -> Result<(), CoreError> {
        let mux = {
            let mut inner = self.inner.lock();
            if inner.state != PortState::Ready {
                return Err(CoreError::NotReady);
            }
            inner.loan_requested = true;
            self.mux.upgrade()
        };

        let Some(mux) = mux else {
            return Err(CoreError::NotReady);
        };
        let Some(upstream) = mux.upstream() else {
            return Err(CoreError::NotReady);
        };

        upstream.request_execution_context()
    }
}
