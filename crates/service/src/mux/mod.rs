//! Multiplexer: fans one upstream RODA connection out to up to 256
//! downstream ports, each with its own session-ID replay protection.
//!
//! Locking discipline is strict: `connect_mutex` -> `mux_mutex` ->
//! `port_mutex`. Upstream callbacks (this type's [`Rodan`] impl) take
//! `mux_mutex` and, as needed, a port's own lock. Downstream calls made by
//! clients on a [`Port`] take only that port's lock, which is what keeps
//! client-to-server calls deadlock-free against server-to-client callbacks
//! arriving on the same port concurrently.

pub mod port;

use std::sync::Arc;

use parking_lot::Mutex;

use codec::{
    request::{PingRequest, Request},
    response::Response,
    rsi::ReturnStackItem,
};

use crate::{
    errors::CoreError,
    roda::{Roda, Rodan},
};

pub use self::port::Port;

const MAX_PORTS: usize = 256;
/// Bit 23 of the packed RSI `info` field: marks a flush ping the mux sent
/// to itself, as opposed to a client-originated request.
const MY_PING_FLAG: u32 = 0x0080_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MuxState {
    NotConnected,
    Disconnecting,
    NotReady,
    Ready,
}

pub(crate) struct MuxShared {
    pub(crate) state: MuxState,
    pub(crate) adjusted_max_request_size: u32,
    pub(crate) adjusted_max_response_size: u32,
}

pub struct Multiplexer {
    pub(crate) owner_id: u32,
    connect_mutex: Mutex<Option<Arc<dyn Roda>>>,
    pub(crate) mux: Mutex<MuxShared>,
    ports: Mutex<Vec<Arc<Port>>>,
}

impl Multiplexer {
    pub fn new(owner_id: u32) -> Arc<Self> {
        Arc::new(Self {
            owner_id,
            connect_mutex: Mutex::new(None),
            mux: Mutex::new(MuxShared {
                state: MuxState::NotConnected,
                adjusted_max_request_size: 0,
                adjusted_max_response_size: 0,
            }),
            ports: Mutex::new(Vec::new()),
        })
    }

    /// Connect to an upstream RODA instance, registering this multiplexer
    /// as its client.
    pub fn connect(self: &Arc<Self>, upstream: Arc<dyn Roda>) -> Result<(), CoreError> {
        let mut slot = self.connect_mutex.lock();
        upstream.register(self.clone() as Arc<dyn Rodan>)?;
        *slot = Some(upstream);
        Ok(())
    }

    /// Tear down the upstream connection.
    pub fn disconnect(&self) {
        let upstream = {
            let mut slot = self.connect_mutex.lock();
            self.mux.lock().state = MuxState::Disconnecting;
            slot.take()
        };

        if let Some(upstream) = upstream {
            upstream.unregister();
        }

        self.mux.lock().state = MuxState::NotConnected;
    }

    /// Create a new downstream port. Fails once 256 ports have been handed
    /// out, matching the 8-bit port-index field packed into the mux's RSI.
    pub fn create_port(self: &Arc<Self>) -> Result<Arc<Port>, CoreError> {
        let mut ports = self.ports.lock();
        if ports.len() >= MAX_PORTS {
            return Err(CoreError::NoSessionIdAvailable);
        }

        let index = ports.len() as u8;
        let port = Port::new(Arc::downgrade(self), index);
        ports.push(port.clone());
        Ok(port)
    }

    pub(crate) fn upstream(&self) -> Option<Arc<dyn Roda>> {
        self.connect_mutex.lock().clone()
    }

    fn ports_snapshot(&self) -> Vec<Arc<Port>> {
        self.ports.lock().clone()
    }
}

impl Rodan for Multiplexer {
    fn on_ready(&self, max_request_size: u32, max_response_size: u32) {
        let rsi_cost = ReturnStackItem::WIRE_SIZE as u32;
        let adjusted_max_request_size = max_request_size.saturating_sub(rsi_cost);
        let adjusted_max_response_size = max_response_size.saturating_sub(rsi_cost);

        {
            let mut mux = self.mux.lock();
            mux.state = MuxState::Ready;
            mux.adjusted_max_request_size = adjusted_max_request_size;
            mux.adjusted_max_response_size = adjusted_max_response_size;
        }

        for port in self.ports_snapshot() {
            port.on_upstream_ready(adjusted_max_request_size, adjusted_max_response_size);
        }
    }

    fn on_disconnected(&self) {
        self.mux.lock().state = MuxState::NotReady;

        for port in self.ports_snapshot() {
            port.on_upstream_disconnected();
        }
    }

    fn on_request_processed(&self, mut response: Response) {
        let Some(top) = response.rsi_mut().pop() else {
            panic!("mux received a response with an empty RSI stack: nothing to demultiplex on");
        };

        if top.creator_id != self.owner_id {
            panic!("mux received a response carrying a foreign RSI: protocol fault");
        }

        let port_index = (top.info >> 24) as u8;
        let session_id = (top.info & 0xFF) as u8;
        let is_ping_flush = (top.info >> 23) & 1 == 1;

        let ports = self.ports_snapshot();
        let Some(port) = ports.get(port_index as usize) else {
            return;
        };

        if is_ping_flush {
            port.on_ping_flush_returned(session_id);
        } else {
            port.on_response(session_id, response);
        }
    }

    fn loan_execution_context(&self) {
        let mut needs_refire = false;
        for port in self.ports_snapshot() {
            port.complete_pending_ready();
            needs_refire |= port.run_pending_loan();
        }

        if needs_refire {
            if let Some(upstream) = self.upstream() {
                let _ = upstream.request_execution_context();
            }
        }
    }
}

/// Build the RSI a forward pushes to tag the upstream request with a port
/// and session.
fn stamp(owner_id: u32, port_index: u8, session_id: u8, is_ping_flush: bool) -> ReturnStackItem {
    let mut info = ((port_index as u32) << 24) | session_id as u32;
    if is_ping_flush {
        info |= MY_PING_FLAG;
    }
    ReturnStackItem::new(owner_id, info)
}

fn flush_ping(owner_id: u32, port_index: u8, next_session_id: u8, max_response_size: u32) -> Request {
    let mut rsi = codec::rsi::ReturnStack::new();
    rsi.push(stamp(owner_id, port_index, next_session_id, true))
        .expect("a single-entry stack always has room");

    Request::Ping(PingRequest {
        max_response_size,
        rsi,
    })
}
