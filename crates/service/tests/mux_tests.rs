//! Integration tests for `Multiplexer`/`Port` wired to a real
//! `RemoteAccessServer` as the upstream. All `WorkerHook` invocations are
//! driven by hand, via `server.work()`, so dispatch ordering is exact.

mod common;

use std::sync::Arc;

use codec::request::{PingRequest, Request};
use codec::response::Response;

use roda_core::mux::Multiplexer;
use roda_core::roda::{Roda, Rodan};
use roda_core::server::{RemoteAccessServer, ServerLimits};

use common::{CapturingRodan, MockDictionary, NullHook};

fn limits() -> ServerLimits {
    ServerLimits { max_request_size: 256, max_response_size: 256, min_useful_response_size: 8 }
}

/// An upstream server with the mux already connected, started, and `Ready`
/// (no ports registered yet).
fn connected_mux() -> (Arc<RemoteAccessServer>, Arc<Multiplexer>) {
    let od = Arc::new(MockDictionary::demo());
    let server = RemoteAccessServer::new(od, Arc::new(NullHook), limits());
    let mux = Multiplexer::new(1);

    mux.connect(server.clone() as Arc<dyn Roda>).expect("connect registers the mux as the server's client");
    server.on_start().expect("on_start from Off succeeds");

    (server, mux)
}

#[test]
fn port_registering_against_an_already_ready_mux_becomes_ready_after_one_work_step() {
    let (server, mux) = connected_mux();
    let port = mux.create_port().expect("first port is always available");
    let client = Arc::new(CapturingRodan::default());

    port.register(client.clone() as Arc<dyn Rodan>).expect("register against a Ready mux succeeds");
    assert!(client.ready.lock().unwrap().is_empty(), "not Ready until the loaned context fires");

    // The registration handshake asked upstream for a loaned execution
    // context; one work() step fires it.
    server.work();

    let ready = client.ready.lock().unwrap();
    assert_eq!(ready.len(), 1);
    // Each forwarded request/response on this port will carry one RSI entry
    // (8 bytes), so the port's announced limits are the server's minus that.
    assert_eq!(ready[0], (limits().max_request_size - 8, limits().max_response_size - 8));
}

#[test]
fn request_sent_through_a_port_is_dispatched_and_demultiplexed_back() {
    let (server, mux) = connected_mux();
    let port = mux.create_port().unwrap();
    let client = Arc::new(CapturingRodan::default());

    port.register(client.clone() as Arc<dyn Rodan>).unwrap();
    server.work();
    assert_eq!(client.ready.lock().unwrap().len(), 1);

    port.send(Request::Ping(PingRequest {
        max_response_size: 64,
        rsi: Default::default(),
    }))
    .expect("send while the port is Ready succeeds");

    // One step to dispatch the ping on the server, one to let the mux's
    // on_request_processed demux it straight back (no further loan needed).
    server.work();

    let responses = client.responses.lock().unwrap();
    assert_eq!(responses.len(), 1);
    match &responses[0] {
        Response::Ping(resp) => assert!(resp.rsi.is_empty(), "the mux's own stamp must be popped before delivery"),
        other => panic!("expected a Ping response, got {other:?}"),
    }
}

#[test]
fn two_ports_are_independently_addressed() {
    let (server, mux) = connected_mux();
    let port_a = mux.create_port().unwrap();
    let port_b = mux.create_port().unwrap();
    let client_a = Arc::new(CapturingRodan::default());
    let client_b = Arc::new(CapturingRodan::default());

    port_a.register(client_a.clone() as Arc<dyn Rodan>).unwrap();
    port_b.register(client_b.clone() as Arc<dyn Rodan>).unwrap();
    // One loan fires both ports' pending_ready in the same pass.
    server.work();
    assert_eq!(client_a.ready.lock().unwrap().len(), 1);
    assert_eq!(client_b.ready.lock().unwrap().len(), 1);

    port_a.send(Request::Ping(PingRequest { max_response_size: 64, rsi: Default::default() })).unwrap();
    server.work();

    assert_eq!(client_a.responses.lock().unwrap().len(), 1);
    assert!(client_b.responses.lock().unwrap().is_empty(), "port b must not see port a's response");
}

#[test]
fn on_disconnected_propagates_to_every_ready_port() {
    let (server, mux) = connected_mux();
    let port = mux.create_port().unwrap();
    let client = Arc::new(CapturingRodan::default());

    port.register(client.clone() as Arc<dyn Rodan>).unwrap();
    server.work();
    assert_eq!(client.ready.lock().unwrap().len(), 1);

    server.on_stop().expect("on_stop from Idle succeeds");

    assert_eq!(*client.disconnected.lock().unwrap(), 1);
}

#[test]
fn unregistering_a_port_stops_delivery_to_its_old_client() {
    let (server, mux) = connected_mux();
    let port = mux.create_port().unwrap();
    let client_one = Arc::new(CapturingRodan::default());

    port.register(client_one.clone() as Arc<dyn Rodan>).unwrap();
    server.work();

    port.send(Request::Ping(PingRequest { max_response_size: 64, rsi: Default::default() })).unwrap();
    port.unregister();

    // The in-flight ping still completes on the server and reaches the mux,
    // but the port has no client anymore so it is silently dropped.
    server.work();
    assert!(client_one.responses.lock().unwrap().is_empty());

    let client_two = Arc::new(CapturingRodan::default());
    port.register(client_two.clone() as Arc<dyn Rodan>).unwrap();
    server.work();

    assert_eq!(client_two.ready.lock().unwrap().len(), 1);
    assert!(client_two.responses.lock().unwrap().is_empty());
    assert!(client_one.responses.lock().unwrap().is_empty(), "client_one must never see a response after unregister");
}
