//! Wiring: builds the demo Object Dictionary, starts a worker thread for
//! the [`RemoteAccessServer`], and brings it up.
//!
//! There is no network transport here - the RODA pair is in-process by
//! design. A real deployment plugs a serializer/deserializer for the wire
//! format in `codec` onto whatever boundary (pipe, socket, shared memory)
//! it needs to cross, and drives `Roda`/`Rodan` calls across it.

use std::sync::Arc;

use roda_core::{RemoteAccessServer, ServerLimits};

use crate::config::Config;
use crate::dictionary::{ATTR_RW, InMemoryDictionary, SubindexSpec};
use crate::worker::ThreadWorker;

/// Populate a handful of demo objects so the server has something to serve
/// against out of the box.
fn demo_dictionary() -> Arc<InMemoryDictionary> {
    let dict = Arc::new(InMemoryDictionary::new());

    dict.insert_object(
        0x1000,
        0x07, // VAR
        0x0007, // UNSIGNED32
        Some("Device Type"),
        vec![(
            SubindexSpec {
                attributes: ATTR_RW,
                name: Some("Device Type".into()),
            },
            vec![0u8; 4],
        )],
    );

    dict.insert_object(
        0x1018,
        0x09, // RECORD
        0x0005, // UNSIGNED8 for SI0
        Some("Identity Object"),
        vec![
            (
                SubindexSpec {
                    attributes: ATTR_RW,
                    name: Some("Number of Entries".into()),
                },
                vec![4u8],
            ),
            (
                SubindexSpec {
                    attributes: ATTR_RW,
                    name: Some("Vendor ID".into()),
                },
                vec![0u8; 4],
            ),
            (
                SubindexSpec {
                    attributes: ATTR_RW,
                    name: Some("Product Code".into()),
                },
                vec![0u8; 4],
            ),
            (
                SubindexSpec {
                    attributes: ATTR_RW,
                    name: Some("Revision Number".into()),
                },
                vec![0u8; 4],
            ),
            (
                SubindexSpec {
                    attributes: ATTR_RW,
                    name: Some("Serial Number".into()),
                },
                vec![0u8; 4],
            ),
        ],
    );

    dict
}

/// Build and start a `RemoteAccessServer` backed by the demo dictionary,
/// driven by its own worker thread. Returns before any client is
/// registered; the caller is expected to `register` a `Rodan` and `send`
/// requests against the returned handle (directly, or via a `Multiplexer`
/// sitting in front of it).
pub fn start(config: &Config) -> anyhow::Result<Arc<RemoteAccessServer>> {
    let dictionary = demo_dictionary();

    let limits = ServerLimits {
        max_request_size: config.limits.max_request_size,
        max_response_size: config.limits.max_response_size,
        min_useful_response_size: config.limits.min_useful_response_size,
    };

    let worker = ThreadWorker::new();
    let server = RemoteAccessServer::new(dictionary, worker.clone(), limits);
    worker.attach(server.clone());

    server.on_start()?;

    log::info!(
        "roda server started (max_request_size={}, max_response_size={})",
        limits.max_request_size,
        limits.max_response_size
    );

    Ok(server)
}
