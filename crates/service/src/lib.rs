//! Transport, dispatch and multiplexing core for remote Object Dictionary
//! access.
//!
//! This crate implements the RODA/RODAN request/response contract (
//! [`roda`]), the single-worker-thread server that dispatches requests
//! against an Object Dictionary ([`server`], consuming the capability
//! contract in [`od`]), and the [`mux`] that fans one upstream connection
//! out to many isolated downstream sessions. Wire encoding lives in the
//! sibling `codec` crate; the Object Dictionary itself is supplied by the
//! application.

pub mod errors;
pub mod mux;
pub mod od;
pub mod roda;
pub mod server;
pub mod worker;

pub use errors::CoreError;
pub use mux::{Multiplexer, Port};
pub use od::{ObjectData, ObjectDictionary, ObjectHandle, TrailingBitPolicy};
pub use roda::{Roda, Rodan, SendError};
pub use server::{RemoteAccessServer, ServerLimits};
pub use worker::WorkerHook;
