//! Wire messages for remote Object Dictionary access (RODA/RODAN).
//!
//! This crate owns the typed, in-memory representation of every request and
//! response that can cross a RODA connection, plus a bit-exact little-endian
//! codec for them. It knows nothing about dispatch, threading, or the Object
//! Dictionary itself - those live in `roda-core`.

pub mod abort;
pub mod request;
pub mod response;
pub mod rsi;

use std::{array::TryFromSliceError, string::FromUtf8Error};

/// Protocol version written into every message header.
///
/// Messages carrying any other value are rejected at decode time so that the
/// wire format can be extended without breaking already-deployed peers.
pub const WIRE_VERSION: u8 = 1;

/// Hard ceiling on the serialized size of a single request, per the transport
/// contract (`max_request_size_cap` in the design).
pub const MAX_REQUEST_SIZE_CAP: u32 = u32::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Buffer ended before a fixed-size field could be read.
    UnexpectedEof,
    /// `version` byte did not match [`WIRE_VERSION`].
    UnrecognizedVersion(u8),
    /// `type` byte did not match a known request/response kind.
    UnknownType(u8),
    /// A field failed one of the acceptance checks in the wire format spec
    /// (e.g. `attr_filter == 0`, `permissions == 0`, non-ascending indices).
    ProtocolError(&'static str),
    /// The return-stack-item count would exceed the 255-entry wire limit.
    ReturnStackOverflow,
    Utf8(FromUtf8Error),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnexpectedEof => write!(f, "buffer ended before a complete field"),
            Error::UnrecognizedVersion(v) => write!(f, "unrecognized wire version: {v}"),
            Error::UnknownType(t) => write!(f, "unknown message type byte: {t}"),
            Error::ProtocolError(reason) => write!(f, "protocol error: {reason}"),
            Error::ReturnStackOverflow => write!(f, "return stack exceeds 255 entries"),
            Error::Utf8(e) => write!(f, "invalid utf-8 in name field: {e}"),
        }
    }
}

impl From<TryFromSliceError> for Error {
    fn from(_: TryFromSliceError) -> Self {
        Error::UnexpectedEof
    }
}

impl From<FromUtf8Error> for Error {
    fn from(value: FromUtf8Error) -> Self {
        Error::Utf8(value)
    }
}
