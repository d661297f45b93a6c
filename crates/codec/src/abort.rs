//! CANopen-style abort codes.
//!
//! The full abort-code catalogue belongs to the Object Dictionary, which is
//! out of scope here - the core treats whatever the OD hands back as opaque.
//! The handful of constants below are the ones the transport and dispatch
//! layers themselves are responsible for producing.

/// A CANopen SDO-style abort code. `0` means success; any other value is a
/// protocol-level failure to be delivered to the caller, never thrown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AbortCode(pub u32);

impl AbortCode {
    pub const OK: AbortCode = AbortCode(0x0000_0000);
    pub const OBJECT_DOES_NOT_EXIST: AbortCode = AbortCode(0x0602_0000);
    pub const SUBINDEX_DOES_NOT_EXIST: AbortCode = AbortCode(0x0609_0011);
    pub const UNSUPPORTED_ACCESS_TO_OBJECT: AbortCode = AbortCode(0x0601_0000);
    pub const DATA_TYPE_MISMATCH_TOO_LONG: AbortCode = AbortCode(0x0607_0012);
    pub const DATA_TYPE_MISMATCH_TOO_SMALL: AbortCode = AbortCode(0x0607_0013);
    pub const OBJECT_LENGTH_EXCEEDS_MBX_SIZE: AbortCode = AbortCode(0x0504_0004);
    pub const OUT_OF_MEMORY: AbortCode = AbortCode(0x0504_0005);
    pub const GENERAL_ERROR: AbortCode = AbortCode(0x0800_0000);

    pub fn is_ok(&self) -> bool {
        *self == Self::OK
    }
}

impl Default for AbortCode {
    fn default() -> Self {
        Self::OK
    }
}

impl From<u32> for AbortCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<AbortCode> for u32 {
    fn from(value: AbortCode) -> Self {
        value.0
    }
}

impl std::fmt::Display for AbortCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}
