//! Narrow capability contract the server dispatches requests against.
//!
//! The Object Dictionary itself - concrete VAR/ARRAY/RECORD entities, their
//! attribute semantics, and the CANopen abort-code catalogue - is owned by
//! the application and lives outside this crate entirely. Dispatch only
//! ever sees this trait.

use codec::abort::AbortCode;

/// How a `complete_write` should treat bits past the last whole byte of a
/// non-byte-aligned subindex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailingBitPolicy {
    /// Trailing bits beyond the subindex's bit size must be zero.
    RequireZero,
    /// Trailing bits are accepted and discarded.
    Ignore,
}

/// Read/write access to one object's data, held for the duration of a
/// dispatch step.
///
/// Obtained via [`ObjectDictionary::get_object`] /
/// [`ObjectDictionary::get_next_nearest_object`] and locked with
/// [`ObjectHandle::lock_data`] before any subindex operation; the lock
/// blocks the worker thread until released, which is acceptable since
/// dispatch is already single-threaded cooperative.
pub trait ObjectHandle: Send + Sync {
    fn index(&self) -> u16;
    fn object_code(&self) -> u8;
    fn data_type(&self) -> u16;
    fn name(&self) -> Option<&str>;
    fn max_subindex_count(&self) -> u16;

    /// Block until exclusive access to this object's data is held, then
    /// run `body` with it. Mirrors a scoped-guard lock: the guard cannot
    /// outlive the call. Access is mutable regardless of the outer `&self`
    /// receiver - the lock itself is what grants exclusivity, typically via
    /// interior mutability in the concrete implementation.
    fn lock_data(&self, body: &mut dyn FnMut(&mut dyn ObjectData) -> AbortCode) -> AbortCode;
}

/// Operations available once an [`ObjectHandle`] is locked.
pub trait ObjectData {
    fn subindex_attributes(&self, subindex: u8) -> u16;
    fn subindex_actual_size_bits(&self, subindex: u8) -> usize;
    fn subindex_empty(&self, subindex: u8) -> bool;
    fn subindex_name(&self, subindex: u8) -> Option<&str>;
    fn subindex_app_specific_metadata(&self, subindex: u8) -> Option<&[u8]>;

    /// Size in bits of the payload a complete (multi-subindex) access
    /// would move, given the SI0 width in use.
    fn object_stream_size_bits(&self, si0_16bit: bool) -> usize;

    /// Read a single subindex. `permissions` carries the read-capable
    /// attribute bits the caller was granted; implementations are expected
    /// to mask against them and return `UnsupportedAccessToObject` if none
    /// apply. On success, writes the raw bytes of the subindex into `out`.
    fn read(&self, subindex: u8, permissions: u16, out: &mut Vec<u8>) -> AbortCode;

    /// Read all subindices as one payload. `include_si0` controls whether
    /// subindex 0 is part of the stream; `si0_16bit` selects its width when
    /// it is.
    fn complete_read(&self, include_si0: bool, si0_16bit: bool, permissions: u16, out: &mut Vec<u8>)
    -> AbortCode;

    /// Write a single subindex from `data`.
    fn write(&mut self, subindex: u8, permissions: u16, data: &[u8]) -> AbortCode;

    /// Write all subindices from one payload.
    fn complete_write(
        &mut self,
        include_si0: bool,
        si0_16bit: bool,
        permissions: u16,
        data: &[u8],
        trailing_bit_policy: TrailingBitPolicy,
    ) -> AbortCode;
}

/// Lookup surface the server uses to find objects by index.
pub trait ObjectDictionary: Send + Sync {
    fn get_object(&self, index: u16) -> Option<Box<dyn ObjectHandle>>;

    /// Smallest registered index strictly greater than or equal to `index`,
    /// used to walk ranges during `ObjectEnum` without the caller needing
    /// to know every gap in the index space up front.
    fn get_next_nearest_object(&self, index: u16) -> Option<Box<dyn ObjectHandle>>;
}
