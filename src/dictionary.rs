//! A small in-memory Object Dictionary used to exercise the core against
//! something concrete.
//!
//! Entries are plain byte-addressable subindices; there is no CANopen
//! attribute model beyond a bitmask per subindex. This is demo scaffolding,
//! not a general-purpose OD implementation - a real deployment supplies its
//! own [`ObjectDictionary`].

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use ahash::HashMap;
use parking_lot::Mutex;

use codec::abort::AbortCode;
use roda_core::od::{ObjectData, ObjectDictionary, ObjectHandle, TrailingBitPolicy};

/// Attribute bit granting read access via `single_subindex`/`complete_access`.
pub const ATTR_READABLE: u16 = 0x0001;
/// Attribute bit granting write access.
pub const ATTR_WRITABLE: u16 = 0x0002;
pub const ATTR_RW: u16 = ATTR_READABLE | ATTR_WRITABLE;

#[derive(Clone)]
pub struct SubindexSpec {
    pub attributes: u16,
    pub name: Option<String>,
}

struct SubindexData {
    attributes: u16,
    name: Option<String>,
    bytes: Vec<u8>,
}

struct ObjectEntry {
    object_code: u8,
    data_type: u16,
    name: Option<String>,
    subindices: Vec<SubindexData>,
}

/// An in-process Object Dictionary, keyed by 16-bit index. Cheaply
/// cloneable; every handle it hands out shares the same backing map.
#[derive(Clone)]
pub struct InMemoryDictionary {
    objects: Arc<Mutex<HashMap<u16, ObjectEntry>>>,
}

impl InMemoryDictionary {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(HashMap::default())),
        }
    }

    /// Register an object with one subindex per entry in `subindices`, in
    /// ascending subindex order starting at 0.
    pub fn insert_object(
        &self,
        index: u16,
        object_code: u8,
        data_type: u16,
        name: Option<&str>,
        subindices: Vec<(SubindexSpec, Vec<u8>)>,
    ) {
        let entry = ObjectEntry {
            object_code,
            data_type,
            name: name.map(str::to_owned),
            subindices: subindices
                .into_iter()
                .map(|(spec, bytes)| SubindexData {
                    attributes: spec.attributes,
                    name: spec.name,
                    bytes,
                })
                .collect(),
        };

        self.objects.lock().insert(index, entry);
    }
}

impl Default for InMemoryDictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectDictionary for InMemoryDictionary {
    fn get_object(&self, index: u16) -> Option<Box<dyn ObjectHandle>> {
        let objects = self.objects.lock();
        let entry = objects.get(&index)?;
        Some(Box::new(Handle::snapshot(self.objects.clone(), index, entry)))
    }

    fn get_next_nearest_object(&self, index: u16) -> Option<Box<dyn ObjectHandle>> {
        let objects = self.objects.lock();
        let next = objects.keys().copied().filter(|k| *k >= index).min()?;
        let entry = objects.get(&next).expect("key just found by min()");
        Some(Box::new(Handle::snapshot(self.objects.clone(), next, entry)))
    }
}

/// An `ObjectHandle` snapshotted at lookup time: the object-level fields
/// (code, data type, name, subindex count) are fixed for the handle's
/// lifetime, matching the contract that a handle is held only for the
/// duration of one dispatch step. Subindex *data* is read fresh on every
/// `lock_data` call, since that is the one operation with a mutation path.
struct Handle {
    objects: Arc<Mutex<HashMap<u16, ObjectEntry>>>,
    index: u16,
    object_code: u8,
    data_type: u16,
    name: Option<String>,
    subindex_count: u16,
}

impl Handle {
    fn snapshot(objects: Arc<Mutex<HashMap<u16, ObjectEntry>>>, index: u16, entry: &ObjectEntry) -> Self {
        Self {
            objects,
            index,
            object_code: entry.object_code,
            data_type: entry.data_type,
            name: entry.name.clone(),
            subindex_count: entry.subindices.len() as u16,
        }
    }
}

impl ObjectHandle for Handle {
    fn index(&self) -> u16 {
        self.index
    }

    fn object_code(&self) -> u8 {
        self.object_code
    }

    fn data_type(&self) -> u16 {
        self.data_type
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn max_subindex_count(&self) -> u16 {
        self.subindex_count
    }

    fn lock_data(&self, body: &mut dyn FnMut(&mut dyn ObjectData) -> AbortCode) -> AbortCode {
        let mut objects = self.objects.lock();
        let Some(entry) = objects.get_mut(&self.index) else {
            return AbortCode::OBJECT_DOES_NOT_EXIST;
        };

        let mut data = EntryData(entry);
        body(&mut data)
    }
}

struct EntryData<'a>(&'a mut ObjectEntry);

impl Deref for EntryData<'_> {
    type Target = ObjectEntry;
    fn deref(&self) -> &Self::Target {
        self.0
    }
}

impl DerefMut for EntryData<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0
    }
}

impl ObjectData for EntryData<'_> {
    fn subindex_attributes(&self, subindex: u8) -> u16 {
        self.subindices.get(subindex as usize).map_or(0, |s| s.attributes)
    }

    fn subindex_actual_size_bits(&self, subindex: u8) -> usize {
        self.subindices.get(subindex as usize).map_or(0, |s| s.bytes.len() * 8)
    }

    fn subindex_empty(&self, subindex: u8) -> bool {
        self.subindices.get(subindex as usize).is_none()
    }

    fn subindex_name(&self, subindex: u8) -> Option<&str> {
        self.subindices.get(subindex as usize).and_then(|s| s.name.as_deref())
    }

    fn subindex_app_specific_metadata(&self, _subindex: u8) -> Option<&[u8]> {
        None
    }

    fn object_stream_size_bits(&self, si0_16bit: bool) -> usize {
        let si0_bytes = if si0_16bit { 2 } else { 1 };
        si0_bytes * 8 + self.subindices.iter().skip(1).map(|s| s.bytes.len() * 8).sum::<usize>()
    }

    fn read(&self, subindex: u8, permissions: u16, out: &mut Vec<u8>) -> AbortCode {
        let Some(si) = self.subindices.get(subindex as usize) else {
            return AbortCode::SUBINDEX_DOES_NOT_EXIST;
        };

        if si.attributes & permissions == 0 {
            return AbortCode::UNSUPPORTED_ACCESS_TO_OBJECT;
        }

        out.clear();
        out.extend_from_slice(&si.bytes);
        AbortCode::OK
    }

    fn complete_read(
        &self,
        include_si0: bool,
        si0_16bit: bool,
        permissions: u16,
        out: &mut Vec<u8>,
    ) -> AbortCode {
        out.clear();

        if include_si0 {
            let count = self.subindices.len().saturating_sub(1) as u32;
            if si0_16bit {
                out.extend_from_slice(&(count as u16).to_le_bytes());
            } else {
                out.push(count as u8);
            }
        }

        for si in self.subindices.iter().skip(1) {
            if si.attributes & permissions == 0 {
                return AbortCode::UNSUPPORTED_ACCESS_TO_OBJECT;
            }
            out.extend_from_slice(&si.bytes);
        }

        AbortCode::OK
    }

    fn write(&mut self, subindex: u8, permissions: u16, data: &[u8]) -> AbortCode {
        let Some(si) = self.subindices.get_mut(subindex as usize) else {
            return AbortCode::SUBINDEX_DOES_NOT_EXIST;
        };

        if si.attributes & permissions == 0 {
            return AbortCode::UNSUPPORTED_ACCESS_TO_OBJECT;
        }
        if data.len() > si.bytes.len() {
            return AbortCode::DATA_TYPE_MISMATCH_TOO_LONG;
        }
        if data.len() < si.bytes.len() {
            return AbortCode::DATA_TYPE_MISMATCH_TOO_SMALL;
        }

        si.bytes.copy_from_slice(data);
        AbortCode::OK
    }

    fn complete_write(
        &mut self,
        include_si0: bool,
        si0_16bit: bool,
        permissions: u16,
        data: &[u8],
        _trailing_bit_policy: TrailingBitPolicy,
    ) -> AbortCode {
        let mut cursor = 0usize;
        let mut new_si0 = None;

        if include_si0 {
            let width = if si0_16bit { 2 } else { 1 };
            if data.len() < width {
                return AbortCode::DATA_TYPE_MISMATCH_TOO_SMALL;
            }
            new_si0 = Some(if si0_16bit {
                u16::from_le_bytes([data[0], data[1]]) as usize
            } else {
                data[0] as usize
            });
            cursor = width;
        }

        for si in self.subindices.iter_mut().skip(1) {
            if si.attributes & permissions == 0 {
                return AbortCode::UNSUPPORTED_ACCESS_TO_OBJECT;
            }
            if cursor + si.bytes.len() > data.len() {
                return AbortCode::DATA_TYPE_MISMATCH_TOO_SMALL;
            }
            si.bytes.copy_from_slice(&data[cursor..cursor + si.bytes.len()]);
            cursor += si.bytes.len();
        }

        if let Some(count) = new_si0 {
            if let Some(si0) = self.subindices.first_mut() {
                si0.bytes = count.to_le_bytes()[..si0.bytes.len().max(1).min(8)].to_vec();
            }
        }

        AbortCode::OK
    }
}
