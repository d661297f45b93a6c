//! Shared test scaffolding: a self-contained mock Object Dictionary and a
//! capturing `Rodan`, reused by the server and mux integration tests.
//!
//! `InMemoryDictionary` in the binary crate is the real demo implementation
//! of the same contract; this one is deliberately independent so the
//! `roda-core` integration tests don't reach across the workspace into the
//! binary crate.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use parking_lot::Mutex;

use codec::abort::AbortCode;
use codec::response::Response;
use codec::rsi::{ReturnStack, ReturnStackItem};

use roda_core::od::{ObjectData, ObjectDictionary, ObjectHandle, TrailingBitPolicy};
use roda_core::roda::Rodan;
use roda_core::worker::WorkerHook;

pub const ATTR_READABLE: u16 = 0x0001;
pub const ATTR_WRITABLE: u16 = 0x0002;
pub const ATTR_RW: u16 = ATTR_READABLE | ATTR_WRITABLE;
pub const ATTR_RO: u16 = ATTR_READABLE;

pub struct MockSubindex {
    pub attributes: u16,
    pub name: Option<&'static str>,
    pub bytes: Vec<u8>,
    /// Logical bit width, when narrower than `bytes.len() * 8`. `None` means
    /// byte-aligned (the common case).
    pub bit_size: Option<usize>,
}

pub struct MockObject {
    pub object_code: u8,
    pub data_type: u16,
    pub name: Option<&'static str>,
    pub subindices: Vec<MockSubindex>,
}

pub struct MockDictionary {
    objects: Arc<Mutex<BTreeMap<u16, MockObject>>>,
}

impl MockDictionary {
    pub fn demo() -> Self {
        let mut objects = BTreeMap::new();

        objects.insert(
            0x1000,
            MockObject {
                object_code: 0x07,
                data_type: 0x0007,
                name: Some("Device Type"),
                subindices: vec![MockSubindex {
                    attributes: ATTR_RW,
                    name: Some("Device Type"),
                    bytes: vec![0u8; 4],
                    bit_size: None,
                }],
            },
        );

        objects.insert(
            0x1018,
            MockObject {
                object_code: 0x09,
                data_type: 0x0005,
                name: Some("Identity Object"),
                subindices: vec![
                    MockSubindex { attributes: ATTR_RO, name: Some("Number of Entries"), bytes: vec![4u8], bit_size: None },
                    MockSubindex { attributes: ATTR_RO, name: Some("Vendor ID"), bytes: vec![0u8; 4], bit_size: None },
                    MockSubindex { attributes: ATTR_RO, name: Some("Product Code"), bytes: vec![0u8; 4], bit_size: None },
                    MockSubindex { attributes: ATTR_RO, name: Some("Revision Number"), bytes: vec![0u8; 4], bit_size: None },
                    MockSubindex { attributes: ATTR_RO, name: Some("Serial Number"), bytes: vec![0u8; 4], bit_size: None },
                ],
            },
        );

        // A deliberately non-byte-aligned subindex: 4 bytes of storage but
        // only 25 significant bits, so the last byte carries a single bit.
        objects.insert(
            0x1020,
            MockObject {
                object_code: 0x07,
                data_type: 0x0007,
                name: Some("Packed Bitfield"),
                subindices: vec![MockSubindex {
                    attributes: ATTR_RW,
                    name: Some("Packed Value"),
                    bytes: vec![0u8; 4],
                    bit_size: Some(25),
                }],
            },
        );

        Self { objects: Arc::new(Mutex::new(objects)) }
    }
}

impl ObjectDictionary for MockDictionary {
    fn get_object(&self, index: u16) -> Option<Box<dyn ObjectHandle>> {
        let objects = self.objects.lock();
        let entry = objects.get(&index)?;
        Some(Box::new(MockHandle::snapshot(self.objects.clone(), index, entry)))
    }

    fn get_next_nearest_object(&self, index: u16) -> Option<Box<dyn ObjectHandle>> {
        let objects = self.objects.lock();
        let next = objects.keys().copied().find(|k| *k >= index)?;
        let entry = objects.get(&next).expect("key just found");
        Some(Box::new(MockHandle::snapshot(self.objects.clone(), next, entry)))
    }
}

struct MockHandle {
    objects: Arc<Mutex<BTreeMap<u16, MockObject>>>,
    index: u16,
    object_code: u8,
    data_type: u16,
    name: Option<&'static str>,
    subindex_count: u16,
}

impl MockHandle {
    fn snapshot(objects: Arc<Mutex<BTreeMap<u16, MockObject>>>, index: u16, entry: &MockObject) -> Self {
        Self {
            objects,
            index,
            object_code: entry.object_code,
            data_type: entry.data_type,
            name: entry.name,
            subindex_count: entry.subindices.len() as u16,
        }
    }
}

impl ObjectHandle for MockHandle {
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
        self.name
    }

    fn max_subindex_count(&self) -> u16 {
        self.subindex_count
    }

    fn lock_data(&self, body: &mut dyn FnMut(&mut dyn ObjectData) -> AbortCode) -> AbortCode {
        let mut objects = self.objects.lock();
        let Some(entry) = objects.get_mut(&self.index) else {
            return AbortCode::OBJECT_DOES_NOT_EXIST;
        };
        body(entry)
    }
}

impl ObjectData for MockObject {
    fn subindex_attributes(&self, subindex: u8) -> u16 {
        self.subindices.get(subindex as usize).map_or(0, |s| s.attributes)
    }

    fn subindex_actual_size_bits(&self, subindex: u8) -> usize {
        self.subindices
            .get(subindex as usize)
            .map_or(0, |s| s.bit_size.unwrap_or(s.bytes.len() * 8))
    }

    fn subindex_empty(&self, subindex: u8) -> bool {
        self.subindices.get(subindex as usize).is_none()
    }

    fn subindex_name(&self, subindex: u8) -> Option<&str> {
        self.subindices.get(subindex as usize).and_then(|s| s.name)
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

    fn complete_read(&self, include_si0: bool, si0_16bit: bool, permissions: u16, out: &mut Vec<u8>) -> AbortCode {
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
        if include_si0 {
            let width = if si0_16bit { 2 } else { 1 };
            if data.len() < width {
                return AbortCode::DATA_TYPE_MISMATCH_TOO_SMALL;
            }
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
        AbortCode::OK
    }
}

/// A `WorkerHook` that does nothing: tests step `work()` themselves.
pub struct NullHook;
impl WorkerHook for NullHook {
    fn request_work_invocation(&self) {}
}

#[derive(Default)]
pub struct CapturingRodan {
    pub ready: StdMutex<Vec<(u32, u32)>>,
    pub disconnected: StdMutex<usize>,
    pub responses: StdMutex<Vec<Response>>,
    pub loans: StdMutex<usize>,
}

impl Rodan for CapturingRodan {
    fn on_ready(&self, max_request_size: u32, max_response_size: u32) {
        self.ready.lock().unwrap().push((max_request_size, max_response_size));
    }

    fn on_disconnected(&self) {
        *self.disconnected.lock().unwrap() += 1;
    }

    fn on_request_processed(&self, response: Response) {
        self.responses.lock().unwrap().push(response);
    }

    fn loan_execution_context(&self) {
        *self.loans.lock().unwrap() += 1;
    }
}

pub fn rsi_with(creator_id: u32, info: u32) -> ReturnStack {
    let mut rsi = ReturnStack::new();
    rsi.push(ReturnStackItem::new(creator_id, info)).unwrap();
    rsi
}
