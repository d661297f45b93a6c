//! Response messages: the answer to each of the five request kinds.
//!
//! A response header never varies: version, type, and a CANopen-style abort
//! code. Everything past the abort code is kind-specific payload, present
//! only when the abort code is [`AbortCode::OK`].

use bytes::{Buf, BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{
    Error, WIRE_VERSION,
    abort::AbortCode,
    request::RequestKind,
    rsi::ReturnStack,
};

pub const HEADER_LEN: usize = 6;

/// Reads a `u16` length prefix followed by that many bytes.
fn decode_len_prefixed_bytes(cursor: &mut &[u8]) -> Result<Vec<u8>, Error> {
    if cursor.remaining() < 2 {
        return Err(Error::UnexpectedEof);
    }
    let len = cursor.get_u16_le() as usize;
    if cursor.remaining() < len {
        return Err(Error::UnexpectedEof);
    }
    let mut bytes = vec![0u8; len];
    cursor.copy_to_slice(&mut bytes);
    Ok(bytes)
}

/// One subindex's metadata, as reported by an `ObjectInfo` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubindexDescriptor {
    pub subindex: u8,
    pub empty: bool,
    pub data_type: u16,
    pub attribute_bits: u16,
    pub max_size_bits: u32,
    pub name: Option<String>,
    pub app_specific_metadata: Option<Vec<u8>>,
}

impl SubindexDescriptor {
    /// Encoded size of this descriptor, used by dispatch to decide how many
    /// subindices fit a response's `max_response_size` budget.
    pub fn wire_size(&self) -> usize {
        // subindex, empty, data_type, attribute_bits, max_size_bits
        1 + 1 + 2 + 2 + 4
            + 2 + self.name.as_deref().map_or(0, |n| n.len())
            + 2 + self.app_specific_metadata.as_deref().map_or(0, |m| m.len())
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.subindex);
        buf.put_u8(self.empty as u8);
        buf.put_u16_le(self.data_type);
        buf.put_u16_le(self.attribute_bits);
        buf.put_u32_le(self.max_size_bits);

        let name_bytes = self.name.as_deref().unwrap_or("").as_bytes();
        buf.put_u16_le(name_bytes.len() as u16);
        buf.extend_from_slice(name_bytes);

        let meta = self.app_specific_metadata.as_deref().unwrap_or(&[]);
        buf.put_u16_le(meta.len() as u16);
        buf.extend_from_slice(meta);
    }

    fn decode(cursor: &mut &[u8], include_names: bool, include_metadata: bool) -> Result<Self, Error> {
        if cursor.remaining() < 10 {
            return Err(Error::UnexpectedEof);
        }

        let subindex = cursor.get_u8();
        let empty = cursor.get_u8() != 0;
        let data_type = cursor.get_u16_le();
        let attribute_bits = cursor.get_u16_le();
        let max_size_bits = cursor.get_u32_le();

        let name_bytes = decode_len_prefixed_bytes(cursor)?;
        let meta = decode_len_prefixed_bytes(cursor)?;

        Ok(Self {
            subindex,
            empty,
            data_type,
            attribute_bits,
            max_size_bits,
            name: include_names.then(|| String::from_utf8(name_bytes)).transpose()?,
            app_specific_metadata: include_metadata.then_some(meta).filter(|m| !m.is_empty()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingResponse {
    pub rsi: ReturnStack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEnumResponse {
    pub abort_code: AbortCode,
    pub indices: Vec<u16>,
    /// False if the result was truncated by `max_response_size`.
    pub complete: bool,
    pub rsi: ReturnStack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfoResponse {
    pub abort_code: AbortCode,
    pub first_queried_subindex: u8,
    pub last_queried_subindex: u8,
    pub complete: bool,
    pub object_code: u8,
    pub data_type: u16,
    pub name: Option<String>,
    pub max_subindex_count: u16,
    pub subindices: Vec<SubindexDescriptor>,
    pub rsi: ReturnStack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResponse {
    pub abort_code: AbortCode,
    pub data: Vec<u8>,
    /// Number of valid bits in the last byte of `data`; `0` only when `data`
    /// is empty, otherwise in `1..=8`.
    pub bits_in_last_byte: u8,
    pub rsi: ReturnStack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResponse {
    pub abort_code: AbortCode,
    pub rsi: ReturnStack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ping(PingResponse),
    ObjectEnum(ObjectEnumResponse),
    ObjectInfo(ObjectInfoResponse),
    Read(ReadResponse),
    Write(WriteResponse),
}

impl Response {
    pub fn kind(&self) -> RequestKind {
        match self {
            Response::Ping(_) => RequestKind::Ping,
            Response::ObjectEnum(_) => RequestKind::ObjectEnum,
            Response::ObjectInfo(_) => RequestKind::ObjectInfo,
            Response::Read(_) => RequestKind::Read,
            Response::Write(_) => RequestKind::Write,
        }
    }

    pub fn abort_code(&self) -> AbortCode {
        match self {
            Response::Ping(_) => AbortCode::OK,
            Response::ObjectEnum(r) => r.abort_code,
            Response::ObjectInfo(r) => r.abort_code,
            Response::Read(r) => r.abort_code,
            Response::Write(r) => r.abort_code,
        }
    }

    pub fn rsi(&self) -> &ReturnStack {
        match self {
            Response::Ping(r) => &r.rsi,
            Response::ObjectEnum(r) => &r.rsi,
            Response::ObjectInfo(r) => &r.rsi,
            Response::Read(r) => &r.rsi,
            Response::Write(r) => &r.rsi,
        }
    }

    pub fn rsi_mut(&mut self) -> &mut ReturnStack {
        match self {
            Response::Ping(r) => &mut r.rsi,
            Response::ObjectEnum(r) => &mut r.rsi,
            Response::ObjectInfo(r) => &mut r.rsi,
            Response::Read(r) => &mut r.rsi,
            Response::Write(r) => &mut r.rsi,
        }
    }

    fn encode_header(buf: &mut BytesMut, kind: RequestKind, abort_code: AbortCode) {
        buf.put_u8(WIRE_VERSION);
        buf.put_u8(kind.into());
        buf.put_u32_le(abort_code.0);
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Response::Ping(r) => {
                Self::encode_header(buf, RequestKind::Ping, AbortCode::OK);
                r.rsi.encode(buf);
            }
            Response::ObjectEnum(r) => {
                Self::encode_header(buf, RequestKind::ObjectEnum, r.abort_code);
                if r.abort_code.is_ok() {
                    buf.put_u16_le(r.indices.len() as u16);
                    for index in &r.indices {
                        buf.put_u16_le(*index);
                    }
                    buf.put_u8(r.complete as u8);
                }
                r.rsi.encode(buf);
            }
            Response::ObjectInfo(r) => {
                Self::encode_header(buf, RequestKind::ObjectInfo, r.abort_code);
                if r.abort_code.is_ok() {
                    buf.put_u8(r.first_queried_subindex);
                    buf.put_u8(r.last_queried_subindex);
                    buf.put_u8(r.complete as u8);
                    buf.put_u8(r.object_code);
                    buf.put_u16_le(r.data_type);
                    let name_bytes = r.name.as_deref().unwrap_or("").as_bytes();
                    buf.put_u16_le(name_bytes.len() as u16);
                    buf.extend_from_slice(name_bytes);
                    buf.put_u16_le(r.max_subindex_count);
                    buf.put_u16_le(r.subindices.len() as u16);
                    for si in &r.subindices {
                        si.encode(buf);
                    }
                }
                r.rsi.encode(buf);
            }
            Response::Read(r) => {
                Self::encode_header(buf, RequestKind::Read, r.abort_code);
                if r.abort_code.is_ok() {
                    buf.put_u16_le(r.data.len() as u16);
                    buf.extend_from_slice(&r.data);
                    buf.put_u8(r.bits_in_last_byte);
                }
                r.rsi.encode(buf);
            }
            Response::Write(r) => {
                Self::encode_header(buf, RequestKind::Write, r.abort_code);
                r.rsi.encode(buf);
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::UnexpectedEof);
        }

        let version = bytes[0];
        if version != WIRE_VERSION {
            return Err(Error::UnrecognizedVersion(version));
        }

        let kind = RequestKind::try_from(bytes[1]).map_err(|_| Error::UnknownType(bytes[1]))?;
        let abort_code = AbortCode::from(u32::from_le_bytes(bytes[2..6].try_into()?));
        let mut cursor = &bytes[HEADER_LEN..];

        Ok(match kind {
            RequestKind::Ping => Response::Ping(PingResponse {
                rsi: ReturnStack::decode(&mut cursor)?,
            }),
            RequestKind::ObjectEnum => {
                let (indices, complete) = if abort_code.is_ok() {
                    if cursor.remaining() < 2 {
                        return Err(Error::UnexpectedEof);
                    }
                    let count = cursor.get_u16_le() as usize;
                    if cursor.remaining() < count * 2 + 1 {
                        return Err(Error::UnexpectedEof);
                    }
                    let indices: Vec<u16> = (0..count).map(|_| cursor.get_u16_le()).collect();
                    let complete = cursor.get_u8() != 0;

                    if indices.windows(2).any(|pair| pair[0] >= pair[1]) {
                        return Err(Error::ProtocolError("indices must be strictly ascending"));
                    }
                    if !complete && (indices.is_empty() || indices.contains(&0xFFFF)) {
                        return Err(Error::ProtocolError(
                            "incomplete enum response must be non-empty and omit 0xFFFF",
                        ));
                    }

                    (indices, complete)
                } else {
                    (Vec::new(), true)
                };

                Response::ObjectEnum(ObjectEnumResponse {
                    abort_code,
                    indices,
                    complete,
                    rsi: ReturnStack::decode(&mut cursor)?,
                })
            }
            RequestKind::ObjectInfo => {
                if !abort_code.is_ok() {
                    return Ok(Response::ObjectInfo(ObjectInfoResponse {
                        abort_code,
                        first_queried_subindex: 0,
                        last_queried_subindex: 0,
                        complete: true,
                        object_code: 0,
                        data_type: 0,
                        name: None,
                        max_subindex_count: 0,
                        subindices: Vec::new(),
                        rsi: ReturnStack::decode(&mut cursor)?,
                    }));
                }

                if cursor.remaining() < 6 {
                    return Err(Error::UnexpectedEof);
                }
                let first_queried_subindex = cursor.get_u8();
                let last_queried_subindex = cursor.get_u8();
                let complete = cursor.get_u8() != 0;
                let object_code = cursor.get_u8();
                let data_type = cursor.get_u16_le();

                let name_bytes = decode_len_prefixed_bytes(cursor)?;
                let name = (!name_bytes.is_empty())
                    .then(|| String::from_utf8(name_bytes))
                    .transpose()?;

                if cursor.remaining() < 4 {
                    return Err(Error::UnexpectedEof);
                }
                let max_subindex_count = cursor.get_u16_le();
                let subindex_count = cursor.get_u16_le() as usize;

                let mut subindices = Vec::with_capacity(subindex_count);
                for _ in 0..subindex_count {
                    subindices.push(SubindexDescriptor::decode(&mut cursor, true, true)?);
                }

                Response::ObjectInfo(ObjectInfoResponse {
                    abort_code,
                    first_queried_subindex,
                    last_queried_subindex,
                    complete,
                    object_code,
                    data_type,
                    name,
                    max_subindex_count,
                    subindices,
                    rsi: ReturnStack::decode(&mut cursor)?,
                })
            }
            RequestKind::Read => {
                let (data, bits_in_last_byte) = if abort_code.is_ok() {
                    if cursor.remaining() < 2 {
                        return Err(Error::UnexpectedEof);
                    }
                    let data_len = cursor.get_u16_le() as usize;
                    if cursor.remaining() < data_len + 1 {
                        return Err(Error::UnexpectedEof);
                    }
                    let mut data = vec![0u8; data_len];
                    cursor.copy_to_slice(&mut data);
                    let bits = cursor.get_u8();

                    if data.is_empty() {
                        if bits != 0 {
                            return Err(Error::ProtocolError(
                                "bits_in_last_byte must be 0 for empty data",
                            ));
                        }
                    } else if !(1..=8).contains(&bits) {
                        return Err(Error::ProtocolError(
                            "bits_in_last_byte must be in 1..=8 for non-empty data",
                        ));
                    }

                    (data, bits)
                } else {
                    (Vec::new(), 0)
                };

                Response::Read(ReadResponse {
                    abort_code,
                    data,
                    bits_in_last_byte,
                    rsi: ReturnStack::decode(&mut cursor)?,
                })
            }
            RequestKind::Write => Response::Write(WriteResponse {
                abort_code,
                rsi: ReturnStack::decode(&mut cursor)?,
            }),
        })
    }
}
