//! Request messages: the five kinds a client may send across a RODA
//! connection, plus their shared little-endian wire encoding.

use bytes::{Buf, BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{Error, WIRE_VERSION, rsi::ReturnStack};

/// Common header every request carries: version, type, a reserved byte kept
/// for forward compatibility, then the response size budget the caller is
/// willing to receive.
const HEADER_LEN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum RequestKind {
    Ping = 0,
    ObjectEnum = 1,
    ObjectInfo = 2,
    Read = 3,
    Write = 4,
}

/// CANopen complete-access flavor a `Read`/`Write` request is using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AccessType {
    SingleSubindex = 0,
    CompleteAccessSi0_8Bit = 1,
    CompleteAccessSi0_16Bit = 2,
}

impl AccessType {
    pub fn is_complete_access(&self) -> bool {
        !matches!(self, AccessType::SingleSubindex)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingRequest {
    pub max_response_size: u32,
    pub rsi: ReturnStack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEnumRequest {
    pub max_response_size: u32,
    pub start_index: u16,
    pub last_index: u16,
    /// 16-bit attribute mask; non-zero per the protocol invariant.
    pub attribute_filter: u16,
    pub rsi: ReturnStack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfoRequest {
    pub max_response_size: u32,
    pub index: u16,
    pub first_si: u8,
    pub last_si: u8,
    pub include_names: bool,
    pub include_app_specific_metadata: bool,
    pub rsi: ReturnStack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub max_response_size: u32,
    pub index: u16,
    pub subindex: u8,
    /// Read-capable attribute bits only; non-zero.
    pub permissions: u16,
    pub access_type: AccessType,
    pub rsi: ReturnStack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub max_response_size: u32,
    pub index: u16,
    pub subindex: u8,
    pub permissions: u16,
    pub access_type: AccessType,
    pub data: Vec<u8>,
    pub rsi: ReturnStack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Ping(PingRequest),
    ObjectEnum(ObjectEnumRequest),
    ObjectInfo(ObjectInfoRequest),
    Read(ReadRequest),
    Write(WriteRequest),
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Ping(_) => RequestKind::Ping,
            Request::ObjectEnum(_) => RequestKind::ObjectEnum,
            Request::ObjectInfo(_) => RequestKind::ObjectInfo,
            Request::Read(_) => RequestKind::Read,
            Request::Write(_) => RequestKind::Write,
        }
    }

    pub fn max_response_size(&self) -> u32 {
        match self {
            Request::Ping(r) => r.max_response_size,
            Request::ObjectEnum(r) => r.max_response_size,
            Request::ObjectInfo(r) => r.max_response_size,
            Request::Read(r) => r.max_response_size,
            Request::Write(r) => r.max_response_size,
        }
    }

    pub fn rsi(&self) -> &ReturnStack {
        match self {
            Request::Ping(r) => &r.rsi,
            Request::ObjectEnum(r) => &r.rsi,
            Request::ObjectInfo(r) => &r.rsi,
            Request::Read(r) => &r.rsi,
            Request::Write(r) => &r.rsi,
        }
    }

    pub fn rsi_mut(&mut self) -> &mut ReturnStack {
        match self {
            Request::Ping(r) => &mut r.rsi,
            Request::ObjectEnum(r) => &mut r.rsi,
            Request::ObjectInfo(r) => &mut r.rsi,
            Request::Read(r) => &mut r.rsi,
            Request::Write(r) => &mut r.rsi,
        }
    }

    /// Move the RSI stack out, leaving an empty stack behind.
    ///
    /// Used by the server and the multiplexer when handing the stack across
    /// to the matching response - the request's copy must not survive the
    /// move, or a stale stack could leak into a later reuse of this object.
    pub fn take_rsi(&mut self) -> ReturnStack {
        std::mem::take(self.rsi_mut())
    }

    /// Total serialized size, including the RSI stack.
    pub fn encoded_size(&self) -> usize {
        let body = match self {
            Request::Ping(_) => 0,
            Request::ObjectEnum(_) => 6,
            Request::ObjectInfo(_) => 5,
            Request::Read(r) => {
                let _ = r;
                6
            }
            Request::Write(r) => 6 + 2 + r.data.len(),
        };

        HEADER_LEN + body + self.rsi().wire_size()
    }

    fn encode_header(buf: &mut BytesMut, kind: RequestKind, max_response_size: u32) {
        buf.put_u8(WIRE_VERSION);
        buf.put_u8(kind.into());
        buf.put_u8(0); // reserved
        buf.put_u32_le(max_response_size);
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Request::Ping(r) => {
                Self::encode_header(buf, RequestKind::Ping, r.max_response_size);
                r.rsi.encode(buf);
            }
            Request::ObjectEnum(r) => {
                Self::encode_header(buf, RequestKind::ObjectEnum, r.max_response_size);
                buf.put_u16_le(r.start_index);
                buf.put_u16_le(r.last_index);
                buf.put_u16_le(r.attribute_filter);
                r.rsi.encode(buf);
            }
            Request::ObjectInfo(r) => {
                Self::encode_header(buf, RequestKind::ObjectInfo, r.max_response_size);
                buf.put_u16_le(r.index);
                buf.put_u8(r.first_si);
                buf.put_u8(r.last_si);
                let flags = (r.include_names as u8) | ((r.include_app_specific_metadata as u8) << 1);
                buf.put_u8(flags);
                r.rsi.encode(buf);
            }
            Request::Read(r) => {
                Self::encode_header(buf, RequestKind::Read, r.max_response_size);
                buf.put_u8(r.access_type.into());
                buf.put_u16_le(r.index);
                buf.put_u8(r.subindex);
                buf.put_u16_le(r.permissions);
                r.rsi.encode(buf);
            }
            Request::Write(r) => {
                Self::encode_header(buf, RequestKind::Write, r.max_response_size);
                buf.put_u8(r.access_type.into());
                buf.put_u16_le(r.index);
                buf.put_u8(r.subindex);
                buf.put_u16_le(r.permissions);
                buf.put_u16_le(r.data.len() as u16);
                buf.extend_from_slice(&r.data);
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
        // bytes[2] is reserved.
        let max_response_size = u32::from_le_bytes(bytes[3..7].try_into()?);
        let mut cursor = &bytes[HEADER_LEN..];

        Ok(match kind {
            RequestKind::Ping => Request::Ping(PingRequest {
                max_response_size,
                rsi: ReturnStack::decode(&mut cursor)?,
            }),
            RequestKind::ObjectEnum => {
                if cursor.remaining() < 6 {
                    return Err(Error::UnexpectedEof);
                }

                let start_index = cursor.get_u16_le();
                let last_index = cursor.get_u16_le();
                let attribute_filter = cursor.get_u16_le();

                if attribute_filter == 0 {
                    return Err(Error::ProtocolError("attr_filter must be non-zero"));
                }
                if start_index > last_index {
                    return Err(Error::ProtocolError("start_index must be <= last_index"));
                }

                Request::ObjectEnum(ObjectEnumRequest {
                    max_response_size,
                    start_index,
                    last_index,
                    attribute_filter,
                    rsi: ReturnStack::decode(&mut cursor)?,
                })
            }
            RequestKind::ObjectInfo => {
                if cursor.remaining() < 5 {
                    return Err(Error::UnexpectedEof);
                }

                let index = cursor.get_u16_le();
                let first_si = cursor.get_u8();
                let last_si = cursor.get_u8();
                let flags = cursor.get_u8();

                Request::ObjectInfo(ObjectInfoRequest {
                    max_response_size,
                    index,
                    first_si,
                    last_si,
                    include_names: flags & 0b01 != 0,
                    include_app_specific_metadata: flags & 0b10 != 0,
                    rsi: ReturnStack::decode(&mut cursor)?,
                })
            }
            RequestKind::Read => {
                if cursor.remaining() < 6 {
                    return Err(Error::UnexpectedEof);
                }

                let access_type = decode_access_type(cursor.get_u8())?;
                let index = cursor.get_u16_le();
                let subindex = cursor.get_u8();
                let permissions = cursor.get_u16_le();

                validate_access(&access_type, subindex)?;
                if permissions == 0 {
                    return Err(Error::ProtocolError("permissions must be non-zero"));
                }

                Request::Read(ReadRequest {
                    max_response_size,
                    index,
                    subindex,
                    permissions,
                    access_type,
                    rsi: ReturnStack::decode(&mut cursor)?,
                })
            }
            RequestKind::Write => {
                if cursor.remaining() < 8 {
                    return Err(Error::UnexpectedEof);
                }

                let access_type = decode_access_type(cursor.get_u8())?;
                let index = cursor.get_u16_le();
                let subindex = cursor.get_u8();
                let permissions = cursor.get_u16_le();
                let data_len = cursor.get_u16_le() as usize;

                validate_access(&access_type, subindex)?;
                if permissions == 0 {
                    return Err(Error::ProtocolError("permissions must be non-zero"));
                }
                if cursor.remaining() < data_len {
                    return Err(Error::UnexpectedEof);
                }

                let mut data = vec![0u8; data_len];
                cursor.copy_to_slice(&mut data);

                if data.is_empty() {
                    return Err(Error::ProtocolError("data_len must be >= 1"));
                }
                if matches!(access_type, AccessType::CompleteAccessSi0_16Bit) && subindex == 0 && data.len() < 2 {
                    return Err(Error::ProtocolError(
                        "CA_16bit write of SI0 needs at least 2 data bytes",
                    ));
                }

                Request::Write(WriteRequest {
                    max_response_size,
                    index,
                    subindex,
                    permissions,
                    access_type,
                    data,
                    rsi: ReturnStack::decode(&mut cursor)?,
                })
            }
        })
    }
}

fn decode_access_type(byte: u8) -> Result<AccessType, Error> {
    AccessType::try_from(byte).map_err(|_| Error::ProtocolError("unknown access_type"))
}

fn validate_access(access_type: &AccessType, subindex: u8) -> Result<(), Error> {
    if access_type.is_complete_access() && subindex > 1 {
        return Err(Error::ProtocolError(
            "complete access requires subindex 0 or 1",
        ));
    }
    Ok(())
}
