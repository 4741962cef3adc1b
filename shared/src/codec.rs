//! Binary codec for per-tick frames.
//!
//! Server frame layout (little endian):
//!
//! ```text
//! frame_id: u24 | count: i32 | count * { guid: u32 | type: u8 | len: u32 | payload: [u8; len] }
//! ```
//!
//! The payload is the bincode encoding of the record struct matching the
//! type tag. A client frame is a `u24` frame id followed by the bincode
//! encoding of [`PlayerInput`].
//!
//! Decoding is total: every byte must be accounted for, every tag known and
//! every payload well formed, otherwise the whole frame is rejected.

use crate::objects::{DoodadRecord, EffectRecord, HeroRecord, ObjectRecord, ObjectType, UnitRecord};
use crate::{Guid, PlayerInput};
use bincode::Options;
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

/// Largest frame id representable on the wire.
pub const MAX_FRAME_ID: u32 = (1 << 24) - 1;

const MAX_PAYLOAD_BYTES: u64 = 64 * 1024;
const RECORD_HEADER_BYTES: usize = 4 + 1 + 4;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame truncated: needed {needed} bytes at offset {offset}")]
    Truncated { needed: usize, offset: usize },

    #[error("frame id {0} does not fit in 24 bits")]
    FrameIdOverflow(u32),

    #[error("invalid object count {0}")]
    InvalidCount(i32),

    #[error("unknown object type tag {0}")]
    UnknownObjectType(u8),

    #[error("object {0} appears twice in one frame")]
    DuplicateObject(Guid),

    #[error("non-finite number in client input")]
    NonFinite,

    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),

    #[error("payload error: {0}")]
    Payload(#[from] bincode::Error),
}

/// One object as it travels in a server frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameObject {
    pub guid: Guid,
    pub record: ObjectRecord,
}

impl FrameObject {
    pub fn write_as(&self) -> ObjectType {
        self.record.object_type()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerFrame {
    pub frame_id: u32,
    pub objects: Vec<FrameObject>,
}

/// Whether frame `id` comes after `last`. Ids wrap past [`MAX_FRAME_ID`],
/// so anything up to half the id space ahead counts as newer.
pub fn frame_is_newer(id: u32, last: u32) -> bool {
    let ahead = id.wrapping_sub(last) & MAX_FRAME_ID;
    ahead != 0 && ahead <= MAX_FRAME_ID / 2
}

fn payload_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(MAX_PAYLOAD_BYTES)
        .reject_trailing_bytes()
}

fn write_u24(buf: &mut Vec<u8>, value: u32) -> Result<(), CodecError> {
    if value > MAX_FRAME_ID {
        return Err(CodecError::FrameIdOverflow(value));
    }
    buf.extend_from_slice(&value.to_le_bytes()[..3]);
    Ok(())
}

fn write_payload<T: Serialize>(buf: &mut Vec<u8>, value: &T) -> Result<(), CodecError> {
    let bytes = payload_options().serialize(value)?;
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(&bytes);
    Ok(())
}

pub fn encode_server_frame(frame_id: u32, objects: &[FrameObject]) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(7 + objects.len() * 64);
    write_u24(&mut buf, frame_id)?;
    buf.extend_from_slice(&(objects.len() as i32).to_le_bytes());

    for object in objects {
        buf.extend_from_slice(&object.guid.to_le_bytes());
        buf.push(object.write_as().tag());
        match &object.record {
            ObjectRecord::Unit(r) => write_payload(&mut buf, r)?,
            ObjectRecord::Hero(r) => write_payload(&mut buf, r)?,
            ObjectRecord::Doodad(r) => write_payload(&mut buf, r)?,
            ObjectRecord::Effect(r) => write_payload(&mut buf, r)?,
        }
    }
    Ok(buf)
}

pub fn decode_server_frame(bytes: &[u8]) -> Result<ServerFrame, CodecError> {
    let mut reader = Reader::new(bytes);
    let frame_id = reader.read_u24()?;
    let count = reader.read_i32()?;
    if count < 0 {
        return Err(CodecError::InvalidCount(count));
    }
    // refuse counts the remaining bytes cannot possibly hold
    let count = count as usize;
    if count > reader.remaining() / RECORD_HEADER_BYTES {
        return Err(CodecError::Truncated {
            needed: count * RECORD_HEADER_BYTES,
            offset: reader.offset,
        });
    }

    let mut seen = HashSet::with_capacity(count);
    let mut objects = Vec::with_capacity(count);
    for _ in 0..count {
        let guid = reader.read_u32()?;
        let tag = reader.read_u8()?;
        let ty = ObjectType::from_tag(tag).ok_or(CodecError::UnknownObjectType(tag))?;
        let len = reader.read_u32()? as usize;
        let payload = reader.take(len)?;

        let options = payload_options();
        let record = match ty {
            ObjectType::Unit => ObjectRecord::Unit(options.deserialize::<UnitRecord>(payload)?),
            ObjectType::Hero => ObjectRecord::Hero(options.deserialize::<HeroRecord>(payload)?),
            ObjectType::Doodad => {
                ObjectRecord::Doodad(options.deserialize::<DoodadRecord>(payload)?)
            }
            ObjectType::Effect => {
                ObjectRecord::Effect(options.deserialize::<EffectRecord>(payload)?)
            }
        };

        if !seen.insert(guid) {
            return Err(CodecError::DuplicateObject(guid));
        }
        objects.push(FrameObject { guid, record });
    }

    reader.finish()?;
    Ok(ServerFrame { frame_id, objects })
}

pub fn encode_client_frame(frame_id: u32, input: &PlayerInput) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(32);
    write_u24(&mut buf, frame_id)?;
    buf.extend_from_slice(&payload_options().serialize(input)?);
    Ok(buf)
}

pub fn decode_client_frame(bytes: &[u8]) -> Result<(u32, PlayerInput), CodecError> {
    let mut reader = Reader::new(bytes);
    let frame_id = reader.read_u24()?;
    let input = payload_options().deserialize::<PlayerInput>(reader.rest())?;
    if !input.is_finite() {
        return Err(CodecError::NonFinite);
    }
    Ok((frame_id, input))
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Truncated {
                needed: n,
                offset: self.offset,
            });
        }
        let slice = &self.bytes[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.bytes[self.offset..];
        self.offset = self.bytes.len();
        slice
    }

    fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn read_u24(&mut self) -> Result<u32, CodecError> {
        let b = self.take(3)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], 0]))
    }

    fn read_u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_i32(&mut self) -> Result<i32, CodecError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn finish(&self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}
