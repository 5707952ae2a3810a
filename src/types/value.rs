//! Runtime channel values and their binary codecs.
//!
//! [`ChannelValue`] is the decoded form of one channel's sample for one
//! pulse. Decoding honors the channel's declared element type, byte order and
//! shape; encoding is the exact inverse and is what the sender uses to build
//! value frames.

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

use super::{ByteOrder, ChannelType, ValueEncoding};
use crate::error::{Result, StreamError};

/// Runtime value that can hold any channel sample.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelValue {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    String(String),
    Array(Vec<ChannelValue>),
}

impl ChannelValue {
    /// Numeric view of a scalar value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ChannelValue::Int8(v) => Some(*v as f64),
            ChannelValue::Int16(v) => Some(*v as f64),
            ChannelValue::Int32(v) => Some(*v as f64),
            ChannelValue::Int64(v) => Some(*v as f64),
            ChannelValue::Float32(v) => Some(*v as f64),
            ChannelValue::Float64(v) => Some(*v),
            ChannelValue::Bool(v) => Some(*v as u8 as f64),
            ChannelValue::String(_) | ChannelValue::Array(_) => None,
        }
    }

    /// Number of elements (1 for scalars).
    pub fn element_count(&self) -> usize {
        match self {
            ChannelValue::Array(items) => items.len(),
            _ => 1,
        }
    }

    /// Decode raw (already decompressed) bytes into a typed value.
    ///
    /// An empty shape means scalar; a non-empty shape means an array with
    /// `shape.iter().product()` elements. The byte length must match exactly.
    pub fn decode(
        channel: &str,
        bytes: &[u8],
        ty: ChannelType,
        order: ByteOrder,
        encoding: ValueEncoding,
        shape: &[usize],
    ) -> Result<Self> {
        if ty == ChannelType::String || encoding == ValueEncoding::Utf8 {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| StreamError::codec(channel, format!("invalid utf-8: {e}")))?;
            return Ok(ChannelValue::String(text.to_owned()));
        }

        let width = ty.width().expect("non-string types have a fixed width");
        let expected: usize = if shape.is_empty() { 1 } else { shape.iter().product() };
        if bytes.len() != expected * width {
            return Err(StreamError::codec(
                channel,
                format!(
                    "expected {expected} x {width}-byte elements, got {} bytes",
                    bytes.len()
                ),
            ));
        }

        let mut elements = Vec::with_capacity(expected);
        for chunk in bytes.chunks_exact(width) {
            elements.push(read_element(ty, order, chunk));
        }

        if shape.is_empty() {
            Ok(elements.pop().expect("scalar decode yields one element"))
        } else {
            Ok(ChannelValue::Array(elements))
        }
    }

    /// Encode this value into the byte layout `decode` reads back.
    pub fn encode(&self, channel: &str, ty: ChannelType, order: ByteOrder) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_into(channel, ty, order, &mut out)?;
        Ok(out)
    }

    fn encode_into(
        &self,
        channel: &str,
        ty: ChannelType,
        order: ByteOrder,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        match self {
            ChannelValue::Array(items) => {
                for item in items {
                    item.encode_into(channel, ty, order, out)?;
                }
                Ok(())
            }
            ChannelValue::String(text) => {
                if ty != ChannelType::String {
                    return Err(type_mismatch(channel, ty, "string"));
                }
                out.extend_from_slice(text.as_bytes());
                Ok(())
            }
            scalar => {
                write_element(channel, scalar, ty, order, out)
            }
        }
    }
}

fn read_element(ty: ChannelType, order: ByteOrder, chunk: &[u8]) -> ChannelValue {
    match (ty, order) {
        (ChannelType::Int8, _) => ChannelValue::Int8(chunk[0] as i8),
        (ChannelType::Bool, _) => ChannelValue::Bool(chunk[0] != 0),
        (ChannelType::Int16, ByteOrder::Little) => ChannelValue::Int16(LittleEndian::read_i16(chunk)),
        (ChannelType::Int16, ByteOrder::Big) => ChannelValue::Int16(BigEndian::read_i16(chunk)),
        (ChannelType::Int32, ByteOrder::Little) => ChannelValue::Int32(LittleEndian::read_i32(chunk)),
        (ChannelType::Int32, ByteOrder::Big) => ChannelValue::Int32(BigEndian::read_i32(chunk)),
        (ChannelType::Int64, ByteOrder::Little) => ChannelValue::Int64(LittleEndian::read_i64(chunk)),
        (ChannelType::Int64, ByteOrder::Big) => ChannelValue::Int64(BigEndian::read_i64(chunk)),
        (ChannelType::Float32, ByteOrder::Little) => {
            ChannelValue::Float32(LittleEndian::read_f32(chunk))
        }
        (ChannelType::Float32, ByteOrder::Big) => ChannelValue::Float32(BigEndian::read_f32(chunk)),
        (ChannelType::Float64, ByteOrder::Little) => {
            ChannelValue::Float64(LittleEndian::read_f64(chunk))
        }
        (ChannelType::Float64, ByteOrder::Big) => ChannelValue::Float64(BigEndian::read_f64(chunk)),
        (ChannelType::String, _) => unreachable!("string decode handled before element loop"),
    }
}

fn write_element(
    channel: &str,
    value: &ChannelValue,
    ty: ChannelType,
    order: ByteOrder,
    out: &mut Vec<u8>,
) -> Result<()> {
    let mut buf = [0u8; 8];
    let written: &[u8] = match (value, ty) {
        (ChannelValue::Int8(v), ChannelType::Int8) => {
            buf[0] = *v as u8;
            &buf[..1]
        }
        (ChannelValue::Bool(v), ChannelType::Bool) => {
            buf[0] = *v as u8;
            &buf[..1]
        }
        (ChannelValue::Int16(v), ChannelType::Int16) => {
            match order {
                ByteOrder::Little => LittleEndian::write_i16(&mut buf, *v),
                ByteOrder::Big => BigEndian::write_i16(&mut buf, *v),
            }
            &buf[..2]
        }
        (ChannelValue::Int32(v), ChannelType::Int32) => {
            match order {
                ByteOrder::Little => LittleEndian::write_i32(&mut buf, *v),
                ByteOrder::Big => BigEndian::write_i32(&mut buf, *v),
            }
            &buf[..4]
        }
        (ChannelValue::Int64(v), ChannelType::Int64) => {
            match order {
                ByteOrder::Little => LittleEndian::write_i64(&mut buf, *v),
                ByteOrder::Big => BigEndian::write_i64(&mut buf, *v),
            }
            &buf[..8]
        }
        (ChannelValue::Float32(v), ChannelType::Float32) => {
            match order {
                ByteOrder::Little => LittleEndian::write_f32(&mut buf, *v),
                ByteOrder::Big => BigEndian::write_f32(&mut buf, *v),
            }
            &buf[..4]
        }
        (ChannelValue::Float64(v), ChannelType::Float64) => {
            match order {
                ByteOrder::Little => LittleEndian::write_f64(&mut buf, *v),
                ByteOrder::Big => BigEndian::write_f64(&mut buf, *v),
            }
            &buf[..8]
        }
        (other, _) => return Err(type_mismatch(channel, ty, value_kind(other))),
    };
    out.extend_from_slice(written);
    Ok(())
}

fn value_kind(value: &ChannelValue) -> &'static str {
    match value {
        ChannelValue::Int8(_) => "int8",
        ChannelValue::Int16(_) => "int16",
        ChannelValue::Int32(_) => "int32",
        ChannelValue::Int64(_) => "int64",
        ChannelValue::Float32(_) => "float32",
        ChannelValue::Float64(_) => "float64",
        ChannelValue::Bool(_) => "bool",
        ChannelValue::String(_) => "string",
        ChannelValue::Array(_) => "array",
    }
}

fn type_mismatch(channel: &str, ty: ChannelType, got: &str) -> StreamError {
    StreamError::codec(channel, format!("cannot encode {got} value as {ty:?}"))
}
