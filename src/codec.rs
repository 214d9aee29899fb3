//! Decode fixed-size frames into raw field values.
//!
//! Every field's byte range was checked against the frame size when the schema was resolved,
//! so decoding a frame of the right length cannot fail: each field is a re-interpretation of
//! a slice (two's complement integers, IEEE-754 floats, or opaque bytes).

use crate::ast::{Endianness, FieldType};
use crate::schema::{Field, Schema};
use crate::value::Value;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is {found} bytes, schema frame size is {expected}")]
    FrameLength { expected: usize, found: usize },
}

/// Decodes frames for one schema.
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder<'a> {
    schema: &'a Schema,
}

impl<'a> FrameDecoder<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        FrameDecoder { schema }
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// Decode all fields, in schema order.
    pub fn decode(&self, frame: &[u8]) -> Result<Vec<Value>, DecodeError> {
        let mut out = Vec::with_capacity(self.schema.fields().len());
        self.decode_into(frame, &mut out)?;
        Ok(out)
    }

    /// Decode all fields, appending to `out`.
    pub fn decode_into(&self, frame: &[u8], out: &mut Vec<Value>) -> Result<(), DecodeError> {
        let expected = self.schema.frame_size();
        if frame.len() != expected {
            return Err(DecodeError::FrameLength {
                expected,
                found: frame.len(),
            });
        }
        out.extend(self.schema.fields().iter().map(|f| decode_field(frame, f)));
        Ok(())
    }
}

/// Decode one field from a frame whose length matches the field's schema.
///
/// # Panics
///
/// If `frame` is shorter than the field's end offset; [`FrameDecoder`] checks this.
pub fn decode_field(frame: &[u8], field: &Field) -> Value {
    let bytes = &frame[field.byte_range()];
    match field.endian {
        Endianness::Big => read_value::<BigEndian>(field.field_type, bytes),
        Endianness::Little => read_value::<LittleEndian>(field.field_type, bytes),
    }
}

fn read_value<B: ByteOrder>(field_type: FieldType, bytes: &[u8]) -> Value {
    match field_type {
        FieldType::U8 => Value::U8(bytes[0]),
        FieldType::I8 => Value::I8(bytes[0] as i8),
        FieldType::U16 => Value::U16(B::read_u16(bytes)),
        FieldType::I16 => Value::I16(B::read_i16(bytes)),
        FieldType::U32 => Value::U32(B::read_u32(bytes)),
        FieldType::I32 => Value::I32(B::read_i32(bytes)),
        FieldType::U64 => Value::U64(B::read_u64(bytes)),
        FieldType::I64 => Value::I64(B::read_i64(bytes)),
        FieldType::F32 => Value::F32(B::read_f32(bytes)),
        FieldType::F64 => Value::F64(B::read_f64(bytes)),
        FieldType::Bytes => Value::Bytes(bytes.to_vec()),
    }
}
