//! Schema definition model: what a schema file says, before validation.
//!
//! [`SchemaDef`] is produced by the schema parser (or built directly in code) and turned into a
//! validated [`crate::Schema`] by [`crate::Schema::resolve`].

use std::fmt;

/// Byte order of a multi-byte field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    Big,
    #[default]
    Little,
}

impl Endianness {
    pub fn from_name(name: &str) -> Option<Endianness> {
        match name.to_ascii_lowercase().as_str() {
            "big" => Some(Endianness::Big),
            "little" => Some(Endianness::Little),
            _ => None,
        }
    }
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Endianness::Big => "big",
            Endianness::Little => "little",
        })
    }
}

/// Field storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    /// Opaque byte sequence; length comes from the field definition.
    Bytes,
}

impl FieldType {
    pub fn from_name(name: &str) -> Option<FieldType> {
        Some(match name {
            "u8" => FieldType::U8,
            "i8" => FieldType::I8,
            "u16" => FieldType::U16,
            "i16" => FieldType::I16,
            "u32" => FieldType::U32,
            "i32" => FieldType::I32,
            "u64" => FieldType::U64,
            "i64" => FieldType::I64,
            "f32" | "float32" => FieldType::F32,
            "f64" | "float64" => FieldType::F64,
            "bytes" => FieldType::Bytes,
            _ => return None,
        })
    }

    /// Width in bytes, `None` for [`FieldType::Bytes`].
    pub fn width(self) -> Option<usize> {
        match self {
            FieldType::U8 | FieldType::I8 => Some(1),
            FieldType::U16 | FieldType::I16 => Some(2),
            FieldType::U32 | FieldType::I32 | FieldType::F32 => Some(4),
            FieldType::U64 | FieldType::I64 | FieldType::F64 => Some(8),
            FieldType::Bytes => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        self != FieldType::Bytes
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FieldType::U8 => "u8",
            FieldType::I8 => "i8",
            FieldType::U16 => "u16",
            FieldType::I16 => "i16",
            FieldType::U32 => "u32",
            FieldType::I32 => "i32",
            FieldType::U64 => "u64",
            FieldType::I64 => "i64",
            FieldType::F32 => "f32",
            FieldType::F64 => "f64",
            FieldType::Bytes => "bytes",
        })
    }
}

/// Root schema definition: settings block and subsystems in declaration order.
#[derive(Debug, Clone, Default)]
pub struct SchemaDef {
    pub settings: SettingsDef,
    pub subsystems: Vec<SubsystemDef>,
}

#[derive(Debug, Clone, Default)]
pub struct SettingsDef {
    pub frame_size: usize,
    pub endian: Endianness,
    pub read_in_memory: bool,
    pub sort_by: Option<String>,
    pub include_frame_index: bool,
}

#[derive(Debug, Clone)]
pub struct SubsystemDef {
    pub name: String,
    pub offset: usize,
    pub endian: Option<Endianness>,
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub offset: usize,
    /// Required for `bytes`; optional (and checked against the width) otherwise.
    pub length: Option<usize>,
    pub endian: Option<Endianness>,
    pub calibration: Option<CalibrationDef>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType, offset: usize) -> Self {
        FieldDef {
            name: name.into(),
            field_type,
            offset,
            length: None,
            endian: None,
            calibration: None,
        }
    }
}

/// Calibration as written: expression text is parsed during resolve.
#[derive(Debug, Clone, Default)]
pub struct CalibrationDef {
    pub expr: Option<String>,
    pub func: Option<String>,
    pub round: Option<u32>,
    pub units: Option<String>,
}

impl CalibrationDef {
    pub fn expr(text: impl Into<String>) -> Self {
        CalibrationDef {
            expr: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn func(name: impl Into<String>) -> Self {
        CalibrationDef {
            func: Some(name.into()),
            ..Default::default()
        }
    }
}
