//! Validated, immutable schema.
//!
//! [`Schema::resolve`] checks every invariant once (frame size, unique names, byte lengths,
//! frame bounds, calibration rules, sort field) and parses all calibration expressions, so
//! nothing has to be re-checked per frame.

use crate::ast::{CalibrationDef, Endianness, FieldType, SchemaDef};
use crate::error::{ConfigError, Error, SchemaError};
use crate::expr::Expression;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::path::Path;

/// Column name used for the frame index when it is included.
pub const FRAME_INDEX_COLUMN: &str = "frame_index";

#[derive(Debug, Clone)]
pub struct Settings {
    pub frame_size: usize,
    pub default_endian: Endianness,
    pub read_in_memory: bool,
    pub sort_by: Option<String>,
    pub include_frame_index: bool,
}

#[derive(Debug, Clone)]
pub struct Subsystem {
    pub name: String,
    pub byte_offset: usize,
    pub endian: Option<Endianness>,
    /// Indices into [`Schema::fields`].
    pub fields: Range<usize>,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub qualified_name: String,
    pub field_type: FieldType,
    /// Offset relative to the subsystem.
    pub byte_offset: usize,
    /// Offset relative to the frame start.
    pub abs_offset: usize,
    pub byte_length: usize,
    /// Resolved byte order: field override, else subsystem, else schema default.
    pub endian: Endianness,
    pub calibration: Option<Calibration>,
}

impl Field {
    pub fn byte_range(&self) -> Range<usize> {
        self.abs_offset..self.abs_offset + self.byte_length
    }
}

#[derive(Debug, Clone)]
pub enum CalibrationMethod {
    Expr(Expression),
    Func(String),
}

#[derive(Debug, Clone)]
pub struct Calibration {
    pub method: CalibrationMethod,
    pub round: Option<u32>,
    pub units: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Schema {
    settings: Settings,
    subsystems: Vec<Subsystem>,
    fields: Vec<Field>,
    fields_by_name: HashMap<String, usize>,
    sort_field: Option<usize>,
}

impl Schema {
    /// Validate a definition. Fails with [`Error::Schema`] or [`Error::Config`].
    pub fn resolve(def: SchemaDef) -> Result<Schema, Error> {
        let settings_def = def.settings;
        if settings_def.frame_size == 0 {
            return Err(SchemaError::ZeroFrameSize.into());
        }
        let frame_size = settings_def.frame_size;

        let mut subsystems = Vec::with_capacity(def.subsystems.len());
        let mut fields = Vec::new();
        let mut fields_by_name = HashMap::new();
        let mut subsystem_names = HashSet::new();

        for sub in def.subsystems {
            if !subsystem_names.insert(sub.name.clone()) {
                return Err(SchemaError::DuplicateSubsystem(sub.name).into());
            }
            let start = fields.len();
            for f in sub.fields {
                let qualified_name = format!("{}.{}", sub.name, f.name);
                if fields_by_name.contains_key(&qualified_name) {
                    return Err(SchemaError::DuplicateField(qualified_name).into());
                }
                let byte_length = field_length(&qualified_name, f.field_type, f.length)?;
                let abs_offset = sub.offset.checked_add(f.offset);
                let end = abs_offset.and_then(|o| o.checked_add(byte_length));
                let abs_offset = match (abs_offset, end) {
                    (Some(o), Some(e)) if e <= frame_size => o,
                    _ => {
                        return Err(SchemaError::OutOfBounds {
                            field: qualified_name,
                            offset: sub.offset.saturating_add(f.offset),
                            length: byte_length,
                            frame_size,
                        }
                        .into())
                    }
                };
                let calibration = match f.calibration {
                    Some(c) => Some(resolve_calibration(&qualified_name, f.field_type, c)?),
                    None => None,
                };
                let endian = f
                    .endian
                    .or(sub.endian)
                    .unwrap_or(settings_def.endian);
                fields_by_name.insert(qualified_name.clone(), fields.len());
                fields.push(Field {
                    name: f.name,
                    qualified_name,
                    field_type: f.field_type,
                    byte_offset: f.offset,
                    abs_offset,
                    byte_length,
                    endian,
                    calibration,
                });
            }
            subsystems.push(Subsystem {
                name: sub.name,
                byte_offset: sub.offset,
                endian: sub.endian,
                fields: start..fields.len(),
            });
        }

        let sort_field = match &settings_def.sort_by {
            Some(name) => {
                if !settings_def.read_in_memory {
                    return Err(ConfigError::SortRequiresInMemory(name.clone()).into());
                }
                let idx = fields_by_name
                    .get(name)
                    .copied()
                    .ok_or_else(|| SchemaError::UnknownSortField(name.clone()))?;
                Some(idx)
            }
            None => None,
        };

        Ok(Schema {
            settings: Settings {
                frame_size,
                default_endian: settings_def.endian,
                read_in_memory: settings_def.read_in_memory,
                sort_by: settings_def.sort_by,
                include_frame_index: settings_def.include_frame_index,
            },
            subsystems,
            fields,
            fields_by_name,
            sort_field,
        })
    }

    /// Parse schema text and validate it. Text whose first non-blank character is `<` is read
    /// as an XML schema ([`crate::xml`]), anything else as the block format.
    pub fn from_source(source: &str) -> Result<Schema, Error> {
        let body = source.trim_start_matches('\u{feff}').trim_start();
        let def = if body.starts_with('<') {
            crate::xml::parse(body)?
        } else {
            crate::parser::parse(source)?
        };
        Schema::resolve(def)
    }

    /// Read a schema file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Schema, Error> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| SchemaError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Schema::from_source(&source)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn frame_size(&self) -> usize {
        self.settings.frame_size
    }

    pub fn subsystems(&self) -> &[Subsystem] {
        &self.subsystems
    }

    pub fn subsystem_fields(&self, subsystem: &Subsystem) -> &[Field] {
        &self.fields[subsystem.fields.clone()]
    }

    /// All fields in output order: subsystem order, then field order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_index(&self, qualified_name: &str) -> Option<usize> {
        self.fields_by_name.get(qualified_name).copied()
    }

    pub fn field(&self, qualified_name: &str) -> Option<&Field> {
        self.field_index(qualified_name).map(|i| &self.fields[i])
    }

    /// Index of the `sort_by` field, if any.
    pub fn sort_field(&self) -> Option<usize> {
        self.sort_field
    }

    /// Output column names, with the frame index column first when enabled.
    pub fn columns(&self) -> Vec<String> {
        let mut cols = Vec::with_capacity(self.fields.len() + 1);
        if self.settings.include_frame_index {
            cols.push(FRAME_INDEX_COLUMN.to_string());
        }
        cols.extend(self.fields.iter().map(|f| f.qualified_name.clone()));
        cols
    }
}

fn field_length(
    field: &str,
    field_type: FieldType,
    length: Option<usize>,
) -> Result<usize, SchemaError> {
    match (field_type.width(), length) {
        (None, Some(n)) if n > 0 => Ok(n),
        (None, _) => Err(SchemaError::BytesMissingLength {
            field: field.to_string(),
        }),
        (Some(width), Some(n)) if n != width => Err(SchemaError::LengthMismatch {
            field: field.to_string(),
            field_type,
            length: n,
            width,
        }),
        (Some(width), _) => Ok(width),
    }
}

fn resolve_calibration(
    field: &str,
    field_type: FieldType,
    def: CalibrationDef,
) -> Result<Calibration, SchemaError> {
    if !field_type.is_numeric() {
        return Err(SchemaError::CalibrationOnBytes {
            field: field.to_string(),
        });
    }
    let method = match (def.expr, def.func) {
        (Some(text), None) => {
            let expr = Expression::parse(&text).map_err(|source| SchemaError::Expression {
                field: field.to_string(),
                source,
            })?;
            CalibrationMethod::Expr(expr)
        }
        (None, Some(name)) => CalibrationMethod::Func(name),
        _ => {
            return Err(SchemaError::CalibrationMethod {
                field: field.to_string(),
            })
        }
    };
    Ok(Calibration {
        method,
        round: def.round,
        units: def.units,
    })
}
