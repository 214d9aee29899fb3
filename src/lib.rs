//! # satframe: schema-driven decoding of fixed-size binary frames
//!
//! Decodes raw telemetry dumps (a file of equally sized frames) into calibrated records,
//! following a declarative schema, and writes them out as delimited text.
//!
//! ## Pieces
//!
//! - **Schema**: settings plus subsystems of typed fields at byte offsets, validated once
//!   ([`Schema::resolve`]) so every field is known to lie inside the frame.
//! - **Frame decoder** ([`FrameDecoder`]): integers (two's complement), IEEE-754 floats and
//!   opaque byte sequences, with per-field / per-subsystem / default endianness.
//! - **Calibration**: a safe expression language over `raw` ([`Expression`]) or a named plugin
//!   function ([`CalibrationPlugin`]), then optional rounding (ties to even).
//! - **Pipeline** ([`RecordPipeline`]): streaming or in-memory, with an optional stable sort.
//!
//! ## Example schema
//!
//! Schemas are written in a block format or in XML ([`xml`]); [`Schema::from_source`] picks
//! the format from the text.
//!
//! ```text
//! settings {
//!     frame_size: 4000;
//!     endian: big;
//!     read_in_memory: true;
//!     sort_by: CDH.OBT;
//!     include_frame_index: false;
//! }
//!
//! subsystem PCS @ 1604 {
//!     vBatAverage: u16 @ 750 {
//!         expr: "raw * 0.01873128 + (-38.682956)";
//!         units: "V";
//!         round: 3;
//!     }
//! }
//!
//! subsystem CDH @ 8 {
//!     OBT: u32 @ 92 { func: obt_seconds_to_unix; }
//! }
//! ```
//!
//! ## Usage
//!
//! ```
//! use satframe::{FunctionTable, RecordPipeline, Schema, Value};
//!
//! let schema = Schema::from_source(r#"
//!     settings { frame_size: 2; endian: big; }
//!     subsystem S @ 0 { v: u16 @ 0 { expr: "raw * 2 + 1"; } }
//! "#).unwrap();
//! let plugin = FunctionTable::with_builtins();
//! let records = RecordPipeline::new(&schema, &plugin).collect(&[0, 10]).unwrap();
//! assert_eq!(records[0].values, vec![Value::F64(21.0)]);
//! ```

pub mod ast;
pub mod calibration;
pub mod codec;
pub mod error;
pub mod eval;
pub mod export;
pub mod expr;
pub mod frame;
pub mod parser;
pub mod pipeline;
pub mod plugin;
pub mod schema;
pub mod value;
pub mod xml;

pub use ast::{CalibrationDef, Endianness, FieldDef, FieldType, SchemaDef, SettingsDef, SubsystemDef};
pub use codec::{DecodeError, FrameDecoder};
pub use error::{CalibrationError, ConfigError, Error, InputError, PluginError, SchemaError};
pub use eval::EvalError;
pub use export::DelimitedWriter;
pub use expr::{Expr, Expression, ParseError};
pub use frame::FrameReader;
pub use parser::parse;
pub use pipeline::{Record, RecordPipeline, RecordSink};
pub use plugin::{CalibrationFn, CalibrationPlugin, FunctionTable, NoPlugin};
pub use schema::{Calibration, CalibrationMethod, Field, Schema, Settings, Subsystem};
pub use value::Value;
