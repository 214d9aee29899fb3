//! Error types for schema building, input reading and per-frame calibration.

use crate::codec::DecodeError;
use crate::eval::EvalError;
use crate::expr::ParseError;

/// Problems with the schema itself. Always detected before the first frame is read.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("schema file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("schema syntax: {0}")]
    Syntax(String),
    #[error("schema XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("schema XML: root element must be <schema>, found <{0}>")]
    UnexpectedRoot(String),
    #[error("schema XML: <{0}> element is required")]
    MissingElement(&'static str),
    #[error("schema XML: <{element}> requires attribute `{attribute}`")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error("schema XML: <{element} {attribute}> has invalid value `{value}`")]
    InvalidAttribute {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },
    #[error("settings: `{0}` is required")]
    MissingSetting(&'static str),
    #[error("settings: `{key}` has invalid value `{value}`")]
    InvalidSetting { key: String, value: String },
    #[error("settings: frame_size must be positive")]
    ZeroFrameSize,
    #[error("duplicate subsystem `{0}`")]
    DuplicateSubsystem(String),
    #[error("duplicate field `{0}`")]
    DuplicateField(String),
    #[error("field `{field}`: unknown type `{type_name}`")]
    UnknownType { field: String, type_name: String },
    #[error("field `{field}`: bytes type requires a positive length")]
    BytesMissingLength { field: String },
    #[error("field `{field}`: length {length} does not match {field_type} width {width}")]
    LengthMismatch {
        field: String,
        field_type: crate::ast::FieldType,
        length: usize,
        width: usize,
    },
    #[error("field `{field}` (offset {offset}, length {length}) overflows frame size {frame_size}")]
    OutOfBounds {
        field: String,
        offset: usize,
        length: usize,
        frame_size: usize,
    },
    #[error("field `{field}`: calibration is not allowed on a bytes field")]
    CalibrationOnBytes { field: String },
    #[error("field `{field}`: calibration needs exactly one of `expr` or `func`")]
    CalibrationMethod { field: String },
    #[error("field `{field}`: calibration key `{key}` has invalid value `{value}`")]
    InvalidCalibration {
        field: String,
        key: String,
        value: String,
    },
    #[error("field `{field}`: expression: {source}")]
    Expression {
        field: String,
        #[source]
        source: ParseError,
    },
    #[error("sort_by: unknown field `{0}`")]
    UnknownSortField(String),
}

/// Settings that are individually valid but cannot be combined.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("sort_by `{0}` requires read_in_memory = true")]
    SortRequiresInMemory(String),
}

/// Problems with the input byte source.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("input size {len} is not a multiple of frame size {frame_size}")]
    NotFrameAligned { len: u64, frame_size: usize },
    #[error("frame {frame_index}: read {read} of {expected} bytes")]
    Truncated {
        frame_index: usize,
        read: usize,
        expected: usize,
    },
    #[error("input: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a plugin-delegated calibration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PluginError {
    #[error("calibration function `{0}` not found in plugin")]
    MissingFunction(String),
    #[error("calibration function `{function}` failed: {reason}")]
    RuntimeFailure { function: String, reason: String },
}

/// Failure to calibrate one raw value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalibrationError {
    #[error("expression needs a numeric input, got a byte sequence")]
    TypeError,
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// Crate-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("frame {frame_index}, field `{field}` (input offset {offset}): {source}")]
    Calibration {
        field: String,
        frame_index: usize,
        offset: u64,
        #[source]
        source: CalibrationError,
    },
    #[error("output: {0}")]
    Output(#[source] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
