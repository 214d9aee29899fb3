//! Calibration plugins: named functions `f64 -> f64` looked up by the `func` calibration key.
//!
//! The core depends only on [`CalibrationPlugin`]. [`FunctionTable`] is the provided
//! implementation; it holds native Rust closures (including the built-ins) and functions
//! defined as safe expressions in a plugin file:
//!
//! ```text
//! // `raw` is the argument
//! kelvin_to_celsius = raw - 273.15;
//! half = raw / 2;
//! ```

use crate::error::SchemaError;
use crate::expr::Expression;
use crate::parser;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// A plugin calibration function. `Err` carries a human-readable failure reason.
pub type CalibrationFn = dyn Fn(f64) -> Result<f64, String> + Send + Sync;

/// Lookup capability for plugin functions.
pub trait CalibrationPlugin {
    fn lookup(&self, name: &str) -> Option<&CalibrationFn>;
}

/// Plugin with no functions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPlugin;

impl CalibrationPlugin for NoPlugin {
    fn lookup(&self, _name: &str) -> Option<&CalibrationFn> {
        None
    }
}

/// Seconds between the Unix epoch and the on-board time epoch (1980-01-06T00:00:00Z).
pub const OBT_EPOCH_UNIX_SECONDS: f64 = 315_964_800.0;

/// Named calibration functions.
#[derive(Default)]
pub struct FunctionTable {
    functions: HashMap<String, Box<CalibrationFn>>,
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionTable").field("functions", &names).finish()
    }
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table preloaded with the built-in functions:
    ///
    /// - `obt_seconds_to_unix`: on-board time (seconds since 1980-01-06) to Unix seconds.
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        table.register("obt_seconds_to_unix", |raw| Ok(raw + OBT_EPOCH_UNIX_SECONDS));
        table
    }

    /// Register (or replace) a native function.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(f64) -> Result<f64, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Box::new(f));
    }

    /// Register a function defined by an expression over `raw`.
    pub fn register_expression(&mut self, name: impl Into<String>, expression: Expression) {
        self.register(name, move |raw| {
            expression.evaluate(raw).map_err(|e| e.to_string())
        });
    }

    /// Add every definition from plugin source text. Later definitions replace earlier ones.
    pub fn load_source(&mut self, source: &str) -> Result<usize, SchemaError> {
        let defs = parser::parse_plugin(source)?;
        let count = defs.len();
        for (name, text) in defs {
            let expression =
                Expression::parse(&text).map_err(|source| SchemaError::Expression {
                    field: name.clone(),
                    source,
                })?;
            tracing::debug!(function = %name, expr = %text, "registered plugin function");
            self.register_expression(name, expression);
        }
        Ok(count)
    }

    /// Read a plugin file and add its definitions.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize, SchemaError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| SchemaError::Read {
            path: path.display().to_string(),
            source,
        })?;
        self.load_source(&source)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl CalibrationPlugin for FunctionTable {
    fn lookup(&self, name: &str) -> Option<&CalibrationFn> {
        self.functions.get(name).map(|f| f.as_ref())
    }
}
