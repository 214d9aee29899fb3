//! Apply a field's calibration to its raw value.

use crate::error::{CalibrationError, PluginError};
use crate::eval::round_half_even;
use crate::plugin::CalibrationPlugin;
use crate::schema::{Calibration, CalibrationMethod};
use crate::value::Value;

/// Calibrate `raw`: evaluate the expression or call the plugin function, then round
/// (ties to even) when the calibration sets `round`.
pub fn apply<P: CalibrationPlugin + ?Sized>(
    raw: &Value,
    calibration: &Calibration,
    plugin: &P,
) -> Result<Value, CalibrationError> {
    let input = raw.as_f64().ok_or(CalibrationError::TypeError)?;
    let result = match &calibration.method {
        CalibrationMethod::Expr(expr) => expr.evaluate(input)?,
        CalibrationMethod::Func(name) => {
            let f = plugin
                .lookup(name)
                .ok_or_else(|| PluginError::MissingFunction(name.clone()))?;
            f(input).map_err(|reason| PluginError::RuntimeFailure {
                function: name.clone(),
                reason,
            })?
        }
    };
    let result = match calibration.round {
        Some(digits) => round_half_even(result, digits.min(i32::MAX as u32) as i32),
        None => result,
    };
    Ok(Value::F64(result))
}

/// Calibrate when the field has a calibration; otherwise pass the raw value through.
pub fn apply_optional<P: CalibrationPlugin + ?Sized>(
    raw: Value,
    calibration: Option<&Calibration>,
    plugin: &P,
) -> Result<Value, CalibrationError> {
    match calibration {
        Some(c) => apply(&raw, c, plugin),
        None => Ok(raw),
    }
}
