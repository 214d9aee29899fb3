//! Decoded and calibrated field values.

use std::cmp::Ordering;
use std::fmt;

/// A single field value: raw (as decoded) or calibrated.
///
/// Calibrated values are always [`Value::F64`]; uncalibrated fields keep their storage type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Bytes(Vec<u8>),
}

impl Value {
    /// Numeric value as `f64`. 64-bit integers above 2^53 lose precision.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::U8(x) => Some(*x as f64),
            Value::I8(x) => Some(*x as f64),
            Value::U16(x) => Some(*x as f64),
            Value::I16(x) => Some(*x as f64),
            Value::U32(x) => Some(*x as f64),
            Value::I32(x) => Some(*x as f64),
            Value::U64(x) => Some(*x as f64),
            Value::I64(x) => Some(*x as f64),
            Value::F32(x) => Some(*x as f64),
            Value::F64(x) => Some(*x),
            Value::Bytes(_) => None,
        }
    }

    /// Exact integer value, if this is an integer variant.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::U8(x) => Some(*x as i128),
            Value::I8(x) => Some(*x as i128),
            Value::U16(x) => Some(*x as i128),
            Value::I16(x) => Some(*x as i128),
            Value::U32(x) => Some(*x as i128),
            Value::I32(x) => Some(*x as i128),
            Value::U64(x) => Some(*x as i128),
            Value::I64(x) => Some(*x as i128),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Total order used for sorting records: integers exactly, other numbers by IEEE total
    /// order, byte sequences lexicographically and after all numbers.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        if let (Some(a), Some(b)) = (self.as_i128(), other.as_i128()) {
            return a.cmp(&b);
        }
        match (self, other) {
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Bytes(_), _) => Ordering::Greater,
            (_, Value::Bytes(_)) => Ordering::Less,
            _ => {
                let a = self.as_f64().unwrap_or(f64::NAN);
                let b = other.as_f64().unwrap_or(f64::NAN);
                a.total_cmp(&b)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::U8(x) => write!(f, "{}", x),
            Value::I8(x) => write!(f, "{}", x),
            Value::U16(x) => write!(f, "{}", x),
            Value::I16(x) => write!(f, "{}", x),
            Value::U32(x) => write!(f, "{}", x),
            Value::I32(x) => write!(f, "{}", x),
            Value::U64(x) => write!(f, "{}", x),
            Value::I64(x) => write!(f, "{}", x),
            Value::F32(x) => write_float(f, f64::from(*x), x),
            Value::F64(x) => write_float(f, *x, x),
            Value::Bytes(b) => {
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

/// Shortest round-trip text: plain notation for everyday magnitudes, exponent notation for
/// very large or very small ones.
fn write_float<T>(f: &mut fmt::Formatter<'_>, magnitude: f64, x: &T) -> fmt::Result
where
    T: fmt::Display + fmt::LowerExp,
{
    let abs = magnitude.abs();
    if magnitude.is_finite() && abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        write!(f, "{:e}", x)
    } else {
        write!(f, "{}", x)
    }
}
