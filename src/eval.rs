//! Evaluation of calibration expressions.
//!
//! Evaluation is a total recursion over [`Expr`]: the only failures are the enumerated
//! runtime errors in [`EvalError`]. NaN inputs propagate without error; a finite computation
//! that produces NaN or infinity is reported.

use crate::expr::{BinaryOp, Expr, Expression, Function, UnaryOp};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("math domain error: {function}({argument})")]
    Domain {
        function: &'static str,
        argument: f64,
    },
    #[error("numeric overflow in `{operation}`")]
    Overflow { operation: &'static str },
}

impl Expression {
    /// Evaluate with the given input value bound to `raw`.
    pub fn evaluate(&self, raw: f64) -> Result<f64, EvalError> {
        self.root().evaluate(raw)
    }
}

impl Expr {
    pub fn evaluate(&self, raw: f64) -> Result<f64, EvalError> {
        match self {
            Expr::Literal(v) => Ok(*v),
            Expr::Raw => Ok(raw),
            Expr::Unary { op, operand } => {
                let v = operand.evaluate(raw)?;
                Ok(match op {
                    UnaryOp::Neg => -v,
                    UnaryOp::Pos => v,
                })
            }
            Expr::Binary { op, lhs, rhs } => {
                let a = lhs.evaluate(raw)?;
                match op {
                    BinaryOp::And if !truthy(a) => return Ok(a),
                    BinaryOp::Or if truthy(a) => return Ok(a),
                    _ => {}
                }
                let b = rhs.evaluate(raw)?;
                binary(*op, a, b)
            }
            Expr::Ternary {
                condition,
                then,
                otherwise,
            } => {
                if truthy(condition.evaluate(raw)?) {
                    then.evaluate(raw)
                } else {
                    otherwise.evaluate(raw)
                }
            }
            Expr::Call { function, args } => {
                let mut values = [0.0f64; 2];
                for (slot, arg) in values.iter_mut().zip(args) {
                    *slot = arg.evaluate(raw)?;
                }
                call(*function, &values[..args.len().min(2)])
            }
        }
    }
}

fn truthy(v: f64) -> bool {
    v != 0.0
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Reject NaN/infinite results of computations whose inputs were finite.
fn checked(operation: &'static str, inputs: &[f64], result: f64) -> Result<f64, EvalError> {
    if result.is_finite() || inputs.iter().any(|v| !v.is_finite()) {
        return Ok(result);
    }
    if result.is_nan() {
        Err(EvalError::Domain {
            function: operation,
            argument: inputs.first().copied().unwrap_or(f64::NAN),
        })
    } else {
        Err(EvalError::Overflow { operation })
    }
}

fn binary(op: BinaryOp, a: f64, b: f64) -> Result<f64, EvalError> {
    match op {
        BinaryOp::Add => checked("+", &[a, b], a + b),
        BinaryOp::Sub => checked("-", &[a, b], a - b),
        BinaryOp::Mul => checked("*", &[a, b], a * b),
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            checked("/", &[a, b], a / b)
        }
        BinaryOp::FloorDiv => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            checked("//", &[a, b], (a / b).floor())
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(floored_mod(a, b))
        }
        BinaryOp::Pow => power(a, b),
        BinaryOp::Lt => Ok(flag(a < b)),
        BinaryOp::Le => Ok(flag(a <= b)),
        BinaryOp::Gt => Ok(flag(a > b)),
        BinaryOp::Ge => Ok(flag(a >= b)),
        BinaryOp::Eq => Ok(flag(a == b)),
        BinaryOp::Ne => Ok(flag(a != b)),
        // Short-circuit cases returned earlier; the right operand decides.
        BinaryOp::And | BinaryOp::Or => Ok(b),
    }
}

/// Remainder with the sign of the divisor.
fn floored_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

fn power(base: f64, exponent: f64) -> Result<f64, EvalError> {
    if base == 0.0 && exponent < 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    checked("pow", &[base, exponent], base.powf(exponent))
}

fn domain(function: Function, argument: f64) -> EvalError {
    EvalError::Domain {
        function: function.name(),
        argument,
    }
}

fn call(function: Function, args: &[f64]) -> Result<f64, EvalError> {
    let x = args.first().copied().unwrap_or(f64::NAN);
    let second = args.get(1).copied();
    let name = function.name();
    match function {
        Function::Sin => checked(name, args, x.sin()),
        Function::Cos => checked(name, args, x.cos()),
        Function::Tan => checked(name, args, x.tan()),
        Function::Asin | Function::Acos if x.abs() > 1.0 => Err(domain(function, x)),
        Function::Asin => Ok(x.asin()),
        Function::Acos => Ok(x.acos()),
        Function::Atan => Ok(x.atan()),
        Function::Sqrt if x < 0.0 => Err(domain(function, x)),
        Function::Sqrt => Ok(x.sqrt()),
        Function::Log | Function::Log10 if x <= 0.0 => Err(domain(function, x)),
        Function::Log => Ok(x.ln()),
        Function::Log10 => Ok(x.log10()),
        Function::Exp => checked(name, args, x.exp()),
        Function::Fabs | Function::Abs => Ok(x.abs()),
        Function::Floor => Ok(x.floor()),
        Function::Ceil => Ok(x.ceil()),
        Function::Round => {
            let digits = match second {
                None => 0,
                Some(n) if n.fract() == 0.0 && n.abs() <= i32::MAX as f64 => n as i32,
                Some(n) => return Err(domain(function, n)),
            };
            Ok(round_half_even(x, digits))
        }
        Function::Min => Ok(second.map_or(x, |y| x.min(y))),
        Function::Max => Ok(second.map_or(x, |y| x.max(y))),
        Function::Pow => power(x, second.unwrap_or(1.0)),
    }
}

/// Round to `digits` decimal places, ties to even. Negative `digits` rounds to tens, hundreds, ...
///
/// The tie rule applies to the decimal-scaled binary value, so `0.125` (exact in binary)
/// rounds to `0.12` while `2.675` (stored just below) rounds to `2.67`.
pub fn round_half_even(value: f64, digits: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(digits.saturating_abs());
    if !factor.is_finite() {
        return if digits > 0 { value } else { 0.0 };
    }
    if digits >= 0 {
        let scaled = value * factor;
        if !scaled.is_finite() {
            return value;
        }
        scaled.round_ties_even() / factor
    } else {
        (value / factor).round_ties_even() * factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_ties_to_even() {
        assert_eq!(round_half_even(0.125, 2), 0.12);
        assert_eq!(round_half_even(0.375, 2), 0.38);
        assert_eq!(round_half_even(2.5, 0), 2.0);
        assert_eq!(round_half_even(3.5, 0), 4.0);
        assert_eq!(round_half_even(-2.5, 0), -2.0);
    }

    #[test]
    fn rounds_to_requested_digits() {
        assert_eq!(round_half_even(1.23456, 2), 1.23);
        assert_eq!(round_half_even(1234.0, -2), 1200.0);
    }

    #[test]
    fn huge_digit_count_is_identity() {
        assert_eq!(round_half_even(1.5e300, 400), 1.5e300);
    }

    #[test]
    fn floored_mod_follows_divisor_sign() {
        assert_eq!(floored_mod(-7.0, 3.0), 2.0);
        assert_eq!(floored_mod(7.0, -3.0), -2.0);
        assert_eq!(floored_mod(7.0, 3.0), 1.0);
    }
}
