//! Calibration expressions: a closed arithmetic language over the single input `raw`.
//!
//! Text is parsed with a PEST grammar (`expr.pest`) into [`Expr`], a tagged AST that can only
//! name `raw`, numeric literals, operators and the whitelisted [`Function`]s. Nothing in the
//! tree can reach I/O or mutable state, so evaluation (see `eval`) is a pure function of the
//! tree and the input value.
//!
//! ```
//! use satframe::Expression;
//!
//! let e = Expression::parse("raw * 2 + 1").unwrap();
//! assert_eq!(e.evaluate(10.0).unwrap(), 21.0);
//! ```

use pest::error::InputLocation;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;
use std::fmt;
use std::ops::RangeInclusive;

#[derive(PestParser)]
#[grammar = "expr.pest"]
struct ExprParser;

/// Reasons an expression text is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid token `{found}` at position {position}")]
    InvalidToken { position: usize, found: String },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unknown identifier `{0}` (allowed: `raw` and the math functions)")]
    UnknownIdentifier(String),
    #[error("`{function}` takes {expected} argument(s), found {found}")]
    WrongArity {
        function: &'static str,
        expected: &'static str,
        found: usize,
    },
    #[error("invalid numeric literal `{0}`")]
    InvalidNumber(String),
    #[error("expression nests deeper than {limit} levels")]
    TooDeep { limit: usize },
}

/// Nesting bound for parsed expressions: parentheses, calls, `**` and `else` chains for the
/// grammar, and operator chains and sign runs for the tree. Keeps parsing, evaluation and
/// drop within a small, fixed amount of stack.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    fn from_token(token: &str) -> Option<BinaryOp> {
        Some(match token {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "//" => BinaryOp::FloorDiv,
            "%" => BinaryOp::Mod,
            "**" => BinaryOp::Pow,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "and" => BinaryOp::And,
            "or" => BinaryOp::Or,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

/// The whitelisted math functions. This set is closed: a name not listed here never parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sqrt,
    Log,
    Log10,
    Exp,
    Fabs,
    Floor,
    Ceil,
    Round,
    Min,
    Max,
    Pow,
    Abs,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Function> {
        Some(match name {
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            "asin" => Function::Asin,
            "acos" => Function::Acos,
            "atan" => Function::Atan,
            "sqrt" => Function::Sqrt,
            "log" => Function::Log,
            "log10" => Function::Log10,
            "exp" => Function::Exp,
            "fabs" => Function::Fabs,
            "floor" => Function::Floor,
            "ceil" => Function::Ceil,
            "round" => Function::Round,
            "min" => Function::Min,
            "max" => Function::Max,
            "pow" => Function::Pow,
            "abs" => Function::Abs,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Asin => "asin",
            Function::Acos => "acos",
            Function::Atan => "atan",
            Function::Sqrt => "sqrt",
            Function::Log => "log",
            Function::Log10 => "log10",
            Function::Exp => "exp",
            Function::Fabs => "fabs",
            Function::Floor => "floor",
            Function::Ceil => "ceil",
            Function::Round => "round",
            Function::Min => "min",
            Function::Max => "max",
            Function::Pow => "pow",
            Function::Abs => "abs",
        }
    }

    /// Accepted argument counts.
    pub fn arity(self) -> RangeInclusive<usize> {
        match self {
            Function::Round | Function::Min | Function::Max | Function::Pow => 1..=2,
            _ => 1..=1,
        }
    }

    fn arity_text(self) -> &'static str {
        if *self.arity().end() == 2 {
            "1 or 2"
        } else {
            "1"
        }
    }
}

/// Expression tree. Every variant is data; there is no way to express a side effect.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(f64),
    Raw,
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Raw => f.write_str("raw"),
            Expr::Unary { op, operand } => {
                let sign = if *op == UnaryOp::Neg { "-" } else { "+" };
                write!(f, "({}{})", sign, operand)
            }
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expr::Ternary {
                condition,
                then,
                otherwise,
            } => write!(f, "({} if {} else {})", then, condition, otherwise),
            Expr::Call { function, args } => {
                write!(f, "{}(", function.name())?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// A parsed calibration expression together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    pub fn parse(text: &str) -> Result<Expression, ParseError> {
        let root = parse(text)?;
        Ok(Expression {
            source: text.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }
}

/// Parse expression text into an [`Expr`].
pub fn parse(text: &str) -> Result<Expr, ParseError> {
    if grammar_nesting(text) > MAX_DEPTH {
        return Err(ParseError::TooDeep { limit: MAX_DEPTH });
    }
    let mut pairs =
        ExprParser::parse(Rule::expression, text).map_err(|e| syntax_error(text, e))?;
    let expression = pairs.next().ok_or(ParseError::UnexpectedEnd)?;
    let ternary = expression
        .into_inner()
        .find(|p| p.as_rule() == Rule::ternary)
        .ok_or(ParseError::UnexpectedEnd)?;
    build_ternary(ternary, 0)
}

/// Upper bound on the grammar recursion a text can cause. Runs before the pest parser, which
/// recurses once per parenthesis, right-nested `**` and `else` branch.
fn grammar_nesting(text: &str) -> usize {
    let mut depth = 0usize;
    let mut max = 0usize;
    for b in text.bytes() {
        match b {
            b'(' => {
                depth += 1;
                max = max.max(depth);
            }
            b')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    let powers = text.matches("**").count();
    let elses = text
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| *w == "else")
        .count();
    max.saturating_add(powers).saturating_add(elses)
}

/// Fails when a node at `depth` would exceed [`MAX_DEPTH`].
fn check_depth(depth: usize) -> Result<(), ParseError> {
    if depth > MAX_DEPTH {
        return Err(ParseError::TooDeep { limit: MAX_DEPTH });
    }
    Ok(())
}

fn syntax_error(text: &str, err: pest::error::Error<Rule>) -> ParseError {
    let position = match err.location {
        InputLocation::Pos(p) => p,
        InputLocation::Span((start, _)) => start,
    };
    let rest = text.get(position..).unwrap_or("");
    let rest = rest.trim_start();
    let position = text.len() - rest.len();
    let mut chars = rest.chars();
    match chars.next() {
        None => ParseError::UnexpectedEnd,
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => {
            let word: String = rest
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();
            ParseError::InvalidToken {
                position,
                found: word,
            }
        }
        Some(c) => ParseError::InvalidToken {
            position,
            found: c.to_string(),
        },
    }
}

fn build_ternary(pair: Pair<Rule>, depth: usize) -> Result<Expr, ParseError> {
    let mut parts = pair
        .into_inner()
        .filter(|p| !matches!(p.as_rule(), Rule::kw_if | Rule::kw_else));
    let first = parts.next().ok_or(ParseError::UnexpectedEnd)?;
    match (parts.next(), parts.next()) {
        (Some(condition), Some(otherwise)) => {
            check_depth(depth)?;
            Ok(Expr::Ternary {
                condition: Box::new(build_binary_chain(condition, depth + 1)?),
                then: Box::new(build_binary_chain(first, depth + 1)?),
                otherwise: Box::new(build_ternary(otherwise, depth + 1)?),
            })
        }
        _ => build_binary_chain(first, depth),
    }
}

/// Builds any left-associative level (`disjunction`, `conjunction`, `comparison`, `sum`, `product`).
///
/// The chain folds to the left, so with `n` operands the first one ends up `n - 1` levels
/// below `depth`.
fn build_binary_chain(pair: Pair<Rule>, depth: usize) -> Result<Expr, ParseError> {
    let inner: Vec<_> = pair.into_inner().collect();
    let operands = (inner.len() + 1) / 2;
    if operands == 0 {
        return Err(ParseError::UnexpectedEnd);
    }
    check_depth(depth + operands - 1)?;
    let mut inner = inner.into_iter();
    let first = inner.next().ok_or(ParseError::UnexpectedEnd)?;
    let mut acc = build_operand(first, depth + operands - 1)?;
    let mut remaining = operands - 1;
    while let Some(op_pair) = inner.next() {
        let op = BinaryOp::from_token(op_pair.as_str()).ok_or_else(|| ParseError::InvalidToken {
            position: op_pair.as_span().start(),
            found: op_pair.as_str().to_string(),
        })?;
        let rhs = build_operand(inner.next().ok_or(ParseError::UnexpectedEnd)?, depth + remaining)?;
        remaining -= 1;
        acc = Expr::Binary {
            op,
            lhs: Box::new(acc),
            rhs: Box::new(rhs),
        };
    }
    Ok(acc)
}

fn build_operand(pair: Pair<Rule>, depth: usize) -> Result<Expr, ParseError> {
    match pair.as_rule() {
        Rule::conjunction | Rule::comparison | Rule::sum | Rule::product => {
            build_binary_chain(pair, depth)
        }
        Rule::unary => build_unary(pair, depth),
        _ => Err(ParseError::InvalidToken {
            position: pair.as_span().start(),
            found: pair.as_str().to_string(),
        }),
    }
}

fn build_unary(pair: Pair<Rule>, depth: usize) -> Result<Expr, ParseError> {
    let mut signs = Vec::new();
    let mut power = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::sign_op => signs.push(if inner.as_str() == "-" {
                UnaryOp::Neg
            } else {
                UnaryOp::Pos
            }),
            Rule::power => power = Some(inner),
            _ => {}
        }
    }
    check_depth(depth + signs.len())?;
    let power = power.ok_or(ParseError::UnexpectedEnd)?;
    let mut expr = build_power(power, depth + signs.len())?;
    // Innermost sign applies first.
    for op in signs.into_iter().rev() {
        expr = Expr::Unary {
            op,
            operand: Box::new(expr),
        };
    }
    Ok(expr)
}

fn build_power(pair: Pair<Rule>, depth: usize) -> Result<Expr, ParseError> {
    let mut inner = pair.into_inner();
    let base = inner.next().ok_or(ParseError::UnexpectedEnd)?;
    match (inner.next(), inner.next()) {
        (Some(_pow), Some(exponent)) => {
            check_depth(depth)?;
            Ok(Expr::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(build_primary(base, depth + 1)?),
                rhs: Box::new(build_unary(exponent, depth + 1)?),
            })
        }
        _ => build_primary(base, depth),
    }
}

fn build_primary(pair: Pair<Rule>, depth: usize) -> Result<Expr, ParseError> {
    check_depth(depth)?;
    let inner = pair.into_inner().next().ok_or(ParseError::UnexpectedEnd)?;
    match inner.as_rule() {
        Rule::number => parse_number(inner.as_str()).map(Expr::Literal),
        Rule::ident => match inner.as_str() {
            "raw" => Ok(Expr::Raw),
            other => Err(ParseError::UnknownIdentifier(other.to_string())),
        },
        Rule::call => build_call(inner, depth),
        Rule::ternary => build_ternary(inner, depth),
        _ => Err(ParseError::InvalidToken {
            position: inner.as_span().start(),
            found: inner.as_str().to_string(),
        }),
    }
}

fn build_call(pair: Pair<Rule>, depth: usize) -> Result<Expr, ParseError> {
    let mut inner = pair.into_inner();
    let name = inner.next().ok_or(ParseError::UnexpectedEnd)?.as_str();
    let function =
        Function::from_name(name).ok_or_else(|| ParseError::UnknownIdentifier(name.to_string()))?;
    let mut args = Vec::new();
    if let Some(arguments) = inner.next() {
        for arg in arguments.into_inner() {
            args.push(build_ternary(arg, depth + 1)?);
        }
    }
    if !function.arity().contains(&args.len()) {
        return Err(ParseError::WrongArity {
            function: function.name(),
            expected: function.arity_text(),
            found: args.len(),
        });
    }
    Ok(Expr::Call { function, args })
}

fn parse_number(text: &str) -> Result<f64, ParseError> {
    let invalid = || ParseError::InvalidNumber(text.to_string());
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16)
            .map(|v| v as f64)
            .map_err(|_| invalid());
    }
    text.parse::<f64>().map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_binds_tighter_than_unary_minus() {
        let e = parse("-2 ** 2").unwrap();
        assert!(matches!(e, Expr::Unary { op: UnaryOp::Neg, .. }));
    }

    #[test]
    fn power_is_right_associative() {
        let e = parse("2 ** 3 ** 2").unwrap();
        match e {
            Expr::Binary { op: BinaryOp::Pow, rhs, .. } => {
                assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Pow, .. }))
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn display_shows_grouping() {
        let e = parse("raw * 2 + 1").unwrap();
        assert_eq!(e.to_string(), "((raw * 2) + 1)");
    }

    #[test]
    fn hex_literal() {
        assert_eq!(parse("0xFF").unwrap(), Expr::Literal(255.0));
    }

    #[test]
    fn grammar_nesting_counts_parens_powers_and_else() {
        assert_eq!(grammar_nesting("raw"), 0);
        assert_eq!(grammar_nesting("((raw)) + (1)"), 2);
        assert_eq!(grammar_nesting("2 ** 3 ** raw"), 2);
        assert_eq!(grammar_nesting("0 if raw else 1 if raw else 2"), 2);
        // `elsewhere` is not the keyword.
        assert_eq!(grammar_nesting("elsewhere"), 0);
    }

    #[test]
    fn chain_at_the_limit_parses() {
        let text = format!("{}raw", "1 + ".repeat(MAX_DEPTH));
        assert!(parse(&text).is_ok());
        let text = format!("{}raw", "1 + ".repeat(MAX_DEPTH + 1));
        assert_eq!(parse(&text).unwrap_err(), ParseError::TooDeep { limit: MAX_DEPTH });
    }
}
