//! Number and string handles.
//!
//! Epoch-millisecond timestamps travel as plain numbers, so the date
//! primitives live on [`Number`] rather than on a separate date handle.

use crate::expr::{Expr, Op};
use crate::handle::{handle_type, IntoExpr};

handle_type! {
    /// A lazy scalar number.
    Number
}

impl Number {
    pub fn add(&self, other: impl IntoExpr) -> Number {
        Number(Expr::call(Op::Add, vec![self.0.clone(), other.into_expr()]))
    }

    pub fn subtract(&self, other: impl IntoExpr) -> Number {
        Number(Expr::call(Op::Subtract, vec![self.0.clone(), other.into_expr()]))
    }

    pub fn multiply(&self, other: impl IntoExpr) -> Number {
        Number(Expr::call(Op::Multiply, vec![self.0.clone(), other.into_expr()]))
    }

    pub fn divide(&self, other: impl IntoExpr) -> Number {
        Number(Expr::call(Op::Divide, vec![self.0.clone(), other.into_expr()]))
    }

    /// Truncate toward zero.
    pub fn to_int(&self) -> Number {
        Number(Expr::call(Op::NumberToInt, vec![self.0.clone()]))
    }

    /// Render as a string; `"%s"` keeps the natural rendering, `"%d"`
    /// renders the truncated integer.
    pub fn format(&self, pattern: &str) -> Str {
        Str(Expr::call(Op::NumberFormat, vec![self.0.clone(), Expr::literal(pattern)]))
    }

    /// Format an epoch-millisecond timestamp with a chrono pattern (UTC).
    pub fn format_date(&self, pattern: &str) -> Str {
        Str(Expr::call(Op::DateFormat, vec![self.0.clone(), Expr::literal(pattern)]))
    }

    /// Calendar field of an epoch-millisecond timestamp, e.g. `"year"`.
    pub fn date_get(&self, field: &str) -> Number {
        Number(Expr::call(Op::DateGet, vec![self.0.clone(), Expr::literal(field)]))
    }

    /// Position of `unit` within `in_unit`, 0-based; `("day", "year")` is
    /// the day-of-year of an epoch-millisecond timestamp.
    pub fn date_relative(&self, unit: &str, in_unit: &str) -> Number {
        Number(Expr::call(
            Op::DateGetRelative,
            vec![self.0.clone(), Expr::literal(unit), Expr::literal(in_unit)],
        ))
    }
}

impl From<f64> for Number {
    fn from(n: f64) -> Self {
        Number(Expr::literal(n))
    }
}

impl From<i64> for Number {
    fn from(n: i64) -> Self {
        Number(Expr::literal(n))
    }
}

handle_type! {
    /// A lazy string.
    Str
}

impl Str {
    pub fn cat(&self, other: impl IntoExpr) -> Str {
        Str(Expr::call(Op::StringCat, vec![self.0.clone(), other.into_expr()]))
    }

    /// Replace the first occurrence of `pattern`.
    pub fn replace(&self, pattern: impl IntoExpr, replacement: &str) -> Str {
        Str(Expr::call(
            Op::StringReplace,
            vec![self.0.clone(), pattern.into_expr(), Expr::literal(replacement)],
        ))
    }

    /// Suffix starting at `start`.
    pub fn slice(&self, start: i64) -> Str {
        Str(Expr::call(Op::StringSlice, vec![self.0.clone(), Expr::literal(start)]))
    }
}

impl From<&str> for Str {
    fn from(s: &str) -> Self {
        Str(Expr::literal(s))
    }
}

impl From<String> for Str {
    fn from(s: String) -> Self {
        Str(Expr::literal(s))
    }
}
