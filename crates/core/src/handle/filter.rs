//! Property filters.

use crate::expr::{Expr, Op};
use crate::handle::{handle_type, Handle, IntoExpr};

handle_type! {
    /// A lazy predicate over an element's property bag. Applied by
    /// collection and list filtering; the property name `"item"` refers to
    /// the element itself when the element is a bare scalar.
    Filter
}

impl Filter {
    fn binary(op: Op, name: &str, value: impl IntoExpr) -> Filter {
        Filter(Expr::call(op, vec![Expr::literal(name), value.into_expr()]))
    }

    pub fn eq(name: &str, value: impl IntoExpr) -> Filter {
        Filter::binary(Op::FilterEq, name, value)
    }

    pub fn gt(name: &str, value: impl IntoExpr) -> Filter {
        Filter::binary(Op::FilterGt, name, value)
    }

    pub fn lt(name: &str, value: impl IntoExpr) -> Filter {
        Filter::binary(Op::FilterLt, name, value)
    }

    pub fn lte(name: &str, value: impl IntoExpr) -> Filter {
        Filter::binary(Op::FilterLte, name, value)
    }

    pub fn gte(name: &str, value: impl IntoExpr) -> Filter {
        Filter::binary(Op::FilterGte, name, value)
    }

    /// Matches when the list-valued property contains `value`.
    pub fn list_contains(name: &str, value: impl IntoExpr) -> Filter {
        Filter::binary(Op::FilterListContains, name, value)
    }

    /// Matches when the string-valued property starts with `prefix`.
    pub fn string_starts_with(name: &str, prefix: impl IntoExpr) -> Filter {
        Filter::binary(Op::FilterStringStartsWith, name, prefix)
    }

    pub fn and(filters: Vec<Filter>) -> Filter {
        Filter(Expr::call(
            Op::FilterAnd,
            filters.into_iter().map(Handle::into_expr).collect(),
        ))
    }

    pub fn or(filters: Vec<Filter>) -> Filter {
        Filter(Expr::call(
            Op::FilterOr,
            filters.into_iter().map(Handle::into_expr).collect(),
        ))
    }
}
