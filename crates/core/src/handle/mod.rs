//! Typed handles over expression nodes.
//!
//! Each handle is a newtype over [`Expr`] exposing the remote primitives
//! for one remote class as chainable methods. Handles replace the
//! accessor-attachment pattern of dynamic clients: operations live on
//! wrapper types, not on re-opened foreign classes.

mod collection;
mod feature;
mod filter;
mod image;
mod list;
mod scalar;

pub use collection::ImageCollection;
pub use feature::{Feature, FeatureCollection, Geometry};
pub use filter::Filter;
pub use image::{Image, ReduceRegionOpts};
pub use list::{Array, Dictionary, List};
pub use scalar::{Number, Str};

use std::sync::atomic::{AtomicU64, Ordering};

use crate::expr::Expr;
use crate::value::Value;

/// A typed view of an expression node.
pub trait Handle: Sized {
    fn from_expr(expr: Expr) -> Self;
    fn expr(&self) -> &Expr;
    fn into_expr(self) -> Expr;
}

/// Anything that can become an expression argument: handles pass through,
/// plain Rust values become literals.
pub trait IntoExpr {
    fn into_expr(self) -> Expr;
}

impl IntoExpr for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

impl IntoExpr for &Expr {
    fn into_expr(self) -> Expr {
        self.clone()
    }
}

impl IntoExpr for f64 {
    fn into_expr(self) -> Expr {
        Expr::literal(self)
    }
}

impl IntoExpr for i64 {
    fn into_expr(self) -> Expr {
        Expr::literal(self)
    }
}

impl IntoExpr for bool {
    fn into_expr(self) -> Expr {
        Expr::literal(self)
    }
}

impl IntoExpr for &str {
    fn into_expr(self) -> Expr {
        Expr::literal(self)
    }
}

impl IntoExpr for String {
    fn into_expr(self) -> Expr {
        Expr::literal(self)
    }
}

impl IntoExpr for Value {
    fn into_expr(self) -> Expr {
        Expr::literal(self)
    }
}

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(pub(crate) crate::expr::Expr);

        impl crate::handle::Handle for $name {
            fn from_expr(expr: crate::expr::Expr) -> Self {
                $name(expr)
            }

            fn expr(&self) -> &crate::expr::Expr {
                &self.0
            }

            fn into_expr(self) -> crate::expr::Expr {
                self.0
            }
        }

        impl crate::handle::IntoExpr for $name {
            fn into_expr(self) -> crate::expr::Expr {
                self.0
            }
        }

        impl crate::handle::IntoExpr for &$name {
            fn into_expr(self) -> crate::expr::Expr {
                self.0.clone()
            }
        }
    };
}
pub(crate) use handle_type;

// Parameter names only need to be unique within a process; the graph is
// rebuilt per call.
static NEXT_PARAM: AtomicU64 = AtomicU64::new(0);

pub(crate) fn fresh_param() -> String {
    format!("_p{}", NEXT_PARAM.fetch_add(1, Ordering::Relaxed))
}

/// Build a one-argument server-side function from a Rust closure.
pub(crate) fn lambda1<A, R>(f: impl FnOnce(A) -> R) -> Expr
where
    A: Handle,
    R: Handle,
{
    let p = fresh_param();
    let body = f(A::from_expr(Expr::var(&p))).into_expr();
    Expr::function(vec![p], body)
}

/// Build a two-argument server-side function (element, accumulator).
pub(crate) fn lambda2<A, B, R>(f: impl FnOnce(A, B) -> R) -> Expr
where
    A: Handle,
    B: Handle,
    R: Handle,
{
    let p0 = fresh_param();
    let p1 = fresh_param();
    let body = f(A::from_expr(Expr::var(&p0)), B::from_expr(Expr::var(&p1))).into_expr();
    Expr::function(vec![p0, p1], body)
}
