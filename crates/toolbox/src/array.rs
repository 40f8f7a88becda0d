//! Array grid constructors.

use eetools_core::{Array, Handle, IntoExpr, List};

/// Grid helpers missing from the primitive array surface.
pub trait ArrayExt: Sized {
    /// A `height` x `width` grid filled with `value`, built as nested list
    /// repetition. Float dimensions truncate toward zero.
    fn full(width: impl IntoExpr, height: impl IntoExpr, value: impl IntoExpr) -> Self;

    /// Copy with the cell at column `x` of row `y` replaced. Bounds are not
    /// checked client-side; an invalid index is a deferred engine error.
    fn set_cell(&self, x: i64, y: i64, value: impl IntoExpr) -> Self;
}

impl ArrayExt for Array {
    fn full(width: impl IntoExpr, height: impl IntoExpr, value: impl IntoExpr) -> Array {
        Array::from_list(&List::repeat(List::repeat(value, width), height))
    }

    fn set_cell(&self, x: i64, y: i64, value: impl IntoExpr) -> Array {
        let rows = self.to_list();
        let row = List::from_expr(rows.get(y));
        Array::from_list(&rows.set(y, row.set(x, value)))
    }
}
