//! List, dictionary and array handles.

use crate::expr::{Expr, Op};
use crate::handle::{handle_type, lambda1, Filter, Handle, IntoExpr};
use crate::value::Value;

handle_type! {
    /// A lazy ordered list. Elements may be scalars, images or whole
    /// collections; homogeneity is by convention only.
    List
}

impl List {
    /// Build a list from computed elements.
    pub fn of(items: Vec<Expr>) -> List {
        List(Expr::call(Op::ListCreate, items))
    }

    /// A client-known list of strings.
    pub fn strings(items: &[&str]) -> List {
        List(Expr::literal(Value::List(
            items.iter().map(|s| Value::from(*s)).collect(),
        )))
    }

    /// `count` copies of `value`.
    pub fn repeat(value: impl IntoExpr, count: impl IntoExpr) -> List {
        List(Expr::call(Op::ListRepeat, vec![value.into_expr(), count.into_expr()]))
    }

    /// Integers from `start` to `end`, inclusive on both ends.
    pub fn sequence(start: impl IntoExpr, end: impl IntoExpr) -> List {
        List(Expr::call(Op::ListSequence, vec![start.into_expr(), end.into_expr()]))
    }

    /// Element at `index`; negative indices count from the end. The result
    /// is untyped, callers rewrap it into the handle they expect.
    pub fn get(&self, index: i64) -> Expr {
        Expr::call(Op::ListGet, vec![self.0.clone(), Expr::literal(index)])
    }

    /// Copy with the element at `index` replaced.
    pub fn set(&self, index: impl IntoExpr, value: impl IntoExpr) -> List {
        List(Expr::call(
            Op::ListSet,
            vec![self.0.clone(), index.into_expr(), value.into_expr()],
        ))
    }

    /// Apply a server-side function to every element.
    pub fn map<A: Handle, R: Handle>(&self, f: impl FnOnce(A) -> R) -> List {
        List(Expr::call(Op::ListMap, vec![self.0.clone(), lambda1(f)]))
    }

    /// Keep elements whose property bag matches `filter`.
    pub fn filter(&self, filter: &Filter) -> List {
        List(Expr::call(Op::ListFilter, vec![self.0.clone(), filter.expr().clone()]))
    }

    /// Unique elements, first occurrence order preserved.
    pub fn distinct(&self) -> List {
        List(Expr::call(Op::ListDistinct, vec![self.0.clone()]))
    }

    pub fn sort(&self) -> List {
        List(Expr::call(Op::ListSort, vec![self.0.clone()]))
    }

    /// Recursively splice nested lists into one flat list.
    pub fn flatten(&self) -> List {
        List(Expr::call(Op::ListFlatten, vec![self.0.clone()]))
    }
}

handle_type! {
    /// A lazy string-keyed dictionary. Keys are kept in lexicographic
    /// order; `keys()` and `values()` enumerate in the same order.
    Dictionary
}

impl Dictionary {
    pub fn from_lists(keys: &List, values: &List) -> Dictionary {
        Dictionary(Expr::call(
            Op::DictFromLists,
            vec![keys.expr().clone(), values.expr().clone()],
        ))
    }

    pub fn keys(&self) -> List {
        List(Expr::call(Op::DictKeys, vec![self.0.clone()]))
    }

    pub fn values(&self) -> List {
        List(Expr::call(Op::DictValues, vec![self.0.clone()]))
    }

    /// Sub-dictionary restricted to `keys`.
    pub fn select(&self, keys: &List) -> Dictionary {
        Dictionary(Expr::call(Op::DictSelect, vec![self.0.clone(), keys.expr().clone()]))
    }
}

handle_type! {
    /// A lazy rectangular array, represented remotely as nested lists.
    Array
}

impl Array {
    pub fn from_list(rows: &List) -> Array {
        Array(Expr::call(Op::ArrayFromList, vec![rows.expr().clone()]))
    }

    pub fn to_list(&self) -> List {
        List(Expr::call(Op::ArrayToList, vec![self.0.clone()]))
    }
}
