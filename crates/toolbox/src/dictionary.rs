//! Dictionary builders.

use eetools_core::{Dictionary, Expr, Handle, List, Op};

/// Construction helpers missing from the primitive dictionary surface.
pub trait DictionaryExt: Sized {
    /// Build a dictionary from a list of `[key, value]` pairs. Later pairs
    /// win on duplicate keys.
    fn from_pairs(pairs: &List) -> Self;
}

impl DictionaryExt for Dictionary {
    fn from_pairs(pairs: &List) -> Dictionary {
        Dictionary::from_expr(Expr::call(Op::DictFromPairs, vec![pairs.expr().clone()]))
    }
}
