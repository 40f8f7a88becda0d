//! Grid constructor behavior against the in-memory engine.

use eetools_core::engine::MemoryEngine;
use eetools_core::prelude::*;
use eetools_core::Expr;
use eetools_toolbox::{ArrayExt, DictionaryExt};

fn grid_of(value: f64, width: usize, height: usize) -> Value {
    let row = Value::List(vec![Value::Float(value); width]);
    Value::List(vec![row; height])
}

#[test]
fn full_builds_constant_grids() {
    let engine = MemoryEngine::new();
    for (w, h) in [(1i64, 1i64), (3, 1), (1, 3), (3, 3)] {
        for v in [0.0, 1.0, -2.5] {
            let arr = Array::full(w, h, v);
            assert_eq!(
                engine.evaluate(arr.expr()).unwrap(),
                grid_of(v, w as usize, h as usize),
                "{w}x{h} grid of {v}"
            );
        }
    }
}

#[test]
fn full_truncates_float_dimensions() {
    let engine = MemoryEngine::new();
    let arr = Array::full(2.9, 1.7, 0.5);
    assert_eq!(engine.evaluate(arr.expr()).unwrap(), grid_of(0.5, 2, 1));
}

#[test]
fn set_cell_replaces_a_single_cell() {
    let engine = MemoryEngine::new();
    let arr = Array::full(3i64, 3i64, 0.0).set_cell(1, 1, 9.0);
    let Value::List(rows) = engine.evaluate(arr.expr()).unwrap() else {
        panic!("expected a grid")
    };
    for (y, row) in rows.iter().enumerate() {
        let Value::List(cells) = row else {
            panic!("expected a row")
        };
        for (x, cell) in cells.iter().enumerate() {
            let want = if (x, y) == (1, 1) { 9.0 } else { 0.0 };
            assert_eq!(*cell, Value::Float(want), "cell ({x}, {y})");
        }
    }
}

#[test]
fn dictionary_from_pairs() {
    let engine = MemoryEngine::new();
    let pairs = List::of(vec![
        Expr::literal(Value::List(vec!["a".into(), Value::Int(1)])),
        Expr::literal(Value::List(vec!["b".into(), Value::Int(2)])),
        Expr::literal(Value::List(vec!["a".into(), Value::Int(3)])),
    ]);
    let dict = Dictionary::from_pairs(&pairs);
    let Value::Dict(d) = engine.evaluate(dict.expr()).unwrap() else {
        panic!("expected a dictionary")
    };
    // later pairs win
    assert_eq!(d["a"], Value::Int(3));
    assert_eq!(d["b"], Value::Int(2));
}
