//! List and array conversion: elementwise procedures, list/array
//! interchange, multi-dimensional arrays, and rank checking.

use std::sync::Arc;

use morph_engine::{CompileError, MapError, Mapper, MapperConfig, RuntimeError};
use morph_model::{ArrayValue, MemberDescriptor, ShapeId, ShapeRegistry, StructShape, Value};

// ── Helpers ────────────────────────────────────────────────────────────

fn ints(ns: &[i64]) -> Value {
    Value::List(ns.iter().map(|&n| Value::Int(n)).collect())
}

fn strings(ss: &[&str]) -> Value {
    Value::List(ss.iter().map(|&s| Value::str(s)).collect())
}

// ── Collection Conversion Tests ────────────────────────────────────────

/// List elements convert in order through the element pair; empty and
/// null inputs stay empty and null.
#[test]
fn test_lists_convert_element_by_element() {
    let mut shapes = ShapeRegistry::new();
    let src = shapes.list_of(ShapeId::I64);
    let dst = shapes.list_of(ShapeId::STRING);
    let m = Mapper::new(Arc::new(shapes), MapperConfig::new()).unwrap();

    assert_eq!(m.convert(src, dst, &ints(&[1, 2])).unwrap(), strings(&["1", "2"]));
    assert_eq!(m.convert(src, dst, &Value::List(vec![])).unwrap(), Value::List(vec![]));
    assert_eq!(m.convert(src, dst, &Value::Null).unwrap(), Value::Null);
}

/// Lists and rank-1 arrays convert into each other, preserving order.
#[test]
fn test_lists_and_rank_one_arrays_interchange() {
    let mut shapes = ShapeRegistry::new();
    let list = shapes.list_of(ShapeId::I64);
    let arr = shapes.array_of(ShapeId::I64, 1);
    let m = Mapper::new(Arc::new(shapes), MapperConfig::new()).unwrap();

    let out = m.convert(list, arr, &ints(&[1, 2, 3])).unwrap();
    let Value::Array(a) = &out else { panic!("expected an array") };
    assert_eq!(a.dims, vec![3]);
    assert_eq!(a.elems, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);

    assert_eq!(m.convert(arr, list, &out).unwrap(), ints(&[1, 2, 3]));
}

/// Struct elements convert through their own cached pair rather than
/// being inlined into the list procedure.
#[test]
fn test_struct_elements_compile_their_own_pair() {
    let mut shapes = ShapeRegistry::new();
    let mut item = StructShape::new("Item");
    item.members.push(MemberDescriptor::property("Qty", ShapeId::I64));
    let item = shapes.register_struct(item);
    let mut row = StructShape::new("ItemRow");
    row.members.push(MemberDescriptor::property("Qty", ShapeId::I64));
    let row = shapes.register_struct(row);
    let list_item = shapes.list_of(item);
    let list_row = shapes.list_of(row);
    let shapes = Arc::new(shapes);
    let m = Mapper::new(shapes.clone(), MapperConfig::new()).unwrap();

    let src = Value::List(vec![
        shapes.object(item, &[("Qty", Value::Int(4))]),
        shapes.object(item, &[("Qty", Value::Int(9))]),
    ]);
    let out = m.convert(list_item, list_row, &src).unwrap();
    let Value::List(elems) = &out else { panic!("expected a list") };
    assert_eq!(elems.len(), 2);
    let first = elems[0].as_object().unwrap();
    assert_eq!(first.shape(), row);
    assert_eq!(first.member(&shapes, "Qty"), Some(Value::Int(4)));

    // The element pair owns a cache slot of its own.
    assert_eq!(m.compiled_pairs(), 2);
}

/// Rank disagreements between declared shapes are synthesis errors.
#[test]
fn test_rank_mismatches_fail_at_synthesis() {
    let mut shapes = ShapeRegistry::new();
    let arr1 = shapes.array_of(ShapeId::I32, 1);
    let arr2 = shapes.array_of(ShapeId::I32, 2);
    let list = shapes.list_of(ShapeId::I32);
    let m = Mapper::new(Arc::new(shapes), MapperConfig::new()).unwrap();

    let flat = Value::Array(ArrayValue::new(vec![2], vec![Value::Int(1), Value::Int(2)]));
    let err = m.convert(arr1, arr2, &flat).unwrap_err();
    assert_eq!(
        err,
        MapError::Compile(CompileError::Unsupported {
            pair: "Int32[] -> Int32[,]".into(),
            detail: "array ranks differ: 1 vs 2".into(),
        })
    );

    let err = m.convert(list, arr2, &ints(&[1])).unwrap_err();
    assert_eq!(
        err,
        MapError::Compile(CompileError::Unsupported {
            pair: "List<Int32> -> Int32[,]".into(),
            detail: "arrays of rank above one convert only to arrays of the same rank".into(),
        })
    );
}

/// A two-dimensional array converts elementwise in row-major order, with
/// the dimensions carried over unchanged.
#[test]
fn test_nd_arrays_convert_in_row_major_order() {
    let mut shapes = ShapeRegistry::new();
    let src = shapes.array_of(ShapeId::I32, 2);
    let dst = shapes.array_of(ShapeId::STRING, 2);
    let m = Mapper::new(Arc::new(shapes), MapperConfig::new()).unwrap();

    let grid = ArrayValue::new(vec![2, 3], (1..=6).map(Value::Int).collect());
    let out = m.convert(src, dst, &Value::Array(grid)).unwrap();
    let Value::Array(a) = &out else { panic!("expected an array") };
    assert_eq!(a.dims, vec![2, 3]);
    let rendered: Vec<&str> = a.elems.iter().map(|v| v.as_str().unwrap()).collect();
    assert_eq!(rendered, ["1", "2", "3", "4", "5", "6"]);
}

/// A value whose actual rank disagrees with the declared shape fails at
/// runtime.
#[test]
fn test_runtime_rank_disagreement_fails() {
    let mut shapes = ShapeRegistry::new();
    let src = shapes.array_of(ShapeId::I32, 2);
    let dst = shapes.array_of(ShapeId::STRING, 2);
    let m = Mapper::new(Arc::new(shapes), MapperConfig::new()).unwrap();

    let flat = Value::Array(ArrayValue::new(vec![2], vec![Value::Int(1), Value::Int(2)]));
    let err = m.convert(src, dst, &flat).unwrap_err();
    assert_eq!(err, MapError::Runtime(RuntimeError::RankMismatch { expected: 2, found: 1 }));
}
