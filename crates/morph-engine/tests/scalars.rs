//! Primitive conversion: numeric casts, string parsing and formatting,
//! null routing, and the runtime coercion fallback for `Any` shapes.
//!
//! Primitive and `Any` shapes are preinterned by the registry, so most of
//! these tests need no shape setup at all.

use std::sync::Arc;

use morph_engine::{CompileError, MapError, Mapper, MapperConfig, RuntimeError};
use morph_model::{EnumShape, EnumValue, ShapeId, ShapeRegistry, Value};

// ── Helpers ────────────────────────────────────────────────────────────

/// A mapper over a registry holding nothing but the preinterned shapes.
fn flat_mapper() -> Mapper {
    Mapper::new(Arc::new(ShapeRegistry::new()), MapperConfig::new()).unwrap()
}

// ── Scalar Conversion Tests ────────────────────────────────────────────

/// Integer narrowing wraps and float-to-integer saturates, matching the
/// machine cast the procedure compiles down to.
#[test]
fn test_numeric_casts_follow_machine_semantics() {
    let m = flat_mapper();

    assert_eq!(m.convert(ShapeId::I64, ShapeId::I8, &Value::Int(300)).unwrap(), Value::Int(44));
    assert_eq!(m.convert(ShapeId::I64, ShapeId::U8, &Value::Int(-1)).unwrap(), Value::UInt(255));
    assert_eq!(
        m.convert(ShapeId::F64, ShapeId::I32, &Value::Float(1e20)).unwrap(),
        Value::Int(i64::from(i32::MAX))
    );
    assert_eq!(m.convert(ShapeId::F64, ShapeId::U8, &Value::Float(-1e20)).unwrap(), Value::UInt(0));
    assert_eq!(m.convert(ShapeId::F64, ShapeId::I64, &Value::Float(2.9)).unwrap(), Value::Int(2));
}

/// Numbers format to strings and strings parse back; a bad digit string
/// surfaces as a parse failure naming the offending value.
#[test]
fn test_numbers_format_and_parse_as_strings() {
    let m = flat_mapper();

    assert_eq!(
        m.convert(ShapeId::I64, ShapeId::STRING, &Value::Int(42)).unwrap(),
        Value::str("42")
    );
    assert_eq!(
        m.convert(ShapeId::STRING, ShapeId::F64, &Value::str("2.5")).unwrap(),
        Value::Float(2.5)
    );

    let err = m.convert(ShapeId::STRING, ShapeId::I32, &Value::str("12x")).unwrap_err();
    assert_eq!(
        err,
        MapError::Runtime(RuntimeError::ParseFailure { value: "12x".into(), target: "Int32" })
    );
}

/// Booleans render as `true`/`false` and only those two spellings parse.
#[test]
fn test_booleans_round_trip_through_strings() {
    let m = flat_mapper();

    assert_eq!(
        m.convert(ShapeId::BOOL, ShapeId::STRING, &Value::Bool(true)).unwrap(),
        Value::str("true")
    );
    assert_eq!(
        m.convert(ShapeId::STRING, ShapeId::BOOL, &Value::str("false")).unwrap(),
        Value::Bool(false)
    );

    let err = m.convert(ShapeId::STRING, ShapeId::BOOL, &Value::str("yes")).unwrap_err();
    assert_eq!(
        err,
        MapError::Runtime(RuntimeError::ParseFailure { value: "yes".into(), target: "Bool" })
    );
}

/// Scalar pairs with no defined conversion are rejected when the
/// procedure is compiled, not when a value flows through it.
#[test]
fn test_undefined_scalar_pairs_fail_at_compile_time() {
    let m = flat_mapper();

    let err = m.convert(ShapeId::BOOL, ShapeId::I32, &Value::Bool(true)).unwrap_err();
    assert_eq!(
        err,
        MapError::Compile(CompileError::Unsupported {
            pair: "Bool -> Int32".into(),
            detail: "no Bool to Int32 conversion".into(),
        })
    );
}

/// Null becomes the destination's zero unless the destination is
/// optional, in which case it passes through.
#[test]
fn test_null_scalars_default_or_pass_through() {
    let mut shapes = ShapeRegistry::new();
    let opt_i64 = shapes.optional(ShapeId::I64);
    let m = Mapper::new(Arc::new(shapes), MapperConfig::new()).unwrap();

    assert_eq!(m.convert(ShapeId::I64, ShapeId::I32, &Value::Null).unwrap(), Value::Int(0));
    assert_eq!(m.convert(ShapeId::I64, opt_i64, &Value::Null).unwrap(), Value::Null);
    assert_eq!(m.convert(ShapeId::I64, opt_i64, &Value::Int(5)).unwrap(), Value::Int(5));
}

/// `Any` pairs compile to a coercion that inspects the value at runtime.
#[test]
fn test_any_defers_shape_checks_to_runtime() {
    let m = flat_mapper();

    assert_eq!(m.convert(ShapeId::I64, ShapeId::ANY, &Value::Int(5)).unwrap(), Value::Int(5));
    assert_eq!(m.convert(ShapeId::ANY, ShapeId::I32, &Value::str("42")).unwrap(), Value::Int(42));

    let err = m.convert(ShapeId::ANY, ShapeId::I32, &Value::Bool(true)).unwrap_err();
    assert_eq!(
        err,
        MapError::Runtime(RuntimeError::ValueShapeMismatch {
            expected: "Int32".into(),
            found: "bool",
        })
    );
}

/// A pair no strategy claims still compiles, falling back to coercion:
/// compatible values pass, incompatible ones fail at runtime.
#[test]
fn test_unclaimed_pairs_fall_back_to_coercion() {
    let mut shapes = ShapeRegistry::new();
    let list_i64 = shapes.list_of(ShapeId::I64);
    let m = Mapper::new(Arc::new(shapes), MapperConfig::new()).unwrap();

    assert_eq!(m.convert(ShapeId::STRING, list_i64, &Value::Null).unwrap(), Value::Null);

    let err = m.convert(ShapeId::STRING, list_i64, &Value::str("x")).unwrap_err();
    assert_eq!(
        err,
        MapError::Runtime(RuntimeError::ValueShapeMismatch {
            expected: "list".into(),
            found: "string",
        })
    );
}

/// Enum values carried in `Any` sources coerce to their name or their
/// underlying value.
#[test]
fn test_enum_sources_coerce_to_plain_primitives() {
    let mut shapes = ShapeRegistry::new();
    let color = shapes.register_enum(EnumShape::new("Color", vec![("Red", 1), ("Blue", 2)]));
    let m = Mapper::new(Arc::new(shapes), MapperConfig::new()).unwrap();

    let red = Value::Enum(EnumValue { shape: color, variant: 0 });
    assert_eq!(m.convert(ShapeId::ANY, ShapeId::STRING, &red).unwrap(), Value::str("Red"));
    assert_eq!(m.convert(ShapeId::ANY, ShapeId::I64, &red).unwrap(), Value::Int(1));
}
