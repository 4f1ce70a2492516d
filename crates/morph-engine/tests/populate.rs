//! Populating existing destinations through `convert_into`: in-place
//! struct updates, list clear-and-refill, map merges, and the pairings
//! that refuse a populate form outright.

use std::sync::Arc;

use morph_engine::{CompileError, MapError, Mapper, MapperConfig, RuntimeError};
use morph_model::{
    ConstructorDescriptor, MapValue, MemberDescriptor, ParamDescriptor, ShapeId, ShapeRegistry,
    StructShape, Value,
};

// ── Helpers ────────────────────────────────────────────────────────────

fn member(shapes: &ShapeRegistry, value: &Value, name: &str) -> Value {
    value.as_object().unwrap().member(shapes, name).unwrap()
}

fn map_value(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(MapValue::from_entries(
        entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
    ))
}

fn keys_of(value: &Value) -> Vec<String> {
    value.as_map().unwrap().iter().map(|(k, _)| k.to_string()).collect()
}

/// `Order { Id, Name }` and `OrderDto { Id, Name, Remark }`.
fn order_shapes(shapes: &mut ShapeRegistry) -> (ShapeId, ShapeId) {
    let mut shape = StructShape::new("Order");
    shape.members.push(MemberDescriptor::property("Id", ShapeId::I64));
    shape.members.push(MemberDescriptor::property("Name", ShapeId::STRING));
    let order = shapes.register_struct(shape);

    let mut shape = StructShape::new("OrderDto");
    shape.members.push(MemberDescriptor::property("Id", ShapeId::I64));
    shape.members.push(MemberDescriptor::property("Name", ShapeId::STRING));
    shape.members.push(MemberDescriptor::property("Remark", ShapeId::STRING));
    let order_dto = shapes.register_struct(shape);
    (order, order_dto)
}

// ── Populate Tests ─────────────────────────────────────────────────────

/// `convert_into` writes mapped members into the caller's object and
/// returns that same object; members without a source survive.
#[test]
fn test_struct_populate_updates_in_place() {
    let mut shapes = ShapeRegistry::new();
    let (order, order_dto) = order_shapes(&mut shapes);
    let shapes = Arc::new(shapes);
    let m = Mapper::new(shapes.clone(), MapperConfig::new()).unwrap();

    let src = shapes.object(order, &[("Id", Value::Int(7)), ("Name", Value::str("primary"))]);
    let existing =
        shapes.object(order_dto, &[("Id", Value::Int(99)), ("Remark", Value::str("keep"))]);

    let out = m.convert_into(order, order_dto, &src, existing.clone()).unwrap();
    assert!(out.as_object().unwrap().ptr_eq(existing.as_object().unwrap()));
    assert_eq!(member(&shapes, &existing, "Id"), Value::Int(7));
    assert_eq!(member(&shapes, &existing, "Name"), Value::str("primary"));
    assert_eq!(member(&shapes, &existing, "Remark"), Value::str("keep"));
}

/// A null source populates nothing and hands the target back as-is.
#[test]
fn test_null_sources_leave_the_target_untouched() {
    let mut shapes = ShapeRegistry::new();
    let (order, order_dto) = order_shapes(&mut shapes);
    let shapes = Arc::new(shapes);
    let m = Mapper::new(shapes.clone(), MapperConfig::new()).unwrap();

    let existing = shapes.object(order_dto, &[("Id", Value::Int(99))]);
    let out = m.convert_into(order, order_dto, &Value::Null, existing.clone()).unwrap();
    assert!(out.as_object().unwrap().ptr_eq(existing.as_object().unwrap()));
    assert_eq!(member(&shapes, &existing, "Id"), Value::Int(99));
}

/// Factories build new instances; populating never constructs, so the
/// target keeps its identity and its unmapped members.
#[test]
fn test_populate_skips_construction() {
    let mut shapes = ShapeRegistry::new();
    let job = {
        let mut shape = StructShape::new("Job");
        shape.members.push(MemberDescriptor::property("Name", ShapeId::STRING));
        shapes.register_struct(shape)
    };
    let job_dto = {
        let mut shape = StructShape::new("JobDto");
        shape.members.push(MemberDescriptor::property("Name", ShapeId::STRING));
        shape.members.push(MemberDescriptor::property("Tag", ShapeId::STRING));
        shapes.register_struct(shape)
    };
    let shapes = Arc::new(shapes);

    let mut config = MapperConfig::new();
    let reg = shapes.clone();
    config
        .pair(job, job_dto)
        .construct_with(move |_| reg.object(job_dto, &[("Tag", Value::str("made"))]));
    let m = Mapper::new(shapes.clone(), config).unwrap();

    let src = shapes.object(job, &[("Name", Value::str("build"))]);
    let existing = shapes.object(job_dto, &[("Tag", Value::str("old"))]);
    let out = m.convert_into(job, job_dto, &src, existing.clone()).unwrap();

    assert!(out.as_object().unwrap().ptr_eq(existing.as_object().unwrap()));
    assert_eq!(member(&shapes, &existing, "Name"), Value::str("build"));
    assert_eq!(member(&shapes, &existing, "Tag"), Value::str("old"));
}

/// Constructor-equipped destinations still populate member-wise; the
/// constructor only matters when a new instance is built.
#[test]
fn test_constructor_destinations_populate_through_members() {
    let mut shapes = ShapeRegistry::new();
    let row = {
        let mut shape = StructShape::new("Row");
        shape.members.push(MemberDescriptor::property("Name", ShapeId::STRING));
        shapes.register_struct(shape)
    };
    let person = {
        let mut shape = StructShape::new("Person");
        shape.members.push(MemberDescriptor::property("Name", ShapeId::STRING));
        shape
            .constructors
            .push(ConstructorDescriptor::public(vec![ParamDescriptor::required(
                "name",
                ShapeId::STRING,
            )]));
        shapes.register_struct(shape)
    };
    let shapes = Arc::new(shapes);
    let m = Mapper::new(shapes.clone(), MapperConfig::new()).unwrap();

    let src = shapes.object(row, &[("Name", Value::str("Ada"))]);
    let existing = shapes.object(person, &[("Name", Value::str("stale"))]);
    let out = m.convert_into(row, person, &src, existing.clone()).unwrap();

    assert!(out.as_object().unwrap().ptr_eq(existing.as_object().unwrap()));
    assert_eq!(member(&shapes, &existing, "Name"), Value::str("Ada"));
}

/// Populating a list clears it and refills from the converted source; a
/// null target becomes a fresh list and a null source changes nothing.
#[test]
fn test_list_populate_clears_and_refills() {
    let mut shapes = ShapeRegistry::new();
    let ints = shapes.list_of(ShapeId::I64);
    let strings = shapes.list_of(ShapeId::STRING);
    let m = Mapper::new(Arc::new(shapes), MapperConfig::new()).unwrap();

    let src = Value::List(vec![Value::Int(1), Value::Int(2)]);
    let stale = Value::List(vec![Value::str("a"), Value::str("b"), Value::str("c")]);
    let out = m.convert_into(ints, strings, &src, stale).unwrap();
    assert_eq!(out, Value::List(vec![Value::str("1"), Value::str("2")]));

    let out = m.convert_into(ints, strings, &src, Value::Null).unwrap();
    assert_eq!(out, Value::List(vec![Value::str("1"), Value::str("2")]));

    let untouched = Value::List(vec![Value::str("x")]);
    let out = m.convert_into(ints, strings, &Value::Null, untouched.clone()).unwrap();
    assert_eq!(out, untouched);
}

/// Array targets have fixed geometry, so a populate replaces them
/// wholesale instead of editing elements.
#[test]
fn test_array_populate_replaces_wholesale() {
    let mut shapes = ShapeRegistry::new();
    let ints = shapes.list_of(ShapeId::I64);
    let strings = shapes.array_of(ShapeId::STRING, 1);
    let m = Mapper::new(Arc::new(shapes), MapperConfig::new()).unwrap();

    let src = Value::List(vec![Value::Int(1), Value::Int(2)]);
    let stale = Value::Array(morph_model::ArrayValue::new(
        vec![3],
        vec![Value::str("a"), Value::str("b"), Value::str("c")],
    ));
    let out = m.convert_into(ints, strings, &src, stale).unwrap();
    let arr = out.as_array().unwrap();
    assert_eq!(arr.dims, vec![2]);
    assert_eq!(arr.elems, vec![Value::str("1"), Value::str("2")]);
}

/// Map populates merge: source entries land (through the key transform),
/// untouched keys survive, and skipped nulls never arrive.
#[test]
fn test_map_populate_merges_and_transforms_keys() {
    let mut shapes = ShapeRegistry::new();
    let source_map = shapes.map_of(ShapeId::STRING);
    let dest_map = shapes.map_of(ShapeId::STRING);
    let shapes = Arc::new(shapes);

    let mut config = MapperConfig::new();
    config
        .pair(source_map, dest_map)
        .map_skip_null()
        .map_key_transform(|k| k.to_uppercase());
    let m = Mapper::new(shapes, config).unwrap();

    let src = map_value(vec![("a", Value::str("new")), ("b", Value::Null)]);

    // The transform is a populate-side concern; plain conversions keep keys.
    let converted = m.convert(source_map, dest_map, &src).unwrap();
    assert_eq!(keys_of(&converted), ["a"]);

    let existing = map_value(vec![("a", Value::str("old")), ("z", Value::str("stay"))]);
    let out = m.convert_into(source_map, dest_map, &src, existing).unwrap();
    assert_eq!(keys_of(&out), ["a", "z", "A"]);
    assert_eq!(out.as_map().unwrap().get("a"), Some(&Value::str("old")));
    assert_eq!(out.as_map().unwrap().get("A"), Some(&Value::str("new")));
}

/// Struct-to-map populates add the exported members without clearing
/// whatever the map already held.
#[test]
fn test_struct_to_map_populate_keeps_stale_keys() {
    let mut shapes = ShapeRegistry::new();
    let contact = {
        let mut shape = StructShape::new("Contact");
        shape.members.push(MemberDescriptor::property("Id", ShapeId::I64));
        shape.members.push(MemberDescriptor::property("Name", ShapeId::STRING));
        shapes.register_struct(shape)
    };
    let bag = shapes.map_of(ShapeId::ANY);
    let shapes = Arc::new(shapes);
    let m = Mapper::new(shapes.clone(), MapperConfig::new()).unwrap();

    let src = shapes.object(contact, &[("Id", Value::Int(4)), ("Name", Value::str("Nora"))]);
    let existing = map_value(vec![("Mode", Value::str("legacy"))]);
    let out = m.convert_into(contact, bag, &src, existing).unwrap();

    assert_eq!(keys_of(&out), ["Mode", "Id", "Name"]);
    assert_eq!(out.as_map().unwrap().get("Id"), Some(&Value::Int(4)));
    assert_eq!(out.as_map().unwrap().get("Mode"), Some(&Value::str("legacy")));
}

/// The populate target must match the destination's kind, and an object
/// target must carry the destination shape itself.
#[test]
fn test_populate_rejects_mismatched_targets() {
    let mut shapes = ShapeRegistry::new();
    let (order, order_dto) = order_shapes(&mut shapes);
    let ints = shapes.list_of(ShapeId::I64);
    let any_map = shapes.map_of(ShapeId::ANY);
    let shapes = Arc::new(shapes);
    let m = Mapper::new(shapes.clone(), MapperConfig::new()).unwrap();

    let src = shapes.object(order, &[("Id", Value::Int(1))]);
    let err = m.convert_into(order, order_dto, &src, Value::Int(3)).unwrap_err();
    assert_eq!(
        err,
        MapError::Runtime(RuntimeError::PopulateTarget { expected: "object", found: "int" })
    );

    let err = m.convert_into(order, order_dto, &src, Value::Null).unwrap_err();
    assert_eq!(
        err,
        MapError::Runtime(RuntimeError::PopulateTarget { expected: "object", found: "null" })
    );

    let foreign = shapes.object(order, &[("Id", Value::Int(9))]);
    let err = m.convert_into(order, order_dto, &src, foreign).unwrap_err();
    assert_eq!(
        err,
        MapError::Runtime(RuntimeError::ValueShapeMismatch {
            expected: "OrderDto".into(),
            found: "object",
        })
    );

    let lists = Value::List(vec![Value::Int(1)]);
    let err = m.convert_into(ints, ints, &lists, Value::Int(1)).unwrap_err();
    assert_eq!(
        err,
        MapError::Runtime(RuntimeError::PopulateTarget { expected: "list", found: "int" })
    );

    let maps = map_value(vec![("k", Value::Int(1))]);
    let err = m.convert_into(any_map, any_map, &maps, Value::Bool(true)).unwrap_err();
    assert_eq!(
        err,
        MapError::Runtime(RuntimeError::PopulateTarget { expected: "map", found: "bool" })
    );
}

/// Scalar and fallback-coerced destinations have no in-place form; the
/// compile refuses them up front.
#[test]
fn test_scalar_destinations_cannot_be_populated() {
    let mut shapes = ShapeRegistry::new();
    let ints = shapes.list_of(ShapeId::I64);
    let m = Mapper::new(Arc::new(shapes), MapperConfig::new()).unwrap();

    let err =
        m.convert_into(ShapeId::I32, ShapeId::I64, &Value::Int(1), Value::Int(2)).unwrap_err();
    assert_eq!(
        err,
        MapError::Compile(CompileError::Unsupported {
            pair: "Int32 -> Int64".into(),
            detail: "scalar destinations cannot be populated in place".into(),
        })
    );
    insta::assert_snapshot!(
        err.to_string(),
        @"cannot convert Int32 -> Int64: scalar destinations cannot be populated in place"
    );

    let err = m
        .convert_into(ShapeId::STRING, ints, &Value::str("x"), Value::List(Vec::new()))
        .unwrap_err();
    assert_eq!(
        err,
        MapError::Compile(CompileError::Unsupported {
            pair: "String -> List<Int64>".into(),
            detail: "cannot coerce into an existing value".into(),
        })
    );
}
