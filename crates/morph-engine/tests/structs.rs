//! Struct-to-struct conversion through the member-mapping strategy.
//!
//! Each test builds a small shape registry, converts an object, and
//! inspects the destination members. Covers name-driven resolution,
//! explicit overrides, ignore lists, per-call conditions, null
//! substitutes, shape-keyed transforms, flattening, getter members, and
//! shallow copies.

use std::sync::Arc;

use morph_engine::{MapError, Mapper, MapperConfig, MemberSource, NameMatch, RuntimeError};
use morph_model::{
    Const, GetterDescriptor, MemberDescriptor, ShapeId, ShapeRegistry, StructShape, Value,
};

// ── Helpers ────────────────────────────────────────────────────────────

struct Fixture {
    shapes: Arc<ShapeRegistry>,
    order: ShapeId,
    dto: ShapeId,
}

/// `Order { Id, Name, Total }` next to `OrderDto { Id, Name, Total, Remark }`.
fn fixture() -> Fixture {
    let mut shapes = ShapeRegistry::new();

    let mut order = StructShape::new("Order");
    order.members.push(MemberDescriptor::property("Id", ShapeId::I64));
    order.members.push(MemberDescriptor::property("Name", ShapeId::STRING));
    order.members.push(MemberDescriptor::property("Total", ShapeId::F64));
    let order = shapes.register_struct(order);

    let mut dto = StructShape::new("OrderDto");
    dto.members.push(MemberDescriptor::property("Id", ShapeId::I64));
    dto.members.push(MemberDescriptor::property("Name", ShapeId::STRING));
    dto.members.push(MemberDescriptor::property("Total", ShapeId::F64));
    dto.members.push(MemberDescriptor::property("Remark", ShapeId::STRING));
    let dto = shapes.register_struct(dto);

    Fixture { shapes: Arc::new(shapes), order, dto }
}

fn sample_order(fx: &Fixture) -> Value {
    fx.shapes.object(
        fx.order,
        &[
            ("Id", Value::Int(7)),
            ("Name", Value::str("primary")),
            ("Total", Value::Float(99.5)),
        ],
    )
}

/// Read a named member out of an object value.
fn member(shapes: &ShapeRegistry, value: &Value, name: &str) -> Value {
    value
        .as_object()
        .unwrap_or_else(|| panic!("expected an object, found {}", value.kind_name()))
        .member(shapes, name)
        .unwrap_or_else(|| panic!("no member named `{name}`"))
}

// ── Member Mapping Tests ───────────────────────────────────────────────

/// Same-name public members map automatically; unmatched destination
/// members keep their default slot values.
#[test]
fn test_members_map_by_exact_name() {
    let fx = fixture();
    let mapper = Mapper::new(fx.shapes.clone(), MapperConfig::new()).unwrap();

    let out = mapper.convert(fx.order, fx.dto, &sample_order(&fx)).unwrap();

    assert_eq!(member(&fx.shapes, &out, "Id"), Value::Int(7));
    assert_eq!(member(&fx.shapes, &out, "Name"), Value::str("primary"));
    assert_eq!(member(&fx.shapes, &out, "Total"), Value::Float(99.5));
    assert_eq!(member(&fx.shapes, &out, "Remark"), Value::Null);
}

/// Ignored destination members are left at their defaults even when the
/// source has a matching member.
#[test]
fn test_ignored_members_keep_their_defaults() {
    let fx = fixture();
    let mut config = MapperConfig::new();
    config.pair(fx.order, fx.dto).ignore("Total");
    let mapper = Mapper::new(fx.shapes.clone(), config).unwrap();

    let out = mapper.convert(fx.order, fx.dto, &sample_order(&fx)).unwrap();

    assert_eq!(member(&fx.shapes, &out, "Total"), Value::Float(0.0));
    assert_eq!(member(&fx.shapes, &out, "Id"), Value::Int(7));
}

/// Explicit overrides beat name matching: a member redirect, a constant,
/// and a resolver closure each feed their destination member.
#[test]
fn test_overrides_redirect_and_inject() {
    let fx = fixture();
    let mut config = MapperConfig::new();
    config
        .pair(fx.order, fx.dto)
        .member("Remark", MemberSource::Member("Name".into()))
        .constant("Id", Const::Int(1000))
        .resolve_with("Total", |_| Value::Float(5.0));
    let mapper = Mapper::new(fx.shapes.clone(), config).unwrap();

    let out = mapper.convert(fx.order, fx.dto, &sample_order(&fx)).unwrap();

    assert_eq!(member(&fx.shapes, &out, "Remark"), Value::str("primary"));
    assert_eq!(member(&fx.shapes, &out, "Id"), Value::Int(1000));
    assert_eq!(member(&fx.shapes, &out, "Total"), Value::Float(5.0));
    assert_eq!(member(&fx.shapes, &out, "Name"), Value::str("primary"));
}

/// A null substitute replaces a null source member before conversion.
#[test]
fn test_null_substitute_replaces_null_sources() {
    let fx = fixture();
    // `Name` is left unset, so its slot defaults to null.
    let src = fx.shapes.object(fx.order, &[("Id", Value::Int(1))]);

    let plain = Mapper::new(fx.shapes.clone(), MapperConfig::new()).unwrap();
    let out = plain.convert(fx.order, fx.dto, &src).unwrap();
    assert_eq!(member(&fx.shapes, &out, "Name"), Value::Null);

    let mut config = MapperConfig::new();
    config.pair(fx.order, fx.dto).null_substitute("Name", Const::Str("anon".into()));
    let mapper = Mapper::new(fx.shapes.clone(), config).unwrap();
    let out = mapper.convert(fx.order, fx.dto, &src).unwrap();
    assert_eq!(member(&fx.shapes, &out, "Name"), Value::str("anon"));
}

/// Transforms apply to mapped members whose destination shape matches,
/// and only to those.
#[test]
fn test_transforms_filter_by_destination_shape() {
    let fx = fixture();
    let mut config = MapperConfig::new();
    config.pair(fx.order, fx.dto).transform(ShapeId::STRING, |v| match v {
        Value::String(s) => Value::String(s.to_uppercase()),
        other => other,
    });
    let mapper = Mapper::new(fx.shapes.clone(), config).unwrap();

    let out = mapper.convert(fx.order, fx.dto, &sample_order(&fx)).unwrap();

    assert_eq!(member(&fx.shapes, &out, "Name"), Value::str("PRIMARY"));
    // Non-string destinations are untouched.
    assert_eq!(member(&fx.shapes, &out, "Total"), Value::Float(99.5));
    // `Remark` never maps, so the transform never sees it.
    assert_eq!(member(&fx.shapes, &out, "Remark"), Value::Null);
}

/// Conditions are evaluated against the source value on every call, so
/// one compiled procedure can skip a member for some inputs only.
#[test]
fn test_conditions_skip_members_per_call() {
    let fx = fixture();
    let reg = fx.shapes.clone();
    let mut config = MapperConfig::new();
    config.pair(fx.order, fx.dto).ignore_if("Total", move |src| {
        src.as_object().is_some_and(|o| o.member(&reg, "Id") == Some(Value::Int(0)))
    });
    let mapper = Mapper::new(fx.shapes.clone(), config).unwrap();

    let skipped =
        fx.shapes.object(fx.order, &[("Id", Value::Int(0)), ("Total", Value::Float(3.0))]);
    let out = mapper.convert(fx.order, fx.dto, &skipped).unwrap();
    assert_eq!(member(&fx.shapes, &out, "Total"), Value::Float(0.0));

    let out = mapper.convert(fx.order, fx.dto, &sample_order(&fx)).unwrap();
    assert_eq!(member(&fx.shapes, &out, "Total"), Value::Float(99.5));
}

/// `AddressCity` resolves by flattening through the `Address` member, and
/// `Badge` resolves through the `GetBadge` getter. A null link nulls the
/// flattened chain instead of failing.
#[test]
fn test_flattening_and_getters_resolve_members() {
    let mut shapes = ShapeRegistry::new();
    let mut address = StructShape::new("Address");
    address.members.push(MemberDescriptor::property("City", ShapeId::STRING));
    let address = shapes.register_struct(address);

    let mut person = StructShape::new("Person");
    person.members.push(MemberDescriptor::property("Name", ShapeId::STRING));
    person.members.push(MemberDescriptor::property("Address", address));
    person.getters.push(GetterDescriptor::new("GetBadge", ShapeId::STRING, |data| {
        match &data.slots[0] {
            Value::String(s) => Value::String(format!("badge:{s}")),
            other => other.clone(),
        }
    }));
    let person = shapes.register_struct(person);

    let mut dto = StructShape::new("PersonDto");
    dto.members.push(MemberDescriptor::property("AddressCity", ShapeId::STRING));
    dto.members.push(MemberDescriptor::property("Badge", ShapeId::STRING));
    let dto = shapes.register_struct(dto);
    let shapes = Arc::new(shapes);

    let mapper = Mapper::new(shapes.clone(), MapperConfig::new()).unwrap();

    let home = shapes.object(address, &[("City", Value::str("Bergen"))]);
    let src = shapes.object(person, &[("Name", Value::str("Ada")), ("Address", home)]);
    let out = mapper.convert(person, dto, &src).unwrap();
    assert_eq!(member(&shapes, &out, "AddressCity"), Value::str("Bergen"));
    assert_eq!(member(&shapes, &out, "Badge"), Value::str("badge:Ada"));

    let detached = shapes.object(person, &[("Name", Value::str("Lin"))]);
    let out = mapper.convert(person, dto, &detached).unwrap();
    assert_eq!(member(&shapes, &out, "AddressCity"), Value::Null);
    assert_eq!(member(&shapes, &out, "Badge"), Value::str("badge:Lin"));
}

/// Flexible matching bridges naming conventions; the default exact policy
/// does not.
#[test]
fn test_flexible_matching_crosses_conventions() {
    let mut shapes = ShapeRegistry::new();
    let mut event = StructShape::new("Event");
    event.members.push(MemberDescriptor::property("EventKind", ShapeId::STRING));
    let event = shapes.register_struct(event);
    let mut row = StructShape::new("EventRow");
    row.members.push(MemberDescriptor::property("event_kind", ShapeId::STRING));
    let row = shapes.register_struct(row);
    let shapes = Arc::new(shapes);

    let src = shapes.object(event, &[("EventKind", Value::str("boom"))]);

    let exact = Mapper::new(shapes.clone(), MapperConfig::new()).unwrap();
    let out = exact.convert(event, row, &src).unwrap();
    assert_eq!(member(&shapes, &out, "event_kind"), Value::Null);

    let mut config = MapperConfig::new();
    config.default_name_match(NameMatch::Flexible);
    let flexible = Mapper::new(shapes.clone(), config).unwrap();
    let out = flexible.convert(event, row, &src).unwrap();
    assert_eq!(member(&shapes, &out, "event_kind"), Value::str("boom"));
}

/// A shallow copy clones slots without descending: the copy is a fresh
/// object, but object-valued members alias the source's children.
#[test]
fn test_shallow_copy_aliases_member_objects() {
    let mut shapes = ShapeRegistry::new();
    let mut payload = StructShape::new("Payload");
    payload.members.push(MemberDescriptor::property("Data", ShapeId::I64));
    let payload = shapes.register_struct(payload);
    let mut wrap = StructShape::new("Wrap");
    wrap.members.push(MemberDescriptor::property("Tag", ShapeId::STRING));
    wrap.members.push(MemberDescriptor::property("Child", payload));
    let wrap = shapes.register_struct(wrap);
    let shapes = Arc::new(shapes);

    let mut config = MapperConfig::new();
    config.pair(wrap, wrap).shallow_copy();
    let mapper = Mapper::new(shapes.clone(), config).unwrap();

    let inner = shapes.object(payload, &[("Data", Value::Int(5))]);
    let src = shapes.object(wrap, &[("Tag", Value::str("a")), ("Child", inner)]);
    let out = mapper.convert(wrap, wrap, &src).unwrap();

    assert!(!out.as_object().unwrap().ptr_eq(src.as_object().unwrap()));
    let src_child = member(&shapes, &src, "Child");
    let out_child = member(&shapes, &out, "Child");
    assert!(out_child.as_object().unwrap().ptr_eq(src_child.as_object().unwrap()));
    assert_eq!(member(&shapes, &out, "Tag"), Value::str("a"));
}

/// Feeding a non-object value to a struct procedure is a runtime error.
#[test]
fn test_wrong_source_kind_is_a_runtime_error() {
    let fx = fixture();
    let mapper = Mapper::new(fx.shapes.clone(), MapperConfig::new()).unwrap();

    let err = mapper.convert(fx.order, fx.dto, &Value::Int(3)).unwrap_err();
    assert_eq!(
        err,
        MapError::Runtime(RuntimeError::ValueShapeMismatch {
            expected: "object".into(),
            found: "int",
        })
    );
}

/// An object whose runtime shape is not the declared source is refused;
/// its slot layout cannot be read through the compiled fetches.
#[test]
fn test_foreign_shaped_sources_are_rejected() {
    let mut shapes = ShapeRegistry::new();
    let mut stub = StructShape::new("Stub");
    stub.members.push(MemberDescriptor::property("Id", ShapeId::I64));
    let stub = shapes.register_struct(stub);
    let mut order = StructShape::new("Order");
    order.members.push(MemberDescriptor::property("Id", ShapeId::I64));
    order.members.push(MemberDescriptor::property("Name", ShapeId::STRING));
    let order = shapes.register_struct(order);
    let mut dto = StructShape::new("OrderDto");
    dto.members.push(MemberDescriptor::property("Id", ShapeId::I64));
    dto.members.push(MemberDescriptor::property("Name", ShapeId::STRING));
    let dto = shapes.register_struct(dto);
    let shapes = Arc::new(shapes);
    let mapper = Mapper::new(shapes.clone(), MapperConfig::new()).unwrap();

    let src = shapes.object(order, &[("Id", Value::Int(1)), ("Name", Value::str("a"))]);
    mapper.convert(order, dto, &src).unwrap();

    // `Stub` has fewer slots than the procedure's fetches expect.
    let foreign = shapes.object(stub, &[("Id", Value::Int(2))]);
    let err = mapper.convert(order, dto, &foreign).unwrap_err();
    assert_eq!(
        err,
        MapError::Runtime(RuntimeError::ValueShapeMismatch {
            expected: "Order".into(),
            found: "object",
        })
    );
}

/// A null source converts to a null destination.
#[test]
fn test_null_source_converts_to_null() {
    let fx = fixture();
    let mapper = Mapper::new(fx.shapes.clone(), MapperConfig::new()).unwrap();

    assert_eq!(mapper.convert(fx.order, fx.dto, &Value::Null).unwrap(), Value::Null);
}
