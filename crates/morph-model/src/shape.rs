//! Shape descriptions and the shape registry.
//!
//! A `Shape` describes the structure of values at one level: primitives,
//! optionals, enums, structs with members, lists, rectangular arrays, maps,
//! and the dynamic `Any` shape. Shapes live in an append-only
//! `ShapeRegistry` and are referred to by `ShapeId` everywhere else, so
//! recursive shapes (a struct containing itself) need no special casing.
//!
//! The registry is built up-front by the host, then frozen by moving it
//! into an `Arc` when the mapper is constructed. Composite wrappers
//! (optionals, lists, arrays, maps) are interned so that structurally equal
//! wrappers share one id; structs and enums are nominal and every
//! registration mints a fresh id.

use std::fmt::Write as _;

use rustc_hash::FxHashMap;

use crate::member::{ConstructorDescriptor, GetterDescriptor, MemberDescriptor};
use crate::value::Value;

// ── Shape identifiers ───────────────────────────────────────────────────────

/// An interned shape identifier: an index into the registry's shape table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(u32);

impl ShapeId {
    pub const BOOL: ShapeId = ShapeId(0);
    pub const I8: ShapeId = ShapeId(1);
    pub const I16: ShapeId = ShapeId(2);
    pub const I32: ShapeId = ShapeId(3);
    pub const I64: ShapeId = ShapeId(4);
    pub const U8: ShapeId = ShapeId(5);
    pub const U16: ShapeId = ShapeId(6);
    pub const U32: ShapeId = ShapeId(7);
    pub const U64: ShapeId = ShapeId(8);
    pub const F32: ShapeId = ShapeId(9);
    pub const F64: ShapeId = ShapeId(10);
    pub const STRING: ShapeId = ShapeId(11);
    /// The dynamic shape: any runtime value.
    pub const ANY: ShapeId = ShapeId(12);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A primitive scalar shape.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    String,
}

impl Primitive {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Primitive::I8
                | Primitive::I16
                | Primitive::I32
                | Primitive::I64
                | Primitive::U8
                | Primitive::U16
                | Primitive::U32
                | Primitive::U64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Primitive::F32 | Primitive::F64)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Bool => "Bool",
            Primitive::I8 => "Int8",
            Primitive::I16 => "Int16",
            Primitive::I32 => "Int32",
            Primitive::I64 => "Int64",
            Primitive::U8 => "UInt8",
            Primitive::U16 => "UInt16",
            Primitive::U32 => "UInt32",
            Primitive::U64 => "UInt64",
            Primitive::F32 => "Float32",
            Primitive::F64 => "Float64",
            Primitive::String => "String",
        }
    }
}

/// All primitives, in the order the registry pre-interns them.
const PRIMITIVES: [Primitive; 12] = [
    Primitive::Bool,
    Primitive::I8,
    Primitive::I16,
    Primitive::I32,
    Primitive::I64,
    Primitive::U8,
    Primitive::U16,
    Primitive::U32,
    Primitive::U64,
    Primitive::F32,
    Primitive::F64,
    Primitive::String,
];

// ── Shapes ──────────────────────────────────────────────────────────────────

/// One level of value structure.
#[derive(Debug)]
pub enum Shape {
    Primitive(Primitive),
    /// A nullable wrapper around another shape.
    Optional(ShapeId),
    Enum(EnumShape),
    Struct(StructShape),
    /// A growable sequence with one element shape.
    List(ShapeId),
    /// A rectangular array with a fixed rank.
    Array { elem: ShapeId, rank: u32 },
    /// A string-keyed map with one value shape.
    Map { value: ShapeId },
    /// The dynamic shape: matches any runtime value.
    Any,
}

/// A named enum shape: variants with names and underlying integer values.
#[derive(Debug)]
pub struct EnumShape {
    pub name: String,
    pub variants: Vec<EnumVariant>,
}

#[derive(Debug)]
pub struct EnumVariant {
    pub name: String,
    pub value: i64,
}

impl EnumShape {
    pub fn new(name: impl Into<String>, variants: Vec<(&str, i64)>) -> EnumShape {
        EnumShape {
            name: name.into(),
            variants: variants
                .into_iter()
                .map(|(name, value)| EnumVariant { name: name.into(), value })
                .collect(),
        }
    }

    /// Variant index by exact name.
    pub fn variant_index(&self, name: &str) -> Option<u32> {
        self.variants.iter().position(|v| v.name == name).map(|i| i as u32)
    }

    /// Variant index by underlying value; first declaration wins on
    /// duplicates.
    pub fn variant_by_value(&self, value: i64) -> Option<u32> {
        self.variants.iter().position(|v| v.value == value).map(|i| i as u32)
    }

    pub fn variant(&self, index: u32) -> Option<&EnumVariant> {
        self.variants.get(index as usize)
    }
}

/// A named struct shape: members in declaration order (the member index is
/// the object's slot index), plus getters and constructors.
#[derive(Debug)]
pub struct StructShape {
    pub name: String,
    pub members: Vec<MemberDescriptor>,
    pub getters: Vec<GetterDescriptor>,
    pub constructors: Vec<ConstructorDescriptor>,
}

impl StructShape {
    pub fn new(name: impl Into<String>) -> StructShape {
        StructShape {
            name: name.into(),
            members: Vec::new(),
            getters: Vec::new(),
            constructors: Vec::new(),
        }
    }

    /// Slot index of a member by exact name.
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }

    pub fn member(&self, name: &str) -> Option<&MemberDescriptor> {
        self.member_index(name).map(|i| &self.members[i])
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

/// Interning key for composite wrapper shapes.
#[derive(PartialEq, Eq, Hash)]
enum CompositeKey {
    Optional(ShapeId),
    List(ShapeId),
    Array(ShapeId, u32),
    Map(ShapeId),
}

/// The append-only shape table.
///
/// Ids are dense indices; primitives and `Any` are pre-interned at fixed
/// ids (`ShapeId::BOOL` .. `ShapeId::ANY`).
pub struct ShapeRegistry {
    shapes: Vec<Shape>,
    composites: FxHashMap<CompositeKey, ShapeId>,
}

impl Default for ShapeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ShapeRegistry {
    pub fn new() -> ShapeRegistry {
        let mut shapes = Vec::with_capacity(16);
        for p in PRIMITIVES {
            shapes.push(Shape::Primitive(p));
        }
        shapes.push(Shape::Any);
        ShapeRegistry { shapes, composites: FxHashMap::default() }
    }

    /// Look up a shape by id. Ids are only minted by this registry, so an
    /// out-of-range id is a caller bug and panics.
    pub fn get(&self, id: ShapeId) -> &Shape {
        &self.shapes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        false // primitives are always present
    }

    /// The fixed id of a primitive shape.
    pub fn primitive(&self, p: Primitive) -> ShapeId {
        match p {
            Primitive::Bool => ShapeId::BOOL,
            Primitive::I8 => ShapeId::I8,
            Primitive::I16 => ShapeId::I16,
            Primitive::I32 => ShapeId::I32,
            Primitive::I64 => ShapeId::I64,
            Primitive::U8 => ShapeId::U8,
            Primitive::U16 => ShapeId::U16,
            Primitive::U32 => ShapeId::U32,
            Primitive::U64 => ShapeId::U64,
            Primitive::F32 => ShapeId::F32,
            Primitive::F64 => ShapeId::F64,
            Primitive::String => ShapeId::STRING,
        }
    }

    fn intern(&mut self, key: CompositeKey, make: impl FnOnce() -> Shape) -> ShapeId {
        if let Some(&id) = self.composites.get(&key) {
            return id;
        }
        let id = self.push(make());
        self.composites.insert(key, id);
        id
    }

    fn push(&mut self, shape: Shape) -> ShapeId {
        let id = ShapeId(self.shapes.len() as u32);
        self.shapes.push(shape);
        id
    }

    /// Intern `Optional(inner)`. Already-optional inner shapes are returned
    /// unchanged, so optionals never nest.
    pub fn optional(&mut self, inner: ShapeId) -> ShapeId {
        if matches!(self.get(inner), Shape::Optional(_)) {
            return inner;
        }
        self.intern(CompositeKey::Optional(inner), || Shape::Optional(inner))
    }

    /// Intern a list shape with the given element shape.
    pub fn list_of(&mut self, elem: ShapeId) -> ShapeId {
        self.intern(CompositeKey::List(elem), || Shape::List(elem))
    }

    /// Intern an array shape with the given element shape and rank (>= 1).
    pub fn array_of(&mut self, elem: ShapeId, rank: u32) -> ShapeId {
        debug_assert!(rank >= 1);
        self.intern(CompositeKey::Array(elem, rank), || Shape::Array { elem, rank })
    }

    /// Intern a string-keyed map shape with the given value shape.
    pub fn map_of(&mut self, value: ShapeId) -> ShapeId {
        self.intern(CompositeKey::Map(value), || Shape::Map { value })
    }

    /// Register a nominal struct shape. Each call mints a fresh id.
    pub fn register_struct(&mut self, shape: StructShape) -> ShapeId {
        self.push(Shape::Struct(shape))
    }

    /// Mint an id for a struct before its body is known. Members can then
    /// mention the id, which is how self-referential and mutually recursive
    /// shapes are declared; `define_struct` fills the body in afterwards.
    pub fn declare_struct(&mut self, name: &str) -> ShapeId {
        self.push(Shape::Struct(StructShape::new(name)))
    }

    /// Install the body of a previously declared struct.
    ///
    /// Panics if `id` does not name a struct or if the body carries a
    /// different name than the declaration.
    pub fn define_struct(&mut self, id: ShapeId, shape: StructShape) {
        match self.shapes.get_mut(id.index()) {
            Some(Shape::Struct(slot)) => {
                assert_eq!(slot.name, shape.name, "define_struct renames `{}`", slot.name);
                *slot = shape;
            }
            _ => panic!("define_struct on a non-struct id"),
        }
    }

    /// Register a nominal enum shape. Each call mints a fresh id.
    pub fn register_enum(&mut self, shape: EnumShape) -> ShapeId {
        self.push(Shape::Enum(shape))
    }

    pub fn struct_shape(&self, id: ShapeId) -> Option<&StructShape> {
        match self.get(id) {
            Shape::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn enum_shape(&self, id: ShapeId) -> Option<&EnumShape> {
        match self.get(id) {
            Shape::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// Strip one `Optional` layer, if present.
    pub fn unwrap_optional(&self, id: ShapeId) -> ShapeId {
        match self.get(id) {
            Shape::Optional(inner) => *inner,
            _ => id,
        }
    }

    pub fn is_optional(&self, id: ShapeId) -> bool {
        matches!(self.get(id), Shape::Optional(_))
    }

    /// Human-readable name of a shape, for diagnostics.
    pub fn display(&self, id: ShapeId) -> String {
        let mut out = String::new();
        self.write_display(id, &mut out);
        out
    }

    fn write_display(&self, id: ShapeId, out: &mut String) {
        match self.get(id) {
            Shape::Primitive(p) => out.push_str(p.name()),
            Shape::Optional(inner) => {
                self.write_display(*inner, out);
                out.push('?');
            }
            Shape::Enum(e) => out.push_str(&e.name),
            Shape::Struct(s) => out.push_str(&s.name),
            Shape::List(elem) => {
                out.push_str("List<");
                self.write_display(*elem, out);
                out.push('>');
            }
            Shape::Array { elem, rank } => {
                self.write_display(*elem, out);
                out.push('[');
                for _ in 1..*rank {
                    out.push(',');
                }
                out.push(']');
            }
            Shape::Map { value } => {
                out.push_str("Map<String, ");
                self.write_display(*value, out);
                out.push('>');
            }
            Shape::Any => out.push_str("Any"),
        }
    }

    /// Render a source/destination pair for diagnostics, e.g.
    /// `Order -> OrderDto`.
    pub fn display_pair(&self, src: ShapeId, dst: ShapeId) -> String {
        let mut out = String::new();
        self.write_display(src, &mut out);
        let _ = write!(out, " -> ");
        self.write_display(dst, &mut out);
        out
    }

    // ── Object construction ─────────────────────────────────────────────

    /// Build an object of a struct shape with every slot at its default.
    ///
    /// Panics when `shape` is not a struct; object construction against a
    /// non-struct shape is a caller bug.
    pub fn new_object(&self, shape: ShapeId) -> Value {
        let s = match self.get(shape) {
            Shape::Struct(s) => s,
            other => panic!("new_object on non-struct shape {other:?}"),
        };
        let slots = s
            .members
            .iter()
            .map(|m| Value::default_of(m.shape, self))
            .collect();
        Value::Object(crate::value::ObjRef::new(crate::value::ObjectData::new(shape, slots)))
    }

    /// Build an object with the named members set and the rest defaulted.
    ///
    /// Panics on an unknown member name.
    pub fn object(&self, shape: ShapeId, fields: &[(&str, Value)]) -> Value {
        let value = self.new_object(shape);
        let obj = match &value {
            Value::Object(o) => o,
            _ => unreachable!(),
        };
        for (name, field) in fields {
            if !obj.set_member(self, name, field.clone()) {
                panic!("shape `{}` has no member `{name}`", self.display(shape));
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::MemberDescriptor;

    #[test]
    fn composite_shapes_are_interned() {
        let mut reg = ShapeRegistry::new();
        let a = reg.list_of(ShapeId::I32);
        let b = reg.list_of(ShapeId::I32);
        let c = reg.list_of(ShapeId::I64);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let m1 = reg.map_of(ShapeId::STRING);
        let m2 = reg.map_of(ShapeId::STRING);
        assert_eq!(m1, m2);

        let r1 = reg.array_of(ShapeId::F64, 2);
        let r2 = reg.array_of(ShapeId::F64, 2);
        let r3 = reg.array_of(ShapeId::F64, 3);
        assert_eq!(r1, r2);
        assert_ne!(r1, r3);
    }

    #[test]
    fn optionals_do_not_nest() {
        let mut reg = ShapeRegistry::new();
        let opt = reg.optional(ShapeId::I32);
        let opt_opt = reg.optional(opt);
        assert_eq!(opt, opt_opt);
        assert_eq!(reg.unwrap_optional(opt), ShapeId::I32);
    }

    #[test]
    fn structs_are_nominal() {
        let mut reg = ShapeRegistry::new();
        let a = reg.register_struct(StructShape::new("Point"));
        let b = reg.register_struct(StructShape::new("Point"));
        assert_ne!(a, b);
    }

    #[test]
    fn display_names() {
        let mut reg = ShapeRegistry::new();
        let opt = reg.optional(ShapeId::I32);
        let list = reg.list_of(opt);
        let arr = reg.array_of(ShapeId::F64, 2);
        let map = reg.map_of(ShapeId::ANY);
        let e = reg.register_enum(EnumShape::new("Color", vec![("Red", 0), ("Green", 1)]));

        assert_eq!(reg.display(ShapeId::I32), "Int32");
        assert_eq!(reg.display(opt), "Int32?");
        assert_eq!(reg.display(list), "List<Int32?>");
        assert_eq!(reg.display(arr), "Float64[,]");
        assert_eq!(reg.display(map), "Map<String, Any>");
        assert_eq!(reg.display(e), "Color");
        assert_eq!(reg.display_pair(ShapeId::I32, e), "Int32 -> Color");
    }

    #[test]
    fn object_builder_sets_named_members() {
        let mut reg = ShapeRegistry::new();
        let mut shape = StructShape::new("Point");
        shape.members.push(MemberDescriptor::field("X", ShapeId::I64));
        shape.members.push(MemberDescriptor::field("Y", ShapeId::I64));
        let id = reg.register_struct(shape);

        let value = reg.object(id, &[("Y", Value::Int(7))]);
        let obj = value.as_object().unwrap();
        assert_eq!(obj.member(&reg, "X"), Some(Value::Int(0)));
        assert_eq!(obj.member(&reg, "Y"), Some(Value::Int(7)));
    }

    #[test]
    fn declared_structs_can_mention_themselves() {
        let mut reg = ShapeRegistry::new();
        let node = reg.declare_struct("Node");
        let mut body = StructShape::new("Node");
        body.members.push(MemberDescriptor::property("Label", ShapeId::STRING));
        body.members.push(MemberDescriptor::property("Next", node));
        reg.define_struct(node, body);

        assert_eq!(reg.struct_shape(node).unwrap().members[1].shape, node);
        let value = reg.new_object(node);
        let obj = value.as_object().unwrap();
        assert_eq!(obj.member(&reg, "Next"), Some(Value::Null));
    }

    #[test]
    #[should_panic(expected = "non-struct id")]
    fn define_struct_rejects_other_shapes() {
        let mut reg = ShapeRegistry::new();
        reg.define_struct(ShapeId::I32, StructShape::new("Int32"));
    }
}
