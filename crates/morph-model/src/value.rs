//! Runtime value representation for the Morph object mapper.
//!
//! Defines the dynamic `Value` enum that conversion procedures consume and
//! produce, the shared-mutable object handle `ObjRef`, and the `Const`
//! subset used wherever a value must live inside shared configuration.
//!
//! Objects have reference semantics: cloning a `Value::Object` clones the
//! handle, not the object. Two object values are equal only when they are
//! the same object. Everything else compares structurally.
//!
//! `Value` is deliberately not `Send`: each thread builds and converts its
//! own values. Only the mapper itself (shapes, settings, compiled
//! procedures) is shared across threads, which is why closures stored in
//! shared state capture `Const`, never `Value`.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::shape::{Primitive, Shape, ShapeId, ShapeRegistry};

// ── Value ───────────────────────────────────────────────────────────────────

/// A dynamic runtime value.
///
/// Numeric values are stored in canonical widths (`i64`, `u64`, `f64`); the
/// declared shape records the logical width, and conversion procedures
/// re-narrow on assignment. `Null` doubles as the absent case of optional
/// shapes and the default for reference shapes (strings, objects,
/// collections).
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    /// A signed integer, canonically widened to `i64`.
    Int(i64),
    /// An unsigned integer, canonically widened to `u64`.
    UInt(u64),
    /// A floating-point number, canonically widened to `f64`.
    Float(f64),
    String(String),
    /// An enum constant: the enum shape plus a variant index into it.
    Enum(EnumValue),
    /// A handle to a shared, mutable object.
    Object(ObjRef),
    /// A growable sequence of values.
    List(Vec<Value>),
    /// A fixed-shape rectangular array of rank >= 1.
    Array(ArrayValue),
    /// A string-keyed map with stable insertion order.
    Map(MapValue),
}

/// An enum constant: a variant of a registered enum shape.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EnumValue {
    /// The enum shape this constant belongs to.
    pub shape: ShapeId,
    /// Index into the shape's variant list (not the underlying value).
    pub variant: u32,
}

impl Value {
    /// Convenience constructor for string values.
    pub fn str(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    /// Short name of the value's kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Enum(_) => "enum",
            Value::Object(_) => "object",
            Value::List(_) => "list",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayValue> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapValue> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// The default value a freshly constructed slot of `shape` holds.
    ///
    /// Numerics default to zero, booleans to false, enums to the variant
    /// whose underlying value is zero (or `Null` when there is none).
    /// Strings, objects, collections, optionals, and `Any` default to
    /// `Null` -- they are reference shapes.
    pub fn default_of(shape: ShapeId, shapes: &ShapeRegistry) -> Value {
        match shapes.get(shape) {
            Shape::Primitive(p) => Const::zero_of(*p).to_value(),
            Shape::Optional(_) => Value::Null,
            Shape::Enum(e) => match e.variant_by_value(0) {
                Some(variant) => Value::Enum(EnumValue { shape, variant }),
                None => Value::Null,
            },
            Shape::Struct(_)
            | Shape::List(_)
            | Shape::Array { .. }
            | Shape::Map { .. }
            | Shape::Any => Value::Null,
        }
    }
}

impl PartialEq for Value {
    /// Structural equality, except objects, which compare by identity.
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

// ── Objects ─────────────────────────────────────────────────────────────────

/// The storage behind an object handle: its shape and one slot per member,
/// in member declaration order.
#[derive(Debug)]
pub struct ObjectData {
    pub shape: ShapeId,
    pub slots: Vec<Value>,
}

impl ObjectData {
    pub fn new(shape: ShapeId, slots: Vec<Value>) -> ObjectData {
        ObjectData { shape, slots }
    }
}

/// A shared, mutable object handle.
///
/// Handles clone cheaply and alias the same storage; object identity is
/// handle identity. The `Debug` impl prints only the shape so that cyclic
/// object graphs can be formatted.
#[derive(Clone)]
pub struct ObjRef(Rc<RefCell<ObjectData>>);

impl ObjRef {
    pub fn new(data: ObjectData) -> ObjRef {
        ObjRef(Rc::new(RefCell::new(data)))
    }

    /// Stable address of the underlying storage, used as an identity key.
    pub fn ptr_id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// True when both handles refer to the same object.
    pub fn ptr_eq(&self, other: &ObjRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn borrow(&self) -> Ref<'_, ObjectData> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, ObjectData> {
        self.0.borrow_mut()
    }

    /// The object's runtime shape.
    pub fn shape(&self) -> ShapeId {
        self.0.borrow().shape
    }

    /// Read a member slot by name, resolved against the object's shape.
    pub fn member(&self, shapes: &ShapeRegistry, name: &str) -> Option<Value> {
        let data = self.0.borrow();
        let s = shapes.struct_shape(data.shape)?;
        let idx = s.member_index(name)?;
        data.slots.get(idx).cloned()
    }

    /// Write a member slot by name. Returns false when the shape has no
    /// such member.
    pub fn set_member(&self, shapes: &ShapeRegistry, name: &str, value: Value) -> bool {
        let mut data = self.0.borrow_mut();
        let idx = match shapes.struct_shape(data.shape).and_then(|s| s.member_index(name)) {
            Some(idx) => idx,
            None => return false,
        };
        data.slots[idx] = value;
        true
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Shape only: slot contents may contain this object again.
        write!(f, "ObjRef(shape #{})", self.0.borrow().shape.index())
    }
}

// ── Arrays ──────────────────────────────────────────────────────────────────

/// A rectangular array of rank >= 1, stored flat in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayValue {
    /// Length along each dimension; `dims.len()` is the rank.
    pub dims: Vec<usize>,
    /// Flat row-major element storage; `elems.len()` is the product of `dims`.
    pub elems: Vec<Value>,
}

impl ArrayValue {
    pub fn new(dims: Vec<usize>, elems: Vec<Value>) -> ArrayValue {
        debug_assert_eq!(dims.iter().product::<usize>(), elems.len());
        ArrayValue { dims, elems }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Row-major flat offset of a multi-index, or `None` when any component
    /// is out of bounds or the rank disagrees.
    pub fn offset(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.dims.len() {
            return None;
        }
        let mut flat = 0usize;
        for (i, d) in index.iter().zip(&self.dims) {
            if i >= d {
                return None;
            }
            flat = flat * d + i;
        }
        Some(flat)
    }

    pub fn get(&self, index: &[usize]) -> Option<&Value> {
        self.offset(index).map(|flat| &self.elems[flat])
    }
}

// ── Maps ────────────────────────────────────────────────────────────────────

/// A string-keyed map preserving insertion order.
///
/// Entry count stays small in mapping workloads, so lookup is a linear
/// scan rather than a hash table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapValue {
    entries: Vec<(String, Value)>,
}

impl MapValue {
    pub fn new() -> MapValue {
        MapValue { entries: Vec::new() }
    }

    pub fn from_entries(entries: Vec<(String, Value)>) -> MapValue {
        let mut map = MapValue::new();
        for (k, v) in entries {
            map.insert(k, v);
        }
        map
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Insert or replace, keeping the original position on replace.
    pub fn insert(&mut self, key: String, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// ── Constants ───────────────────────────────────────────────────────────────

/// The scalar subset of `Value` that is `Send + Sync`.
///
/// Shared state -- member source constants, constructor parameter defaults,
/// null substitutes -- stores `Const` and materializes a `Value` per call.
#[derive(Clone, Debug, PartialEq)]
pub enum Const {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Enum(EnumValue),
}

impl Const {
    /// Convenience constructor for string constants.
    pub fn str(s: impl Into<String>) -> Const {
        Const::Str(s.into())
    }

    /// The zero default for a primitive shape. String is a reference
    /// primitive and defaults to `Null`.
    pub fn zero_of(p: Primitive) -> Const {
        match p {
            Primitive::Bool => Const::Bool(false),
            Primitive::I8 | Primitive::I16 | Primitive::I32 | Primitive::I64 => Const::Int(0),
            Primitive::U8 | Primitive::U16 | Primitive::U32 | Primitive::U64 => Const::UInt(0),
            Primitive::F32 | Primitive::F64 => Const::Float(0.0),
            Primitive::String => Const::Null,
        }
    }

    /// Materialize the constant as a runtime value.
    pub fn to_value(&self) -> Value {
        match self {
            Const::Null => Value::Null,
            Const::Bool(b) => Value::Bool(*b),
            Const::Int(n) => Value::Int(*n),
            Const::UInt(n) => Value::UInt(*n),
            Const::Float(n) => Value::Float(*n),
            Const::Str(s) => Value::String(s.clone()),
            Const::Enum(e) => Value::Enum(*e),
        }
    }
}
