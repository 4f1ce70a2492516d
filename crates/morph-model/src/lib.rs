//! Dynamic value and shape model for the Morph object mapper.
//!
//! This crate defines the data the mapping engine operates on, with no
//! mapping logic of its own:
//!
//! - [`value`]: the runtime `Value` enum, object handles, and the
//!   `Send + Sync` constant subset `Const`
//! - [`shape`]: shape descriptions and the interning `ShapeRegistry`
//! - [`member`]: member, getter, and constructor descriptors for structs
//!
//! The registry is built by the host, frozen into an `Arc`, and shared by
//! every compiled conversion procedure.

pub mod member;
pub mod shape;
pub mod value;

pub use member::{
    AccessModifier, ConstructorDescriptor, GetterDescriptor, GetterFn, MemberDescriptor,
    MemberOrigin, ParamDescriptor,
};
pub use shape::{EnumShape, EnumVariant, Primitive, Shape, ShapeId, ShapeRegistry, StructShape};
pub use value::{ArrayValue, Const, EnumValue, MapValue, ObjRef, ObjectData, Value};
