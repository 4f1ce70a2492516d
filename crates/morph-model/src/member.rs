//! Member, getter, and constructor descriptors for struct shapes.

use std::fmt;
use std::sync::Arc;

use crate::shape::ShapeId;
use crate::value::{Const, ObjectData, Value};

/// Who may read or write a member.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AccessModifier {
    Public,
    Protected,
    Private,
}

/// Where a member came from on the original type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemberOrigin {
    Field,
    Property,
    /// Declared only through a constructor parameter.
    CtorParam,
}

/// One data member of a struct shape. The member's index in
/// `StructShape::members` is the object's slot index.
#[derive(Clone, Debug)]
pub struct MemberDescriptor {
    pub name: String,
    pub shape: ShapeId,
    pub access: AccessModifier,
    pub origin: MemberOrigin,
}

impl MemberDescriptor {
    /// A public field member.
    pub fn field(name: impl Into<String>, shape: ShapeId) -> MemberDescriptor {
        MemberDescriptor {
            name: name.into(),
            shape,
            access: AccessModifier::Public,
            origin: MemberOrigin::Field,
        }
    }

    /// A public property member.
    pub fn property(name: impl Into<String>, shape: ShapeId) -> MemberDescriptor {
        MemberDescriptor {
            name: name.into(),
            shape,
            access: AccessModifier::Public,
            origin: MemberOrigin::Property,
        }
    }

    pub fn with_access(mut self, access: AccessModifier) -> MemberDescriptor {
        self.access = access;
        self
    }

    pub fn is_public(&self) -> bool {
        self.access == AccessModifier::Public
    }
}

/// A computed accessor on a struct shape.
pub type GetterFn = Arc<dyn Fn(&ObjectData) -> Value + Send + Sync>;

/// A parameterless accessor method, e.g. `GetTotal`. Member resolution
/// strips the `Get` prefix and matches the rest against destination member
/// names.
#[derive(Clone)]
pub struct GetterDescriptor {
    /// Full method name, including the `Get` prefix.
    pub name: String,
    /// Shape of the value the getter returns.
    pub result: ShapeId,
    pub func: GetterFn,
}

impl GetterDescriptor {
    pub fn new(
        name: impl Into<String>,
        result: ShapeId,
        func: impl Fn(&ObjectData) -> Value + Send + Sync + 'static,
    ) -> GetterDescriptor {
        GetterDescriptor { name: name.into(), result, func: Arc::new(func) }
    }
}

impl fmt::Debug for GetterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetterDescriptor")
            .field("name", &self.name)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}

/// A constructor overload on a struct shape.
#[derive(Clone, Debug)]
pub struct ConstructorDescriptor {
    pub access: AccessModifier,
    pub params: Vec<ParamDescriptor>,
}

impl ConstructorDescriptor {
    pub fn public(params: Vec<ParamDescriptor>) -> ConstructorDescriptor {
        ConstructorDescriptor { access: AccessModifier::Public, params }
    }
}

/// One constructor parameter. An optional parameter carries its declared
/// default as a `Const`.
#[derive(Clone, Debug)]
pub struct ParamDescriptor {
    pub name: String,
    pub shape: ShapeId,
    pub default: Option<Const>,
}

impl ParamDescriptor {
    pub fn required(name: impl Into<String>, shape: ShapeId) -> ParamDescriptor {
        ParamDescriptor { name: name.into(), shape, default: None }
    }

    pub fn optional(name: impl Into<String>, shape: ShapeId, default: Const) -> ParamDescriptor {
        ParamDescriptor { name: name.into(), shape, default: Some(default) }
    }
}
