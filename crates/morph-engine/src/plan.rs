//! The operation tree produced by procedure synthesis.
//!
//! A `Plan` is the compile-time description of one pair's conversion:
//! a tree of `Op` nodes that the lowering pass turns into a closure.
//! Nested conversions of scalar-like shapes are inlined as subtrees;
//! nested struct and collection conversions become `Op::Call` references
//! to other cache slots, declared before they are compiled so that
//! recursive shapes cannot recurse the synthesizer forever.
//!
//! Plans are built and lowered inside the compile lock, then dropped;
//! only the lowered closures live on.

use std::fmt;
use std::sync::Arc;

use morph_model::{Const, GetterFn, Primitive, ShapeId, Value};

use crate::cache::SlotId;
use crate::error::RuntimeError;
use crate::names::NameMatch;
use crate::pair::TypePair;
use crate::settings::{
    ConditionFn, EnumMatchMode, FactoryFn, HookFn, KeyTransformFn, ResolverFn, TransformFn,
};

/// A hand-written conversion supplied by a user strategy.
pub(crate) type CustomFn = Arc<dyn Fn(&Value) -> Result<Value, RuntimeError> + Send + Sync>;

/// A synthesized conversion procedure, pre-lowering.
///
/// Opaque outside the crate: strategies obtain one from the synthesizer
/// rather than building the tree themselves.
pub struct Plan {
    pub(crate) pair: TypePair,
    pub(crate) root: Op,
}

/// One node of the operation tree.
pub(crate) enum Op {
    /// Pass the value through unchanged. Object handles alias.
    Identity,
    /// Produce the destination shape's default, ignoring the input.
    DefaultOf(ShapeId),
    /// Same-shape struct: fresh object, slots cloned one level deep.
    ShallowCopy { dest: ShapeId },
    /// Route nulls before running the inner op: pass them through (optional
    /// destinations) or substitute the destination default.
    NullGate { dest: ShapeId, pass_through: bool, inner: Box<Op> },
    /// Primitive-to-primitive conversion.
    Scalar { from: Primitive, to: Primitive },
    /// Enum constant to its variant name.
    EnumToString { src: ShapeId },
    /// Variant name to enum constant.
    EnumFromString { dest: ShapeId },
    /// Enum constant to enum constant, by name or underlying value.
    EnumToEnum { src: ShapeId, dest: ShapeId, mode: EnumMatchMode },
    /// Enum constant to its underlying integer value.
    EnumToInt { to: Primitive },
    /// Integer to the variant with that underlying value.
    IntToEnum { dest: ShapeId },
    /// Best-effort dynamic conversion, driven by the runtime value kind.
    Coerce { dest: ShapeId },
    /// Invoke another pair's compiled procedure through the cache.
    Call { slot: SlotId, pair: TypePair },
    /// A user-supplied conversion function, opaque to the planner.
    Custom(CustomFn),
    Struct(Box<StructOp>),
    /// List or one-dimensional array conversion.
    Seq(Box<SeqOp>),
    /// Rank-preserving array conversion, any rank.
    NdArray(Box<NdArrayOp>),
    MapToMap(Box<MapToMapOp>),
    StructToMap(Box<StructToMapOp>),
}

/// Struct (or map-sourced struct) construction and member population.
pub(crate) struct StructOp {
    pub pair: TypePair,
    pub dest: ShapeId,
    pub construction: Construction,
    pub members: Vec<MemberOp>,
    pub before: Option<HookFn>,
    pub after: Option<HookFn>,
    /// Depth limit for this pair; exceeding it yields the destination
    /// default instead of recursing.
    pub max_depth: Option<u32>,
    pub preserve_refs: bool,
    /// Derived-shape redirects: runtime source shape to the derived
    /// pair's slot.
    pub includes: Vec<(ShapeId, SlotId)>,
}

/// How the destination object comes into being.
pub(crate) enum Construction {
    /// Default-initialized slots.
    Default,
    /// A user factory over the source value.
    Factory(FactoryFn),
    /// The chosen constructor overload, with one argument op per
    /// parameter.
    Parameterized { ctor: usize, args: Vec<CtorArg> },
}

/// One constructor argument.
pub(crate) struct CtorArg {
    pub param: String,
    /// Slot the parameter's value lands in, when the parameter
    /// corresponds to a member.
    pub dest_slot: Option<usize>,
    pub source: ArgSource,
}

pub(crate) enum ArgSource {
    Fetched { fetch: Fetch, convert: Op },
    /// Declared default of an optional parameter with no resolvable
    /// source.
    Default(Const),
}

/// One destination member assignment.
pub(crate) struct MemberOp {
    pub dest_slot: usize,
    pub dest_name: String,
    pub fetch: Fetch,
    pub convert: Op,
    /// Skip the whole assignment when the predicate is true for the
    /// source value; the slot keeps its prior value.
    pub skip_if: Option<ConditionFn>,
    /// Replaces a null fetched value before conversion.
    pub null_substitute: Option<Const>,
    /// Value transforms for this member's destination shape, applied after
    /// conversion in registration order.
    pub transforms: Vec<TransformFn>,
}

/// How a member's source value is obtained from the source.
pub(crate) enum Fetch {
    /// Read one slot of the source object.
    Slot(usize),
    /// Walk nested slots, outermost first; a null link yields null.
    Path(Vec<usize>),
    /// Invoke a getter on the source object.
    Getter(GetterFn),
    /// Invoke a user resolver on the whole source value.
    Resolver(ResolverFn),
    /// A fixed constant.
    Constant(Const),
    /// Read a key of a source map under the pair's name-matching policy.
    Key { name: String, matcher: NameMatch },
}

/// List or rank-1 array conversion.
pub(crate) struct SeqOp {
    pub elem: Op,
    pub src_kind: SeqKind,
    pub dest_kind: SeqKind,
    /// Clone elements instead of converting them (identical primitive
    /// element shapes).
    pub index_copy: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SeqKind {
    List,
    Array,
}

/// Array-to-array conversion preserving rank and per-dimension bounds.
pub(crate) struct NdArrayOp {
    pub elem: Op,
    pub rank: u32,
    pub index_copy: bool,
}

pub(crate) struct MapToMapOp {
    pub value: Op,
    pub skip_null: bool,
    /// Key rewrite used when merging into an existing map.
    pub key_transform: Option<KeyTransformFn>,
}

/// Each source member becomes a key/value entry.
pub(crate) struct StructToMapOp {
    pub entries: Vec<MapEntryOp>,
    pub skip_null: bool,
}

pub(crate) struct MapEntryOp {
    pub key: String,
    pub fetch: Fetch,
    pub convert: Op,
}

// ── Debug ───────────────────────────────────────────────────────────────────
//
// Closure-holding nodes print a placeholder; the tree structure is what
// matters when a plan shows up in test output.

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Identity => f.write_str("Identity"),
            Op::DefaultOf(shape) => write!(f, "DefaultOf({shape:?})"),
            Op::ShallowCopy { dest } => write!(f, "ShallowCopy({dest:?})"),
            Op::NullGate { dest, pass_through, inner } => f
                .debug_struct("NullGate")
                .field("dest", dest)
                .field("pass_through", pass_through)
                .field("inner", inner)
                .finish(),
            Op::Scalar { from, to } => write!(f, "Scalar({from:?} -> {to:?})"),
            Op::EnumToString { src } => write!(f, "EnumToString({src:?})"),
            Op::EnumFromString { dest } => write!(f, "EnumFromString({dest:?})"),
            Op::EnumToEnum { src, dest, mode } => {
                write!(f, "EnumToEnum({src:?} -> {dest:?}, {mode:?})")
            }
            Op::EnumToInt { to } => write!(f, "EnumToInt({to:?})"),
            Op::IntToEnum { dest } => write!(f, "IntToEnum({dest:?})"),
            Op::Coerce { dest } => write!(f, "Coerce({dest:?})"),
            Op::Call { slot, pair } => write!(f, "Call(slot {slot:?}, {pair:?})"),
            Op::Custom(_) => f.write_str("Custom(<fn>)"),
            Op::Struct(op) => op.fmt(f),
            Op::Seq(op) => op.fmt(f),
            Op::NdArray(op) => op.fmt(f),
            Op::MapToMap(op) => op.fmt(f),
            Op::StructToMap(op) => op.fmt(f),
        }
    }
}

impl fmt::Debug for StructOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Struct")
            .field("pair", &self.pair)
            .field("construction", &self.construction)
            .field("members", &self.members)
            .field("max_depth", &self.max_depth)
            .field("preserve_refs", &self.preserve_refs)
            .field("includes", &self.includes)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Construction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Construction::Default => f.write_str("Default"),
            Construction::Factory(_) => f.write_str("Factory(<fn>)"),
            Construction::Parameterized { ctor, args } => f
                .debug_struct("Parameterized")
                .field("ctor", ctor)
                .field("args", args)
                .finish(),
        }
    }
}

impl fmt::Debug for CtorArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CtorArg")
            .field("param", &self.param)
            .field("dest_slot", &self.dest_slot)
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Debug for ArgSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgSource::Fetched { fetch, convert } => f
                .debug_struct("Fetched")
                .field("fetch", fetch)
                .field("convert", convert)
                .finish(),
            ArgSource::Default(c) => write!(f, "Default({c:?})"),
        }
    }
}

impl fmt::Debug for MemberOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("dest", &self.dest_name)
            .field("fetch", &self.fetch)
            .field("convert", &self.convert)
            .field("conditional", &self.skip_if.is_some())
            .field("null_substitute", &self.null_substitute)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Fetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fetch::Slot(i) => write!(f, "Slot({i})"),
            Fetch::Path(path) => write!(f, "Path({path:?})"),
            Fetch::Getter(_) => f.write_str("Getter(<fn>)"),
            Fetch::Resolver(_) => f.write_str("Resolver(<fn>)"),
            Fetch::Constant(c) => write!(f, "Constant({c:?})"),
            Fetch::Key { name, .. } => write!(f, "Key({name:?})"),
        }
    }
}

impl fmt::Debug for SeqOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seq")
            .field("src", &self.src_kind)
            .field("dest", &self.dest_kind)
            .field("index_copy", &self.index_copy)
            .field("elem", &self.elem)
            .finish()
    }
}

impl fmt::Debug for NdArrayOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NdArray")
            .field("rank", &self.rank)
            .field("index_copy", &self.index_copy)
            .field("elem", &self.elem)
            .finish()
    }
}

impl fmt::Debug for MapToMapOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapToMap")
            .field("skip_null", &self.skip_null)
            .field("keyed", &self.key_transform.is_some())
            .field("value", &self.value)
            .finish()
    }
}

impl fmt::Debug for StructToMapOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructToMap")
            .field("skip_null", &self.skip_null)
            .field("entries", &self.entries)
            .finish()
    }
}

impl fmt::Debug for MapEntryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("fetch", &self.fetch)
            .field("convert", &self.convert)
            .finish()
    }
}
