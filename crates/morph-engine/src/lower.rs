//! Lowering: turning an operation tree into an invocable procedure.
//!
//! Each `Op` lowers to an `Arc` closure over `(&Value, &mut ConvCtx)`.
//! Lowering happens once per pair, inside the compile lock; the closures
//! are then invoked many times from any thread. Closures capture only
//! `Send + Sync` data (shape ids, `Const`s, user function handles) and
//! reach runtime shape tables through the context, never through captured
//! `Value`s.
//!
//! Composite ops lower to a small struct holding their precompiled parts,
//! with one method per mapping kind, so the new-instance and populate
//! forms share the member logic.

use std::sync::Arc;

use morph_model::{
    ArrayValue, Const, EnumValue, GetterFn, MapValue, ObjRef, ObjectData, Primitive, ShapeId,
    ShapeRegistry, Value,
};

use crate::cache::{Compiled, ConvertFn, PopulateFn, SlotId};
use crate::context::ConvCtx;
use crate::error::RuntimeError;
use crate::names::NameMatch;
use crate::pair::{MappingKind, TypePair};
use crate::plan::{
    ArgSource, Construction, Fetch, MapEntryOp, MapToMapOp, MemberOp, NdArrayOp, Op, Plan, SeqKind,
    SeqOp, StructOp, StructToMapOp,
};
use crate::settings::{
    ConditionFn, EnumMatchMode, FactoryFn, HookFn, KeyTransformFn, ResolverFn, TransformFn,
};

/// Lower a plan into the cached artifact for its mapping kind.
pub(crate) fn lower(plan: &Plan) -> Compiled {
    match plan.pair.kind {
        MappingKind::NewInstance | MappingKind::Projection => {
            Compiled::Convert(lower_op(&plan.root))
        }
        MappingKind::PopulateExisting => Compiled::Populate(lower_populate(&plan.root)),
    }
}

/// Lower one op into a new-instance conversion closure.
fn lower_op(op: &Op) -> Arc<ConvertFn> {
    match op {
        Op::Identity => Arc::new(|v, _| Ok(v.clone())),
        Op::DefaultOf(shape) => {
            let shape = *shape;
            Arc::new(move |_, ctx| Ok(Value::default_of(shape, ctx.shapes)))
        }
        Op::ShallowCopy { dest } => {
            let dest = *dest;
            Arc::new(move |v, _| shallow_copy(v, dest))
        }
        Op::NullGate { dest, pass_through, inner } => {
            let dest = *dest;
            let pass = *pass_through;
            let inner = lower_op(inner);
            Arc::new(move |v, ctx| {
                if v.is_null() {
                    if pass {
                        Ok(Value::Null)
                    } else {
                        Ok(Value::default_of(dest, ctx.shapes))
                    }
                } else {
                    inner(v, ctx)
                }
            })
        }
        Op::Scalar { from, to } => lower_scalar(*from, *to),
        Op::EnumToString { .. } => Arc::new(|v, ctx| enum_to_string(v, ctx.shapes)),
        Op::EnumFromString { dest } => {
            let dest = *dest;
            Arc::new(move |v, ctx| enum_from_string(v, dest, ctx.shapes))
        }
        Op::EnumToEnum { dest, mode, .. } => {
            let dest = *dest;
            let mode = *mode;
            Arc::new(move |v, ctx| enum_to_enum(v, dest, mode, ctx.shapes))
        }
        Op::EnumToInt { to } => {
            let to = *to;
            Arc::new(move |v, ctx| enum_to_int(v, to, ctx.shapes))
        }
        Op::IntToEnum { dest } => {
            let dest = *dest;
            Arc::new(move |v, ctx| int_to_enum(v, dest, ctx.shapes))
        }
        Op::Coerce { dest } => {
            let dest = *dest;
            Arc::new(move |v, ctx| coerce_value(v, dest, ctx.shapes))
        }
        Op::Call { slot, .. } => {
            let slot = *slot;
            Arc::new(move |v, ctx| ctx.invoke(slot, v))
        }
        Op::Custom(f) => {
            let f = f.clone();
            Arc::new(move |v, _| f(v))
        }
        Op::Struct(op) => {
            let ls = Arc::new(LoweredStruct::new(op));
            Arc::new(move |v, ctx| ls.convert(v, ctx))
        }
        Op::Seq(op) => {
            let ls = Arc::new(LoweredSeq::new(op));
            Arc::new(move |v, ctx| ls.convert(v, ctx))
        }
        Op::NdArray(op) => {
            let ls = Arc::new(LoweredNdArray::new(op));
            Arc::new(move |v, ctx| ls.convert(v, ctx))
        }
        Op::MapToMap(op) => {
            let ls = Arc::new(LoweredMapToMap::new(op));
            Arc::new(move |v, ctx| ls.convert(v, ctx))
        }
        Op::StructToMap(op) => {
            let ls = Arc::new(LoweredStructToMap::new(op));
            Arc::new(move |v, ctx| ls.convert(v, ctx))
        }
    }
}

/// Lower a composite root into its populate-existing form. Synthesis only
/// produces populate plans for composite roots.
fn lower_populate(op: &Op) -> Arc<PopulateFn> {
    match op {
        Op::Struct(op) => {
            let ls = Arc::new(LoweredStruct::new(op));
            Arc::new(move |src, dest, ctx| ls.populate(src, dest, ctx))
        }
        Op::Seq(op) => {
            let ls = Arc::new(LoweredSeq::new(op));
            Arc::new(move |src, dest, ctx| ls.populate(src, dest, ctx))
        }
        Op::NdArray(op) => {
            let ls = Arc::new(LoweredNdArray::new(op));
            // Arrays have fixed geometry; populate replaces wholesale.
            Arc::new(move |src, _, ctx| ls.convert(src, ctx))
        }
        Op::MapToMap(op) => {
            let ls = Arc::new(LoweredMapToMap::new(op));
            Arc::new(move |src, dest, ctx| ls.populate(src, dest, ctx))
        }
        Op::StructToMap(op) => {
            let ls = Arc::new(LoweredStructToMap::new(op));
            Arc::new(move |src, dest, ctx| ls.populate(src, dest, ctx))
        }
        // A user plan claiming a populate pair replaces rather than merges.
        Op::Custom(f) => {
            let f = f.clone();
            Arc::new(move |src, _, _| f(src))
        }
        _ => unreachable!("populate lowering of a non-composite op"),
    }
}

// ── Scalars ─────────────────────────────────────────────────────────────────

fn lower_scalar(from: Primitive, to: Primitive) -> Arc<ConvertFn> {
    use Primitive as P;
    if from == to {
        return Arc::new(|v, _| Ok(v.clone()));
    }
    match (from, to) {
        (f, t) if f.is_numeric() && t.is_numeric() => {
            Arc::new(move |v, _| numeric_cast(v, t))
        }
        (f, P::String) if f.is_numeric() => Arc::new(|v, _| format_number(v)),
        (P::String, t) if t.is_numeric() => Arc::new(move |v, _| parse_number(v, t)),
        (P::Bool, P::String) => Arc::new(|v, _| match v {
            Value::Bool(b) => Ok(Value::String(if *b { "true" } else { "false" }.into())),
            other => Err(mismatch("bool", other)),
        }),
        (P::String, P::Bool) => Arc::new(|v, _| match v {
            Value::String(s) => match s.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(RuntimeError::ParseFailure { value: s.clone(), target: "Bool" }),
            },
            other => Err(mismatch("string", other)),
        }),
        // Synthesis rejects the remaining combinations.
        _ => unreachable!("scalar lowering of {from:?} -> {to:?}"),
    }
}

fn mismatch(expected: &str, found: &Value) -> RuntimeError {
    RuntimeError::ValueShapeMismatch { expected: expected.into(), found: found.kind_name() }
}

fn numeric_cast(v: &Value, to: Primitive) -> Result<Value, RuntimeError> {
    match *v {
        Value::Int(n) => Ok(cast_i64(n, to)),
        Value::UInt(n) => Ok(cast_u64(n, to)),
        Value::Float(n) => Ok(cast_f64(n, to)),
        ref other => Err(mismatch("numeric", other)),
    }
}

// Width changes follow Rust cast semantics: integer narrowing wraps,
// float-to-int saturates.

fn cast_i64(n: i64, to: Primitive) -> Value {
    use Primitive as P;
    match to {
        P::I8 => Value::Int(n as i8 as i64),
        P::I16 => Value::Int(n as i16 as i64),
        P::I32 => Value::Int(n as i32 as i64),
        P::I64 => Value::Int(n),
        P::U8 => Value::UInt(n as u8 as u64),
        P::U16 => Value::UInt(n as u16 as u64),
        P::U32 => Value::UInt(n as u32 as u64),
        P::U64 => Value::UInt(n as u64),
        P::F32 => Value::Float(n as f32 as f64),
        P::F64 => Value::Float(n as f64),
        P::Bool | P::String => unreachable!("non-numeric cast target"),
    }
}

fn cast_u64(n: u64, to: Primitive) -> Value {
    use Primitive as P;
    match to {
        P::I8 => Value::Int(n as i8 as i64),
        P::I16 => Value::Int(n as i16 as i64),
        P::I32 => Value::Int(n as i32 as i64),
        P::I64 => Value::Int(n as i64),
        P::U8 => Value::UInt(n as u8 as u64),
        P::U16 => Value::UInt(n as u16 as u64),
        P::U32 => Value::UInt(n as u32 as u64),
        P::U64 => Value::UInt(n),
        P::F32 => Value::Float(n as f32 as f64),
        P::F64 => Value::Float(n as f64),
        P::Bool | P::String => unreachable!("non-numeric cast target"),
    }
}

fn cast_f64(n: f64, to: Primitive) -> Value {
    use Primitive as P;
    match to {
        P::I8 => Value::Int(n as i8 as i64),
        P::I16 => Value::Int(n as i16 as i64),
        P::I32 => Value::Int(n as i32 as i64),
        P::I64 => Value::Int(n as i64),
        P::U8 => Value::UInt(n as u8 as u64),
        P::U16 => Value::UInt(n as u16 as u64),
        P::U32 => Value::UInt(n as u32 as u64),
        P::U64 => Value::UInt(n as u64),
        P::F32 => Value::Float(n as f32 as f64),
        P::F64 => Value::Float(n),
        P::Bool | P::String => unreachable!("non-numeric cast target"),
    }
}

fn format_number(v: &Value) -> Result<Value, RuntimeError> {
    match v {
        Value::Int(n) => Ok(Value::String(n.to_string())),
        Value::UInt(n) => Ok(Value::String(n.to_string())),
        Value::Float(n) => Ok(Value::String(n.to_string())),
        other => Err(mismatch("numeric", other)),
    }
}

fn parse_number(v: &Value, to: Primitive) -> Result<Value, RuntimeError> {
    use Primitive as P;
    let Value::String(s) = v else {
        return Err(mismatch("string", v));
    };
    let parse_err = || RuntimeError::ParseFailure { value: s.clone(), target: to.name() };
    match to {
        P::I8 | P::I16 | P::I32 | P::I64 => {
            let n: i64 = s.parse().map_err(|_| parse_err())?;
            Ok(cast_i64(n, to))
        }
        P::U8 | P::U16 | P::U32 | P::U64 => {
            let n: u64 = s.parse().map_err(|_| parse_err())?;
            Ok(cast_u64(n, to))
        }
        P::F32 | P::F64 => {
            let n: f64 = s.parse().map_err(|_| parse_err())?;
            Ok(cast_f64(n, to))
        }
        P::Bool | P::String => unreachable!("non-numeric parse target"),
    }
}

// ── Enums ───────────────────────────────────────────────────────────────────

fn enum_to_string(v: &Value, shapes: &ShapeRegistry) -> Result<Value, RuntimeError> {
    let Value::Enum(e) = v else {
        return Err(mismatch("enum", v));
    };
    let variant = shapes
        .enum_shape(e.shape)
        .and_then(|table| table.variant(e.variant))
        .ok_or_else(|| mismatch("enum", v))?;
    Ok(Value::String(variant.name.clone()))
}

fn enum_from_string(
    v: &Value,
    dest: ShapeId,
    shapes: &ShapeRegistry,
) -> Result<Value, RuntimeError> {
    let Value::String(s) = v else {
        return Err(mismatch("string", v));
    };
    let table = shapes.enum_shape(dest).ok_or_else(|| mismatch("enum", v))?;
    match table.variant_index(s) {
        Some(variant) => Ok(Value::Enum(EnumValue { shape: dest, variant })),
        None => Err(RuntimeError::UnknownEnumName {
            name: s.clone(),
            enum_name: table.name.clone(),
        }),
    }
}

fn enum_to_enum(
    v: &Value,
    dest: ShapeId,
    mode: EnumMatchMode,
    shapes: &ShapeRegistry,
) -> Result<Value, RuntimeError> {
    let Value::Enum(e) = v else {
        return Err(mismatch("enum", v));
    };
    let src_variant = shapes
        .enum_shape(e.shape)
        .and_then(|table| table.variant(e.variant))
        .ok_or_else(|| mismatch("enum", v))?;
    let dest_table = shapes.enum_shape(dest).ok_or_else(|| mismatch("enum", v))?;
    let found = match mode {
        EnumMatchMode::ByName => dest_table
            .variant_index(&src_variant.name)
            .or_else(|| dest_table.variant_by_value(src_variant.value)),
        EnumMatchMode::ByValue => dest_table.variant_by_value(src_variant.value),
    };
    match found {
        Some(variant) => Ok(Value::Enum(EnumValue { shape: dest, variant })),
        None => match mode {
            EnumMatchMode::ByName => Err(RuntimeError::UnknownEnumName {
                name: src_variant.name.clone(),
                enum_name: dest_table.name.clone(),
            }),
            EnumMatchMode::ByValue => Err(RuntimeError::NoVariantForValue {
                value: src_variant.value,
                enum_name: dest_table.name.clone(),
            }),
        },
    }
}

fn enum_to_int(v: &Value, to: Primitive, shapes: &ShapeRegistry) -> Result<Value, RuntimeError> {
    let Value::Enum(e) = v else {
        return Err(mismatch("enum", v));
    };
    let variant = shapes
        .enum_shape(e.shape)
        .and_then(|table| table.variant(e.variant))
        .ok_or_else(|| mismatch("enum", v))?;
    Ok(cast_i64(variant.value, to))
}

fn int_to_enum(v: &Value, dest: ShapeId, shapes: &ShapeRegistry) -> Result<Value, RuntimeError> {
    let n = match *v {
        Value::Int(n) => n,
        Value::UInt(n) => n as i64,
        ref other => return Err(mismatch("integer", other)),
    };
    let table = shapes.enum_shape(dest).ok_or_else(|| mismatch("enum", v))?;
    match table.variant_by_value(n) {
        Some(variant) => Ok(Value::Enum(EnumValue { shape: dest, variant })),
        None => Err(RuntimeError::NoVariantForValue { value: n, enum_name: table.name.clone() }),
    }
}

// ── Coercion ────────────────────────────────────────────────────────────────

/// Best-effort conversion driven by the runtime value kind, used for
/// `Any`-typed sources and destinations where no shape-directed procedure
/// exists.
pub(crate) fn coerce_value(
    v: &Value,
    dest: ShapeId,
    shapes: &ShapeRegistry,
) -> Result<Value, RuntimeError> {
    use morph_model::Shape;
    match shapes.get(dest) {
        Shape::Any => Ok(v.clone()),
        Shape::Optional(inner) => {
            if v.is_null() {
                Ok(Value::Null)
            } else {
                coerce_value(v, *inner, shapes)
            }
        }
        Shape::Primitive(p) => coerce_primitive(v, *p, shapes),
        Shape::Enum(_) => match v {
            Value::Null => Ok(Value::default_of(dest, shapes)),
            Value::Enum(e) if e.shape == dest => Ok(v.clone()),
            Value::Enum(_) => enum_to_enum(v, dest, EnumMatchMode::ByName, shapes),
            Value::String(_) => enum_from_string(v, dest, shapes),
            Value::Int(_) | Value::UInt(_) => int_to_enum(v, dest, shapes),
            other => Err(mismatch("enum-compatible", other)),
        },
        Shape::Struct(s) => match v {
            Value::Null => Ok(Value::Null),
            Value::Object(o) if o.shape() == dest => Ok(v.clone()),
            other => Err(mismatch(&s.name, other)),
        },
        Shape::List(_) => match v {
            Value::Null | Value::List(_) => Ok(v.clone()),
            other => Err(mismatch("list", other)),
        },
        Shape::Array { rank, .. } => match v {
            Value::Null => Ok(Value::Null),
            Value::Array(a) if a.rank() as u32 == *rank => Ok(v.clone()),
            Value::Array(a) => Err(RuntimeError::RankMismatch {
                expected: *rank,
                found: a.rank() as u32,
            }),
            other => Err(mismatch("array", other)),
        },
        Shape::Map { .. } => match v {
            Value::Null | Value::Map(_) => Ok(v.clone()),
            other => Err(mismatch("map", other)),
        },
    }
}

fn coerce_primitive(
    v: &Value,
    p: Primitive,
    shapes: &ShapeRegistry,
) -> Result<Value, RuntimeError> {
    use Primitive as P;
    match v {
        Value::Null => Ok(Const::zero_of(p).to_value()),
        Value::Bool(b) => match p {
            P::Bool => Ok(Value::Bool(*b)),
            P::String => Ok(Value::String(if *b { "true" } else { "false" }.into())),
            _ => Err(mismatch(p.name(), v)),
        },
        Value::Int(_) | Value::UInt(_) | Value::Float(_) => match p {
            P::String => format_number(v),
            t if t.is_numeric() => numeric_cast(v, t),
            _ => Err(mismatch(p.name(), v)),
        },
        Value::String(s) => match p {
            P::String => Ok(v.clone()),
            P::Bool => match s.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(RuntimeError::ParseFailure { value: s.clone(), target: "Bool" }),
            },
            t => parse_number(v, t),
        },
        Value::Enum(_) => match p {
            P::String => enum_to_string(v, shapes),
            t if t.is_numeric() => enum_to_int(v, t, shapes),
            _ => Err(mismatch(p.name(), v)),
        },
        other => Err(mismatch(p.name(), other)),
    }
}

// ── Shallow copy ────────────────────────────────────────────────────────────

fn shallow_copy(v: &Value, dest: ShapeId) -> Result<Value, RuntimeError> {
    match v {
        Value::Null => Ok(Value::Null),
        Value::Object(o) => {
            let slots = o.borrow().slots.clone();
            Ok(Value::Object(ObjRef::new(ObjectData::new(dest, slots))))
        }
        other => Err(mismatch("object", other)),
    }
}

// ── Fetches ─────────────────────────────────────────────────────────────────

enum LoweredFetch {
    Slot(usize),
    Path(Vec<usize>),
    Getter(GetterFn),
    Resolver(ResolverFn),
    Constant(Const),
    Key { name: String, matcher: NameMatch },
}

/// Read one slot of an object, reporting a shape mismatch when the object
/// is too small for the index the procedure was compiled against.
fn slot_read(o: &ObjRef, i: usize) -> Result<Value, RuntimeError> {
    o.borrow().slots.get(i).cloned().ok_or_else(|| RuntimeError::ValueShapeMismatch {
        expected: format!("an object with at least {} member slots", i + 1),
        found: "object",
    })
}

impl LoweredFetch {
    fn new(fetch: &Fetch) -> LoweredFetch {
        match fetch {
            Fetch::Slot(i) => LoweredFetch::Slot(*i),
            Fetch::Path(path) => LoweredFetch::Path(path.clone()),
            Fetch::Getter(f) => LoweredFetch::Getter(f.clone()),
            Fetch::Resolver(f) => LoweredFetch::Resolver(f.clone()),
            Fetch::Constant(c) => LoweredFetch::Constant(c.clone()),
            Fetch::Key { name, matcher } => {
                LoweredFetch::Key { name: name.clone(), matcher: matcher.clone() }
            }
        }
    }

    fn run(&self, src: &Value) -> Result<Value, RuntimeError> {
        match self {
            LoweredFetch::Slot(i) => match src {
                Value::Object(o) => slot_read(o, *i),
                other => Err(mismatch("object", other)),
            },
            LoweredFetch::Path(path) => {
                let mut cur = src.clone();
                for &i in path {
                    cur = match cur {
                        // A null link nulls the whole chain.
                        Value::Null => return Ok(Value::Null),
                        Value::Object(o) => {
                            let next = slot_read(&o, i)?;
                            next
                        }
                        ref other => return Err(mismatch("object", other)),
                    };
                }
                Ok(cur)
            }
            LoweredFetch::Getter(f) => match src {
                Value::Object(o) => Ok(f(&o.borrow())),
                other => Err(mismatch("object", other)),
            },
            LoweredFetch::Resolver(f) => Ok(f(src)),
            LoweredFetch::Constant(c) => Ok(c.to_value()),
            // The first entry matching under the policy wins, in insertion
            // order. Exact matching keeps the direct lookup.
            LoweredFetch::Key { name, matcher } => match src {
                Value::Map(m) => Ok(match matcher {
                    NameMatch::Exact => m.get(name).cloned(),
                    _ => m
                        .iter()
                        .find(|&(k, _)| matcher.matches(k, name))
                        .map(|(_, v)| v.clone()),
                }
                .unwrap_or(Value::Null)),
                other => Err(mismatch("map", other)),
            },
        }
    }
}

// ── Structs ─────────────────────────────────────────────────────────────────

struct LoweredMember {
    dest_slot: usize,
    fetch: LoweredFetch,
    convert: Arc<ConvertFn>,
    skip_if: Option<ConditionFn>,
    null_substitute: Option<Const>,
    transforms: Vec<TransformFn>,
}

impl LoweredMember {
    fn new(op: &MemberOp) -> LoweredMember {
        LoweredMember {
            dest_slot: op.dest_slot,
            fetch: LoweredFetch::new(&op.fetch),
            convert: lower_op(&op.convert),
            skip_if: op.skip_if.clone(),
            null_substitute: op.null_substitute.clone(),
            transforms: op.transforms.clone(),
        }
    }

    fn apply(&self, src: &Value, obj: &ObjRef, ctx: &mut ConvCtx<'_>) -> Result<(), RuntimeError> {
        if let Some(skip) = &self.skip_if {
            if skip(src) {
                return Ok(());
            }
        }
        let mut raw = self.fetch.run(src)?;
        if raw.is_null() {
            if let Some(c) = &self.null_substitute {
                raw = c.to_value();
            }
        }
        let mut converted = (self.convert)(&raw, ctx)?;
        for t in &self.transforms {
            converted = t(converted);
        }
        obj.borrow_mut().slots[self.dest_slot] = converted;
        Ok(())
    }
}

enum LoweredConstruction {
    Default,
    Factory(FactoryFn),
    Parameterized(Vec<LoweredArg>),
}

struct LoweredArg {
    dest_slot: Option<usize>,
    source: LoweredArgSource,
}

enum LoweredArgSource {
    Fetched { fetch: LoweredFetch, convert: Arc<ConvertFn> },
    Default(Const),
}

struct LoweredStruct {
    pair: TypePair,
    dest: ShapeId,
    construction: LoweredConstruction,
    members: Vec<LoweredMember>,
    before: Option<HookFn>,
    after: Option<HookFn>,
    max_depth: Option<u32>,
    preserve: bool,
    includes: Vec<(ShapeId, SlotId)>,
}

impl LoweredStruct {
    fn new(op: &StructOp) -> LoweredStruct {
        let construction = match &op.construction {
            Construction::Default => LoweredConstruction::Default,
            Construction::Factory(f) => LoweredConstruction::Factory(f.clone()),
            Construction::Parameterized { args, .. } => LoweredConstruction::Parameterized(
                args.iter()
                    .map(|arg| LoweredArg {
                        dest_slot: arg.dest_slot,
                        source: match &arg.source {
                            ArgSource::Fetched { fetch, convert } => LoweredArgSource::Fetched {
                                fetch: LoweredFetch::new(fetch),
                                convert: lower_op(convert),
                            },
                            ArgSource::Default(c) => LoweredArgSource::Default(c.clone()),
                        },
                    })
                    .collect(),
            ),
        };
        LoweredStruct {
            pair: op.pair,
            dest: op.dest,
            construction,
            members: op.members.iter().map(LoweredMember::new).collect(),
            before: op.before.clone(),
            after: op.after.clone(),
            max_depth: op.max_depth,
            preserve: op.preserve_refs,
            includes: op.includes.clone(),
        }
    }

    fn convert(&self, src: &Value, ctx: &mut ConvCtx<'_>) -> Result<Value, RuntimeError> {
        if src.is_null() {
            return Ok(Value::Null);
        }
        // Derived redirect: a source whose runtime shape is a declared
        // derived pair converts through that pair's procedure.
        if !self.includes.is_empty() {
            if let Value::Object(o) = src {
                let runtime = o.shape();
                if runtime != self.pair.source {
                    if let Some(&(_, slot)) =
                        self.includes.iter().find(|(shape, _)| *shape == runtime)
                    {
                        return ctx.invoke(slot, src);
                    }
                }
            }
        }
        self.check_source_shape(src, ctx)?;
        let depth = ctx.enter(self.pair);
        let result = self.convert_at(src, depth, ctx);
        ctx.exit(self.pair);
        result
    }

    /// Member fetches index slots of the declared source shape; an object
    /// of any other shape cannot be read through them.
    fn check_source_shape(&self, src: &Value, ctx: &ConvCtx<'_>) -> Result<(), RuntimeError> {
        if let Value::Object(o) = src {
            let declared = ctx.shapes.unwrap_optional(self.pair.source);
            if o.shape() != declared {
                return Err(RuntimeError::ValueShapeMismatch {
                    expected: ctx.shapes.display(declared),
                    found: "object",
                });
            }
        }
        Ok(())
    }

    fn convert_at(
        &self,
        src: &Value,
        depth: u32,
        ctx: &mut ConvCtx<'_>,
    ) -> Result<Value, RuntimeError> {
        if let Some(limit) = self.max_depth {
            if depth > limit {
                return Ok(Value::default_of(self.dest, ctx.shapes));
            }
        }
        if self.preserve {
            if let Value::Object(o) = src {
                if let Some(existing) = ctx.preserved(o.ptr_id(), self.dest) {
                    return Ok(existing);
                }
            }
        }
        let dest_value = self.construct(src, ctx)?;
        // Register before populating members, so a cyclic back-reference
        // finds the still-in-progress destination.
        if self.preserve {
            if let Value::Object(o) = src {
                ctx.preserve(o.ptr_id(), self.dest, dest_value.clone());
            }
        }
        if let Some(hook) = &self.before {
            hook(src, &dest_value);
        }
        if let Value::Object(obj) = &dest_value {
            let obj = obj.clone();
            for member in &self.members {
                member.apply(src, &obj, ctx)?;
            }
        }
        if let Some(hook) = &self.after {
            hook(src, &dest_value);
        }
        Ok(dest_value)
    }

    fn construct(&self, src: &Value, ctx: &mut ConvCtx<'_>) -> Result<Value, RuntimeError> {
        match &self.construction {
            LoweredConstruction::Default => Ok(ctx.shapes.new_object(self.dest)),
            LoweredConstruction::Factory(f) => Ok(f(src)),
            LoweredConstruction::Parameterized(args) => {
                let value = ctx.shapes.new_object(self.dest);
                if let Value::Object(obj) = &value {
                    for arg in args {
                        let v = match &arg.source {
                            LoweredArgSource::Fetched { fetch, convert } => {
                                let raw = fetch.run(src)?;
                                convert(&raw, ctx)?
                            }
                            LoweredArgSource::Default(c) => c.to_value(),
                        };
                        if let Some(slot) = arg.dest_slot {
                            obj.borrow_mut().slots[slot] = v;
                        }
                    }
                }
                Ok(value)
            }
        }
    }

    fn populate(
        &self,
        src: &Value,
        existing: Value,
        ctx: &mut ConvCtx<'_>,
    ) -> Result<Value, RuntimeError> {
        if src.is_null() {
            return Ok(existing);
        }
        let obj = match &existing {
            Value::Object(o) => o.clone(),
            other => {
                return Err(RuntimeError::PopulateTarget {
                    expected: "object",
                    found: other.kind_name(),
                })
            }
        };
        // Member writes index slots of the declared destination shape.
        if obj.shape() != self.dest {
            return Err(RuntimeError::ValueShapeMismatch {
                expected: ctx.shapes.display(self.dest),
                found: "object",
            });
        }
        self.check_source_shape(src, ctx)?;
        let depth = ctx.enter(self.pair);
        let result = (|| {
            if let Some(limit) = self.max_depth {
                if depth > limit {
                    return Ok(existing.clone());
                }
            }
            if self.preserve {
                if let Value::Object(o) = src {
                    ctx.preserve(o.ptr_id(), self.dest, existing.clone());
                }
            }
            if let Some(hook) = &self.before {
                hook(src, &existing);
            }
            for member in &self.members {
                member.apply(src, &obj, ctx)?;
            }
            if let Some(hook) = &self.after {
                hook(src, &existing);
            }
            Ok(existing.clone())
        })();
        ctx.exit(self.pair);
        result
    }
}

// ── Sequences ───────────────────────────────────────────────────────────────

struct LoweredSeq {
    elem: Arc<ConvertFn>,
    src_kind: SeqKind,
    dest_kind: SeqKind,
    index_copy: bool,
}

impl LoweredSeq {
    fn new(op: &SeqOp) -> LoweredSeq {
        LoweredSeq {
            elem: lower_op(&op.elem),
            src_kind: op.src_kind,
            dest_kind: op.dest_kind,
            index_copy: op.index_copy,
        }
    }

    fn elems<'v>(&self, src: &'v Value) -> Result<&'v [Value], RuntimeError> {
        match (self.src_kind, src) {
            (SeqKind::List, Value::List(items)) => Ok(items),
            (SeqKind::Array, Value::Array(a)) => {
                if a.rank() != 1 {
                    Err(RuntimeError::RankMismatch { expected: 1, found: a.rank() as u32 })
                } else {
                    Ok(&a.elems)
                }
            }
            (SeqKind::List, other) => Err(mismatch("list", other)),
            (SeqKind::Array, other) => Err(mismatch("array", other)),
        }
    }

    fn convert_elems(
        &self,
        elems: &[Value],
        ctx: &mut ConvCtx<'_>,
    ) -> Result<Vec<Value>, RuntimeError> {
        let mut out = Vec::with_capacity(elems.len());
        if self.index_copy {
            out.extend(elems.iter().cloned());
        } else {
            for e in elems {
                out.push((self.elem)(e, ctx)?);
            }
        }
        Ok(out)
    }

    fn convert(&self, src: &Value, ctx: &mut ConvCtx<'_>) -> Result<Value, RuntimeError> {
        if src.is_null() {
            return Ok(Value::Null);
        }
        let out = self.convert_elems(self.elems(src)?, ctx)?;
        Ok(match self.dest_kind {
            SeqKind::List => Value::List(out),
            SeqKind::Array => Value::Array(ArrayValue::new(vec![out.len()], out)),
        })
    }

    fn populate(
        &self,
        src: &Value,
        existing: Value,
        ctx: &mut ConvCtx<'_>,
    ) -> Result<Value, RuntimeError> {
        if src.is_null() {
            return Ok(existing);
        }
        let out = self.convert_elems(self.elems(src)?, ctx)?;
        match (self.dest_kind, existing) {
            // Clear-and-add into the caller's list.
            (SeqKind::List, Value::List(mut items)) => {
                items.clear();
                items.extend(out);
                Ok(Value::List(items))
            }
            (SeqKind::List, Value::Null) => Ok(Value::List(out)),
            // Arrays have fixed geometry; replace wholesale.
            (SeqKind::Array, _) => Ok(Value::Array(ArrayValue::new(vec![out.len()], out))),
            (SeqKind::List, other) => Err(RuntimeError::PopulateTarget {
                expected: "list",
                found: other.kind_name(),
            }),
        }
    }
}

// ── Arrays ──────────────────────────────────────────────────────────────────

/// Multi-index iteration over rectangular bounds, least-significant axis
/// innermost with carry into the next axis.
pub(crate) struct MultiIndex {
    dims: Vec<usize>,
    idx: Vec<usize>,
    started: bool,
    empty: bool,
}

impl MultiIndex {
    pub fn new(dims: &[usize]) -> MultiIndex {
        MultiIndex {
            dims: dims.to_vec(),
            idx: vec![0; dims.len()],
            started: false,
            empty: dims.iter().any(|&d| d == 0),
        }
    }

    /// The next multi-index in row-major order, or `None` after the last.
    pub fn next_index(&mut self) -> Option<&[usize]> {
        if self.empty {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(&self.idx);
        }
        for axis in (0..self.idx.len()).rev() {
            self.idx[axis] += 1;
            if self.idx[axis] < self.dims[axis] {
                return Some(&self.idx);
            }
            self.idx[axis] = 0;
        }
        None
    }
}

struct LoweredNdArray {
    elem: Arc<ConvertFn>,
    rank: u32,
    index_copy: bool,
}

impl LoweredNdArray {
    fn new(op: &NdArrayOp) -> LoweredNdArray {
        LoweredNdArray { elem: lower_op(&op.elem), rank: op.rank, index_copy: op.index_copy }
    }

    fn convert(&self, src: &Value, ctx: &mut ConvCtx<'_>) -> Result<Value, RuntimeError> {
        if src.is_null() {
            return Ok(Value::Null);
        }
        let Value::Array(a) = src else {
            return Err(mismatch("array", src));
        };
        if a.rank() as u32 != self.rank {
            return Err(RuntimeError::RankMismatch {
                expected: self.rank,
                found: a.rank() as u32,
            });
        }
        let mut out = Vec::with_capacity(a.len());
        let mut index = MultiIndex::new(&a.dims);
        while let Some(idx) = index.next_index() {
            let flat = a.offset(idx).expect("index within bounds");
            let elem = &a.elems[flat];
            if self.index_copy {
                out.push(elem.clone());
            } else {
                out.push((self.elem)(elem, ctx)?);
            }
        }
        Ok(Value::Array(ArrayValue::new(a.dims.clone(), out)))
    }
}

// ── Maps ────────────────────────────────────────────────────────────────────

struct LoweredMapToMap {
    value: Arc<ConvertFn>,
    skip_null: bool,
    key_transform: Option<KeyTransformFn>,
}

impl LoweredMapToMap {
    fn new(op: &MapToMapOp) -> LoweredMapToMap {
        LoweredMapToMap {
            value: lower_op(&op.value),
            skip_null: op.skip_null,
            key_transform: op.key_transform.clone(),
        }
    }

    fn convert(&self, src: &Value, ctx: &mut ConvCtx<'_>) -> Result<Value, RuntimeError> {
        if src.is_null() {
            return Ok(Value::Null);
        }
        let Value::Map(m) = src else {
            return Err(mismatch("map", src));
        };
        let mut out = MapValue::new();
        for (k, v) in m.iter() {
            let converted = (self.value)(v, ctx)?;
            if self.skip_null && converted.is_null() {
                continue;
            }
            out.insert(k.to_string(), converted);
        }
        Ok(Value::Map(out))
    }

    /// Merge into the caller's map; existing keys not present in the
    /// source survive.
    fn populate(
        &self,
        src: &Value,
        existing: Value,
        ctx: &mut ConvCtx<'_>,
    ) -> Result<Value, RuntimeError> {
        if src.is_null() {
            return Ok(existing);
        }
        let Value::Map(m) = src else {
            return Err(mismatch("map", src));
        };
        let mut out = match existing {
            Value::Map(out) => out,
            Value::Null => MapValue::new(),
            other => {
                return Err(RuntimeError::PopulateTarget {
                    expected: "map",
                    found: other.kind_name(),
                })
            }
        };
        for (k, v) in m.iter() {
            let converted = (self.value)(v, ctx)?;
            if self.skip_null && converted.is_null() {
                continue;
            }
            let key = match &self.key_transform {
                Some(t) => t(k),
                None => k.to_string(),
            };
            out.insert(key, converted);
        }
        Ok(Value::Map(out))
    }
}

struct LoweredStructToMap {
    entries: Vec<(String, LoweredFetch, Arc<ConvertFn>)>,
    skip_null: bool,
}

impl LoweredStructToMap {
    fn new(op: &StructToMapOp) -> LoweredStructToMap {
        LoweredStructToMap {
            entries: op
                .entries
                .iter()
                .map(|MapEntryOp { key, fetch, convert }| {
                    (key.clone(), LoweredFetch::new(fetch), lower_op(convert))
                })
                .collect(),
            skip_null: op.skip_null,
        }
    }

    fn entries_into(
        &self,
        src: &Value,
        out: &mut MapValue,
        ctx: &mut ConvCtx<'_>,
    ) -> Result<(), RuntimeError> {
        for (key, fetch, convert) in &self.entries {
            let raw = fetch.run(src)?;
            let converted = convert(&raw, ctx)?;
            if self.skip_null && converted.is_null() {
                continue;
            }
            out.insert(key.clone(), converted);
        }
        Ok(())
    }

    fn convert(&self, src: &Value, ctx: &mut ConvCtx<'_>) -> Result<Value, RuntimeError> {
        if src.is_null() {
            return Ok(Value::Null);
        }
        let mut out = MapValue::new();
        self.entries_into(src, &mut out, ctx)?;
        Ok(Value::Map(out))
    }

    fn populate(
        &self,
        src: &Value,
        existing: Value,
        ctx: &mut ConvCtx<'_>,
    ) -> Result<Value, RuntimeError> {
        if src.is_null() {
            return Ok(existing);
        }
        let mut out = match existing {
            Value::Map(out) => out,
            Value::Null => MapValue::new(),
            other => {
                return Err(RuntimeError::PopulateTarget {
                    expected: "map",
                    found: other.kind_name(),
                })
            }
        };
        self.entries_into(src, &mut out, ctx)?;
        Ok(Value::Map(out))
    }
}
