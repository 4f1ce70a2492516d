//! Conversion strategies: one provider per shape family.
//!
//! Every pair is claimed by the strategy scoring it highest. The built-in
//! families, from strongest claim to weakest:
//!
//! - [`enums`] -- enum constants, to and from names, values, and other enums
//! - [`scalar`] -- primitive widening, narrowing, parsing, and formatting
//! - [`array`] -- rank-preserving rectangular array conversion
//! - [`collection`] -- lists and rank-1 arrays, element by element
//! - [`dictionary`] -- string-keyed maps, to and from structs
//! - [`record`] -- struct construction through a constructor overload
//! - [`object`] -- member-wise struct conversion
//! - [`coerce`] -- best-effort dynamic conversion, also the unclaimed-pair
//!   fallback
//!
//! User strategies registered on the configuration are consulted before
//! any of these.

use morph_model::{Primitive, Shape, ShapeId, ShapeRegistry};

use crate::error::CompileError;
use crate::pair::TypePair;
use crate::plan::Plan;
use crate::synth::{SynthEnv, Synthesizer};

pub(crate) mod array;
pub(crate) mod coerce;
pub(crate) mod collection;
pub(crate) mod dictionary;
pub(crate) mod enums;
pub(crate) mod object;
pub(crate) mod record;
pub(crate) mod scalar;

pub(crate) use coerce::CoerceStrategy;

use std::sync::Arc;

/// A conversion strategy provider.
///
/// `score` claims a pair; `synthesize` builds the plan for a pair the
/// registry awarded to this strategy. User implementations produce plans
/// through [`Synthesizer::custom`].
pub trait ConversionStrategy: Send + Sync {
    /// Short name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Claim strength for a pair, or `None` to decline it. Higher wins.
    fn score(&self, pair: TypePair, env: &SynthEnv<'_>) -> Option<i32>;

    /// Build the plan for a claimed pair.
    fn synthesize(&self, pair: TypePair, syn: &mut Synthesizer<'_>) -> Result<Plan, CompileError>;
}

/// Built-in claim strengths. More specific families score higher, so a
/// user strategy can slot itself anywhere in between.
pub mod score {
    pub const ENUM: i32 = 110;
    pub const SCALAR: i32 = 100;
    pub const ARRAY: i32 = 80;
    pub const COLLECTION: i32 = 70;
    pub const DICTIONARY: i32 = 60;
    pub const RECORD: i32 = 50;
    pub const OBJECT: i32 = 10;
    pub const COERCE: i32 = 0;
}

/// The built-in tier, in registration order.
pub(crate) fn builtins() -> Vec<Arc<dyn ConversionStrategy>> {
    vec![
        Arc::new(enums::EnumStrategy),
        Arc::new(scalar::ScalarStrategy),
        Arc::new(array::ArrayStrategy),
        Arc::new(collection::CollectionStrategy),
        Arc::new(dictionary::DictionaryStrategy),
        Arc::new(record::RecordStrategy),
        Arc::new(object::ObjectStrategy),
    ]
}

// ── Shape classification ────────────────────────────────────────────────────
//
// Strategies classify through one optional layer; null routing is the
// synthesized op's business, not selection's.

/// The primitive under a shape, looking through one optional layer.
pub(crate) fn primitive_of(shapes: &ShapeRegistry, id: ShapeId) -> Option<Primitive> {
    match shapes.get(shapes.unwrap_optional(id)) {
        Shape::Primitive(p) => Some(*p),
        _ => None,
    }
}

/// The enum shape under a shape, looking through one optional layer.
pub(crate) fn enum_of(shapes: &ShapeRegistry, id: ShapeId) -> Option<ShapeId> {
    let inner = shapes.unwrap_optional(id);
    match shapes.get(inner) {
        Shape::Enum(_) => Some(inner),
        _ => None,
    }
}

/// The struct shape under a shape, looking through one optional layer.
pub(crate) fn struct_of(shapes: &ShapeRegistry, id: ShapeId) -> Option<ShapeId> {
    let inner = shapes.unwrap_optional(id);
    match shapes.get(inner) {
        Shape::Struct(_) => Some(inner),
        _ => None,
    }
}

/// A compile failure for a shape combination the claiming strategy cannot
/// express.
pub(crate) fn unsupported(
    syn: &Synthesizer<'_>,
    pair: TypePair,
    detail: impl Into<String>,
) -> CompileError {
    CompileError::Unsupported { pair: syn.display_pair(pair), detail: detail.into() }
}
