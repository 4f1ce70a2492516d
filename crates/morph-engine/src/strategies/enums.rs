//! Enum conversion: between enums, names, and underlying values.
//!
//! Enum-to-enum matches by variant name with a fallback to the underlying
//! value, unless the pair's settings pin the mode. Strings convert by
//! variant name, integers by underlying value; both fail at runtime when
//! nothing matches.

use morph_model::Primitive;

use crate::error::CompileError;
use crate::pair::{MappingKind, TypePair};
use crate::plan::{Op, Plan};
use crate::settings::EnumMatchMode;
use crate::strategies::{enum_of, primitive_of, score, unsupported, ConversionStrategy};
use crate::synth::{SynthEnv, Synthesizer};

pub(crate) struct EnumStrategy;

/// True when a shape can sit on the other side of an enum conversion.
fn enum_compatible(env: &SynthEnv<'_>, id: morph_model::ShapeId) -> bool {
    let shapes = env.shapes();
    enum_of(shapes, id).is_some()
        || matches!(
            primitive_of(shapes, id),
            Some(p) if p == Primitive::String || p.is_integer()
        )
}

impl ConversionStrategy for EnumStrategy {
    fn name(&self) -> &'static str {
        "enum"
    }

    fn score(&self, pair: TypePair, env: &SynthEnv<'_>) -> Option<i32> {
        let shapes = env.shapes();
        let involves_enum =
            enum_of(shapes, pair.source).is_some() || enum_of(shapes, pair.dest).is_some();
        let claims = involves_enum
            && enum_compatible(env, pair.source)
            && enum_compatible(env, pair.dest);
        claims.then_some(score::ENUM)
    }

    fn synthesize(
        &self,
        pair: TypePair,
        syn: &mut Synthesizer<'_>,
    ) -> Result<Plan, CompileError> {
        if pair.kind == MappingKind::PopulateExisting {
            return Err(unsupported(syn, pair, "enum destinations cannot be populated in place"));
        }
        let shapes = syn.shapes();
        let src_enum = enum_of(shapes, pair.source);
        let dst_enum = enum_of(shapes, pair.dest);
        let mode = syn
            .settings(pair.source, pair.dest)
            .and_then(|s| s.enum_match)
            .unwrap_or(EnumMatchMode::ByName);

        let inner = match (src_enum, dst_enum) {
            (Some(src), Some(dest)) => Op::EnumToEnum { src, dest, mode },
            (Some(src), None) => match primitive_of(shapes, pair.dest) {
                Some(Primitive::String) => Op::EnumToString { src },
                Some(p) if p.is_integer() => Op::EnumToInt { to: p },
                _ => return Err(unsupported(syn, pair, "enum converts to names and values only")),
            },
            (None, Some(dest)) => match primitive_of(shapes, pair.source) {
                Some(Primitive::String) => Op::EnumFromString { dest },
                Some(p) if p.is_integer() => Op::IntToEnum { dest },
                _ => {
                    return Err(unsupported(syn, pair, "enum converts from names and values only"))
                }
            },
            (None, None) => return Err(unsupported(syn, pair, "not an enum pair")),
        };
        let root = Op::NullGate {
            dest: pair.dest,
            pass_through: shapes.is_optional(pair.dest),
            inner: Box::new(inner),
        };
        Ok(Plan { pair, root })
    }
}
