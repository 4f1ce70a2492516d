//! The fallback strategy: best-effort dynamic coercion.
//!
//! Coercion actively claims only pairs that involve `Any`, where nothing
//! is known about the value until run time. For every other pair it is
//! reached as the registry's fallback when no strategy claims the pair and
//! explicit mappings are not required. The lowered op inspects the runtime
//! value and clones, converts, or defaults as the destination allows.

use morph_model::Shape;

use crate::error::CompileError;
use crate::pair::{MappingKind, TypePair};
use crate::plan::{Op, Plan};
use crate::strategies::{score, unsupported, ConversionStrategy};
use crate::synth::{SynthEnv, Synthesizer};

pub(crate) struct CoerceStrategy;

impl ConversionStrategy for CoerceStrategy {
    fn name(&self) -> &'static str {
        "coerce"
    }

    fn score(&self, pair: TypePair, env: &SynthEnv<'_>) -> Option<i32> {
        let shapes = env.shapes();
        let any = |id| matches!(shapes.get(shapes.unwrap_optional(id)), Shape::Any);
        (any(pair.source) || any(pair.dest)).then_some(score::COERCE)
    }

    fn synthesize(&self, pair: TypePair, syn: &mut Synthesizer<'_>) -> Result<Plan, CompileError> {
        if pair.kind == MappingKind::PopulateExisting {
            return Err(unsupported(syn, pair, "cannot coerce into an existing value"));
        }
        Ok(Plan { pair, root: Op::Coerce { dest: pair.dest } })
    }
}
