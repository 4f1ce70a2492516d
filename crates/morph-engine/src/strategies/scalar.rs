//! Primitive-to-primitive conversion.
//!
//! Numeric widths convert by cast (narrowing wraps, float-to-int
//! saturates), numbers format to and parse from strings, and booleans
//! round-trip through `"true"`/`"false"`. Boolean-to-numeric has no
//! defined meaning and is rejected at synthesis. Null routing wraps the
//! whole conversion: optional destinations pass null through, required
//! ones take their default.

use morph_model::Primitive;

use crate::error::CompileError;
use crate::pair::{MappingKind, TypePair};
use crate::plan::{Op, Plan};
use crate::strategies::{primitive_of, score, unsupported, ConversionStrategy};
use crate::synth::{SynthEnv, Synthesizer};

pub(crate) struct ScalarStrategy;

impl ConversionStrategy for ScalarStrategy {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn score(&self, pair: TypePair, env: &SynthEnv<'_>) -> Option<i32> {
        let shapes = env.shapes();
        let claims = primitive_of(shapes, pair.source).is_some()
            && primitive_of(shapes, pair.dest).is_some();
        claims.then_some(score::SCALAR)
    }

    fn synthesize(
        &self,
        pair: TypePair,
        syn: &mut Synthesizer<'_>,
    ) -> Result<Plan, CompileError> {
        let shapes = syn.shapes();
        let (Some(from), Some(to)) =
            (primitive_of(shapes, pair.source), primitive_of(shapes, pair.dest))
        else {
            return Err(unsupported(syn, pair, "not a scalar pair"));
        };
        if pair.kind == MappingKind::PopulateExisting {
            return Err(unsupported(syn, pair, "scalar destinations cannot be populated in place"));
        }
        if !convertible(from, to) {
            return Err(unsupported(
                syn,
                pair,
                format!("no {} to {} conversion", from.name(), to.name()),
            ));
        }
        let inner = if from == to { Op::Identity } else { Op::Scalar { from, to } };
        let root = Op::NullGate {
            dest: pair.dest,
            pass_through: shapes.is_optional(pair.dest),
            inner: Box::new(inner),
        };
        Ok(Plan { pair, root })
    }
}

fn convertible(from: Primitive, to: Primitive) -> bool {
    use Primitive as P;
    from == to
        || (from.is_numeric() && to.is_numeric())
        || (from.is_numeric() && to == P::String)
        || (from == P::String && to.is_numeric())
        || matches!((from, to), (P::Bool, P::String) | (P::String, P::Bool))
}
