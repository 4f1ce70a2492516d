//! Rank-preserving array conversion.
//!
//! Claims array-to-array pairs. The destination keeps the source's
//! per-dimension bounds; elements convert in multi-index order. Ranks are
//! part of the shape, so a rank disagreement is a synthesis error, not a
//! runtime one.

use morph_model::Shape;

use crate::error::CompileError;
use crate::pair::TypePair;
use crate::plan::{NdArrayOp, Op, Plan};
use crate::strategies::{score, unsupported, ConversionStrategy};
use crate::synth::{SynthEnv, Synthesizer};

pub(crate) struct ArrayStrategy;

impl ConversionStrategy for ArrayStrategy {
    fn name(&self) -> &'static str {
        "array"
    }

    fn score(&self, pair: TypePair, env: &SynthEnv<'_>) -> Option<i32> {
        let shapes = env.shapes();
        let src = shapes.get(shapes.unwrap_optional(pair.source));
        let dst = shapes.get(shapes.unwrap_optional(pair.dest));
        let claims = matches!(src, Shape::Array { .. }) && matches!(dst, Shape::Array { .. });
        claims.then_some(score::ARRAY)
    }

    fn synthesize(
        &self,
        pair: TypePair,
        syn: &mut Synthesizer<'_>,
    ) -> Result<Plan, CompileError> {
        let shapes = syn.shapes();
        let src = shapes.get(shapes.unwrap_optional(pair.source));
        let dst = shapes.get(shapes.unwrap_optional(pair.dest));
        let (
            Shape::Array { elem: src_elem, rank: src_rank },
            Shape::Array { elem: dest_elem, rank: dest_rank },
        ) = (src, dst)
        else {
            return Err(unsupported(syn, pair, "not an array pair"));
        };
        if src_rank != dest_rank {
            return Err(unsupported(
                syn,
                pair,
                format!("array ranks differ: {src_rank} vs {dest_rank}"),
            ));
        }
        let (src_elem, dest_elem, rank) = (*src_elem, *dest_elem, *src_rank);
        let index_copy =
            src_elem == dest_elem && matches!(shapes.get(src_elem), Shape::Primitive(_));
        let elem = if index_copy {
            Op::Identity
        } else {
            syn.nested_op(pair.kind, src_elem, dest_elem)?
        };
        let root = Op::NdArray(Box::new(NdArrayOp { elem, rank, index_copy }));
        Ok(Plan { pair, root })
    }
}
