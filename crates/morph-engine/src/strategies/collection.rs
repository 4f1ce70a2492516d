//! List and rank-1 array conversion, element by element.
//!
//! Claims any pairing of lists and arrays that involves a list. Elements
//! convert in order through the element pair's procedure; identical
//! primitive element shapes copy directly. Arrays of rank above one have
//! no list equivalent and fail at synthesis.

use morph_model::{Shape, ShapeId, ShapeRegistry};

use crate::error::CompileError;
use crate::pair::TypePair;
use crate::plan::{Op, Plan, SeqKind, SeqOp};
use crate::strategies::{score, unsupported, ConversionStrategy};
use crate::synth::{SynthEnv, Synthesizer};

pub(crate) struct CollectionStrategy;

fn seq_of(shapes: &ShapeRegistry, id: ShapeId) -> Option<(SeqKind, ShapeId, u32)> {
    match shapes.get(shapes.unwrap_optional(id)) {
        Shape::List(elem) => Some((SeqKind::List, *elem, 1)),
        Shape::Array { elem, rank } => Some((SeqKind::Array, *elem, *rank)),
        _ => None,
    }
}

impl ConversionStrategy for CollectionStrategy {
    fn name(&self) -> &'static str {
        "collection"
    }

    fn score(&self, pair: TypePair, env: &SynthEnv<'_>) -> Option<i32> {
        let shapes = env.shapes();
        let src = seq_of(shapes, pair.source);
        let dst = seq_of(shapes, pair.dest);
        match (src, dst) {
            (Some((sk, ..)), Some((dk, ..)))
                if sk == SeqKind::List || dk == SeqKind::List =>
            {
                Some(score::COLLECTION)
            }
            _ => None,
        }
    }

    fn synthesize(
        &self,
        pair: TypePair,
        syn: &mut Synthesizer<'_>,
    ) -> Result<Plan, CompileError> {
        let shapes = syn.shapes();
        let (Some((src_kind, src_elem, src_rank)), Some((dest_kind, dest_elem, dest_rank))) =
            (seq_of(shapes, pair.source), seq_of(shapes, pair.dest))
        else {
            return Err(unsupported(syn, pair, "not a collection pair"));
        };
        if src_rank > 1 || dest_rank > 1 {
            return Err(unsupported(
                syn,
                pair,
                "arrays of rank above one convert only to arrays of the same rank",
            ));
        }
        let index_copy =
            src_elem == dest_elem && matches!(shapes.get(src_elem), Shape::Primitive(_));
        let elem = if index_copy {
            Op::Identity
        } else {
            syn.nested_op(pair.kind, src_elem, dest_elem)?
        };
        let root = Op::Seq(Box::new(SeqOp { elem, src_kind, dest_kind, index_copy }));
        Ok(Plan { pair, root })
    }
}
