//! Per-call conversion context: depth counters and preserved references.
//!
//! One context is created per top-level `convert` call and threaded by
//! `&mut` through every nested procedure invocation. It is never shared
//! across calls or threads, so its maps need no locking.

use rustc_hash::FxHashMap;

use morph_model::{ShapeId, ShapeRegistry, Value};

use crate::cache::{Compiled, ProcedureCache, SlotId};
use crate::error::RuntimeError;
use crate::pair::TypePair;

pub struct ConvCtx<'a> {
    pub(crate) shapes: &'a ShapeRegistry,
    cache: &'a ProcedureCache,
    /// Live recursion depth per pair.
    depth: FxHashMap<TypePair, u32>,
    /// Already-converted objects: (source identity, destination shape) to
    /// the destination produced for them.
    refs: FxHashMap<(usize, ShapeId), Value>,
}

impl<'a> ConvCtx<'a> {
    pub(crate) fn new(shapes: &'a ShapeRegistry, cache: &'a ProcedureCache) -> ConvCtx<'a> {
        ConvCtx {
            shapes,
            cache,
            depth: FxHashMap::default(),
            refs: FxHashMap::default(),
        }
    }

    /// Run another pair's compiled procedure on a nested value.
    pub(crate) fn invoke(&mut self, slot: SlotId, value: &Value) -> Result<Value, RuntimeError> {
        match self.cache.thunk(slot) {
            Compiled::Convert(f) => f(value, self),
            // Nested calls are always synthesized against new-instance
            // pairs.
            Compiled::Populate(_) => unreachable!("nested call bound to a populate procedure"),
        }
    }

    /// Record entry into a pair; returns the depth including this entry.
    pub(crate) fn enter(&mut self, pair: TypePair) -> u32 {
        let d = self.depth.entry(pair).or_insert(0);
        *d += 1;
        *d
    }

    pub(crate) fn exit(&mut self, pair: TypePair) {
        if let Some(d) = self.depth.get_mut(&pair) {
            *d = d.saturating_sub(1);
        }
    }

    /// The destination already produced for a source object under a
    /// destination shape, if any.
    pub(crate) fn preserved(&self, src_id: usize, dest: ShapeId) -> Option<Value> {
        self.refs.get(&(src_id, dest)).cloned()
    }

    /// Register a destination for a source object. Called right after
    /// construction, before members are populated, so cyclic
    /// back-references can find it mid-population.
    pub(crate) fn preserve(&mut self, src_id: usize, dest: ShapeId, value: Value) {
        self.refs.insert((src_id, dest), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pair::MappingKind;
    use morph_model::{ObjRef, ObjectData};

    #[test]
    fn depth_is_tracked_per_pair() {
        let shapes = ShapeRegistry::new();
        let cache = ProcedureCache::new();
        let mut ctx = ConvCtx::new(&shapes, &cache);

        let a = TypePair::new(ShapeId::I32, ShapeId::I64, MappingKind::NewInstance);
        let b = TypePair::new(ShapeId::I64, ShapeId::I32, MappingKind::NewInstance);

        assert_eq!(ctx.enter(a), 1);
        assert_eq!(ctx.enter(a), 2);
        assert_eq!(ctx.enter(b), 1);
        ctx.exit(a);
        assert_eq!(ctx.enter(a), 2);
    }

    #[test]
    fn preserved_references_key_on_identity_and_dest_shape() {
        let mut shapes = ShapeRegistry::new();
        let node = shapes.register_struct(morph_model::StructShape::new("Node"));
        let cache = ProcedureCache::new();
        let mut ctx = ConvCtx::new(&shapes, &cache);

        let src = ObjRef::new(ObjectData::new(node, vec![]));
        let dest = ObjRef::new(ObjectData::new(node, vec![]));
        ctx.preserve(src.ptr_id(), node, Value::Object(dest.clone()));

        let found = ctx.preserved(src.ptr_id(), node).unwrap();
        assert!(found.as_object().unwrap().ptr_eq(&dest));
        assert!(ctx.preserved(src.ptr_id(), ShapeId::ANY).is_none());
    }
}
