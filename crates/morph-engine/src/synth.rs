//! Compile sessions: pair resolution and plan synthesis.
//!
//! A `Synthesizer` is one compile session, created under the cache's
//! compile lock. Starting from one requested pair it selects a strategy,
//! has it build a plan, lowers the plan into a slot, and repeats for every
//! pair the plan pulls in. Nested struct and collection pairs are declared
//! before they are compiled (`require` returns the slot immediately and
//! fills it afterwards), which is what lets mutually recursive shapes
//! terminate. The session ends with `finish`, whose outcome the mapper
//! publishes in one step, or `rollback`, which returns every declared slot
//! to the cache and leaves no artifact behind.
//!
//! Projections never emit cache calls: the whole tree is inlined, and a
//! pair re-entered during inlining is a cycle error.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use morph_model::{Shape, ShapeId, ShapeRegistry, Value};

use crate::cache::{ProcedureCache, SlotId};
use crate::error::{CompileError, ConfigError, RuntimeError};
use crate::lower;
use crate::names::NameMatch;
use crate::pair::{MappingKind, TypePair};
use crate::plan::{Op, Plan};
use crate::registry::StrategyRegistry;
use crate::settings::{MapperConfig, MappingSettings, PairKey};

/// What strategies see of the engine while scoring a pair.
pub struct SynthEnv<'a> {
    pub(crate) shapes: &'a ShapeRegistry,
    pub(crate) config: &'a MapperConfig,
}

impl<'a> SynthEnv<'a> {
    pub fn shapes(&self) -> &'a ShapeRegistry {
        self.shapes
    }

    /// Merged settings for a (source, destination) key, if configured.
    pub(crate) fn settings(&self, source: ShapeId, dest: ShapeId) -> Option<&'a MappingSettings> {
        self.config.settings(source, dest)
    }

    pub(crate) fn require_explicit(&self) -> bool {
        self.config.require_explicit
    }
}

/// Everything a compile session produced, handed to the mapper for
/// publication.
pub(crate) struct SessionOutcome {
    /// Pairs compiled by this session, in declaration order.
    pub entries: Vec<(TypePair, SlotId)>,
    /// Pair keys that freeze on publish: every settings key consulted
    /// during synthesis plus every pair the session compiled.
    pub frozen: Vec<PairKey>,
    /// Destination members left unresolved, per pair, for validation.
    pub unmapped: Vec<(TypePair, Vec<String>)>,
}

/// One compile session.
pub struct Synthesizer<'a> {
    env: SynthEnv<'a>,
    registry: &'a StrategyRegistry,
    cache: &'a ProcedureCache,
    /// Slots declared by this session, including not-yet-backfilled ones.
    declared: FxHashMap<TypePair, SlotId>,
    order: Vec<(TypePair, SlotId)>,
    frozen: Vec<PairKey>,
    unmapped: Vec<(TypePair, Vec<String>)>,
    /// Projection pairs currently being inlined, for cycle detection.
    inline_stack: Vec<TypePair>,
}

impl<'a> Synthesizer<'a> {
    pub(crate) fn new(
        shapes: &'a ShapeRegistry,
        config: &'a MapperConfig,
        registry: &'a StrategyRegistry,
        cache: &'a ProcedureCache,
    ) -> Synthesizer<'a> {
        Synthesizer {
            env: SynthEnv { shapes, config },
            registry,
            cache,
            declared: FxHashMap::default(),
            order: Vec::new(),
            frozen: Vec::new(),
            unmapped: Vec::new(),
            inline_stack: Vec::new(),
        }
    }

    /// The shape registry procedures are synthesized against.
    pub fn shapes(&self) -> &'a ShapeRegistry {
        self.env.shapes
    }

    /// Wrap a hand-written conversion as a complete plan. This is how user
    /// strategy providers produce their result.
    pub fn custom(
        &self,
        pair: TypePair,
        f: impl Fn(&Value) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    ) -> Plan {
        Plan { pair, root: Op::Custom(Arc::new(f)) }
    }

    /// Settings for a pair, recording the consumption: the key freezes when
    /// this session publishes, whether a bag exists or not, along with
    /// every base it inherited from.
    pub(crate) fn settings(
        &mut self,
        source: ShapeId,
        dest: ShapeId,
    ) -> Option<&'a MappingSettings> {
        self.frozen.push((source, dest));
        let found = self.env.settings(source, dest);
        if let Some(s) = found {
            self.frozen.extend(s.inherited_chain.iter().copied());
        }
        found
    }

    /// The name-matching policy in effect for a pair's settings.
    pub(crate) fn name_policy(&self, settings: Option<&MappingSettings>) -> NameMatch {
        settings
            .and_then(|s| s.name_match.clone())
            .unwrap_or_else(|| self.env.config.default_name_match.clone())
    }

    pub(crate) fn default_max_depth(&self) -> Option<u32> {
        self.env.config.default_max_depth
    }

    /// Record destination members no resolution step could source.
    pub(crate) fn record_unmapped(&mut self, pair: TypePair, members: Vec<String>) {
        if !members.is_empty() {
            self.unmapped.push((pair, members));
        }
    }

    pub(crate) fn display_pair(&self, pair: TypePair) -> String {
        self.env.shapes.display_pair(pair.source, pair.dest)
    }

    /// The slot holding the procedure for a pair, compiling it within this
    /// session when it is neither published nor already declared here.
    pub(crate) fn require(&mut self, pair: TypePair) -> Result<SlotId, CompileError> {
        if let Some(slot) = self.cache.published_slot(pair) {
            return Ok(slot);
        }
        if let Some(&slot) = self.declared.get(&pair) {
            return Ok(slot);
        }
        let slot = self.cache.alloc_slot();
        self.declared.insert(pair, slot);
        self.order.push((pair, slot));
        let plan = self.plan_for(pair)?;
        self.cache.backfill(slot, lower::lower(&plan));
        self.cache.note_compile();
        Ok(slot)
    }

    /// Build the plan for one pair through strategy selection.
    pub(crate) fn plan_for(&mut self, pair: TypePair) -> Result<Plan, CompileError> {
        if pair.kind == MappingKind::Projection {
            if self.inline_stack.contains(&pair) {
                return Err(CompileError::ProjectionCycle { pair: self.display_pair(pair) });
            }
            self.inline_stack.push(pair);
            let plan = self.select_and_build(pair);
            self.inline_stack.pop();
            return plan;
        }
        self.select_and_build(pair)
    }

    fn select_and_build(&mut self, pair: TypePair) -> Result<Plan, CompileError> {
        let registry = self.registry;
        match registry.select(pair, &self.env) {
            Some(strategy) => strategy.synthesize(pair, self),
            None if self.env.require_explicit() => {
                Err(ConfigError::MissingMapping { pair: self.display_pair(pair) }.into())
            }
            None => registry.fallback().synthesize(pair, self),
        }
    }

    /// The op converting one nested value inside a composite conversion.
    ///
    /// Scalar-like pairs inline their subtree. Struct and collection pairs
    /// compile as separate procedures and are invoked through the cache,
    /// which is what lets recursive object graphs terminate. Projection
    /// parents inline everything.
    pub(crate) fn nested_op(
        &mut self,
        parent_kind: MappingKind,
        source: ShapeId,
        dest: ShapeId,
    ) -> Result<Op, CompileError> {
        let kind = match parent_kind {
            MappingKind::Projection => MappingKind::Projection,
            // Nested values are always fresh, even under a populate root.
            _ => MappingKind::NewInstance,
        };
        let pair = TypePair::new(source, dest, kind);
        if kind == MappingKind::Projection || (self.scalar_like(source) && self.scalar_like(dest))
        {
            let plan = self.plan_for(pair)?;
            Ok(plan.root)
        } else {
            let slot = self.require(pair)?;
            Ok(Op::Call { slot, pair })
        }
    }

    /// True for shapes whose conversions inline instead of occupying a
    /// cache slot.
    fn scalar_like(&self, id: ShapeId) -> bool {
        match self.env.shapes.get(id) {
            Shape::Primitive(_) | Shape::Enum(_) | Shape::Any => true,
            Shape::Optional(inner) => self.scalar_like(*inner),
            Shape::Struct(_) | Shape::List(_) | Shape::Array { .. } | Shape::Map { .. } => false,
        }
    }

    pub(crate) fn finish(self) -> SessionOutcome {
        // Every compiled pair freezes, read settings or not.
        let mut frozen = self.frozen;
        frozen.extend(self.order.iter().map(|(pair, _)| (pair.source, pair.dest)));
        SessionOutcome { entries: self.order, frozen, unmapped: self.unmapped }
    }

    /// Abandon the session. Declared slots go back to the cache's free
    /// list; nothing was published, so nothing can reference them.
    pub(crate) fn rollback(self) {
        let slots = self.order.into_iter().map(|(_, slot)| slot).collect();
        self.cache.recycle(slots);
    }
}
