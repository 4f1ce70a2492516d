//! Per-pair mapping settings and the mapper-wide configuration bag.
//!
//! The configuration layer (fluent builders, attribute scanning) lives
//! outside this crate; what arrives here is the merged result: one
//! `MappingSettings` bag per (source, destination) key plus global
//! defaults, collected in a `MapperConfig`. Settings inheritance is
//! resolved exactly once, when the mapper is built, so synthesis only ever
//! sees merged bags.
//!
//! Every closure stored here must be `Send + Sync`: settings are shared by
//! all threads through the mapper. That is why constants are `Const`, not
//! `Value`.

use std::fmt;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use morph_model::{Const, ShapeId, ShapeRegistry, Value};

use crate::error::ConfigError;
use crate::names::NameMatch;
use crate::strategies::ConversionStrategy;

/// Settings key: a (source, destination) pair without the mapping kind.
pub(crate) type PairKey = (ShapeId, ShapeId);

// ── User-supplied functions ─────────────────────────────────────────────────

/// Computes one destination member from the whole source value.
pub type ResolverFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Decides per call whether a member is skipped (true skips).
pub type ConditionFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Rewrites a converted value before assignment.
pub type TransformFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Constructs the destination value from the source value.
pub type FactoryFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// A before/after hook: receives the source and the destination.
pub type HookFn = Arc<dyn Fn(&Value, &Value) + Send + Sync>;

/// Rewrites map keys during a dictionary merge.
pub type KeyTransformFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

// ── Member sources ──────────────────────────────────────────────────────────

/// An explicit override for where one destination member comes from.
#[derive(Clone)]
pub enum MemberSource {
    /// A named source member.
    Member(String),
    /// A chain of nested source members, outermost first.
    Path(Vec<String>),
    /// A custom resolver over the whole source value.
    Resolver(ResolverFn),
    /// A fixed constant.
    Constant(Const),
}

impl fmt::Debug for MemberSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberSource::Member(name) => write!(f, "Member({name:?})"),
            MemberSource::Path(path) => write!(f, "Path({path:?})"),
            MemberSource::Resolver(_) => f.write_str("Resolver(<fn>)"),
            MemberSource::Constant(c) => write!(f, "Constant({c:?})"),
        }
    }
}

/// How enum-to-enum conversion matches variants.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EnumMatchMode {
    /// Match variants by name; fall back to underlying value for variants
    /// the destination does not name.
    ByName,
    /// Match variants strictly by underlying value.
    ByValue,
}

// ── Per-pair settings ───────────────────────────────────────────────────────

/// The configuration bag for one (source, destination) pair.
///
/// All mutators chain, so a pair reads as one statement:
///
/// ```ignore
/// config.pair(order, order_dto)
///     .ignore("Audit")
///     .member("Customer", MemberSource::Path(vec!["Account".into(), "Name".into()]))
///     .max_depth(3);
/// ```
#[derive(Clone, Default)]
pub struct MappingSettings {
    pub(crate) name_match: Option<NameMatch>,
    pub(crate) ignored: FxHashSet<String>,
    pub(crate) member_sources: FxHashMap<String, MemberSource>,
    pub(crate) conditions: FxHashMap<String, ConditionFn>,
    pub(crate) null_substitutes: FxHashMap<String, Const>,
    /// Post-conversion transforms keyed by destination value shape,
    /// applied in registration order.
    pub(crate) transforms: Vec<(ShapeId, TransformFn)>,
    pub(crate) before_map: Option<HookFn>,
    pub(crate) after_map: Option<HookFn>,
    pub(crate) construct_with: Option<FactoryFn>,
    pub(crate) use_constructor: Option<bool>,
    pub(crate) max_depth: Option<u32>,
    pub(crate) preserve_references: bool,
    pub(crate) shallow_copy: bool,
    pub(crate) require_full_mapping: bool,
    pub(crate) enum_match: Option<EnumMatchMode>,
    pub(crate) map_skip_null: bool,
    pub(crate) map_key_transform: Option<KeyTransformFn>,
    /// Derived-pair redirects: when the runtime source is one of these
    /// derived shapes, dispatch to the derived pair's procedure instead.
    pub(crate) includes: Vec<PairKey>,
    pub(crate) inherit_from: Option<PairKey>,
    /// Base keys this bag was merged from, recorded by inheritance
    /// resolution so compiles can freeze the whole chain.
    pub(crate) inherited_chain: Vec<PairKey>,
}

impl MappingSettings {
    pub fn new() -> MappingSettings {
        MappingSettings::default()
    }

    /// Override the name-matching policy for this pair.
    pub fn name_match(&mut self, nm: NameMatch) -> &mut Self {
        self.name_match = Some(nm);
        self
    }

    /// Skip a destination member entirely; its slot keeps the destination
    /// default.
    pub fn ignore(&mut self, member: impl Into<String>) -> &mut Self {
        self.ignored.insert(member.into());
        self
    }

    /// Explicitly source a destination member.
    pub fn member(&mut self, member: impl Into<String>, source: MemberSource) -> &mut Self {
        self.member_sources.insert(member.into(), source);
        self
    }

    /// Source a destination member from a custom resolver.
    pub fn resolve_with(
        &mut self,
        member: impl Into<String>,
        f: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> &mut Self {
        self.member(member, MemberSource::Resolver(Arc::new(f)))
    }

    /// Source a destination member from a constant.
    pub fn constant(&mut self, member: impl Into<String>, c: Const) -> &mut Self {
        self.member(member, MemberSource::Constant(c))
    }

    /// Skip a member on calls where the predicate returns true for the
    /// source value. The member keeps its default on skipped calls.
    pub fn ignore_if(
        &mut self,
        member: impl Into<String>,
        predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> &mut Self {
        self.conditions.insert(member.into(), Arc::new(predicate));
        self
    }

    /// Substitute a constant when the member's source value is null.
    pub fn null_substitute(&mut self, member: impl Into<String>, c: Const) -> &mut Self {
        self.null_substitutes.insert(member.into(), c);
        self
    }

    /// Transform every converted member value of the given destination
    /// shape before assignment.
    pub fn transform(
        &mut self,
        dest_shape: ShapeId,
        f: impl Fn(Value) -> Value + Send + Sync + 'static,
    ) -> &mut Self {
        self.transforms.push((dest_shape, Arc::new(f)));
        self
    }

    /// Run a hook after construction, before members are populated.
    pub fn before_map(&mut self, f: impl Fn(&Value, &Value) + Send + Sync + 'static) -> &mut Self {
        self.before_map = Some(Arc::new(f));
        self
    }

    /// Run a hook after members are populated.
    pub fn after_map(&mut self, f: impl Fn(&Value, &Value) + Send + Sync + 'static) -> &mut Self {
        self.after_map = Some(Arc::new(f));
        self
    }

    /// Construct the destination with a factory instead of a constructor.
    pub fn construct_with(
        &mut self,
        f: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> &mut Self {
        self.construct_with = Some(Arc::new(f));
        self
    }

    /// Force parameterized construction on (or off) for this pair.
    pub fn use_constructor(&mut self, on: bool) -> &mut Self {
        self.use_constructor = Some(on);
        self
    }

    /// Truncate recursion into this pair beyond the given depth.
    pub fn max_depth(&mut self, depth: u32) -> &mut Self {
        self.max_depth = Some(depth);
        self
    }

    /// Preserve source aliasing: two references to one source object
    /// convert to two references to one destination object.
    pub fn preserve_references(&mut self) -> &mut Self {
        self.preserve_references = true;
        self
    }

    /// When source and destination are the same struct shape, copy slots
    /// instead of converting member by member.
    pub fn shallow_copy(&mut self) -> &mut Self {
        self.shallow_copy = true;
        self
    }

    /// Fail compilation unless every destination member resolves.
    pub fn require_full_mapping(&mut self) -> &mut Self {
        self.require_full_mapping = true;
        self
    }

    /// How enum-to-enum conversion matches variants for this pair.
    pub fn enum_match(&mut self, mode: EnumMatchMode) -> &mut Self {
        self.enum_match = Some(mode);
        self
    }

    /// Drop null values when producing a dictionary.
    pub fn map_skip_null(&mut self) -> &mut Self {
        self.map_skip_null = true;
        self
    }

    /// Rewrite keys when merging into an existing dictionary.
    pub fn map_key_transform(
        &mut self,
        f: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> &mut Self {
        self.map_key_transform = Some(Arc::new(f));
        self
    }

    /// Redirect to a derived pair when the runtime source has the derived
    /// shape.
    pub fn include(&mut self, derived_source: ShapeId, derived_dest: ShapeId) -> &mut Self {
        self.includes.push((derived_source, derived_dest));
        self
    }

    /// Inherit this pair's settings from a base pair. Resolved once, when
    /// the mapper is built.
    pub fn inherit_from(&mut self, base_source: ShapeId, base_dest: ShapeId) -> &mut Self {
        self.inherit_from = Some((base_source, base_dest));
        self
    }

    /// Merge `child` over `base`: child's scalars win, sets union, and
    /// child transforms run after the base's.
    fn merged_over(base: &MappingSettings, child: &MappingSettings) -> MappingSettings {
        let mut merged = base.clone();
        if child.name_match.is_some() {
            merged.name_match = child.name_match.clone();
        }
        merged.ignored.extend(child.ignored.iter().cloned());
        merged
            .member_sources
            .extend(child.member_sources.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
            .conditions
            .extend(child.conditions.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
            .null_substitutes
            .extend(child.null_substitutes.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.transforms.extend(child.transforms.iter().cloned());
        if child.before_map.is_some() {
            merged.before_map = child.before_map.clone();
        }
        if child.after_map.is_some() {
            merged.after_map = child.after_map.clone();
        }
        if child.construct_with.is_some() {
            merged.construct_with = child.construct_with.clone();
        }
        if child.use_constructor.is_some() {
            merged.use_constructor = child.use_constructor;
        }
        if child.max_depth.is_some() {
            merged.max_depth = child.max_depth;
        }
        merged.preserve_references |= child.preserve_references;
        merged.shallow_copy |= child.shallow_copy;
        merged.require_full_mapping |= child.require_full_mapping;
        if child.enum_match.is_some() {
            merged.enum_match = child.enum_match;
        }
        merged.map_skip_null |= child.map_skip_null;
        if child.map_key_transform.is_some() {
            merged.map_key_transform = child.map_key_transform.clone();
        }
        // Redirect tables are not inherited; each pair dispatches only on
        // its own declared derived pairs.
        merged.includes = child.includes.clone();
        merged.inherit_from = None;
        merged
    }
}

impl fmt::Debug for MappingSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingSettings")
            .field("name_match", &self.name_match)
            .field("ignored", &self.ignored)
            .field("member_sources", &self.member_sources)
            .field("max_depth", &self.max_depth)
            .field("preserve_references", &self.preserve_references)
            .field("shallow_copy", &self.shallow_copy)
            .field("require_full_mapping", &self.require_full_mapping)
            .field("enum_match", &self.enum_match)
            .field("includes", &self.includes)
            .field("inherit_from", &self.inherit_from)
            .finish_non_exhaustive()
    }
}

// ── Mapper-wide configuration ───────────────────────────────────────────────

/// Everything the engine consumes from the configuration layer: global
/// defaults, per-pair settings, and user strategy providers.
#[derive(Default)]
pub struct MapperConfig {
    pub(crate) default_name_match: NameMatch,
    pub(crate) default_max_depth: Option<u32>,
    pub(crate) require_explicit: bool,
    pub(crate) pairs: FxHashMap<PairKey, MappingSettings>,
    pub(crate) strategies: Vec<Arc<dyn ConversionStrategy>>,
}

impl MapperConfig {
    pub fn new() -> MapperConfig {
        MapperConfig::default()
    }

    /// Default name-matching policy for pairs without an override.
    pub fn default_name_match(&mut self, nm: NameMatch) -> &mut Self {
        self.default_name_match = nm;
        self
    }

    /// Default recursion depth limit for pairs without an override.
    pub fn default_max_depth(&mut self, depth: u32) -> &mut Self {
        self.default_max_depth = Some(depth);
        self
    }

    /// Refuse to synthesize struct pairs that have no configured settings.
    pub fn require_explicit(&mut self, on: bool) -> &mut Self {
        self.require_explicit = on;
        self
    }

    /// Settings for a pair, created empty on first access.
    pub fn pair(&mut self, source: ShapeId, dest: ShapeId) -> &mut MappingSettings {
        self.pairs.entry((source, dest)).or_default()
    }

    pub fn settings(&self, source: ShapeId, dest: ShapeId) -> Option<&MappingSettings> {
        self.pairs.get(&(source, dest))
    }

    /// Register a user strategy provider. User providers are consulted
    /// before every built-in, in registration order.
    pub fn register_strategy(&mut self, strategy: Arc<dyn ConversionStrategy>) -> &mut Self {
        self.strategies.push(strategy);
        self
    }

    /// Resolve every `inherit_from` chain into merged bags. Called once
    /// when the mapper is built.
    pub(crate) fn resolve_inheritance(
        &mut self,
        shapes: &ShapeRegistry,
    ) -> Result<(), ConfigError> {
        let keys: Vec<PairKey> = self.pairs.keys().copied().collect();
        let mut resolved: FxHashMap<PairKey, MappingSettings> = FxHashMap::default();
        for key in keys {
            let mut visiting = Vec::new();
            let merged = merged_chain(&self.pairs, key, &mut visiting, shapes)?;
            resolved.insert(key, merged);
        }
        self.pairs = resolved;
        Ok(())
    }
}

/// Walk a pair's inheritance chain base-first and fold the bags together.
fn merged_chain(
    pairs: &FxHashMap<PairKey, MappingSettings>,
    key: PairKey,
    visiting: &mut Vec<PairKey>,
    shapes: &ShapeRegistry,
) -> Result<MappingSettings, ConfigError> {
    if visiting.contains(&key) {
        return Err(ConfigError::InheritanceCycle {
            pair: shapes.display_pair(key.0, key.1),
        });
    }
    let settings = match pairs.get(&key) {
        Some(s) => s,
        None => {
            return Err(ConfigError::MissingBase {
                pair: shapes.display_pair(key.0, key.1),
            })
        }
    };
    let Some(base_key) = settings.inherit_from else {
        let mut leaf = settings.clone();
        leaf.inherited_chain = Vec::new();
        return Ok(leaf);
    };
    visiting.push(key);
    let base = merged_chain(pairs, base_key, visiting, shapes)?;
    visiting.pop();
    let mut merged = MappingSettings::merged_over(&base, settings);
    merged.inherited_chain = base.inherited_chain.clone();
    merged.inherited_chain.push(base_key);
    Ok(merged)
}
