//! The mapper: the public conversion surface.
//!
//! A `Mapper` owns a shared shape registry, the resolved configuration,
//! the strategy registry, and the procedure cache. Conversion entry
//! points compile on first use: `convert` builds a fresh destination,
//! `convert_into` populates a caller-provided one, and `project` runs the
//! pure inlined form. Concurrent first users of a pair serialize on the
//! compile lock and produce exactly one physical compile.
//!
//! Settings freeze when a successful compile consumes them and stay
//! frozen until `reset_cache`. A failed compile publishes nothing, so its
//! settings stay editable and the pair can be retried after a fix.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use morph_model::{ShapeId, ShapeRegistry, StructShape, Value};

use crate::cache::{Compiled, ProcedureCache};
use crate::context::ConvCtx;
use crate::error::{CompileError, ConfigError, MapError, PairReport, ValidationError};
use crate::pair::{MappingKind, TypePair};
use crate::registry::StrategyRegistry;
use crate::settings::{MapperConfig, MappingSettings, MemberSource, PairKey};
use crate::synth::Synthesizer;

pub struct Mapper {
    shapes: Arc<ShapeRegistry>,
    config: MapperConfig,
    registry: StrategyRegistry,
    cache: ProcedureCache,
    /// Settings keys consumed by successful compiles.
    frozen: RwLock<FxHashSet<PairKey>>,
    /// Unmapped-member diagnostics recorded per compiled pair.
    diagnostics: RwLock<FxHashMap<TypePair, Vec<String>>>,
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapper").finish_non_exhaustive()
    }
}

impl Mapper {
    /// Build a mapper over a frozen shape registry.
    ///
    /// Settings inheritance is resolved here, once, and member overrides
    /// are checked against the shapes they name, so configuration
    /// mistakes surface immediately rather than on first use of whichever
    /// pair carries them.
    pub fn new(
        shapes: Arc<ShapeRegistry>,
        mut config: MapperConfig,
    ) -> Result<Mapper, ConfigError> {
        config.resolve_inheritance(&shapes)?;
        check_overrides(&shapes, &config)?;
        let registry = StrategyRegistry::new(config.strategies.clone());
        Ok(Mapper {
            shapes,
            config,
            registry,
            cache: ProcedureCache::new(),
            frozen: RwLock::new(FxHashSet::default()),
            diagnostics: RwLock::new(FxHashMap::default()),
        })
    }

    /// The shape registry this mapper converts against.
    pub fn shapes(&self) -> &ShapeRegistry {
        &self.shapes
    }

    /// Convert a source value into a fresh destination value.
    pub fn convert(
        &self,
        source: ShapeId,
        dest: ShapeId,
        value: &Value,
    ) -> Result<Value, MapError> {
        let pair = TypePair::new(source, dest, MappingKind::NewInstance);
        let Compiled::Convert(f) = self.ensure_compiled(pair)? else {
            unreachable!("new-instance pair bound to a populate procedure");
        };
        let mut ctx = ConvCtx::new(&self.shapes, &self.cache);
        Ok(f(value, &mut ctx)?)
    }

    /// Convert into a caller-provided destination value, merging where
    /// the destination kind supports it, and return the updated
    /// destination.
    pub fn convert_into(
        &self,
        source: ShapeId,
        dest: ShapeId,
        value: &Value,
        existing: Value,
    ) -> Result<Value, MapError> {
        let pair = TypePair::new(source, dest, MappingKind::PopulateExisting);
        let Compiled::Populate(f) = self.ensure_compiled(pair)? else {
            unreachable!("populate pair bound to a new-instance procedure");
        };
        let mut ctx = ConvCtx::new(&self.shapes, &self.cache);
        Ok(f(value, existing, &mut ctx)?)
    }

    /// Convert through the pure projection form: fully inlined, no hooks,
    /// no conditions, no reference tracking.
    pub fn project(
        &self,
        source: ShapeId,
        dest: ShapeId,
        value: &Value,
    ) -> Result<Value, MapError> {
        let pair = TypePair::new(source, dest, MappingKind::Projection);
        let Compiled::Convert(f) = self.ensure_compiled(pair)? else {
            unreachable!("projection pair bound to a populate procedure");
        };
        let mut ctx = ConvCtx::new(&self.shapes, &self.cache);
        Ok(f(value, &mut ctx)?)
    }

    /// Mutable settings for a pair, for corrections between compiles.
    ///
    /// Refused once a successful compile has covered the pair, whether it
    /// had settings then or not; `reset_cache` unfreezes everything.
    /// Inheritance is resolved when the mapper is built, so `inherit_from`
    /// set here has no effect.
    pub fn settings_mut(
        &mut self,
        source: ShapeId,
        dest: ShapeId,
    ) -> Result<&mut MappingSettings, ConfigError> {
        if self.frozen.get_mut().contains(&(source, dest)) {
            return Err(ConfigError::FrozenSettings {
                pair: self.shapes.display_pair(source, dest),
            });
        }
        Ok(self.config.pair(source, dest))
    }

    /// Drop every compiled procedure and unfreeze all settings. The
    /// cumulative compile count survives resets.
    pub fn reset_cache(&mut self) {
        self.cache.clear();
        self.frozen.get_mut().clear();
        self.diagnostics.get_mut().clear();
    }

    /// Physical compiles performed, cumulative across resets. Stable under
    /// repeated conversion of already-compiled pairs.
    pub fn compile_count(&self) -> u64 {
        self.cache.compile_count()
    }

    /// Pairs currently published in the cache.
    pub fn compiled_pairs(&self) -> usize {
        self.cache.compiled_pairs()
    }

    /// Compile every configured pair and aggregate everything wrong.
    ///
    /// Each configured (source, destination) key compiles as a
    /// new-instance pair. A pair fails by leaving destination members
    /// unmapped, by failing to compile, or both; unconfigured pairs
    /// pulled in by a configured one surface their unmapped members too.
    /// Reports come sorted by pair name.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut reports = Vec::new();
        for &(src, dst) in self.config.pairs.keys() {
            let pair = TypePair::new(src, dst, MappingKind::NewInstance);
            let failure = match self.ensure_compiled(pair) {
                Ok(_) => None,
                Err(e) => Some(e.to_string()),
            };
            let unmapped = self.diagnostics.read().get(&pair).cloned().unwrap_or_default();
            if failure.is_some() || !unmapped.is_empty() {
                reports.push(PairReport {
                    pair: self.shapes.display_pair(src, dst),
                    unmapped,
                    failure,
                });
            }
        }

        let diagnostics = self.diagnostics.read();
        for (&pair, unmapped) in diagnostics.iter() {
            if pair.kind != MappingKind::NewInstance || unmapped.is_empty() {
                continue;
            }
            let name = self.shapes.display_pair(pair.source, pair.dest);
            if !reports.iter().any(|r| r.pair == name) {
                reports.push(PairReport { pair: name, unmapped: unmapped.clone(), failure: None });
            }
        }
        drop(diagnostics);

        if reports.is_empty() {
            return Ok(());
        }
        reports.sort_by(|a, b| a.pair.cmp(&b.pair));
        Err(ValidationError { reports })
    }

    /// The compiled procedure for a pair, compiling on first use.
    fn ensure_compiled(&self, pair: TypePair) -> Result<Compiled, CompileError> {
        if let Some(compiled) = self.cache.lookup(pair) {
            return Ok(compiled);
        }
        let _guard = self.cache.compile_guard();
        // Lost the race: the winner published while this thread waited.
        if let Some(compiled) = self.cache.lookup(pair) {
            return Ok(compiled);
        }

        let mut syn = Synthesizer::new(&self.shapes, &self.config, &self.registry, &self.cache);
        match syn.require(pair) {
            Ok(slot) => {
                let outcome = syn.finish();
                self.cache.publish(&outcome.entries);
                self.frozen.write().extend(outcome.frozen);
                let mut diagnostics = self.diagnostics.write();
                for (p, members) in outcome.unmapped {
                    diagnostics.insert(p, members);
                }
                drop(diagnostics);
                Ok(self.cache.thunk(slot))
            }
            Err(e) => {
                syn.rollback();
                Err(e)
            }
        }
    }
}

/// Check member overrides against the shapes they name. Constructor
/// parameter names count as destination members, case-insensitively, the
/// way the record strategy binds them. Map-keyed sides are runtime data
/// and are not checked.
fn check_overrides(shapes: &ShapeRegistry, config: &MapperConfig) -> Result<(), ConfigError> {
    for (&(src, dst), settings) in &config.pairs {
        if let Some(dest_struct) = shapes.struct_shape(shapes.unwrap_optional(dst)) {
            for name in settings.member_sources.keys() {
                let known = dest_struct.member_index(name).is_some()
                    || dest_struct
                        .constructors
                        .iter()
                        .flat_map(|c| &c.params)
                        .any(|p| p.name.eq_ignore_ascii_case(name));
                if !known {
                    return Err(ConfigError::UnknownDestMember {
                        pair: shapes.display_pair(src, dst),
                        member: name.clone(),
                    });
                }
            }
        }
        if let Some(src_struct) = shapes.struct_shape(shapes.unwrap_optional(src)) {
            for source in settings.member_sources.values() {
                if let Err(member) = check_source(shapes, src_struct, source) {
                    return Err(ConfigError::UnknownSourceMember {
                        pair: shapes.display_pair(src, dst),
                        member,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Check one override against the source struct, returning the unknown
/// member name on failure.
fn check_source(
    shapes: &ShapeRegistry,
    src: &StructShape,
    source: &MemberSource,
) -> Result<(), String> {
    match source {
        MemberSource::Member(name) => match src.member_index(name) {
            Some(_) => Ok(()),
            None => Err(name.clone()),
        },
        MemberSource::Path(names) => {
            let mut cur = src;
            for (i, name) in names.iter().enumerate() {
                let Some(idx) = cur.member_index(name) else {
                    return Err(name.clone());
                };
                if i + 1 < names.len() {
                    let inner = shapes.unwrap_optional(cur.members[idx].shape);
                    match shapes.struct_shape(inner) {
                        Some(next) => cur = next,
                        None => return Err(names[i + 1].clone()),
                    }
                }
            }
            Ok(())
        }
        MemberSource::Resolver(_) | MemberSource::Constant(_) => Ok(()),
    }
}
