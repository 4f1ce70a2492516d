//! Conversion engine for the Morph object mapper.
//!
//! The engine turns (source shape, destination shape, kind) requests into
//! compiled conversion procedures and runs them. A request is resolved by
//! scoring pluggable conversion strategies; the winner synthesizes an
//! operation tree, which is lowered into a closure and published in a
//! concurrent memoized cache. Convert-by-convert, the mapper is
//! lock-free: compilation happens once per pair, on first use, behind one
//! compile lock.
//!
//! ## Modules
//!
//! - [`mapper`]: the public [`Mapper`] and its conversion entry points
//! - [`settings`]: per-pair configuration bags and the mapper-wide config
//! - [`names`]: name-matching policies for member resolution
//! - [`strategies`]: the [`ConversionStrategy`] trait, claim scores, and
//!   the built-in strategy families
//! - [`error`]: configuration, compile, runtime, and validation errors
//!
//! Internals follow the compile pipeline: `registry` selects a strategy
//! for a pair, `resolve` decides where destination members come from,
//! `synth` runs compile sessions over the `plan` op tree, `lower` turns
//! plans into closures, and `cache` and `context` execute them.

pub mod error;
pub mod mapper;
pub mod names;
pub mod settings;
pub mod strategies;

mod cache;
mod context;
mod lower;
mod pair;
mod plan;
mod registry;
mod resolve;
mod synth;

pub use error::{CompileError, ConfigError, MapError, PairReport, RuntimeError, ValidationError};
pub use mapper::Mapper;
pub use names::{NameMatch, NormalizeFn};
pub use pair::{MappingKind, TypePair};
pub use plan::Plan;
pub use settings::{
    ConditionFn, EnumMatchMode, FactoryFn, HookFn, KeyTransformFn, MapperConfig, MappingSettings,
    MemberSource, ResolverFn, TransformFn,
};
pub use strategies::{score, ConversionStrategy};
pub use synth::{SynthEnv, Synthesizer};
