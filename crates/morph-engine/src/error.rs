//! Error types for configuration, compilation, and conversion.
//!
//! Errors are split by phase. `ConfigError` covers mistakes in the mapping
//! configuration, caught either when the mapper is built or when a pair is
//! first compiled. `CompileError` covers synthesis failures for a specific
//! pair. `RuntimeError` covers value-level failures while a compiled
//! procedure runs. `MapError` is the umbrella the public conversion entry
//! points return.
//!
//! Shape names in errors are pre-rendered strings so that errors stay
//! self-contained once they leave the engine.

use std::fmt;

/// A mistake in the mapping configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Settings for a pair were mutated after a compile consumed them.
    FrozenSettings { pair: String },
    /// A pair required explicit configuration and had none.
    MissingMapping { pair: String },
    /// Destination members no resolution step could account for, on a pair
    /// that requires full coverage. Lists every unmapped member at once.
    UnmappedMembers { pair: String, members: Vec<String> },
    /// Parameterized construction was requested but no public constructor
    /// could be satisfied.
    NoUsableConstructor { shape: String },
    /// An override names a source member that does not exist.
    UnknownSourceMember { pair: String, member: String },
    /// An override names a destination member that does not exist.
    UnknownDestMember { pair: String, member: String },
    /// `inherit_from` chains form a cycle.
    InheritanceCycle { pair: String },
    /// `inherit_from` names a pair with no settings of its own.
    MissingBase { pair: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrozenSettings { pair } => {
                write!(
                    f,
                    "settings for {pair} are frozen: the pair has already been compiled \
                     (reset the cache to edit)"
                )
            }
            Self::MissingMapping { pair } => {
                write!(f, "no mapping configured for {pair} and explicit mappings are required")
            }
            Self::UnmappedMembers { pair, members } => {
                write!(f, "unmapped destination members for {pair}: {}", members.join(", "))
            }
            Self::NoUsableConstructor { shape } => {
                write!(f, "no usable constructor for `{shape}`")
            }
            Self::UnknownSourceMember { pair, member } => {
                write!(f, "override for {pair} names unknown source member `{member}`")
            }
            Self::UnknownDestMember { pair, member } => {
                write!(f, "override for {pair} names unknown destination member `{member}`")
            }
            Self::InheritanceCycle { pair } => {
                write!(f, "settings inheritance cycle through {pair}")
            }
            Self::MissingBase { pair } => {
                write!(f, "inherited base pair {pair} has no settings")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// A failure while synthesizing the procedure for one pair.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// The claiming strategy cannot express this pair.
    Unsupported { pair: String, detail: String },
    /// A projection re-entered a pair already being inlined. Projections
    /// cannot express cyclic object graphs.
    ProjectionCycle { pair: String },
    /// A nested failure, attributed to the destination member whose
    /// conversion required it.
    Member { pair: String, member: String, cause: Box<CompileError> },
    Config(ConfigError),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported { pair, detail } => {
                write!(f, "cannot convert {pair}: {detail}")
            }
            Self::ProjectionCycle { pair } => {
                write!(f, "projection of {pair} is cyclic")
            }
            Self::Member { pair, member, cause } => {
                write!(f, "member `{member}` of {pair}: {cause}")
            }
            Self::Config(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Member { cause, .. } => Some(cause),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CompileError {
    fn from(e: ConfigError) -> CompileError {
        CompileError::Config(e)
    }
}

/// A value-level failure while running a compiled procedure.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// A value did not have the kind its declared shape promised.
    ValueShapeMismatch { expected: String, found: &'static str },
    /// A string could not be parsed as the target primitive.
    ParseFailure { value: String, target: &'static str },
    /// A string named no variant of the destination enum.
    UnknownEnumName { name: String, enum_name: String },
    /// An integer matched no variant value of the destination enum.
    NoVariantForValue { value: i64, enum_name: String },
    /// An array's rank disagreed with the declared shape.
    RankMismatch { expected: u32, found: u32 },
    /// A populate call received a destination of the wrong kind.
    PopulateTarget { expected: &'static str, found: &'static str },
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValueShapeMismatch { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            Self::ParseFailure { value, target } => {
                write!(f, "cannot parse {value:?} as {target}")
            }
            Self::UnknownEnumName { name, enum_name } => {
                write!(f, "`{enum_name}` has no variant named {name:?}")
            }
            Self::NoVariantForValue { value, enum_name } => {
                write!(f, "`{enum_name}` has no variant with value {value}")
            }
            Self::RankMismatch { expected, found } => {
                write!(f, "array rank mismatch: expected rank {expected}, found rank {found}")
            }
            Self::PopulateTarget { expected, found } => {
                write!(f, "populate target must be {expected}, found {found}")
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Umbrella error for the public conversion entry points.
#[derive(Debug, Clone, PartialEq)]
pub enum MapError {
    Config(ConfigError),
    Compile(CompileError),
    Runtime(RuntimeError),
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{e}"),
            Self::Compile(e) => write!(f, "{e}"),
            Self::Runtime(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for MapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Compile(e) => Some(e),
            Self::Runtime(e) => Some(e),
        }
    }
}

impl From<ConfigError> for MapError {
    fn from(e: ConfigError) -> MapError {
        MapError::Config(e)
    }
}

impl From<CompileError> for MapError {
    fn from(e: CompileError) -> MapError {
        MapError::Compile(e)
    }
}

impl From<RuntimeError> for MapError {
    fn from(e: RuntimeError) -> MapError {
        MapError::Runtime(e)
    }
}

/// Aggregate result of validating every configured pair.
///
/// One report per failing pair; a pair can fail by leaving destination
/// members unmapped, by failing to compile, or both ways at once across
/// the pairs it pulls in.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub reports: Vec<PairReport>,
}

/// What went wrong for one pair during validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PairReport {
    pub pair: String,
    pub unmapped: Vec<String>,
    pub failure: Option<String>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "mapper validation failed for {} pair(s):", self.reports.len())?;
        for report in &self.reports {
            writeln!(f, "  {}:", report.pair)?;
            if !report.unmapped.is_empty() {
                writeln!(f, "    unmapped destination members: {}", report.unmapped.join(", "))?;
            }
            if let Some(failure) = &report.failure {
                writeln!(f, "    compile failed: {failure}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}
