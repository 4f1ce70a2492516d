//! Struct construction through a constructor overload.
//!
//! Claims struct pairs whose destination offers a usable public
//! constructor, unless the pair's settings say otherwise. Overloads are
//! tried most-parameters-first, declaration order on ties; a parameter
//! binds to an explicit override, to a source member through the
//! resolution chain, or to its own declared default. The first overload
//! whose every parameter binds wins, and members the constructor covers
//! are not resolved again.

use morph_model::{AccessModifier, MemberDescriptor, ParamDescriptor, StructShape};

use crate::error::{CompileError, ConfigError};
use crate::names::NameMatch;
use crate::pair::{MappingKind, TypePair};
use crate::plan::{ArgSource, Construction, CtorArg, Plan};
use crate::resolve::{resolve_member, Resolution};
use crate::settings::MappingSettings;
use crate::strategies::object::{assemble, build_members};
use crate::strategies::{score, struct_of, unsupported, ConversionStrategy};
use crate::synth::{SynthEnv, Synthesizer};

pub(crate) struct RecordStrategy;

impl ConversionStrategy for RecordStrategy {
    fn name(&self) -> &'static str {
        "record"
    }

    fn score(&self, pair: TypePair, env: &SynthEnv<'_>) -> Option<i32> {
        // Populating an existing value never constructs.
        if pair.kind == MappingKind::PopulateExisting {
            return None;
        }
        let shapes = env.shapes();
        let src_id = struct_of(shapes, pair.source)?;
        let dest_id = struct_of(shapes, pair.dest)?;
        let settings = env.settings(pair.source, pair.dest);
        if env.require_explicit() && settings.is_none() {
            return None;
        }
        // A factory or a same-shape shallow copy overrides construction.
        if settings.is_some_and(|s| s.construct_with.is_some()) {
            return None;
        }
        if src_id == dest_id && settings.is_some_and(|s| s.shallow_copy) {
            return None;
        }
        match settings.and_then(|s| s.use_constructor) {
            Some(false) => None,
            Some(true) => Some(score::RECORD),
            None => {
                let dest = shapes.struct_shape(dest_id)?;
                dest.constructors
                    .iter()
                    .any(|c| c.access == AccessModifier::Public && !c.params.is_empty())
                    .then_some(score::RECORD)
            }
        }
    }

    fn synthesize(&self, pair: TypePair, syn: &mut Synthesizer<'_>) -> Result<Plan, CompileError> {
        let shapes = syn.shapes();
        let (Some(src_id), Some(dest_id)) =
            (struct_of(shapes, pair.source), struct_of(shapes, pair.dest))
        else {
            return Err(unsupported(syn, pair, "not a struct pair"));
        };
        let (Some(src_struct), Some(dest_struct)) =
            (shapes.struct_shape(src_id), shapes.struct_shape(dest_id))
        else {
            return Err(unsupported(syn, pair, "not a struct pair"));
        };
        let settings = syn.settings(pair.source, pair.dest);

        let mut ranked: Vec<_> = dest_struct
            .constructors
            .iter()
            .enumerate()
            .filter(|(_, c)| c.access == AccessModifier::Public)
            .collect();
        ranked.sort_by(|a, b| b.1.params.len().cmp(&a.1.params.len()));

        let mut chosen = None;
        'overloads: for (idx, ctor) in ranked {
            let mut args = Vec::with_capacity(ctor.params.len());
            for param in &ctor.params {
                match bind_param(syn, pair, settings, src_struct, dest_struct, param)? {
                    Some(arg) => args.push(arg),
                    None => continue 'overloads,
                }
            }
            chosen = Some((idx, args));
            break;
        }
        let Some((ctor, args)) = chosen else {
            return Err(ConfigError::NoUsableConstructor { shape: shapes.display(dest_id) }.into());
        };

        let covered: Vec<usize> = args.iter().filter_map(|a| a.dest_slot).collect();
        let (members, unmapped) =
            build_members(syn, pair, settings, src_struct, dest_struct, &covered)?;
        let construction = Construction::Parameterized { ctor, args };
        assemble(syn, pair, settings, dest_id, construction, members, unmapped)
    }
}

/// Bind one constructor parameter, or `None` when this overload cannot be
/// used. Parameters always match case-insensitively, independent of the
/// pair's name policy, and explicit overrides name them under the same
/// latitude.
fn bind_param(
    syn: &mut Synthesizer<'_>,
    pair: TypePair,
    settings: Option<&MappingSettings>,
    src_struct: &StructShape,
    dest_struct: &StructShape,
    param: &ParamDescriptor,
) -> Result<Option<CtorArg>, CompileError> {
    let ci = NameMatch::CaseInsensitive;
    // Slot the parameter's value lands in, when a member carries its name.
    let dest_slot = dest_struct
        .members
        .iter()
        .position(|m| ci.matches(&m.name, &param.name));

    // An override may spell the parameter with different casing; resolve
    // under the override's own spelling so the chain's exact lookup sees it.
    let name = override_spelling(settings, &param.name).unwrap_or(&param.name);
    let probe = MemberDescriptor::property(name, param.shape);
    match resolve_member(syn.shapes(), src_struct, settings, &ci, &probe) {
        Resolution::Mapped { fetch, shape } => {
            let convert = syn.nested_op(pair.kind, shape, param.shape).map_err(|cause| {
                CompileError::Member {
                    pair: syn.display_pair(pair),
                    member: param.name.clone(),
                    cause: Box::new(cause),
                }
            })?;
            Ok(Some(CtorArg {
                param: param.name.clone(),
                dest_slot,
                source: ArgSource::Fetched { fetch, convert },
            }))
        }
        Resolution::Skipped | Resolution::Unmapped => Ok(param.default.as_ref().map(|c| CtorArg {
            param: param.name.clone(),
            dest_slot,
            source: ArgSource::Default(c.clone()),
        })),
    }
}

/// The explicit override key whose spelling differs from the parameter's
/// only by case. An exactly-spelled key resolves through the chain as-is.
fn override_spelling<'s>(
    settings: Option<&'s MappingSettings>,
    param: &str,
) -> Option<&'s str> {
    let sources = &settings?.member_sources;
    if sources.contains_key(param) {
        return None;
    }
    sources.keys().map(String::as_str).find(|k| k.eq_ignore_ascii_case(param))
}
