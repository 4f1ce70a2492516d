//! Member-wise struct conversion.
//!
//! The general struct strategy and the weakest built-in struct claim;
//! record construction and dictionary conversion outrank it. Each public
//! destination member runs through the resolution chain and becomes one
//! `MemberOp`; the pair's settings supply construction, hooks, depth
//! limits, reference preservation, and derived-pair redirects. The
//! helpers here are shared with the record and dictionary strategies,
//! which assemble struct ops of their own.

use morph_model::{Const, ShapeId, StructShape};

use crate::cache::SlotId;
use crate::error::{CompileError, ConfigError};
use crate::pair::{MappingKind, TypePair};
use crate::plan::{Construction, MemberOp, Op, Plan, StructOp};
use crate::resolve::{resolve_member, Resolution};
use crate::settings::{ConditionFn, HookFn, MappingSettings, TransformFn};
use crate::strategies::{score, struct_of, unsupported, ConversionStrategy};
use crate::synth::{SynthEnv, Synthesizer};

pub(crate) struct ObjectStrategy;

impl ConversionStrategy for ObjectStrategy {
    fn name(&self) -> &'static str {
        "object"
    }

    fn score(&self, pair: TypePair, env: &SynthEnv<'_>) -> Option<i32> {
        let shapes = env.shapes();
        if struct_of(shapes, pair.source).is_none() || struct_of(shapes, pair.dest).is_none() {
            return None;
        }
        if env.require_explicit() && env.settings(pair.source, pair.dest).is_none() {
            return None;
        }
        Some(score::OBJECT)
    }

    fn synthesize(&self, pair: TypePair, syn: &mut Synthesizer<'_>) -> Result<Plan, CompileError> {
        let shapes = syn.shapes();
        let (Some(src_id), Some(dest_id)) =
            (struct_of(shapes, pair.source), struct_of(shapes, pair.dest))
        else {
            return Err(unsupported(syn, pair, "not a struct pair"));
        };
        let settings = syn.settings(pair.source, pair.dest);

        if pair.kind != MappingKind::PopulateExisting
            && src_id == dest_id
            && settings.is_some_and(|s| s.shallow_copy)
        {
            return Ok(Plan { pair, root: Op::ShallowCopy { dest: dest_id } });
        }

        let (Some(src_struct), Some(dest_struct)) =
            (shapes.struct_shape(src_id), shapes.struct_shape(dest_id))
        else {
            return Err(unsupported(syn, pair, "not a struct pair"));
        };

        let (members, unmapped) = build_members(syn, pair, settings, src_struct, dest_struct, &[])?;
        let construction = construction_of(pair.kind, settings);
        assemble(syn, pair, settings, dest_id, construction, members, unmapped)
    }
}

/// Resolve every public destination member into a `MemberOp`, returning
/// the ops and the names nothing resolved. Slots in `skip_slots` are
/// covered elsewhere (constructor parameters) and are not resolved.
pub(super) fn build_members(
    syn: &mut Synthesizer<'_>,
    pair: TypePair,
    settings: Option<&MappingSettings>,
    src_struct: &StructShape,
    dest_struct: &StructShape,
    skip_slots: &[usize],
) -> Result<(Vec<MemberOp>, Vec<String>), CompileError> {
    let nm = syn.name_policy(settings);
    let mut members = Vec::new();
    let mut unmapped = Vec::new();
    for (slot, dm) in dest_struct.members.iter().enumerate() {
        if !dm.is_public() || skip_slots.contains(&slot) {
            continue;
        }
        match resolve_member(syn.shapes(), src_struct, settings, &nm, dm) {
            Resolution::Skipped => {}
            Resolution::Unmapped => unmapped.push(dm.name.clone()),
            Resolution::Mapped { fetch, shape } => {
                let convert = syn.nested_op(pair.kind, shape, dm.shape).map_err(|cause| {
                    CompileError::Member {
                        pair: syn.display_pair(pair),
                        member: dm.name.clone(),
                        cause: Box::new(cause),
                    }
                })?;
                let (skip_if, null_substitute, transforms) =
                    member_extras(settings, pair.kind, &dm.name, dm.shape);
                members.push(MemberOp {
                    dest_slot: slot,
                    dest_name: dm.name.clone(),
                    fetch,
                    convert,
                    skip_if,
                    null_substitute,
                    transforms,
                });
            }
        }
    }
    Ok((members, unmapped))
}

/// Per-member embellishments from the pair's settings. Conditions are
/// impure and do not survive into projections; null substitutes and shape
/// transforms do.
pub(super) fn member_extras(
    settings: Option<&MappingSettings>,
    kind: MappingKind,
    dest_name: &str,
    dest_shape: ShapeId,
) -> (Option<ConditionFn>, Option<Const>, Vec<TransformFn>) {
    let Some(s) = settings else {
        return (None, None, Vec::new());
    };
    let skip_if = if kind == MappingKind::Projection {
        None
    } else {
        s.conditions.get(dest_name).cloned()
    };
    let null_substitute = s.null_substitutes.get(dest_name).cloned();
    let transforms = s
        .transforms
        .iter()
        .filter(|(shape, _)| *shape == dest_shape)
        .map(|(_, f)| f.clone())
        .collect();
    (skip_if, null_substitute, transforms)
}

/// Construction for a struct op with no constructor binding. Projections
/// never run user factories.
pub(super) fn construction_of(
    kind: MappingKind,
    settings: Option<&MappingSettings>,
) -> Construction {
    if kind == MappingKind::Projection {
        return Construction::Default;
    }
    match settings.and_then(|s| s.construct_with.clone()) {
        Some(f) => Construction::Factory(f),
        None => Construction::Default,
    }
}

/// Finish a struct plan: enforce full-mapping, record leftovers, attach
/// hooks and redirects, and wrap the op.
pub(super) fn assemble(
    syn: &mut Synthesizer<'_>,
    pair: TypePair,
    settings: Option<&MappingSettings>,
    dest: ShapeId,
    construction: Construction,
    members: Vec<MemberOp>,
    unmapped: Vec<String>,
) -> Result<Plan, CompileError> {
    if !unmapped.is_empty() {
        if settings.is_some_and(|s| s.require_full_mapping) {
            return Err(ConfigError::UnmappedMembers {
                pair: syn.display_pair(pair),
                members: unmapped,
            }
            .into());
        }
        syn.record_unmapped(pair, unmapped);
    }
    let includes = derived_redirects(syn, pair.kind, settings)?;
    let extras = struct_extras(syn, pair.kind, settings);
    Ok(Plan {
        pair,
        root: Op::Struct(Box::new(StructOp {
            pair,
            dest,
            construction,
            members,
            before: extras.before,
            after: extras.after,
            max_depth: extras.max_depth,
            preserve_refs: extras.preserve,
            includes,
        })),
    })
}

struct StructExtras {
    before: Option<HookFn>,
    after: Option<HookFn>,
    max_depth: Option<u32>,
    preserve: bool,
}

/// Hooks, depth limits, and reference tracking. Projections are pure and
/// take none of them.
fn struct_extras(
    syn: &Synthesizer<'_>,
    kind: MappingKind,
    settings: Option<&MappingSettings>,
) -> StructExtras {
    if kind == MappingKind::Projection {
        return StructExtras { before: None, after: None, max_depth: None, preserve: false };
    }
    StructExtras {
        before: settings.and_then(|s| s.before_map.clone()),
        after: settings.and_then(|s| s.after_map.clone()),
        max_depth: settings
            .and_then(|s| s.max_depth)
            .or_else(|| syn.default_max_depth()),
        preserve: settings.is_some_and(|s| s.preserve_references),
    }
}

/// Compile each declared derived pair and record its dispatch slot. Only
/// new-instance procedures dispatch on the runtime source shape.
fn derived_redirects(
    syn: &mut Synthesizer<'_>,
    kind: MappingKind,
    settings: Option<&MappingSettings>,
) -> Result<Vec<(ShapeId, SlotId)>, CompileError> {
    if kind != MappingKind::NewInstance {
        return Ok(Vec::new());
    }
    let Some(s) = settings else {
        return Ok(Vec::new());
    };
    let mut redirects = Vec::with_capacity(s.includes.len());
    for &(derived_src, derived_dest) in &s.includes {
        let slot = syn.require(TypePair::new(derived_src, derived_dest, MappingKind::NewInstance))?;
        redirects.push((derived_src, slot));
    }
    Ok(redirects)
}
