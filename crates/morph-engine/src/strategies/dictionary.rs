//! String-keyed map conversion, to and from structs.
//!
//! Claims three pair families, each through one optional layer: map to
//! map (value by value), struct to map (each public source member becomes
//! an entry), and map to struct (each public destination member reads the
//! key carrying its name). Map-to-struct assembles a struct op and shares
//! the object strategy's embellishments.

use morph_model::{Shape, ShapeId, ShapeRegistry};

use crate::error::CompileError;
use crate::pair::TypePair;
use crate::plan::{Fetch, MapEntryOp, MapToMapOp, MemberOp, Op, Plan, StructToMapOp};
use crate::settings::{MappingSettings, MemberSource};
use crate::strategies::object::{assemble, construction_of, member_extras};
use crate::strategies::{score, struct_of, unsupported, ConversionStrategy};
use crate::synth::{SynthEnv, Synthesizer};

/// The value shape of the map under a shape, looking through one optional
/// layer.
fn map_value_of(shapes: &ShapeRegistry, id: ShapeId) -> Option<ShapeId> {
    match shapes.get(shapes.unwrap_optional(id)) {
        Shape::Map { value } => Some(*value),
        _ => None,
    }
}

pub(crate) struct DictionaryStrategy;

impl ConversionStrategy for DictionaryStrategy {
    fn name(&self) -> &'static str {
        "dictionary"
    }

    fn score(&self, pair: TypePair, env: &SynthEnv<'_>) -> Option<i32> {
        let shapes = env.shapes();
        let src_map = map_value_of(shapes, pair.source).is_some();
        let dest_map = map_value_of(shapes, pair.dest).is_some();
        let claims = (src_map && dest_map)
            || (src_map && struct_of(shapes, pair.dest).is_some())
            || (dest_map && struct_of(shapes, pair.source).is_some());
        claims.then_some(score::DICTIONARY)
    }

    fn synthesize(&self, pair: TypePair, syn: &mut Synthesizer<'_>) -> Result<Plan, CompileError> {
        let shapes = syn.shapes();
        let settings = syn.settings(pair.source, pair.dest);
        match (map_value_of(shapes, pair.source), map_value_of(shapes, pair.dest)) {
            (Some(src_value), Some(dest_value)) => {
                map_to_map(syn, pair, settings, src_value, dest_value)
            }
            (None, Some(dest_value)) => struct_to_map(syn, pair, settings, dest_value),
            (Some(src_value), None) => map_to_struct(syn, pair, settings, src_value),
            (None, None) => Err(unsupported(syn, pair, "not a dictionary pair")),
        }
    }
}

fn map_to_map(
    syn: &mut Synthesizer<'_>,
    pair: TypePair,
    settings: Option<&MappingSettings>,
    src_value: ShapeId,
    dest_value: ShapeId,
) -> Result<Plan, CompileError> {
    let value = syn.nested_op(pair.kind, src_value, dest_value)?;
    let op = MapToMapOp {
        value,
        skip_null: settings.is_some_and(|s| s.map_skip_null),
        key_transform: settings.and_then(|s| s.map_key_transform.clone()),
    };
    Ok(Plan { pair, root: Op::MapToMap(Box::new(op)) })
}

fn struct_to_map(
    syn: &mut Synthesizer<'_>,
    pair: TypePair,
    settings: Option<&MappingSettings>,
    dest_value: ShapeId,
) -> Result<Plan, CompileError> {
    let shapes = syn.shapes();
    let Some(src_id) = struct_of(shapes, pair.source) else {
        return Err(unsupported(syn, pair, "not a dictionary pair"));
    };
    let Some(src_struct) = shapes.struct_shape(src_id) else {
        return Err(unsupported(syn, pair, "not a dictionary pair"));
    };

    let mut entries = Vec::new();
    for (slot, m) in src_struct.members.iter().enumerate() {
        if !m.is_public() || settings.is_some_and(|s| s.ignored.contains(&m.name)) {
            continue;
        }
        let convert = syn.nested_op(pair.kind, m.shape, dest_value).map_err(|cause| {
            CompileError::Member {
                pair: syn.display_pair(pair),
                member: m.name.clone(),
                cause: Box::new(cause),
            }
        })?;
        entries.push(MapEntryOp { key: m.name.clone(), fetch: Fetch::Slot(slot), convert });
    }
    let op = StructToMapOp { entries, skip_null: settings.is_some_and(|s| s.map_skip_null) };
    Ok(Plan { pair, root: Op::StructToMap(Box::new(op)) })
}

fn map_to_struct(
    syn: &mut Synthesizer<'_>,
    pair: TypePair,
    settings: Option<&MappingSettings>,
    src_value: ShapeId,
) -> Result<Plan, CompileError> {
    let shapes = syn.shapes();
    let Some(dest_id) = struct_of(shapes, pair.dest) else {
        return Err(unsupported(syn, pair, "not a dictionary pair"));
    };
    let Some(dest_struct) = shapes.struct_shape(dest_id) else {
        return Err(unsupported(syn, pair, "not a dictionary pair"));
    };
    let nm = syn.name_policy(settings);

    let mut members = Vec::new();
    let mut unmapped = Vec::new();
    for (slot, dm) in dest_struct.members.iter().enumerate() {
        if !dm.is_public() {
            continue;
        }
        // Overrides and ignores apply; everything else reads its own key
        // under the pair's name policy. Keys are runtime data, so a missing
        // key is a null fetch, not an unmapped member.
        let (fetch, value_shape) = match settings.and_then(|s| s.member_sources.get(&dm.name)) {
            Some(MemberSource::Member(key)) => {
                (Fetch::Key { name: key.clone(), matcher: nm.clone() }, src_value)
            }
            Some(MemberSource::Path(_)) => {
                // Paths walk struct slots; a map source has none.
                unmapped.push(dm.name.clone());
                continue;
            }
            Some(MemberSource::Resolver(f)) => (Fetch::Resolver(f.clone()), ShapeId::ANY),
            Some(MemberSource::Constant(c)) => (Fetch::Constant(c.clone()), ShapeId::ANY),
            None => {
                if settings.is_some_and(|s| s.ignored.contains(&dm.name)) {
                    continue;
                }
                (Fetch::Key { name: dm.name.clone(), matcher: nm.clone() }, src_value)
            }
        };
        let convert = syn.nested_op(pair.kind, value_shape, dm.shape).map_err(|cause| {
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
    let construction = construction_of(pair.kind, settings);
    assemble(syn, pair, settings, dest_id, construction, members, unmapped)
}
