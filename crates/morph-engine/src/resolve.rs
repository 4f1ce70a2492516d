//! Member resolution: deciding where each destination member comes from.
//!
//! For one destination member the resolver walks a fixed chain, first
//! success wins:
//!
//! 1. an explicit override configured for the pair (member, path,
//!    resolver, or constant)
//! 2. the ignored set
//! 3. a public source member with a matching name
//! 4. a `Get<Name>` getter
//! 5. deep flattening: nested members whose concatenated names spell the
//!    destination name (`Address.City` for `AddressCity`)
//!
//! Constructor-parameter binding sits outside this chain; the record
//! strategy runs it over the same primitives. Anything unresolved is
//! reported as unmapped and left at its destination default.
//!
//! Resolution is pure: the same shapes, settings, and policy always
//! produce the same decision.

use morph_model::{MemberDescriptor, ShapeId, ShapeRegistry, StructShape};

use crate::names::NameMatch;
use crate::plan::Fetch;
use crate::settings::{MappingSettings, MemberSource};

/// Outcome of resolving one destination member.
#[derive(Debug)]
pub(crate) enum Resolution {
    /// A source computation was found; `shape` is the shape of the value
    /// it produces (`Any` for resolvers and constants).
    Mapped { fetch: Fetch, shape: ShapeId },
    /// The member is configured away; leave it at its default.
    Skipped,
    /// Nothing matched.
    Unmapped,
}

/// Resolve one destination member against a struct source.
pub(crate) fn resolve_member(
    shapes: &ShapeRegistry,
    src: &StructShape,
    settings: Option<&MappingSettings>,
    nm: &NameMatch,
    dest: &MemberDescriptor,
) -> Resolution {
    // 1. Explicit override.
    if let Some(source) = settings.and_then(|s| s.member_sources.get(&dest.name)) {
        return resolve_override(shapes, src, source);
    }

    // 2. Ignore list.
    if settings.is_some_and(|s| s.ignored.contains(&dest.name)) {
        return Resolution::Skipped;
    }

    // 3. Direct member under the active name policy.
    if let Some((idx, m)) = src
        .members
        .iter()
        .enumerate()
        .find(|(_, m)| m.is_public() && nm.matches(&m.name, &dest.name))
    {
        return Resolution::Mapped { fetch: Fetch::Slot(idx), shape: m.shape };
    }

    // 4. Get<Name> getter.
    if let Some(g) = src.getters.iter().find(|g| {
        g.name
            .strip_prefix("Get")
            .is_some_and(|rest| nm.matches(rest, &dest.name))
    }) {
        return Resolution::Mapped { fetch: Fetch::Getter(g.func.clone()), shape: g.result };
    }

    // 5. Deep flattening.
    if let Some((path, shape)) = resolve_flattening(shapes, src, nm, &dest.name) {
        return Resolution::Mapped { fetch: Fetch::Path(path), shape };
    }

    Resolution::Unmapped
}

/// Resolve an explicit `MemberSource` override.
fn resolve_override(
    shapes: &ShapeRegistry,
    src: &StructShape,
    source: &MemberSource,
) -> Resolution {
    match source {
        MemberSource::Member(name) => match src.member_index(name) {
            Some(idx) => Resolution::Mapped {
                fetch: Fetch::Slot(idx),
                shape: src.members[idx].shape,
            },
            None => Resolution::Unmapped,
        },
        MemberSource::Path(names) => {
            let mut cur = src;
            let mut path = Vec::with_capacity(names.len());
            let mut shape = ShapeId::ANY;
            for (i, name) in names.iter().enumerate() {
                let Some(idx) = cur.member_index(name) else {
                    return Resolution::Unmapped;
                };
                path.push(idx);
                shape = cur.members[idx].shape;
                if i + 1 < names.len() {
                    let inner = shapes.unwrap_optional(shape);
                    match shapes.struct_shape(inner) {
                        Some(next) => cur = next,
                        None => return Resolution::Unmapped,
                    }
                }
            }
            Resolution::Mapped { fetch: Fetch::Path(path), shape }
        }
        MemberSource::Resolver(f) => Resolution::Mapped {
            fetch: Fetch::Resolver(f.clone()),
            shape: ShapeId::ANY,
        },
        MemberSource::Constant(c) => Resolution::Mapped {
            fetch: Fetch::Constant(c.clone()),
            shape: ShapeId::ANY,
        },
    }
}

/// Find a nested member chain whose concatenated normalized names spell
/// the destination name. Depth-first in declaration order; the first full
/// spelling wins, with backtracking across sibling prefixes.
fn resolve_flattening(
    shapes: &ShapeRegistry,
    src: &StructShape,
    nm: &NameMatch,
    dest_name: &str,
) -> Option<(Vec<usize>, ShapeId)> {
    let target = nm.normalize(dest_name);
    for (idx, m) in src.members.iter().enumerate() {
        if !m.is_public() {
            continue;
        }
        let prefix = nm.normalize(&m.name);
        if prefix.is_empty() {
            continue;
        }
        // A full match at the top level is step 3's business, not
        // flattening's; only strict prefixes descend.
        if let Some(rest) = target.strip_prefix(&prefix) {
            if rest.is_empty() {
                continue;
            }
            let inner = shapes.unwrap_optional(m.shape);
            if let Some(nested) = shapes.struct_shape(inner) {
                if let Some((mut path, shape)) = flatten_tail(shapes, nested, nm, rest) {
                    path.insert(0, idx);
                    return Some((path, shape));
                }
            }
        }
    }
    None
}

/// Continue a flattening walk: consume `rest` member by member.
fn flatten_tail(
    shapes: &ShapeRegistry,
    src: &StructShape,
    nm: &NameMatch,
    rest: &str,
) -> Option<(Vec<usize>, ShapeId)> {
    for (idx, m) in src.members.iter().enumerate() {
        if !m.is_public() {
            continue;
        }
        let prefix = nm.normalize(&m.name);
        if prefix.is_empty() {
            continue;
        }
        if let Some(remaining) = rest.strip_prefix(&prefix) {
            if remaining.is_empty() {
                return Some((vec![idx], m.shape));
            }
            let inner = shapes.unwrap_optional(m.shape);
            if let Some(nested) = shapes.struct_shape(inner) {
                if let Some((mut path, shape)) = flatten_tail(shapes, nested, nm, remaining) {
                    path.insert(0, idx);
                    return Some((path, shape));
                }
            }
        }
    }
    None
}
