//! Type pairs: the request keys of the conversion engine.

use morph_model::ShapeId;

/// How a conversion delivers its result.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MappingKind {
    /// Construct a fresh destination value.
    NewInstance,
    /// Write into a caller-provided destination value.
    PopulateExisting,
    /// Construct a fresh destination with a pure, fully inlined procedure:
    /// no hooks, no conditions, no reference tracking.
    Projection,
}

/// A conversion request: source shape, destination shape, and kind.
///
/// The full triple keys the procedure cache; settings are keyed by the
/// `(source, destination)` prefix and shared across kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypePair {
    pub source: ShapeId,
    pub dest: ShapeId,
    pub kind: MappingKind,
}

impl TypePair {
    pub fn new(source: ShapeId, dest: ShapeId, kind: MappingKind) -> TypePair {
        TypePair { source, dest, kind }
    }

    /// The settings key: the pair without its kind.
    pub fn key(&self) -> (ShapeId, ShapeId) {
        (self.source, self.dest)
    }

    /// The same source and destination under another kind.
    pub fn with_kind(&self, kind: MappingKind) -> TypePair {
        TypePair { kind, ..*self }
    }
}
