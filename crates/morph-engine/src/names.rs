//! Name matching policies for member resolution.

use std::fmt;
use std::sync::Arc;

/// A user-supplied name normalizer.
pub type NormalizeFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// How member names are compared during resolution.
///
/// Matching is defined by normalization: two names match when their
/// normalized forms are equal. Flattening extends this to prefixes of
/// normalized forms.
#[derive(Clone, Default)]
pub enum NameMatch {
    /// Exact, case-sensitive comparison.
    #[default]
    Exact,
    /// Case-insensitive comparison.
    CaseInsensitive,
    /// Case-insensitive, ignoring `_` and `-`. Matches across naming
    /// conventions: `order_total`, `OrderTotal`, and `ORDER-TOTAL` all
    /// normalize to `ordertotal`.
    Flexible,
    /// A caller-provided normalizer.
    Custom(NormalizeFn),
}

impl NameMatch {
    /// Normalized form of a name under this policy.
    pub fn normalize(&self, name: &str) -> String {
        match self {
            NameMatch::Exact => name.to_string(),
            NameMatch::CaseInsensitive => name.to_lowercase(),
            NameMatch::Flexible => name
                .chars()
                .filter(|c| *c != '_' && *c != '-')
                .flat_map(char::to_lowercase)
                .collect(),
            NameMatch::Custom(f) => f(name),
        }
    }

    /// True when the two names are equal under this policy.
    pub fn matches(&self, a: &str, b: &str) -> bool {
        match self {
            NameMatch::Exact => a == b,
            _ => self.normalize(a) == self.normalize(b),
        }
    }
}

impl fmt::Debug for NameMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameMatch::Exact => f.write_str("Exact"),
            NameMatch::CaseInsensitive => f.write_str("CaseInsensitive"),
            NameMatch::Flexible => f.write_str("Flexible"),
            NameMatch::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}
