use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ObjectId;

/// Which version of an object/tag a caller is asking for
/// (spec.md §4.2.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VersionSelector {
    /// `objectVersion=N` / the equivalent for tags: join on exact version.
    Exact(u32),
    /// `objectAsOf=T`: the version whose window covers `T`.
    AsOf(DateTime<Utc>),
    /// `latestObject=true` / the tag equivalent.
    Latest,
}

impl Default for VersionSelector {
    fn default() -> Self {
        VersionSelector::Latest
    }
}

/// A fully resolved request for one object/tag (spec.md §4.2.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selector {
    pub tenant: String,
    pub object_id: ObjectId,
    pub object: VersionSelector,
    pub tag: VersionSelector,
}

impl Selector {
    pub fn latest(tenant: impl Into<String>, object_id: ObjectId) -> Self {
        Self {
            tenant: tenant.into(),
            object_id,
            object: VersionSelector::Latest,
            tag: VersionSelector::Latest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_constructor_resolves_both_axes_to_latest() {
        let selector = Selector::latest("ACME", ObjectId::new());
        assert_eq!(selector.object, VersionSelector::Latest);
        assert_eq!(selector.tag, VersionSelector::Latest);
    }

    #[test]
    fn exact_and_as_of_are_distinct_selectors() {
        let exact = VersionSelector::Exact(3);
        let as_of = VersionSelector::AsOf(Utc::now());
        assert_ne!(exact, as_of);
    }
}
