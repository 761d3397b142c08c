use trac_metadata::{SearchParams, VersionSelector};

/// Identity of the caller, used to stamp controlled attributes
/// (spec.md §4.3: `trac_create_user_{id,name}`, `trac_update_user_*`).
#[derive(Debug, Clone, Default)]
pub struct Principal {
    pub user_id: String,
    pub user_name: String,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
        }
    }
}

/// Params threaded through every `MetadataService` call (spec.md §4.3).
#[derive(Debug, Clone, Default)]
pub struct MetadataParams {
    /// Which object version a `get`/`update`/`patch` call addresses.
    pub object_selector: VersionSelector,
    /// Which tag version a `get`/`patch` call addresses.
    pub tag_selector: VersionSelector,
    /// `update`'s required "submitted prior version matches" check
    /// (spec.md §4.3 `updateObject`). `None` skips the check (only valid
    /// for `create`/`find`/`get`).
    pub expect_prior_version: Option<u32>,
    /// Query used by `find`.
    pub search: SearchParams,
    pub principal: Principal,
}

impl MetadataParams {
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = principal;
        self
    }

    pub fn with_search(mut self, search: SearchParams) -> Self {
        self.search = search;
        self
    }

    pub fn expecting_prior_version(mut self, version: u32) -> Self {
        self.expect_prior_version = Some(version);
        self
    }
}
