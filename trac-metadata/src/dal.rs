use async_trait::async_trait;
use trac_core::TenantDescriptor;

use crate::error::DalResult;
use crate::search::SearchParams;
use crate::selector::Selector;
use crate::types::{ObjectId, Tag};

/// One unsaved tag, as handed to the DAL by the services layer: a
/// definition payload plus attributes, with the object identity and
/// version numbering resolved by the DAL itself (spec.md §4.2.1).
#[derive(Debug, Clone)]
pub struct NewTag {
    pub object_id: ObjectId,
    pub object_type: trac_types::ObjectType,
    pub definition: serde_json::Value,
    pub attrs: Vec<crate::types::AttrValue>,
}

/// A single hit from `search`: enough of the header to resolve a
/// follow-up `load_object` call, without shipping the full tag payload.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub object_id: ObjectId,
    pub object_version: u32,
    pub tag_version: u32,
}

/// The Metadata DAL (spec.md §4.2.1): tenant-scoped, atomic, versioned
/// object/tag storage. Every write validates against the current
/// `isLatestObject`/`isLatestTag` state inside one transaction and
/// flips it atomically; every read resolves a [`Selector`] against
/// that same header state.
#[async_trait]
pub trait MetadataDal: Send + Sync {
    /// All tenants this DAL instance knows about.
    async fn list_tenants(&self) -> DalResult<Vec<TenantDescriptor>>;

    /// Reserve object ids with no definition attached yet (spec.md
    /// §4.2.1 `savePreallocatedIds`): used when a job needs an id to
    /// reference before the object it describes has been computed.
    async fn save_preallocated_ids(
        &self,
        tenant: &str,
        object_type: trac_types::ObjectType,
        count: u32,
    ) -> DalResult<Vec<ObjectId>>;

    /// Attach the first definition to ids reserved by
    /// `save_preallocated_ids` (spec.md §4.2.1 `savePreallocatedObjects`).
    async fn save_preallocated_objects(&self, tenant: &str, tags: Vec<NewTag>) -> DalResult<()>;

    /// Create brand-new objects at version 1, tag version 1 (spec.md
    /// §4.2.1 `saveNewObjects`). Errors `DuplicateObject` if an id
    /// supplied here already has a definition.
    async fn save_new_objects(&self, tenant: &str, tags: Vec<NewTag>) -> DalResult<()>;

    /// Add object version N+1 on top of the current latest version
    /// (spec.md §4.2.1 `saveNewVersions`). Errors `VersionConflict` if
    /// the caller's view of "current latest" is stale.
    async fn save_new_versions(&self, tenant: &str, tags: Vec<NewTag>) -> DalResult<()>;

    /// Add tag version N+1 on the current object version, leaving the
    /// object definition untouched (spec.md §4.2.1 `saveNewTags`).
    /// Errors `TagVersionConflict` if stale.
    async fn save_new_tags(&self, tenant: &str, tags: Vec<NewTag>) -> DalResult<()>;

    /// Apply a mixed batch of the above in one transaction (spec.md
    /// §4.3 `writeBatch`): all-or-nothing.
    async fn save_batch_update(
        &self,
        tenant: &str,
        preallocated: Vec<NewTag>,
        new_objects: Vec<NewTag>,
        new_versions: Vec<NewTag>,
        new_tags: Vec<NewTag>,
    ) -> DalResult<()>;

    /// Resolve one selector to a fully hydrated tag (spec.md §4.2.1
    /// `loadObject`, §4.2.3).
    async fn load_object(&self, selector: &Selector) -> DalResult<Tag>;

    /// Resolve many selectors in one round trip (spec.md §4.2.1
    /// `loadObjects`). Order matches the input.
    async fn load_objects(&self, selectors: &[Selector]) -> DalResult<Vec<Tag>>;

    /// Run a search query against the tenant's latest tags, or prior
    /// versions/tags when the params ask for it (spec.md §4.2.1
    /// `search`, §4.2.4).
    async fn search(&self, tenant: &str, params: &SearchParams) -> DalResult<Vec<SearchHit>>;
}
