use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use trac_core::schema::Rules;
use trac_core::{ServiceCapabilities, TenantContext, TracError, TracService};
use trac_metadata::{MetadataDal, NewTag, ObjectId, Selector, VersionSelector};
use uuid::Uuid;

use crate::params::MetadataParams;
use crate::record::{record_attrs, MetadataRecord};

/// Thin layer above a [`MetadataDal`] enforcing object-lifecycle rules
/// (spec.md §4.3): rejects updates to a nonexistent prior version,
/// refuses to change object type on update, and keeps definitions
/// untouched on tag-only patches.
pub struct MetadataService<D: MetadataDal> {
    dal: Arc<D>,
}

impl<D: MetadataDal> MetadataService<D> {
    pub fn new(dal: Arc<D>) -> Self {
        Self { dal }
    }

    pub fn dal(&self) -> &Arc<D> {
        &self.dal
    }

    pub(crate) fn parse_id(id: &str) -> Result<ObjectId> {
        Uuid::parse_str(id)
            .map(ObjectId)
            .map_err(|e| anyhow!("invalid object id '{id}': {e}"))
    }

    /// Static validation (spec.md §4.3): reject client-supplied
    /// controlled attribute names before anything is stamped back in.
    pub(crate) fn validate_static(record: &MetadataRecord) -> Result<()> {
        let mut rules = Rules::new();
        for name in record.attrs.keys() {
            rules = rules.no_reserved_prefix("attrs", name);
        }
        rules.check()
    }

    pub(crate) fn to_new_tag(object_id: ObjectId, record: &MetadataRecord) -> Result<NewTag> {
        let object_type = record
            .object_type
            .ok_or_else(|| anyhow!("object_type is required"))?;
        Ok(NewTag {
            object_id,
            object_type,
            definition: record.definition.clone(),
            attrs: record_attrs(record),
        })
    }
}

#[async_trait]
impl<D: MetadataDal + 'static> TracService<MetadataRecord, MetadataParams> for MetadataService<D> {
    async fn find(
        &self,
        tenant: &TenantContext,
        params: MetadataParams,
    ) -> Result<Vec<MetadataRecord>> {
        let hits = self.dal.search(tenant.code(), &params.search).await?;
        let selectors: Vec<Selector> = hits
            .into_iter()
            .map(|hit| Selector {
                tenant: tenant.code().to_string(),
                object_id: hit.object_id,
                object: VersionSelector::Exact(hit.object_version),
                tag: VersionSelector::Exact(hit.tag_version),
            })
            .collect();
        let tags = self.dal.load_objects(&selectors).await?;
        Ok(tags.into_iter().map(MetadataRecord::from).collect())
    }

    async fn get(
        &self,
        tenant: &TenantContext,
        id: &str,
        params: MetadataParams,
    ) -> Result<MetadataRecord> {
        let object_id = Self::parse_id(id)?;
        let selector = Selector {
            tenant: tenant.code().to_string(),
            object_id,
            object: params.object_selector,
            tag: params.tag_selector,
        };
        let tag = self.dal.load_object(&selector).await?;
        Ok(MetadataRecord::from(tag))
    }

    async fn create(
        &self,
        tenant: &TenantContext,
        data: MetadataRecord,
        _params: MetadataParams,
    ) -> Result<MetadataRecord> {
        Self::validate_static(&data)?;
        let object_id = data.object_id.unwrap_or_else(ObjectId::new);
        let new_tag = Self::to_new_tag(object_id, &data)?;
        self.dal.save_new_objects(tenant.code(), vec![new_tag]).await?;
        let tag = self
            .dal
            .load_object(&Selector::latest(tenant.code(), object_id))
            .await?;
        Ok(MetadataRecord::from(tag))
    }

    async fn update(
        &self,
        tenant: &TenantContext,
        id: &str,
        data: MetadataRecord,
        params: MetadataParams,
    ) -> Result<MetadataRecord> {
        Self::validate_static(&data)?;
        let object_id = Self::parse_id(id)?;
        let prior = self
            .dal
            .load_object(&Selector::latest(tenant.code(), object_id))
            .await?;

        if let Some(requested_type) = data.object_type {
            if requested_type != prior.header.object_type {
                return Err(anyhow!("updateObject cannot change object type"));
            }
        }
        if let Some(expected) = params.expect_prior_version {
            if expected != prior.header.object_version {
                return Err(TracError::version_conflict(format!(
                    "expected prior version {expected}, found {}",
                    prior.header.object_version
                ))
                .into_anyhow());
            }
        }

        let new_tag = Self::to_new_tag(object_id, &data)?;
        self.dal.save_new_versions(tenant.code(), vec![new_tag]).await?;
        let tag = self
            .dal
            .load_object(&Selector::latest(tenant.code(), object_id))
            .await?;
        Ok(MetadataRecord::from(tag))
    }

    async fn patch(
        &self,
        tenant: &TenantContext,
        id: Option<&str>,
        data: MetadataRecord,
        _params: MetadataParams,
    ) -> Result<MetadataRecord> {
        Self::validate_static(&data)?;
        let id = id.ok_or_else(|| anyhow!("updateTag requires an object id"))?;
        let object_id = Self::parse_id(id)?;
        let prior = self
            .dal
            .load_object(&Selector::latest(tenant.code(), object_id))
            .await?;

        // updateTag leaves the definition untouched (spec.md §4.3).
        let new_tag = NewTag {
            object_id,
            object_type: prior.header.object_type,
            definition: prior.definition.clone(),
            attrs: record_attrs(&data),
        };
        self.dal.save_new_tags(tenant.code(), vec![new_tag]).await?;
        let tag = self
            .dal
            .load_object(&Selector::latest(tenant.code(), object_id))
            .await?;
        Ok(MetadataRecord::from(tag))
    }

    async fn custom(
        &self,
        name: &str,
        tenant: &TenantContext,
        data: Option<MetadataRecord>,
        _params: MetadataParams,
    ) -> Result<MetadataRecord> {
        match name {
            // Two-step creation for external id binding (spec.md §4.3
            // `preallocateId`); `createPreallocatedObject` is just
            // `create()` with a pre-supplied `object_id`.
            "preallocateId" => {
                let data = data.ok_or_else(|| anyhow!("preallocateId requires data"))?;
                let object_type = data
                    .object_type
                    .ok_or_else(|| anyhow!("object_type is required"))?;
                let mut ids = self
                    .dal
                    .save_preallocated_ids(tenant.code(), object_type, 1)
                    .await?;
                Ok(MetadataRecord {
                    object_id: ids.pop(),
                    object_type: Some(object_type),
                    ..Default::default()
                })
            }
            other => Err(anyhow!("custom method '{other}' is not implemented")),
        }
    }

    fn capabilities(&self) -> ServiceCapabilities {
        ServiceCapabilities::crud().with_custom("preallocateId")
    }
}
