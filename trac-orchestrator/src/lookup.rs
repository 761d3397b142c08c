//! The orchestrator's view onto metadata: existence checks for
//! `CREATED→VALIDATED` and the Trusted Metadata API write for
//! `FINISHING→COMPLETED|FAILED` (spec.md §4.7). Kept behind a trait so
//! `trac-orchestrator` doesn't need a concrete `MetadataDal` to be
//! tested — `MetadataServiceLookup` is the real, in-process
//! implementation wired in `trac-server`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use trac_core::{ServiceHandle, TenantContext, TracError};
use trac_metadata::MetadataDal;
use trac_metadata_service::{MetadataParams, MetadataRecord, Principal};
use trac_types::{ObjectType, Value};

#[async_trait]
pub trait MetadataLookup: Send + Sync + 'static {
    async fn exists(&self, tenant: &TenantContext, object_id: &str) -> Result<bool, TracError>;

    async fn write_result(
        &self,
        tenant: &TenantContext,
        principal: &Principal,
        definition: serde_json::Value,
        attrs: BTreeMap<String, Value>,
    ) -> Result<String, TracError>;
}

/// Goes through the same `ServiceHandle` the gRPC Trusted API uses, so
/// a RESULT object written by the orchestrator gets the same
/// controlled-attribute stamping spec.md §4.3 requires of every write.
pub struct MetadataServiceLookup<D: MetadataDal> {
    handle: ServiceHandle<MetadataRecord, MetadataParams>,
    _dal: std::marker::PhantomData<D>,
}

impl<D: MetadataDal + 'static> MetadataServiceLookup<D> {
    pub fn new(handle: ServiceHandle<MetadataRecord, MetadataParams>) -> Self {
        Self { handle, _dal: std::marker::PhantomData }
    }
}

#[async_trait]
impl<D: MetadataDal + 'static> MetadataLookup for MetadataServiceLookup<D> {
    async fn exists(&self, tenant: &TenantContext, object_id: &str) -> Result<bool, TracError> {
        match self.handle.get(tenant.clone(), object_id, MetadataParams::default()).await {
            Ok(_) => Ok(true),
            Err(e) => match TracError::from_anyhow(&e) {
                Some(t) if t.kind == trac_core::TracErrorKind::NotFound => Ok(false),
                _ => Err(TracError::normalize(e)),
            },
        }
    }

    async fn write_result(
        &self,
        tenant: &TenantContext,
        principal: &Principal,
        definition: serde_json::Value,
        attrs: BTreeMap<String, Value>,
    ) -> Result<String, TracError> {
        let mut record = MetadataRecord::new(ObjectType::Result, definition);
        record.attrs = attrs;
        let params = MetadataParams::default().with_principal(principal.clone());
        let created = self
            .handle
            .create(tenant.clone(), record, params)
            .await
            .map_err(TracError::normalize)?;
        created
            .object_id
            .map(|id| id.to_string())
            .ok_or_else(|| TracError::internal("create did not return an object id"))
    }
}
