use anyhow::Result;
use chrono::Utc;
use trac_core::TenantContext;
use trac_metadata::{MetadataDal, NewTag, ObjectId};
use trac_types::Value;

use crate::params::Principal;
use crate::record::{record_attrs, MetadataRecord};
use crate::service::MetadataService;

/// A mixed batch of the five save kinds, applied in one transaction
/// (spec.md §4.2.2's ordering, §4.3 `writeBatch`).
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub preallocated: Vec<MetadataRecord>,
    pub new_objects: Vec<MetadataRecord>,
    pub new_versions: Vec<MetadataRecord>,
    pub new_tags: Vec<MetadataRecord>,
}

impl BatchRequest {
    pub fn is_empty(&self) -> bool {
        self.preallocated.is_empty()
            && self.new_objects.is_empty()
            && self.new_versions.is_empty()
            && self.new_tags.is_empty()
    }
}

impl<D: MetadataDal> MetadataService<D> {
    /// `writeBatch`: validates every request, groups by kind, delegates
    /// to `saveBatchUpdate` in one atomic transaction (spec.md §4.3).
    /// Stamping is applied inline here rather than through the
    /// single-record hook pipeline, since a batch call has no single
    /// `ctx.data` for `ServiceHost` to thread through.
    pub async fn write_batch(
        &self,
        tenant: &TenantContext,
        principal: &Principal,
        batch: BatchRequest,
    ) -> Result<()> {
        for record in batch
            .preallocated
            .iter()
            .chain(&batch.new_objects)
            .chain(&batch.new_versions)
            .chain(&batch.new_tags)
        {
            MetadataService::<D>::validate_static(record)?;
        }

        let preallocated = stamp_and_convert(&batch.preallocated, principal, true)?;
        let new_objects = stamp_and_convert(&batch.new_objects, principal, true)?;
        let new_versions = stamp_and_convert(&batch.new_versions, principal, false)?;
        let new_tags = stamp_and_convert(&batch.new_tags, principal, false)?;

        self.dal()
            .save_batch_update(tenant.code(), preallocated, new_objects, new_versions, new_tags)
            .await?;
        Ok(())
    }
}

fn stamp_and_convert(records: &[MetadataRecord], principal: &Principal, is_create: bool) -> Result<Vec<NewTag>> {
    records
        .iter()
        .map(|record| {
            let mut record = record.clone();
            stamp(&mut record, principal, is_create);
            let object_id = record.object_id.unwrap_or_else(ObjectId::new);
            let object_type = record
                .object_type
                .ok_or_else(|| anyhow::anyhow!("object_type is required"))?;
            Ok(NewTag {
                object_id,
                object_type,
                definition: record.definition,
                attrs: record_attrs(&record),
            })
        })
        .collect()
}

fn stamp(record: &mut MetadataRecord, principal: &Principal, is_create: bool) {
    let now = trac_types::truncate_to_micros(Utc::now());
    if is_create {
        record
            .attrs
            .insert("trac_create_time".into(), Value::DateTime(now));
        record.attrs.insert(
            "trac_create_user_id".into(),
            Value::String(principal.user_id.clone()),
        );
        record.attrs.insert(
            "trac_create_user_name".into(),
            Value::String(principal.user_name.clone()),
        );
    }
    record
        .attrs
        .insert("trac_update_time".into(), Value::DateTime(now));
    record.attrs.insert(
        "trac_update_user_id".into(),
        Value::String(principal.user_id.clone()),
    );
    record.attrs.insert(
        "trac_update_user_name".into(),
        Value::String(principal.user_name.clone()),
    );
    crate::stamping::apply_structured_attrs(record);
}
