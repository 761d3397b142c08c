//! trac-metadata-service: Metadata Services (spec.md §4.3) — the
//! object-lifecycle layer above the Metadata DAL, wired through
//! `trac_core`'s hook pipeline for controlled-attribute stamping and
//! static validation.

pub mod batch;
pub mod params;
pub mod record;
pub mod service;
pub mod stamping;

pub use batch::BatchRequest;
pub use params::{MetadataParams, Principal};
pub use record::MetadataRecord;
pub use service::MetadataService;

use std::sync::Arc;

use trac_core::{ServiceHandle, ServiceHost};
use trac_metadata::MetadataDal;

/// Build a [`ServiceHost`] with a `"metadata"` service registered and the
/// controlled-attribute stamping hooks installed (spec.md §4.3).
pub fn build_service_host<D: MetadataDal + 'static>(
    dal: Arc<D>,
) -> (ServiceHost<MetadataRecord, MetadataParams>, ServiceHandle<MetadataRecord, MetadataParams>) {
    let host = ServiceHost::new();
    let service = Arc::new(MetadataService::new(dal));
    host.register_service("metadata", service);
    host.hooks(stamping::install);
    let handle = host.service("metadata").expect("just registered");
    (host, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use trac_core::TenantContext;
    use trac_core::TenantDescriptor;
    use trac_metadata::{DalResult, NewTag, SearchHit, Selector, Tag};
    use trac_types::ObjectType;

    /// A minimal in-memory `MetadataDal` for exercising the service
    /// layer and hook pipeline without a database.
    #[derive(Default)]
    struct FakeDal {
        objects: Mutex<HashMap<uuid::Uuid, Tag>>,
    }

    #[async_trait]
    impl MetadataDal for FakeDal {
        async fn list_tenants(&self) -> DalResult<Vec<TenantDescriptor>> {
            Ok(vec![])
        }

        async fn save_preallocated_ids(
            &self,
            _tenant: &str,
            _object_type: ObjectType,
            count: u32,
        ) -> DalResult<Vec<trac_metadata::ObjectId>> {
            Ok((0..count).map(|_| trac_metadata::ObjectId::new()).collect())
        }

        async fn save_preallocated_objects(&self, tenant: &str, tags: Vec<NewTag>) -> DalResult<()> {
            self.save_new_objects(tenant, tags).await
        }

        async fn save_new_objects(&self, tenant: &str, tags: Vec<NewTag>) -> DalResult<()> {
            let now = chrono::Utc::now();
            let mut objects = self.objects.lock().unwrap();
            for new_tag in tags {
                let header = trac_metadata::Header {
                    tenant: tenant.to_string(),
                    object_id: new_tag.object_id,
                    object_type: new_tag.object_type,
                    object_version: 1,
                    object_timestamp: now,
                    tag_version: 1,
                    tag_timestamp: now,
                    is_latest_object: true,
                    is_latest_tag: true,
                    superseded: None,
                };
                objects.insert(
                    new_tag.object_id.0,
                    Tag {
                        header,
                        definition: new_tag.definition,
                        attrs: new_tag.attrs,
                    },
                );
            }
            Ok(())
        }

        async fn save_new_versions(&self, tenant: &str, tags: Vec<NewTag>) -> DalResult<()> {
            let now = chrono::Utc::now();
            let mut objects = self.objects.lock().unwrap();
            for new_tag in tags {
                let prior = objects
                    .get(&new_tag.object_id.0)
                    .cloned()
                    .ok_or_else(|| trac_metadata::DalError::MissingItem("no prior version".into()))?;
                let header = trac_metadata::Header {
                    object_version: prior.header.object_version + 1,
                    object_timestamp: now,
                    tag_version: 1,
                    tag_timestamp: now,
                    ..prior.header
                };
                objects.insert(
                    new_tag.object_id.0,
                    Tag {
                        header,
                        definition: new_tag.definition,
                        attrs: new_tag.attrs,
                    },
                );
            }
            Ok(())
        }

        async fn save_new_tags(&self, tenant: &str, tags: Vec<NewTag>) -> DalResult<()> {
            let now = chrono::Utc::now();
            let mut objects = self.objects.lock().unwrap();
            for new_tag in tags {
                let prior = objects
                    .get(&new_tag.object_id.0)
                    .cloned()
                    .ok_or_else(|| trac_metadata::DalError::MissingItem("no prior tag".into()))?;
                let header = trac_metadata::Header {
                    tag_version: prior.header.tag_version + 1,
                    tag_timestamp: now,
                    ..prior.header
                };
                let _ = tenant;
                objects.insert(
                    new_tag.object_id.0,
                    Tag {
                        header,
                        definition: prior.definition,
                        attrs: new_tag.attrs,
                    },
                );
            }
            Ok(())
        }

        async fn save_batch_update(
            &self,
            tenant: &str,
            preallocated: Vec<NewTag>,
            new_objects: Vec<NewTag>,
            new_versions: Vec<NewTag>,
            new_tags: Vec<NewTag>,
        ) -> DalResult<()> {
            self.save_new_objects(tenant, preallocated).await?;
            self.save_new_objects(tenant, new_objects).await?;
            self.save_new_versions(tenant, new_versions).await?;
            self.save_new_tags(tenant, new_tags).await?;
            Ok(())
        }

        async fn load_object(&self, selector: &Selector) -> DalResult<Tag> {
            self.objects
                .lock()
                .unwrap()
                .get(&selector.object_id.0)
                .cloned()
                .ok_or_else(|| trac_metadata::DalError::MissingItem("no such object".into()))
        }

        async fn load_objects(&self, selectors: &[Selector]) -> DalResult<Vec<Tag>> {
            let mut out = Vec::with_capacity(selectors.len());
            for selector in selectors {
                out.push(self.load_object(selector).await?);
            }
            Ok(out)
        }

        async fn search(
            &self,
            _tenant: &str,
            _params: &trac_metadata::SearchParams,
        ) -> DalResult<Vec<SearchHit>> {
            let objects = self.objects.lock().unwrap();
            Ok(objects
                .values()
                .map(|tag| SearchHit {
                    object_id: tag.header.object_id,
                    object_version: tag.header.object_version,
                    tag_version: tag.header.tag_version,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn create_then_get_stamps_controlled_attrs() {
        let dal = Arc::new(FakeDal::default());
        let (_host, handle) = build_service_host(dal);
        let tenant = TenantContext::new("ACME");

        let record = MetadataRecord::new(ObjectType::Data, serde_json::json!({"rows": 10}));
        let params = MetadataParams::default().with_principal(Principal::new("u1", "Alice"));

        let created = handle.create(tenant.clone(), record, params).await.unwrap();
        assert_eq!(created.object_version, Some(1));
        assert!(created.attrs.contains_key("trac_create_user_id"));
        assert!(created.attrs.contains_key("trac_update_time"));

        let id = created.object_id.unwrap().to_string();
        let fetched = handle
            .get(tenant, &id, MetadataParams::default())
            .await
            .unwrap();
        assert_eq!(fetched.object_id, created.object_id);
    }

    #[tokio::test]
    async fn client_supplied_controlled_attr_is_rejected() {
        let dal = Arc::new(FakeDal::default());
        let (_host, handle) = build_service_host(dal);
        let tenant = TenantContext::new("ACME");

        let record = MetadataRecord::new(ObjectType::Data, serde_json::json!({}))
            .with_attr("trac_create_time", trac_types::Value::Integer(0));
        let err = handle
            .create(tenant, record, MetadataParams::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[tokio::test]
    async fn update_rejects_object_type_change() {
        let dal = Arc::new(FakeDal::default());
        let (_host, handle) = build_service_host(dal);
        let tenant = TenantContext::new("ACME");

        let record = MetadataRecord::new(ObjectType::Data, serde_json::json!({}));
        let created = handle
            .create(tenant.clone(), record, MetadataParams::default())
            .await
            .unwrap();
        let id = created.object_id.unwrap().to_string();

        let changed_type = MetadataRecord::new(ObjectType::Model, serde_json::json!({}));
        let err = handle
            .update(tenant, &id, changed_type, MetadataParams::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("object type"));
    }
}
