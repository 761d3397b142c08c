//! The two gRPC surfaces over [`trac_metadata_service::MetadataService`]
//! (spec.md §4.4): `MetadataApi` (object-type-restricted) and
//! `TrustedMetadataApi` (unrestricted, internal-only). Both share one
//! handler; the restriction is a single check gating writes.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use trac_core::{ServiceHandle, TenantContext, TracError};
use trac_metadata::{MetadataDal, VersionSelector};
use trac_metadata_service::{MetadataParams, MetadataRecord, MetadataService, Principal};

use crate::convert::{json_to_struct, parse_rfc3339, pb_to_value, struct_to_json, value_to_pb};
use crate::pb;
use crate::status::to_status;

/// Restriction policy a surface enforces before delegating a write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiSurface {
    Public,
    Trusted,
}

impl ApiSurface {
    fn check_writeable(self, object_type: trac_types::ObjectType) -> Result<(), Status> {
        match self {
            ApiSurface::Trusted => Ok(()),
            ApiSurface::Public if object_type.is_public_writeable() => Ok(()),
            ApiSurface::Public => Err(to_status(
                TracError::permission_denied(format!(
                    "object type {} is not writeable through the public API",
                    object_type.name()
                ))
                .into_anyhow(),
            )),
        }
    }
}

/// Wraps a [`ServiceHandle`] (so `create`/`update`/`patch`/`get`/`find`
/// run through the controlled-attribute stamping hooks, spec.md §4.3)
/// and the concrete [`MetadataService`] (for `writeBatch`, which sits
/// outside the hook pipeline — see `trac_metadata_service::batch`).
pub struct MetadataApiHandler<D: MetadataDal> {
    handle: ServiceHandle<MetadataRecord, MetadataParams>,
    service: Arc<MetadataService<D>>,
    surface: ApiSurface,
}

impl<D: MetadataDal + 'static> MetadataApiHandler<D> {
    pub fn new(
        handle: ServiceHandle<MetadataRecord, MetadataParams>,
        service: Arc<MetadataService<D>>,
        surface: ApiSurface,
    ) -> Self {
        Self { handle, service, surface }
    }

    fn tenant_and_principal<T>(req: &Request<T>) -> Result<(TenantContext, Principal), Status> {
        let metadata = req.metadata();
        let tenant = metadata
            .get("x-trac-tenant")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Status::invalid_argument("missing x-trac-tenant metadata"))?;
        let user_id = metadata
            .get("x-trac-user-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Status::unauthenticated("missing x-trac-user-id metadata"))?;
        let user_name = metadata
            .get("x-trac-user-name")
            .and_then(|v| v.to_str().ok())
            .unwrap_or(user_id);
        Ok((
            TenantContext::new(tenant.to_string()),
            Principal::new(user_id.to_string(), user_name.to_string()),
        ))
    }

    async fn create_object(&self, request: Request<pb::CreateObjectRequest>) -> Result<Response<pb::Tag>, Status> {
        let (tenant, principal) = Self::tenant_and_principal(&request)?;
        let req = request.into_inner();
        let object_type = pb::ObjectType::from_i32(req.object_type).unwrap_or(pb::ObjectType::Unspecified);
        let object_type: trac_types::ObjectType = object_type.try_into()?;
        self.surface.check_writeable(object_type)?;

        let definition = req.definition.as_ref().map(struct_to_json).unwrap_or(serde_json::json!({}));
        let mut record = MetadataRecord::new(object_type, definition);
        for (name, value) in &req.attrs {
            record = record.with_attr(name.clone(), pb_to_value(value)?);
        }

        let params = MetadataParams::default().with_principal(principal);
        let tenant_label = tenant.clone();
        let created = self
            .handle
            .create(tenant, record, params)
            .await
            .map_err(to_status)?;
        Ok(Response::new(record_to_pb(&tenant_label, created)))
    }

    async fn update_object(&self, request: Request<pb::UpdateObjectRequest>) -> Result<Response<pb::Tag>, Status> {
        let (tenant, principal) = Self::tenant_and_principal(&request)?;
        let req = request.into_inner();
        let definition = req.definition.as_ref().map(struct_to_json).unwrap_or(serde_json::json!({}));
        let mut record = MetadataRecord {
            definition,
            ..Default::default()
        };
        for (name, value) in &req.attrs {
            record = record.with_attr(name.clone(), pb_to_value(value)?);
        }

        let params = MetadataParams::default()
            .with_principal(principal)
            .expecting_prior_version(req.expect_prior_version);
        let tenant_label = tenant.clone();
        let updated = self
            .handle
            .update(tenant, &req.object_id, record, params)
            .await
            .map_err(to_status)?;
        Ok(Response::new(record_to_pb(&tenant_label, updated)))
    }

    async fn update_tag(&self, request: Request<pb::UpdateTagRequest>) -> Result<Response<pb::Tag>, Status> {
        let (tenant, principal) = Self::tenant_and_principal(&request)?;
        let req = request.into_inner();
        let mut record = MetadataRecord::default();
        for (name, value) in &req.attrs {
            record = record.with_attr(name.clone(), pb_to_value(value)?);
        }

        let params = MetadataParams::default().with_principal(principal);
        let tenant_label = tenant.clone();
        let patched = self
            .handle
            .patch(tenant, Some(&req.object_id), record, params)
            .await
            .map_err(to_status)?;
        Ok(Response::new(record_to_pb(&tenant_label, patched)))
    }

    async fn preallocate_id(
        &self,
        request: Request<pb::PreallocateIdRequest>,
    ) -> Result<Response<pb::PreallocateIdResponse>, Status> {
        let (tenant, _principal) = Self::tenant_and_principal(&request)?;
        let req = request.into_inner();
        let object_type = pb::ObjectType::from_i32(req.object_type).unwrap_or(pb::ObjectType::Unspecified);
        let object_type: trac_types::ObjectType = object_type.try_into()?;
        self.surface.check_writeable(object_type)?;

        let data = MetadataRecord::new(object_type, serde_json::json!({}));
        let out = self
            .handle
            .custom("preallocateId", tenant, Some(data), MetadataParams::default())
            .await
            .map_err(to_status)?;
        let object_id = out.object_id.ok_or_else(|| Status::internal("preallocateId returned no id"))?;
        Ok(Response::new(pb::PreallocateIdResponse {
            object_id: object_id.to_string(),
        }))
    }

    async fn read_object(&self, request: Request<pb::ReadObjectRequest>) -> Result<Response<pb::Tag>, Status> {
        let (tenant, principal) = Self::tenant_and_principal(&request)?;
        let req = request.into_inner();

        let object_selector = match req.object_selector {
            Some(pb::read_object_request::ObjectSelector::ObjectVersion(v)) => VersionSelector::Exact(v),
            Some(pb::read_object_request::ObjectSelector::ObjectAsOf(t)) => VersionSelector::AsOf(parse_rfc3339(&t)?),
            Some(pb::read_object_request::ObjectSelector::ObjectLatest(_)) | None => VersionSelector::Latest,
        };
        let tag_selector = match req.tag_selector {
            Some(pb::read_object_request::TagSelector::TagVersion(v)) => VersionSelector::Exact(v),
            Some(pb::read_object_request::TagSelector::TagAsOf(t)) => VersionSelector::AsOf(parse_rfc3339(&t)?),
            Some(pb::read_object_request::TagSelector::TagLatest(_)) | None => VersionSelector::Latest,
        };

        let params = MetadataParams {
            object_selector,
            tag_selector,
            principal,
            ..Default::default()
        };
        let tenant_label = tenant.clone();
        let record = self
            .handle
            .get(tenant, &req.object_id, params)
            .await
            .map_err(to_status)?;
        Ok(Response::new(record_to_pb(&tenant_label, record)))
    }

    async fn search(&self, request: Request<pb::SearchRequest>) -> Result<Response<pb::SearchResponse>, Status> {
        let (tenant, principal) = Self::tenant_and_principal(&request)?;
        let req = request.into_inner();
        let query: trac_metadata::QueryNode = serde_json::from_slice(&req.query)
            .map_err(|e| Status::invalid_argument(format!("invalid search query: {e}")))?;

        let params = MetadataParams {
            search: trac_metadata::SearchParams { query: Some(query), ..Default::default() },
            principal,
            ..Default::default()
        };
        let tenant_label = tenant.clone();
        let records = self.handle.find(tenant, params).await.map_err(to_status)?;
        Ok(Response::new(pb::SearchResponse {
            results: records.into_iter().map(|r| record_to_pb(&tenant_label, r)).collect(),
        }))
    }

    async fn write_batch(&self, request: Request<pb::BatchWriteRequest>) -> Result<Response<()>, Status> {
        let (tenant, principal) = Self::tenant_and_principal(&request)?;
        let req = request.into_inner();

        let to_record = |definition: Option<&prost_types::Struct>,
                          attrs: &std::collections::HashMap<String, prost_types::Value>,
                          object_type: Option<i32>|
         -> Result<MetadataRecord, Status> {
            let mut record = MetadataRecord {
                definition: definition.map(struct_to_json).unwrap_or(serde_json::json!({})),
                ..Default::default()
            };
            if let Some(raw) = object_type {
                let object_type = pb::ObjectType::from_i32(raw).unwrap_or(pb::ObjectType::Unspecified);
                record.object_type = Some(object_type.try_into()?);
            }
            for (name, value) in attrs {
                record.attrs.insert(name.clone(), pb_to_value(value)?);
            }
            Ok(record)
        };

        let mut batch = trac_metadata_service::BatchRequest::default();
        for r in &req.preallocated {
            batch
                .preallocated
                .push(to_record(r.definition.as_ref(), &r.attrs, Some(r.object_type))?);
        }
        for r in &req.new_objects {
            batch
                .new_objects
                .push(to_record(r.definition.as_ref(), &r.attrs, Some(r.object_type))?);
        }
        for r in &req.new_versions {
            let mut record = to_record(r.definition.as_ref(), &r.attrs, None)?;
            record.object_id = trac_metadata::ObjectId::parse_str(&r.object_id).ok();
            batch.new_versions.push(record);
        }
        for r in &req.new_tags {
            let mut record = MetadataRecord::default();
            record.object_id = trac_metadata::ObjectId::parse_str(&r.object_id).ok();
            for (name, value) in &r.attrs {
                record.attrs.insert(name.clone(), pb_to_value(value)?);
            }
            batch.new_tags.push(record);
        }

        self.service
            .write_batch(&tenant, &principal, batch)
            .await
            .map_err(to_status)?;
        Ok(Response::new(()))
    }
}

fn record_to_pb(tenant: &TenantContext, record: MetadataRecord) -> pb::Tag {
    let header = (record.object_id.is_some()).then(|| pb::TagHeader {
        tenant: tenant.code().to_string(),
        object_id: record.object_id.map(|id| id.to_string()).unwrap_or_default(),
        object_type: record.object_type.map(pb::ObjectType::from).unwrap_or(pb::ObjectType::Unspecified) as i32,
        object_version: record.object_version.unwrap_or_default(),
        tag_version: record.tag_version.unwrap_or_default(),
        object_timestamp: record.object_timestamp.map(|t| t.to_rfc3339()).unwrap_or_default(),
        tag_timestamp: record.tag_timestamp.map(|t| t.to_rfc3339()).unwrap_or_default(),
        is_latest_object: record.is_latest_object,
        is_latest_tag: record.is_latest_tag,
    });
    pb::Tag {
        header,
        definition: json_to_struct(&record.definition).ok(),
        attrs: record.attrs.iter().map(|(k, v)| (k.clone(), value_to_pb(v))).collect(),
    }
}

/// `tonic_build` emits one async trait per `service` block; hand-written
/// here in the same shape since no `.proto` compilation runs in this repo.
#[tonic::async_trait]
pub trait MetadataApi: Send + Sync + 'static {
    async fn create_object(&self, request: Request<pb::CreateObjectRequest>) -> Result<Response<pb::Tag>, Status>;
    async fn update_object(&self, request: Request<pb::UpdateObjectRequest>) -> Result<Response<pb::Tag>, Status>;
    async fn update_tag(&self, request: Request<pb::UpdateTagRequest>) -> Result<Response<pb::Tag>, Status>;
    async fn preallocate_id(
        &self,
        request: Request<pb::PreallocateIdRequest>,
    ) -> Result<Response<pb::PreallocateIdResponse>, Status>;
    async fn read_object(&self, request: Request<pb::ReadObjectRequest>) -> Result<Response<pb::Tag>, Status>;
    async fn search(&self, request: Request<pb::SearchRequest>) -> Result<Response<pb::SearchResponse>, Status>;
}

#[tonic::async_trait]
pub trait TrustedMetadataApi: Send + Sync + 'static {
    async fn create_object(&self, request: Request<pb::CreateObjectRequest>) -> Result<Response<pb::Tag>, Status>;
    async fn update_object(&self, request: Request<pb::UpdateObjectRequest>) -> Result<Response<pb::Tag>, Status>;
    async fn update_tag(&self, request: Request<pb::UpdateTagRequest>) -> Result<Response<pb::Tag>, Status>;
    async fn preallocate_id(
        &self,
        request: Request<pb::PreallocateIdRequest>,
    ) -> Result<Response<pb::PreallocateIdResponse>, Status>;
    async fn read_object(&self, request: Request<pb::ReadObjectRequest>) -> Result<Response<pb::Tag>, Status>;
    async fn search(&self, request: Request<pb::SearchRequest>) -> Result<Response<pb::SearchResponse>, Status>;
    async fn write_batch(&self, request: Request<pb::BatchWriteRequest>) -> Result<Response<()>, Status>;
}

pub struct PublicMetadataApi<D: MetadataDal>(pub Arc<MetadataApiHandler<D>>);

#[tonic::async_trait]
impl<D: MetadataDal + 'static> MetadataApi for PublicMetadataApi<D> {
    async fn create_object(&self, request: Request<pb::CreateObjectRequest>) -> Result<Response<pb::Tag>, Status> {
        self.0.create_object(request).await
    }

    async fn update_object(&self, request: Request<pb::UpdateObjectRequest>) -> Result<Response<pb::Tag>, Status> {
        self.0.update_object(request).await
    }

    async fn update_tag(&self, request: Request<pb::UpdateTagRequest>) -> Result<Response<pb::Tag>, Status> {
        self.0.update_tag(request).await
    }

    async fn preallocate_id(
        &self,
        request: Request<pb::PreallocateIdRequest>,
    ) -> Result<Response<pb::PreallocateIdResponse>, Status> {
        self.0.preallocate_id(request).await
    }

    async fn read_object(&self, request: Request<pb::ReadObjectRequest>) -> Result<Response<pb::Tag>, Status> {
        self.0.read_object(request).await
    }

    async fn search(&self, request: Request<pb::SearchRequest>) -> Result<Response<pb::SearchResponse>, Status> {
        self.0.search(request).await
    }
}

pub struct TrustedMetadataApiService<D: MetadataDal>(pub Arc<MetadataApiHandler<D>>);

#[tonic::async_trait]
impl<D: MetadataDal + 'static> TrustedMetadataApi for TrustedMetadataApiService<D> {
    async fn create_object(&self, request: Request<pb::CreateObjectRequest>) -> Result<Response<pb::Tag>, Status> {
        self.0.create_object(request).await
    }

    async fn update_object(&self, request: Request<pb::UpdateObjectRequest>) -> Result<Response<pb::Tag>, Status> {
        self.0.update_object(request).await
    }

    async fn update_tag(&self, request: Request<pb::UpdateTagRequest>) -> Result<Response<pb::Tag>, Status> {
        self.0.update_tag(request).await
    }

    async fn preallocate_id(
        &self,
        request: Request<pb::PreallocateIdRequest>,
    ) -> Result<Response<pb::PreallocateIdResponse>, Status> {
        self.0.preallocate_id(request).await
    }

    async fn read_object(&self, request: Request<pb::ReadObjectRequest>) -> Result<Response<pb::Tag>, Status> {
        self.0.read_object(request).await
    }

    async fn search(&self, request: Request<pb::SearchRequest>) -> Result<Response<pb::SearchResponse>, Status> {
        self.0.search(request).await
    }

    async fn write_batch(&self, request: Request<pb::BatchWriteRequest>) -> Result<Response<()>, Status> {
        self.0.write_batch(request).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use trac_core::TenantDescriptor;
    use trac_metadata::{DalResult, NewTag, SearchHit, Selector, Tag};

    use super::*;

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
            _object_type: trac_types::ObjectType,
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
            let _ = tenant;
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
                objects.insert(
                    new_tag.object_id.0,
                    Tag {
                        header,
                        definition: prior.definition,
                        attrs: new_tag.attrs,
                    },
                );
            }
            let _ = tenant;
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

        async fn search(&self, _tenant: &str, _params: &trac_metadata::SearchParams) -> DalResult<Vec<SearchHit>> {
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

    fn handler(surface: ApiSurface) -> MetadataApiHandler<FakeDal> {
        let dal = Arc::new(FakeDal::default());
        let (_host, handle) = trac_metadata_service::build_service_host(dal.clone());
        let service = Arc::new(MetadataService::new(dal));
        MetadataApiHandler::new(handle, service, surface)
    }

    fn with_tenant<T>(msg: T) -> Request<T> {
        let mut req = Request::new(msg);
        req.metadata_mut().insert("x-trac-tenant", "ACME".parse().unwrap());
        req.metadata_mut().insert("x-trac-user-id", "u1".parse().unwrap());
        req
    }

    #[tokio::test]
    async fn create_object_through_public_surface_stamps_attrs_and_returns_header() {
        let h = handler(ApiSurface::Public);
        let req = with_tenant(pb::CreateObjectRequest {
            tenant: "ACME".into(),
            object_type: pb::ObjectType::Data as i32,
            definition: Some(json_to_struct(&serde_json::json!({"rows": 1})).unwrap()),
            attrs: Default::default(),
        });
        let tag = h.create_object(req).await.unwrap().into_inner();
        let header = tag.header.unwrap();
        assert_eq!(header.object_version, 1);
        assert!(tag.attrs.contains_key("trac_create_user_id"));
    }

    #[tokio::test]
    async fn public_surface_rejects_job_object_type() {
        let h = handler(ApiSurface::Public);
        let req = with_tenant(pb::CreateObjectRequest {
            tenant: "ACME".into(),
            object_type: pb::ObjectType::Job as i32,
            definition: None,
            attrs: Default::default(),
        });
        let err = h.create_object(req).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::PermissionDenied);
    }

    #[tokio::test]
    async fn trusted_surface_allows_job_object_type() {
        let h = handler(ApiSurface::Trusted);
        let req = with_tenant(pb::CreateObjectRequest {
            tenant: "ACME".into(),
            object_type: pb::ObjectType::Job as i32,
            definition: None,
            attrs: Default::default(),
        });
        let tag = h.create_object(req).await.unwrap().into_inner();
        assert_eq!(tag.header.unwrap().object_type, pb::ObjectType::Job as i32);
    }

    #[tokio::test]
    async fn missing_tenant_metadata_is_rejected() {
        let h = handler(ApiSurface::Public);
        let req = Request::new(pb::CreateObjectRequest {
            tenant: "ACME".into(),
            object_type: pb::ObjectType::Data as i32,
            definition: None,
            attrs: Default::default(),
        });
        let err = h.create_object(req).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn read_object_round_trips_created_record() {
        let h = handler(ApiSurface::Trusted);
        let created = h
            .create_object(with_tenant(pb::CreateObjectRequest {
                tenant: "ACME".into(),
                object_type: pb::ObjectType::Data as i32,
                definition: Some(json_to_struct(&serde_json::json!({"rows": 1})).unwrap()),
                attrs: Default::default(),
            }))
            .await
            .unwrap()
            .into_inner();
        let object_id = created.header.unwrap().object_id;

        let read = h
            .read_object(with_tenant(pb::ReadObjectRequest {
                tenant: "ACME".into(),
                object_id,
                object_selector: None,
                tag_selector: None,
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(read.definition, created.definition);
    }
}
