//! trac-metadata-api: the gRPC tier over `trac_metadata_service`
//! (spec.md §4.4) — `MetadataApi` (object-type-restricted, public) and
//! `TrustedMetadataApi` (unrestricted, internal-only), sharing one
//! handler built from a single [`ServiceHandle`]/[`MetadataService`]
//! pair.

pub mod convert;
pub mod pb;
pub mod service;
pub mod status;

pub use service::{ApiSurface, MetadataApi, MetadataApiHandler, PublicMetadataApi, TrustedMetadataApi, TrustedMetadataApiService};

use std::sync::Arc;

use trac_metadata::MetadataDal;
use trac_metadata_service::build_service_host;

/// Build both gRPC surfaces over one DAL, sharing the same
/// [`ServiceHost`][trac_core::ServiceHost] so a single set of
/// controlled-attribute stamping hooks backs every write regardless of
/// which surface it came through.
pub fn build_metadata_api<D: MetadataDal + 'static>(
    dal: Arc<D>,
) -> (PublicMetadataApi<D>, TrustedMetadataApiService<D>) {
    let (host, handle) = build_service_host(dal.clone());
    let service = Arc::new(trac_metadata_service::MetadataService::new(dal));

    // `ServiceHandle` isn't `Clone`; a second handle from the same
    // `ServiceHost` shares the same registered service and hooks.
    let trusted_handle = host.service("metadata").expect("just registered");

    let public = Arc::new(MetadataApiHandler::new(handle, service.clone(), ApiSurface::Public));
    let trusted = Arc::new(MetadataApiHandler::new(trusted_handle, service, ApiSurface::Trusted));

    (PublicMetadataApi(public), TrustedMetadataApiService(trusted))
}
