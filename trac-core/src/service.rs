//! Core service trait and method-kind vocabulary.
//!
//! R = record type (e.g. `Tag`, `JobEntry`)
//! P = params type (selectors, query options, tenant-scoped filters, etc.)
//!
//! TRAC objects are versioned and immutable (spec.md §3.4/§3.5) — there is
//! deliberately no `remove`. A stored object's life ends only by a new
//! version superseding it, never by deletion.

use anyhow::Result;
use async_trait::async_trait;

use crate::tenant::TenantContext;

/// Which CRUD-ish method a hook pipeline run is for. `Custom` covers
/// operations with no REST-verb counterpart, such as `writeBatch`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceMethodKind {
    Find,
    Get,
    Create,
    Update,
    Patch,
    Custom(String),
}

/// What a service instance supports, consulted by the gateway's REST
/// bridge before attempting a custom-method dispatch.
#[derive(Debug, Clone, Default)]
pub struct ServiceCapabilities {
    pub allowed_methods: Vec<ServiceMethodKind>,
}

impl ServiceCapabilities {
    pub fn crud() -> Self {
        Self {
            allowed_methods: vec![
                ServiceMethodKind::Find,
                ServiceMethodKind::Get,
                ServiceMethodKind::Create,
                ServiceMethodKind::Update,
                ServiceMethodKind::Patch,
            ],
        }
    }

    pub fn with_custom(mut self, name: impl Into<String>) -> Self {
        self.allowed_methods
            .push(ServiceMethodKind::Custom(name.into()));
        self
    }

    pub fn allows(&self, kind: &ServiceMethodKind) -> bool {
        self.allowed_methods.contains(kind)
    }
}

#[async_trait]
pub trait TracService<R, P = ()>: Send + Sync
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    /// Search for records matching `params` (`loadObject`/`search`).
    async fn find(&self, tenant: &TenantContext, params: P) -> Result<Vec<R>>;

    /// Load a single record by id (`loadObject` against a single selector).
    async fn get(&self, tenant: &TenantContext, id: &str, params: P) -> Result<R>;

    /// Create a brand-new record (`createObject`/`saveNewObjects`).
    async fn create(&self, tenant: &TenantContext, data: R, params: P) -> Result<R>;

    /// Write a new object version (`updateObject`/`saveNewVersions`).
    async fn update(&self, tenant: &TenantContext, id: &str, data: R, params: P) -> Result<R>;

    /// Write a new tag version on an existing object version
    /// (`updateTag`/`saveNewTags`). `id` is optional: some patch calls
    /// address a record purely through `params`.
    async fn patch(
        &self,
        tenant: &TenantContext,
        id: Option<&str>,
        data: R,
        params: P,
    ) -> Result<R>;

    /// Escape hatch for operations with no CRUD-verb equivalent, such as
    /// `writeBatch`. The default rejects every custom method; services
    /// that support one should also reflect it in `capabilities()`.
    async fn custom(
        &self,
        name: &str,
        tenant: &TenantContext,
        data: Option<R>,
        params: P,
    ) -> Result<R> {
        let _ = (tenant, data, params);
        Err(anyhow::anyhow!("custom method '{name}' is not implemented"))
    }

    fn capabilities(&self) -> ServiceCapabilities {
        ServiceCapabilities::crud()
    }
}
