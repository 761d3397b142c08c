//! Multi-tenant types shared across the metadata store, orchestrator and
//! gateway. Every table in the metadata store carries a `tenantId`
//! (spec.md §3.4 invariant 5); this module is the one place that
//! identifier is represented.

/// A tenant's short code, e.g. `"ACME_CORP"`. Tenants are created by an
/// administrative task and never deleted at runtime (spec.md §3.5).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for TenantId {
    fn from(s: S) -> Self {
        Self(s.into())
    }
}

/// Context carried with every tenant-scoped operation: DAL calls, service
/// calls, job cache entries and gateway requests all thread this through
/// so that isolation is part of the call signature, not a hidden lookup.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: TenantId,
}

impl TenantContext {
    pub fn new<S: Into<String>>(tenant: S) -> Self {
        Self {
            tenant_id: TenantId(tenant.into()),
        }
    }

    pub fn code(&self) -> &str {
        self.tenant_id.as_str()
    }
}

/// A tenant row as returned by `listTenants` (spec.md §4.2.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantDescriptor {
    pub code: String,
    pub description: String,
}
