//! # Hooks: Dependency Injection, Feathers style
//!
//! This runtime is **DI-first**: hooks should be small, portable, testable,
//! and not depend on hidden global state.
//!
//! In FeathersJS, hooks often reach for `context.app` to access
//! config/services. Here, the default approach is: **inject what you need
//! at construction time**.
//!
//! An optional, Feathers-like runtime access pattern via `ctx.config` and
//! `ctx.services` is also supported for cases where DI is awkward — e.g. a
//! controlled-attribute stamping hook that needs to read the tenant's
//! pagination defaults.
//!
//! ## The two supported styles
//!
//! ### A) Preferred: Dependency Injection (most hooks should do this)
//! Best for: static validation, permission checks on object type,
//! controlled-attribute stamping, input shaping.
//!
//! ```rust
//! use std::sync::Arc;
//! use anyhow::Result;
//! use async_trait::async_trait;
//! use trac_core::{TracBeforeHook, HookContext};
//!
//! struct RejectClientAttrPrefix;
//!
//! #[async_trait]
//! impl<R, P> TracBeforeHook<R, P> for RejectClientAttrPrefix
//! where
//!     R: Send + 'static,
//!     P: Send + Clone + 'static,
//! {
//!     async fn run(&self, _ctx: &mut HookContext<R, P>) -> Result<()> {
//!         Ok(())
//!     }
//! }
//! ```
//!
//! ### B) Optional: Context services/config (Feathers-like escape hatch)
//! Best for: logging, auditing, or a policy check that genuinely needs
//! a separate service and DI is too rigid.
//!
//! Service-to-service calls **inside hooks** can be dangerous: they create
//! hidden coupling, can trigger nested hook pipelines, and can form
//! cycles. Prefer calling other services from the service implementation
//! rather than from a hook; use `ctx.services` only for logging/auditing
//! or lightweight enrichment that cannot live in the service.
//!
//! `ctx.services.service::<R2, P2>("name")` performs a typed downcast. If
//! you request a different `<R2, P2>` than what was registered, it
//! returns a clear type-mismatch error — this runtime stays strongly
//! typed even while providing a Feathers-like runtime lookup experience.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::{ServiceMethodKind, TenantContext};

pub enum HookResult<R> {
    One(R),
    Many(Vec<R>),
}

/// A typed, Feathers-inspired hook context.
///
/// This context flows through:
/// around → before → service → after → error
pub struct HookContext<R, P>
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    pub tenant: TenantContext,
    pub method: ServiceMethodKind,
    pub params: P,

    /// Input data (create / patch / update)
    pub data: Option<R>,

    /// Output result (after hooks)
    pub result: Option<HookResult<R>>,

    /// Error captured during execution
    pub error: Option<anyhow::Error>,

    /// Feathers-style access to other services (runtime lookup)
    pub services: crate::ServiceCaller<R, P>,

    /// Immutable snapshot of process config for this call
    pub config: crate::TracConfigSnapshot,
}

impl<R, P> HookContext<R, P>
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    pub fn new(
        tenant: TenantContext,
        method: ServiceMethodKind,
        params: P,
        services: crate::ServiceCaller<R, P>,
        config: crate::TracConfigSnapshot,
    ) -> Self {
        Self {
            tenant,
            method,
            params,
            data: None,
            result: None,
            error: None,
            services,
            config,
        }
    }
}

pub type HookFut<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a>>;

/// Around hooks wrap the entire pipeline (like Feathers `around.all`)
pub struct Next<R, P>
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    pub(crate) call: Box<dyn for<'a> FnOnce(&'a mut HookContext<R, P>) -> HookFut<'a> + Send>,
}

impl<R, P> Next<R, P>
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    pub async fn run<'a>(self, ctx: &'a mut HookContext<R, P>) -> Result<()> {
        (self.call)(ctx).await
    }
}

#[async_trait]
pub trait TracBeforeHook<R, P>: Send + Sync
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    async fn run(&self, ctx: &mut HookContext<R, P>) -> Result<()>;
}

#[async_trait]
pub trait TracAfterHook<R, P>: Send + Sync
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    async fn run(&self, ctx: &mut HookContext<R, P>) -> Result<()>;
}

#[async_trait]
pub trait TracErrorHook<R, P>: Send + Sync
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    async fn run(&self, ctx: &mut HookContext<R, P>) -> Result<()>;
}

#[async_trait]
pub trait TracAroundHook<R, P>: Send + Sync
where
    R: Send + 'static,
    P: Send + Clone + 'static,
{
    async fn run(&self, ctx: &mut HookContext<R, P>, next: Next<R, P>) -> Result<()>;
}

/// Feathers-style hooks container:
///
/// {
///   around: { all, create, find },
///   before: { all, create },
///   after:  { all, find },
///   error:  { all, create }
/// }
pub struct ServiceHooks<R, P> {
    pub around_all: Vec<Arc<dyn TracAroundHook<R, P>>>,
    pub before_all: Vec<Arc<dyn TracBeforeHook<R, P>>>,
    pub after_all: Vec<Arc<dyn TracAfterHook<R, P>>>,
    pub error_all: Vec<Arc<dyn TracErrorHook<R, P>>>,

    pub around_by_method: HashMap<ServiceMethodKind, Vec<Arc<dyn TracAroundHook<R, P>>>>,
    pub before_by_method: HashMap<ServiceMethodKind, Vec<Arc<dyn TracBeforeHook<R, P>>>>,
    pub after_by_method: HashMap<ServiceMethodKind, Vec<Arc<dyn TracAfterHook<R, P>>>>,
    pub error_by_method: HashMap<ServiceMethodKind, Vec<Arc<dyn TracErrorHook<R, P>>>>,
}

impl<R, P> ServiceHooks<R, P> {
    pub fn new() -> Self {
        Self {
            around_all: Vec::new(),
            before_all: Vec::new(),
            after_all: Vec::new(),
            error_all: Vec::new(),
            around_by_method: HashMap::new(),
            before_by_method: HashMap::new(),
            after_by_method: HashMap::new(),
            error_by_method: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.around_all.is_empty()
            && self.before_all.is_empty()
            && self.after_all.is_empty()
            && self.error_all.is_empty()
            && self.around_by_method.is_empty()
            && self.before_by_method.is_empty()
            && self.after_by_method.is_empty()
            && self.error_by_method.is_empty()
    }

    // ─────────── AROUND ───────────

    pub fn around_all(&mut self, hook: Arc<dyn TracAroundHook<R, P>>) -> &mut Self {
        self.around_all.push(hook);
        self
    }

    pub fn around(
        &mut self,
        method: ServiceMethodKind,
        hook: Arc<dyn TracAroundHook<R, P>>,
    ) -> &mut Self {
        self.around_by_method.entry(method).or_default().push(hook);
        self
    }

    // ─────────── BEFORE ───────────

    pub fn before_all(&mut self, hook: Arc<dyn TracBeforeHook<R, P>>) -> &mut Self {
        self.before_all.push(hook);
        self
    }

    pub fn before(
        &mut self,
        method: ServiceMethodKind,
        hook: Arc<dyn TracBeforeHook<R, P>>,
    ) -> &mut Self {
        self.before_by_method.entry(method).or_default().push(hook);
        self
    }

    pub fn before_create(&mut self, hook: Arc<dyn TracBeforeHook<R, P>>) -> &mut Self {
        self.before(ServiceMethodKind::Create, hook)
    }

    pub fn before_find(&mut self, hook: Arc<dyn TracBeforeHook<R, P>>) -> &mut Self {
        self.before(ServiceMethodKind::Find, hook)
    }

    pub fn before_get(&mut self, hook: Arc<dyn TracBeforeHook<R, P>>) -> &mut Self {
        self.before(ServiceMethodKind::Get, hook)
    }

    pub fn before_update(&mut self, hook: Arc<dyn TracBeforeHook<R, P>>) -> &mut Self {
        self.before(ServiceMethodKind::Update, hook)
    }

    pub fn before_patch(&mut self, hook: Arc<dyn TracBeforeHook<R, P>>) -> &mut Self {
        self.before(ServiceMethodKind::Patch, hook)
    }

    // ─────────── AFTER ───────────

    pub fn after_all(&mut self, hook: Arc<dyn TracAfterHook<R, P>>) -> &mut Self {
        self.after_all.push(hook);
        self
    }

    pub fn after(
        &mut self,
        method: ServiceMethodKind,
        hook: Arc<dyn TracAfterHook<R, P>>,
    ) -> &mut Self {
        self.after_by_method.entry(method).or_default().push(hook);
        self
    }

    pub fn after_create(&mut self, hook: Arc<dyn TracAfterHook<R, P>>) -> &mut Self {
        self.after(ServiceMethodKind::Create, hook)
    }

    pub fn after_find(&mut self, hook: Arc<dyn TracAfterHook<R, P>>) -> &mut Self {
        self.after(ServiceMethodKind::Find, hook)
    }

    // ─────────── ERROR ───────────

    pub fn error_all(&mut self, hook: Arc<dyn TracErrorHook<R, P>>) -> &mut Self {
        self.error_all.push(hook);
        self
    }

    pub fn error(
        &mut self,
        method: ServiceMethodKind,
        hook: Arc<dyn TracErrorHook<R, P>>,
    ) -> &mut Self {
        self.error_by_method.entry(method).or_default().push(hook);
        self
    }
}

impl<R, P> Default for ServiceHooks<R, P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper used by the pipeline:
/// returns `all + method` hooks in that order.
pub(crate) fn collect_method_hooks<T>(
    all: &[T],
    by_method: &std::collections::HashMap<crate::ServiceMethodKind, Vec<T>>,
    method: &crate::ServiceMethodKind,
) -> Vec<T>
where
    T: Clone,
{
    let mut out = Vec::new();
    out.extend_from_slice(all);
    if let Some(v) = by_method.get(method) {
        out.extend_from_slice(v);
    }
    out
}
