//! Route table (spec.md §4.9). Routes are selected by first path segment
//! against a configured prefix table; ties are broken by declaration
//! order. Generalizes `dog-axum::app::AxumApp::use_service`'s per-path
//! router nesting into a data-driven table so one dispatcher can sit in
//! front of several protocol classes instead of one Axum sub-router per
//! service.

use std::collections::HashMap;

/// What kind of backend a matched route talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolClass {
    HttpProxy,
    GrpcProxy,
    GrpcWeb,
    RestMapped,
    Internal,
}

/// Where a matched route forwards to.
#[derive(Debug, Clone)]
pub struct RouteTarget {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl RouteTarget {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self { scheme: scheme.into(), host: host.into(), port, path: path.into() }
    }

    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct Route {
    pub prefix: String,
    pub class: ProtocolClass,
    pub target: RouteTarget,
}

/// The first-path-segment prefix table. Declaration order is preserved
/// so a caller can resolve tie-breaks deterministically even though, in
/// practice, each first segment is registered once.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Route>,
    by_prefix: HashMap<String, usize>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, prefix: impl Into<String>, class: ProtocolClass, target: RouteTarget) -> &mut Self {
        let prefix = prefix.trim_matches('/').to_string();
        let index = self.routes.len();
        self.routes.push(Route { prefix: prefix.clone(), class, target });
        // First registration for a given prefix wins on conflict — later
        // declarations never silently override an earlier route.
        self.by_prefix.entry(prefix).or_insert(index);
        self
    }

    /// Resolves a request path against the table by its first segment.
    /// No match -> `None`, which callers turn into a 404 with
    /// `Connection: close` (spec.md §4.9).
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        let first_segment = path.trim_start_matches('/').split('/').next().unwrap_or("");
        self.by_prefix.get(first_segment).map(|&i| &self.routes[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> RouteTarget {
        RouteTarget::new("http", "127.0.0.1", 9000, "/")
    }

    #[test]
    fn resolves_by_first_path_segment() {
        let mut table = RouteTable::new();
        table.register("metadata", ProtocolClass::GrpcProxy, target());
        table.register("health", ProtocolClass::Internal, target());

        let route = table.resolve("/metadata/v1/objects/123").unwrap();
        assert_eq!(route.class, ProtocolClass::GrpcProxy);
    }

    #[test]
    fn unmatched_path_returns_none() {
        let table = RouteTable::new();
        assert!(table.resolve("/nothing/here").is_none());
    }

    #[test]
    fn first_declaration_wins_on_duplicate_prefix() {
        let mut table = RouteTable::new();
        table.register("api", ProtocolClass::GrpcProxy, target());
        table.register("api", ProtocolClass::HttpProxy, target());

        let route = table.resolve("/api/x").unwrap();
        assert_eq!(route.class, ProtocolClass::GrpcProxy);
    }

    #[test]
    fn root_path_has_empty_first_segment() {
        let mut table = RouteTable::new();
        table.register("", ProtocolClass::Internal, target());
        assert!(table.resolve("/").is_some());
    }
}
