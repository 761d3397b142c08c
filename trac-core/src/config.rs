//! # TRAC configuration
//!
//! A minimal, framework-agnostic configuration system based on a simple
//! string key/value store. Mirrors Feathers' `app.set()` / `app.get()`
//! API so the same pattern backs per-tenant overrides, DAL datasource
//! settings (spec.md §6) and executor/job-cache backend selection.
//!
//! ## Setting and reading values
//! ```rust
//! use trac_core::TracConfig;
//! let mut config = TracConfig::new();
//!
//! config.set("paginate.default", "10");
//! config.set("paginate.max", "50");
//!
//! assert_eq!(config.get("paginate.default"), Some("10"));
//! ```
//!
//! ## Environment overrides
//! TRAC core is intentionally environment-agnostic. The `trac-server`
//! binary loads environment variables using this convention:
//!
//! ```rust
//! use trac_core::TracConfig;
//! pub fn load_env_config(config: &mut TracConfig, prefix: &str) {
//!     for (key, value) in std::env::vars() {
//!         if let Some(stripped) = key.strip_prefix(prefix) {
//!             let normalized = stripped
//!                 .to_lowercase()
//!                 .replace("__", "."); // TRAC__METADATA__POOL_SIZE → metadata.pool_size
//!
//!             config.set(normalized, value);
//!         }
//!     }
//! }
//! ```
//!
//! ```bash
//! export TRAC__METADATA__POOL_SIZE=25
//! ```
//!
//! Higher-level loaders (TOML, JSON, Consul, Vault, etc.) are intentionally
//! kept out of this crate so each binary remains free to choose its own
//! configuration strategy.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct TracConfig {
    values: HashMap<String, String>,
}

impl TracConfig {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    ///
    /// Example: config.set("paginate.default", "10")
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Get a configuration value by key.
    ///
    /// Returns None if the key is not present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Check whether a key is present.
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn snapshot(&self) -> TracConfigSnapshot {
        TracConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TracConfigSnapshot {
    map: HashMap<String, String>,
}

impl TracConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse::<usize>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.parse::<bool>().ok())
    }
}
