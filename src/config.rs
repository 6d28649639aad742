//! Store configuration.
//!
//! Deployments differ in whether authentication and the school collection
//! are in play and in how mutations hit the cache; one store covers all of
//! them, parameterized by this struct.

use serde::{Deserialize, Serialize};

/// How a counter or score mutation is applied to the local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UpdateMode {
    /// Mutate the cached record synchronously, before the network call
    /// resolves; the server's response body is discarded. A failed call
    /// leaves the local mutation in place.
    #[default]
    Optimistic,
    /// Leave the cache untouched until the server confirms, then replace
    /// the cached class wholesale with the returned aggregate.
    Authoritative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the backend, e.g. `https://grades.example.org/api`.
    pub base_url: String,
    /// Whether login and bearer tokens are in play for this deployment.
    pub auth_enabled: bool,
    /// Whether the school collection is fetched at all.
    pub schools_enabled: bool,
    /// Default update mode callers thread into per-call mutations.
    pub update_mode: UpdateMode,
}

impl StoreConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_enabled: true,
            schools_enabled: true,
            update_mode: UpdateMode::Optimistic,
        }
    }
}
