//! Network layer for the remote collaborators
//!
//! Two services sit behind this module: the seed-resolution endpoint that
//! confirms per-layer seeds, and the dataset-sampling endpoint that turns
//! a V2 sample request into rows. Both are plain idempotent GETs issued
//! through the browser's `fetch`.

mod dataset;
mod fetch;

pub use dataset::{DatasetClient, DatasetResponse};
pub use fetch::FetchTransport;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::error::Result;
use crate::flags::FlagSet;

/// Configuration for network operations
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Base URL the endpoint paths are appended to
    pub endpoint: String,

    /// Request timeout in milliseconds
    pub timeout_ms: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout_ms: 2_000,
        }
    }
}

impl NetworkConfig {
    /// Create config with a custom endpoint
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Join the endpoint and a path, tolerating a trailing slash on the endpoint
    pub fn build_url(&self, path: &str, query: &str) -> String {
        format!("{}{}?{}", self.endpoint.trim_end_matches('/'), path, query)
    }
}

/// Query sent to `GET /seeds/resolve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ResolveRequest {
    pub seed: u32,
    pub v1_enabled: bool,
    pub v2_enabled: bool,
    pub v3_enabled: bool,
}

impl ResolveRequest {
    pub const PATH: &'static str = "/seeds/resolve";

    pub fn new(seed: u32, flags: FlagSet) -> Self {
        Self {
            seed,
            v1_enabled: flags.v1,
            v2_enabled: flags.v2,
            v3_enabled: flags.v3,
        }
    }

    pub fn query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .append_pair("seed", &self.seed.to_string())
            .append_pair("v1_enabled", bool_str(self.v1_enabled))
            .append_pair("v2_enabled", bool_str(self.v2_enabled))
            .append_pair("v3_enabled", bool_str(self.v3_enabled))
            .finish()
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Body returned by the resolve endpoint. Absent or `null` fields mean the
/// layer is disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSeeds {
    #[serde(default)]
    pub base: Option<i64>,
    #[serde(default)]
    pub v1: Option<i64>,
    #[serde(default)]
    pub v2: Option<i64>,
    #[serde(default)]
    pub v3: Option<i64>,
}

/// Issues the remote seed-resolution lookup.
///
/// Implemented by [`FetchTransport`] in the browser; tests and server
/// hosts plug in their own.
#[async_trait(?Send)]
pub trait SeedTransport {
    async fn resolve(&self, request: &ResolveRequest) -> Result<RemoteSeeds>;
}
