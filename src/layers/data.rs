//! Data layer (V2): parameters for the dataset-sampling service.
//!
//! Sampling itself happens server-side. This layer only decides which
//! seed, method and limit to ask for, and keeps the seed aligned with the
//! base seed in the URL so the same URL shows the same catalogue slice.

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::config::{clamp_seed_int, CANONICAL_SEED};

/// How the sampling service should draw rows from its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMethod {
    Select,
    Shuffle,
    Filter,
    Distribute,
}

impl SelectionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            SelectionMethod::Select => "select",
            SelectionMethod::Shuffle => "shuffle",
            SelectionMethod::Filter => "filter",
            SelectionMethod::Distribute => "distribute",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "select" => Some(SelectionMethod::Select),
            "shuffle" => Some(SelectionMethod::Shuffle),
            "filter" => Some(SelectionMethod::Filter),
            "distribute" => Some(SelectionMethod::Distribute),
            _ => None,
        }
    }
}

/// Query for `GET /datasets/load`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRequest {
    pub project_key: String,
    pub entity_type: String,
    pub seed_value: u32,
    pub limit: u32,
    pub method: SelectionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter_values: Vec<String>,
}

impl SampleRequest {
    pub const PATH: &'static str = "/datasets/load";

    /// Restrict the sample to rows whose `key` is one of `values`.
    pub fn with_filter<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter_key = Some(key.into());
        self.filter_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn query_string(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("project_key", &self.project_key)
            .append_pair("entity_type", &self.entity_type)
            .append_pair("seed_value", &self.seed_value.to_string())
            .append_pair("limit", &self.limit.to_string())
            .append_pair("method", self.method.as_str());
        if let Some(key) = &self.filter_key {
            query.append_pair("filter_key", key);
        }
        if !self.filter_values.is_empty() {
            query.append_pair("filter_values", &self.filter_values.join(","));
        }
        query.finish()
    }

    /// `{endpoint}/datasets/load?{query}`
    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{}?{}", endpoint.trim_end_matches('/'), Self::PATH, self.query_string())
    }
}

/// V2 bound to a seed and a project.
#[derive(Debug, Clone)]
pub struct DataLayer {
    seed: Option<u32>,
    project_key: String,
}

impl DataLayer {
    pub fn new(seed: Option<u32>, project_key: impl Into<String>) -> Self {
        Self {
            seed,
            project_key: project_key.into(),
        }
    }

    /// Seed forwarded to the sampler; canonical when the layer is off.
    pub fn seed_value(&self) -> u32 {
        match self.seed {
            Some(seed) => clamp_seed_int(seed as i64),
            None => CANONICAL_SEED,
        }
    }

    pub fn build_sample_request(
        &self,
        entity_type: &str,
        limit: u32,
        method: SelectionMethod,
    ) -> SampleRequest {
        SampleRequest {
            project_key: self.project_key.clone(),
            entity_type: entity_type.to_string(),
            seed_value: self.seed_value(),
            limit,
            method,
            filter_key: None,
            filter_values: Vec::new(),
        }
    }
}
