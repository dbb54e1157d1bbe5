//! Client for the dataset-sampling collaborator.
//!
//! The engine's job ends at building the request (see
//! [`layers::data`](crate::layers::data)). This client only moves the
//! request over the wire; empty or failed responses are returned as-is so
//! the calling app can choose its own degraded dataset.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::fetch::get_text;
use super::NetworkConfig;
use crate::error::Result;
use crate::layers::data::SampleRequest;

/// `{ "data": [...] }`
#[derive(Debug, Clone, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
pub struct DatasetResponse<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

pub struct DatasetClient {
    config: NetworkConfig,
}

impl DatasetClient {
    pub fn new(config: NetworkConfig) -> Self {
        Self { config }
    }

    /// Full request URL for `request`.
    pub fn url_for(&self, request: &SampleRequest) -> String {
        request.url(&self.config.endpoint)
    }

    /// Load the rows for `request`.
    pub async fn load<T: DeserializeOwned>(&self, request: &SampleRequest) -> Result<Vec<T>> {
        let url = self.url_for(request);
        log::debug!("📦 Loading dataset: {}", url);
        let body = get_text(&url, self.config.timeout_ms).await?;
        Ok(parse_dataset::<T>(&body)?.data)
    }
}

pub(crate) fn parse_dataset<T: DeserializeOwned>(body: &str) -> Result<DatasetResponse<T>> {
    Ok(serde_json::from_str(body)?)
}
