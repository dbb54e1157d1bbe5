//! Seed bounds and engine configuration.
//!
//! `VariationConfig` follows the same shape as every other option bag the
//! JS side hands us: a serde struct with `#[serde(default)]`, so callers
//! only spell out what they change.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VariationError};
use crate::flags::{FlagSet, RuntimeFlags};
use crate::layers::attributes::VariantCatalog;
use crate::layers::popup::PopupCatalog;

/// Lowest valid base seed.
pub const MIN_SEED: u32 = 1;
/// Highest valid base seed.
pub const MAX_SEED: u32 = 999;
/// The seed under which every layer renders the unmodified page.
pub const CANONICAL_SEED: u32 = 1;
/// Seed used when neither the URL nor storage supplies one.
pub const DEFAULT_SEED: u32 = CANONICAL_SEED;

/// Clamp an arbitrary numeric input into `[MIN_SEED, MAX_SEED]`.
///
/// NaN maps to `DEFAULT_SEED`; infinities map to the nearest bound.
pub fn clamp_seed(value: f64) -> u32 {
    if value.is_nan() {
        return DEFAULT_SEED;
    }
    let truncated = value.trunc();
    if truncated <= MIN_SEED as f64 {
        MIN_SEED
    } else if truncated >= MAX_SEED as f64 {
        MAX_SEED
    } else {
        truncated as u32
    }
}

/// Clamp an integer seed (e.g. one returned by the resolve endpoint).
pub fn clamp_seed_int(value: i64) -> u32 {
    value.clamp(MIN_SEED as i64, MAX_SEED as i64) as u32
}

/// Parse a textual seed. Non-numeric input yields `None` so the caller can
/// move on to its next source; numeric input is always clamped.
pub fn parse_seed(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(v) if !v.is_nan() => Some(clamp_seed(v)),
        _ => None,
    }
}

/// Pick the base seed from URL, then storage, then the default.
pub fn select_base_seed(url_value: Option<&str>, stored: Option<&str>, default: u32) -> u32 {
    url_value
        .and_then(parse_seed)
        .or_else(|| stored.and_then(parse_seed))
        .unwrap_or_else(|| clamp_seed_int(default as i64))
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VariationConfig {
    /// Namespace for persisted keys; one entry per app.
    pub app_key: String,
    /// Seed used when no URL parameter or stored value exists.
    pub default_seed: u32,
    /// Base URL of the seed-resolution service. `None` disables remote confirmation.
    pub resolve_endpoint: Option<String>,
    /// Base URL of the dataset-sampling service.
    pub dataset_endpoint: Option<String>,
    /// Project key sent with every dataset request.
    pub project_key: String,
    /// Remote resolution timeout in milliseconds.
    pub remote_timeout_ms: u32,
    /// Build-time layer defaults.
    pub build_flags: FlagSet,
    /// Runtime environment flags (`ENABLE_DYNAMIC_V1`, ...).
    pub runtime: RuntimeFlags,
    /// Name of the URL parameter carrying the base seed.
    pub seed_param: String,
    /// Name of the URL parameter listing enabled layers.
    pub layers_param: String,
    pub popups: PopupCatalog,
    pub variants: VariantCatalog,
}

impl Default for VariationConfig {
    fn default() -> Self {
        Self {
            app_key: "seed-variation".to_string(),
            default_seed: DEFAULT_SEED,
            resolve_endpoint: None,
            dataset_endpoint: None,
            project_key: "default".to_string(),
            remote_timeout_ms: 2_000,
            build_flags: FlagSet::all(),
            runtime: RuntimeFlags::default(),
            seed_param: "seed".to_string(),
            layers_param: "enabled_layers".to_string(),
            popups: PopupCatalog::standard(),
            variants: VariantCatalog::default(),
        }
    }
}

impl VariationConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: VariationConfig = serde_json::from_str(json)
            .map_err(|e| VariationError::Config(format!("invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would make a layer misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.app_key.trim().is_empty() {
            return Err(VariationError::Config("app_key must not be empty".into()));
        }
        if self.seed_param.is_empty() || self.layers_param.is_empty() {
            return Err(VariationError::Config("URL parameter names must not be empty".into()));
        }
        self.popups.validate()
    }

    /// localStorage key holding the base seed.
    pub fn seed_storage_key(&self) -> String {
        format!("{}:seed", self.app_key)
    }

    /// sessionStorage key holding the popup session record.
    pub fn popup_storage_key(&self) -> String {
        format!("{}:popups", self.app_key)
    }
}
