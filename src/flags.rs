//! Layer enablement flags.
//!
//! Precedence, highest first:
//! 1. `enabled_layers` URL parameter (when present it fully decides)
//! 2. runtime environment flags (`ENABLE_DYNAMIC_V{n}` and the public
//!    `NEXT_PUBLIC_ENABLE_DYNAMIC_V{n}` mirror)
//! 3. build-time defaults from [`VariationConfig::build_flags`](crate::VariationConfig)

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the four variation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Structure: wrappers, decoys, ordering
    V1,
    /// Data-selection parameters
    V2,
    /// Attribute and text substitution
    V3,
    /// Popups
    V4,
}

impl Layer {
    pub const ALL: [Layer; 4] = [Layer::V1, Layer::V2, Layer::V3, Layer::V4];

    pub fn tag(self) -> &'static str {
        match self {
            Layer::V1 => "v1",
            Layer::V2 => "v2",
            Layer::V3 => "v3",
            Layer::V4 => "v4",
        }
    }

    /// Accepts `v1`..`v4` and the descriptive aliases.
    pub fn from_tag(tag: &str) -> Option<Layer> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "v1" | "structure" | "layout" => Some(Layer::V1),
            "v2" | "data" => Some(Layer::V2),
            "v3" | "attributes" | "text" | "copy" => Some(Layer::V3),
            "v4" | "popups" | "popup" => Some(Layer::V4),
            _ => None,
        }
    }

    pub fn env_key(self) -> String {
        format!("ENABLE_DYNAMIC_{}", self.tag().to_ascii_uppercase())
    }

    pub fn public_env_key(self) -> String {
        format!("NEXT_PUBLIC_{}", self.env_key())
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Which layers are active. A disabled layer is the identity transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagSet {
    pub v1: bool,
    pub v2: bool,
    pub v3: bool,
    pub v4: bool,
}

impl Default for FlagSet {
    fn default() -> Self {
        Self::all()
    }
}

impl FlagSet {
    pub const fn all() -> Self {
        Self {
            v1: true,
            v2: true,
            v3: true,
            v4: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            v1: false,
            v2: false,
            v3: false,
            v4: false,
        }
    }

    pub fn only(layers: &[Layer]) -> Self {
        let mut flags = Self::none();
        for layer in layers {
            flags.set(*layer, true);
        }
        flags
    }

    pub fn is_enabled(&self, layer: Layer) -> bool {
        match layer {
            Layer::V1 => self.v1,
            Layer::V2 => self.v2,
            Layer::V3 => self.v3,
            Layer::V4 => self.v4,
        }
    }

    pub fn set(&mut self, layer: Layer, enabled: bool) {
        match layer {
            Layer::V1 => self.v1 = enabled,
            Layer::V2 => self.v2 = enabled,
            Layer::V3 => self.v3 = enabled,
            Layer::V4 => self.v4 = enabled,
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = Layer> + '_ {
        Layer::ALL.into_iter().filter(|l| self.is_enabled(*l))
    }

    /// Comma-separated tags, the same format the URL parameter takes.
    pub fn to_tags(&self) -> String {
        self.enabled().map(Layer::tag).collect::<Vec<_>>().join(",")
    }
}

/// `"true"`, `"1"`, `"yes"` and `"on"` (any case) are truthy.
pub fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Parse the `enabled_layers` URL value.
///
/// `all` enables everything; `none` or an empty value disables everything.
/// Unknown tags are ignored.
pub fn parse_layer_list(raw: &str) -> FlagSet {
    let mut flags = FlagSet::none();
    for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match tag.to_ascii_lowercase().as_str() {
            "all" => return FlagSet::all(),
            "none" => return FlagSet::none(),
            _ => match Layer::from_tag(tag) {
                Some(layer) => flags.set(layer, true),
                None => log::warn!("Ignoring unknown layer tag {:?}", tag),
            },
        }
    }
    flags
}

/// Environment-style runtime flags (`ENABLE_DYNAMIC_V1=true`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeFlags {
    values: BTreeMap<String, String>,
}

impl RuntimeFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Read the layer flags from the process environment (server rendering).
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> Self {
        Self::from_pairs(std::env::vars().filter(|(k, _)| k.contains("ENABLE_DYNAMIC_")))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// The runtime decision for `layer`, if any flag names it.
    ///
    /// The generic and public mirror must agree; when both are set and
    /// disagree the layer is treated as disabled.
    pub fn layer_override(&self, layer: Layer) -> Option<bool> {
        let generic = self.get(&layer.env_key()).map(is_truthy);
        let public = self.get(&layer.public_env_key()).map(is_truthy);
        match (generic, public) {
            (None, None) => None,
            (Some(v), None) | (None, Some(v)) => Some(v),
            (Some(a), Some(b)) if a == b => Some(a),
            (Some(_), Some(_)) => {
                log::warn!(
                    "⚠️ {} and {} disagree, disabling layer {}",
                    layer.env_key(),
                    layer.public_env_key(),
                    layer
                );
                Some(false)
            }
        }
    }
}

/// Combine all flag sources into the effective layer set.
pub fn resolve_flags(url_layers: Option<&str>, runtime: &RuntimeFlags, build: FlagSet) -> FlagSet {
    if let Some(raw) = url_layers {
        return parse_layer_list(raw);
    }
    let mut flags = build;
    for layer in Layer::ALL {
        if let Some(enabled) = runtime.layer_override(layer) {
            flags.set(layer, enabled);
        }
    }
    flags
}
