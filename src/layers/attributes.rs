//! Attribute and text layer (V3).
//!
//! One mechanism, three kinds of data: element ids, class-name fragments
//! and user-visible copy. Each kind has its own [`CandidateMap`]. Index 0
//! of every candidate list is the canonical value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::varying_seed;
use crate::error::{Result, VariationError};
use crate::selector::VariantSelector;

/// Ordered candidate values per variant key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateMap {
    entries: BTreeMap<String, Vec<String>>,
}

impl CandidateMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut map = Self::new();
        for (key, values) in pairs {
            map.insert(key, values);
        }
        map
    }

    pub fn insert<V, S>(&mut self, key: impl Into<String>, values: V)
    where
        V: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries
            .insert(key.into(), values.into_iter().map(Into::into).collect());
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge two maps; `local` wins for keys present in both.
    pub fn merge(local: &CandidateMap, shared: &CandidateMap) -> CandidateMap {
        let mut entries = shared.entries.clone();
        entries.extend(local.entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        CandidateMap { entries }
    }
}

/// Which candidate map a lookup goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantKind {
    Id,
    Class,
    Text,
}

/// Candidate maps for ids, classes and copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantCatalog {
    pub ids: CandidateMap,
    pub classes: CandidateMap,
    pub texts: CandidateMap,
}

impl VariantCatalog {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| VariationError::InvalidCatalog(format!("variant catalog: {}", e)))
    }

    pub fn map(&self, kind: VariantKind) -> &CandidateMap {
        match kind {
            VariantKind::Id => &self.ids,
            VariantKind::Class => &self.classes,
            VariantKind::Text => &self.texts,
        }
    }

    /// App-local catalog layered over a shared default catalog.
    pub fn merge(local: &VariantCatalog, shared: &VariantCatalog) -> VariantCatalog {
        VariantCatalog {
            ids: CandidateMap::merge(&local.ids, &shared.ids),
            classes: CandidateMap::merge(&local.classes, &shared.classes),
            texts: CandidateMap::merge(&local.texts, &shared.texts),
        }
    }
}

/// Pick a value for `key` from `candidates`.
///
/// Disabled layer, missing list or empty list yields `fallback`, or `key`
/// when no fallback was given. A canonical seed yields the first candidate.
pub fn select_variant(
    seed: Option<u32>,
    key: &str,
    candidates: Option<&[String]>,
    fallback: Option<&str>,
) -> String {
    let default = || fallback.unwrap_or(key).to_string();
    let Some(seed) = seed else {
        return default();
    };
    let list = match candidates {
        Some(list) if !list.is_empty() => list,
        _ => return default(),
    };
    match varying_seed(Some(seed)) {
        None => list[0].clone(),
        Some(seed) => VariantSelector::pick(seed, key, list)
            .cloned()
            .unwrap_or_else(default),
    }
}

/// V3 bound to a seed and a catalog.
#[derive(Debug, Clone, Copy)]
pub struct AttributeTextLayer<'a> {
    seed: Option<u32>,
    catalog: &'a VariantCatalog,
}

impl<'a> AttributeTextLayer<'a> {
    pub fn new(seed: Option<u32>, catalog: &'a VariantCatalog) -> Self {
        Self { seed, catalog }
    }

    pub fn seed(&self) -> Option<u32> {
        self.seed
    }

    pub fn get_variant(&self, key: &str, map: &CandidateMap, fallback: Option<&str>) -> String {
        select_variant(self.seed, key, map.get(key), fallback)
    }

    pub fn variant(&self, kind: VariantKind, key: &str, fallback: Option<&str>) -> String {
        self.get_variant(key, self.catalog.map(kind), fallback)
    }

    pub fn id(&self, key: &str) -> String {
        self.variant(VariantKind::Id, key, None)
    }

    pub fn class(&self, key: &str) -> String {
        self.variant(VariantKind::Class, key, None)
    }

    pub fn text(&self, key: &str) -> String {
        self.variant(VariantKind::Text, key, None)
    }

    pub fn text_or(&self, key: &str, fallback: &str) -> String {
        self.variant(VariantKind::Text, key, Some(fallback))
    }

    /// `"{base_class} {fragment}"`, or just the base class when there is
    /// no fragment for `key`.
    pub fn class_list(&self, base_class: &str, key: &str) -> String {
        let fragment = self.variant(VariantKind::Class, key, Some(""));
        if fragment.is_empty() {
            base_class.to_string()
        } else {
            format!("{} {}", base_class, fragment)
        }
    }
}
