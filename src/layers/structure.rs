//! Structure layer (V1): wrappers, decoys and sibling order.
//!
//! Two decisions are taken per component, each from its own sub-key so
//! they don't move together: whether to enclose the component in an extra
//! container, and whether to drop an invisible decoy next to it.
//!
//! Sibling order is chosen from a pool of permutations drawn from several
//! families (rotations, adjacent swaps, reversals, seeded shuffles). A
//! single family would be easy to invert from a handful of observations.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::varying_seed;
use crate::markup::{Element, Node};
use crate::selector::VariantSelector;

/// Inline style that hides an element from sight without `display:none`.
pub const VISUALLY_HIDDEN_STYLE: &str =
    "position:absolute;width:1px;height:1px;padding:0;margin:-1px;overflow:hidden;clip:rect(0,0,0,0);white-space:nowrap;border:0";

/// Marker attribute on wrapper containers.
pub const WRAPPER_ATTR: &str = "data-variant-wrapper";
/// Marker attribute on decoy siblings.
pub const DECOY_ATTR: &str = "data-variant-decoy";

/// Number of seeded Fisher–Yates shuffles added to the candidate pool.
const SHUFFLE_ROUNDS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoyPosition {
    None,
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapDecision {
    pub wrap: bool,
    pub decoy: DecoyPosition,
}

impl WrapDecision {
    pub const IDENTITY: WrapDecision = WrapDecision {
        wrap: false,
        decoy: DecoyPosition::None,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureLayer {
    seed: Option<u32>,
}

impl StructureLayer {
    pub fn new(seed: Option<u32>) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> Option<u32> {
        self.seed
    }

    /// Wrapper and decoy choice for `key`.
    pub fn decide(&self, key: &str) -> WrapDecision {
        let Some(seed) = varying_seed(self.seed) else {
            return WrapDecision::IDENTITY;
        };
        let wrap = VariantSelector::select_index(seed, &format!("{}-wrapper", key), 2) == 1;
        let decoy = match VariantSelector::select_index(seed, &format!("{}-decoy", key), 3) {
            1 => DecoyPosition::Before,
            2 => DecoyPosition::After,
            _ => DecoyPosition::None,
        };
        WrapDecision { wrap, decoy }
    }

    /// Apply the wrapper/decoy decision for `key` around `children`.
    pub fn wrap(&self, key: &str, children: Node) -> Node {
        let Some(seed) = varying_seed(self.seed) else {
            return children;
        };
        let decision = self.decide(key);

        let body = if decision.wrap {
            Element::new("div")
                .attr(WRAPPER_ATTR, key)
                .child(children)
                .into()
        } else {
            children
        };

        match decision.decoy {
            DecoyPosition::None => body,
            DecoyPosition::Before => Node::Fragment(vec![decoy(seed, key), body]),
            DecoyPosition::After => Node::Fragment(vec![body, decoy(seed, key)]),
        }
    }

    /// Permutation of `[0, count)` for the list named `key`.
    pub fn reorder(&self, key: &str, count: usize) -> Vec<usize> {
        let identity: Vec<usize> = (0..count).collect();
        let Some(seed) = varying_seed(self.seed) else {
            return identity;
        };
        if count <= 1 {
            return identity;
        }

        let candidates = permutation_candidates(seed, key, count);
        let pick = VariantSelector::select_index(seed, &format!("{}-order", key), candidates.len());
        candidates.into_iter().nth(pick).unwrap_or(identity)
    }

    /// Reorder `items` with the permutation for `key`.
    pub fn apply_order<T>(&self, key: &str, items: Vec<T>) -> Vec<T> {
        let order = self.reorder(key, items.len());
        let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
        order
            .into_iter()
            .filter_map(|i| slots.get_mut(i).and_then(Option::take))
            .collect()
    }
}

fn decoy(seed: u32, key: &str) -> Node {
    Element::new("span")
        .attr(
            "id",
            VariantSelector::generate_id(seed, &format!("{}-decoy", key), "decoy"),
        )
        .attr(DECOY_ATTR, key)
        .attr("aria-hidden", "true")
        .attr("style", VISUALLY_HIDDEN_STYLE)
        .into()
}

/// Deduplicated permutation pool for `(seed, key, count)`, identity removed.
pub(crate) fn permutation_candidates(seed: u32, key: &str, count: usize) -> Vec<Vec<usize>> {
    let identity: Vec<usize> = (0..count).collect();
    let mut pool: Vec<Vec<usize>> = Vec::new();

    // Rotations
    for k in 1..count {
        let mut p = identity.clone();
        p.rotate_left(k);
        pool.push(p);
    }

    // Single adjacent swap at each offset
    for i in 0..count - 1 {
        let mut p = identity.clone();
        p.swap(i, i + 1);
        pool.push(p);
    }

    // All adjacent pairs swapped, starting at offset 0 and 1
    for start in 0..2 {
        let mut p = identity.clone();
        let mut i = start;
        while i + 1 < count {
            p.swap(i, i + 1);
            i += 2;
        }
        pool.push(p);
    }

    // Full and partial reversals
    let mut reversed = identity.clone();
    reversed.reverse();
    pool.push(reversed);

    let half = count / 2;
    if half >= 2 {
        let mut head = identity.clone();
        head[..half].reverse();
        pool.push(head);
    }
    if count - half >= 2 {
        let mut tail = identity.clone();
        tail[half..].reverse();
        pool.push(tail);
    }

    // Seeded Fisher–Yates shuffles
    let key_hash = VariantSelector::hash_key(key);
    for round in 0..SHUFFLE_ROUNDS {
        let mut p = identity.clone();
        for i in (1..count).rev() {
            let step = key_hash
                .wrapping_add(round.wrapping_mul(0x0100_0193))
                .wrapping_add(i as u32);
            let j = VariantSelector::mix(seed, step) as usize % (i + 1);
            p.swap(i, j);
        }
        pool.push(p);
    }

    let mut seen = HashSet::new();
    pool.retain(|p| seen.insert(p.clone()));
    if pool.len() > 1 {
        pool.retain(|p| *p != identity);
    }
    pool
}
