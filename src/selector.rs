//! Seeded deterministic variant selection.
//!
//! Maps `(seed, key, count)` to an index in `[0, count)`. The same triple
//! always yields the same index, in every process, on the server and in
//! the browser. Nothing here reads a clock or keeps state, so the
//! functions can be called any number of times per render.

/// Modulus applied to generated element ids.
pub const ID_MODULUS: u32 = 9999;

/// Prefix used by [`VariantSelector::generate_id`] callers that don't care.
pub const DEFAULT_ID_PREFIX: &str = "v";

/// Resolution of [`VariantSelector::roll`].
const ROLL_RESOLUTION: u32 = 10_000;

/// Stateless selector. All entry points are associated functions.
pub struct VariantSelector;

impl VariantSelector {
    /// Polynomial string hash over UTF-16 code units.
    ///
    /// Code units rather than bytes so the value matches what a
    /// `charCodeAt` loop computes for the same key in the page.
    #[inline]
    pub fn hash_key(key: &str) -> u32 {
        key.encode_utf16()
            .fold(0u32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as u32))
    }

    /// Combine a seed with a key hash (murmur-style finaliser).
    #[inline]
    pub fn mix(seed: u32, key_hash: u32) -> u32 {
        let mut h = seed.wrapping_mul(0x9E37_79B1) ^ key_hash;
        h = (h ^ (h >> 16)).wrapping_mul(0x45d9f3b);
        h = (h ^ (h >> 13)).wrapping_mul(0x45d9f3b);
        h ^ (h >> 16)
    }

    /// Deterministic index in `[0, count)`.
    ///
    /// `count <= 1` short-circuits to 0 without hashing.
    #[inline]
    pub fn select_index(seed: u32, key: &str, count: usize) -> usize {
        if count <= 1 {
            return 0;
        }
        Self::mix(seed, Self::hash_key(key)) as usize % count
    }

    /// Seeded element id of the form `{prefix}-{key}-{n}`, `n < 9999`.
    pub fn generate_id(seed: u32, key: &str, prefix: &str) -> String {
        let n = Self::mix(seed, Self::hash_key(key)) % ID_MODULUS;
        format!("{}-{}-{}", prefix, key, n)
    }

    /// Deterministic value in `[0, 1)` for probability gates.
    #[inline]
    pub fn roll(seed: u32, key: &str) -> f64 {
        let n = Self::mix(seed, Self::hash_key(key)) % ROLL_RESOLUTION;
        n as f64 / ROLL_RESOLUTION as f64
    }

    /// Pick one element of `items`, `None` only when `items` is empty.
    pub fn pick<'a, T>(seed: u32, key: &str, items: &'a [T]) -> Option<&'a T> {
        items.get(Self::select_index(seed, key, items.len()))
    }
}
