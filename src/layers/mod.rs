//! The four variation layers.
//!
//! Each layer is a small value bound to its resolved seed (`None` when the
//! layer is off). A layer whose seed is `None` or canonical is the identity
//! transform: it returns its input, index 0, or the caller's fallback.

pub mod attributes;
pub mod data;
pub mod popup;
pub mod structure;

pub use attributes::{AttributeTextLayer, CandidateMap, VariantCatalog, VariantKind};
pub use data::{DataLayer, SampleRequest, SelectionMethod};
pub use popup::{
    DismissReason, Placement, PopupCatalog, PopupDefinition, PopupLayer, PopupRenderer,
    PopupSessionState, PopupState, PopupView,
};
pub use structure::{DecoyPosition, StructureLayer, WrapDecision};

use crate::config::CANONICAL_SEED;

/// The seed a layer should vary with, or `None` when it must stay canonical.
#[inline]
pub(crate) fn varying_seed(seed: Option<u32>) -> Option<u32> {
    seed.filter(|s| *s != CANONICAL_SEED)
}
