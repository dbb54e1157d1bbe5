//! Persistence for the base seed and the popup session record.
//!
//! The seed lives in `localStorage` so it survives a reload without the
//! URL parameter; the popup record lives in `sessionStorage` so it dies
//! with the tab. Both are behind [`SeedStore`] so the engine runs the same
//! way headless.

mod browser;

pub use browser::BrowserStore;

use std::cell::RefCell;

use crate::error::Result;
use crate::layers::popup::PopupSessionState;

/// Key-value persistence used by the engine.
pub trait SeedStore {
    /// Raw stored seed, unparsed. The caller validates it.
    fn load_seed(&self) -> Option<String>;
    fn save_seed(&self, seed: u32) -> Result<()>;
    fn clear_seed(&self) -> Result<()>;
    /// Popup record for this tab; an unreadable record counts as empty.
    fn load_popup_session(&self) -> PopupSessionState;
    fn save_popup_session(&self, state: &PopupSessionState) -> Result<()>;
}

/// In-process store for headless rendering and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    seed: RefCell<Option<String>>,
    popups: RefCell<PopupSessionState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a raw value, as if written by an earlier visit.
    pub fn with_seed(raw: impl Into<String>) -> Self {
        Self {
            seed: RefCell::new(Some(raw.into())),
            ..Self::default()
        }
    }
}

impl SeedStore for MemoryStore {
    fn load_seed(&self) -> Option<String> {
        self.seed.borrow().clone()
    }

    fn save_seed(&self, seed: u32) -> Result<()> {
        *self.seed.borrow_mut() = Some(seed.to_string());
        Ok(())
    }

    fn clear_seed(&self) -> Result<()> {
        self.seed.borrow_mut().take();
        Ok(())
    }

    fn load_popup_session(&self) -> PopupSessionState {
        self.popups.borrow().clone()
    }

    fn save_popup_session(&self, state: &PopupSessionState) -> Result<()> {
        *self.popups.borrow_mut() = state.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_seed() {
        let store = MemoryStore::new();
        assert_eq!(store.load_seed(), None);
        store.save_seed(42).unwrap();
        assert_eq!(store.load_seed().as_deref(), Some("42"));
        store.clear_seed().unwrap();
        assert_eq!(store.load_seed(), None);
    }

    #[test]
    fn test_memory_popups() {
        let store = MemoryStore::new();
        assert!(!store.load_popup_session().has_shown_any());
        let mut state = PopupSessionState::new();
        state.record_shown("newsletter");
        store.save_popup_session(&state).unwrap();
        assert!(store.load_popup_session().was_shown("newsletter"));
    }
}
