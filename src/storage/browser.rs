use web_sys::Storage;

use super::SeedStore;
use crate::config::VariationConfig;
use crate::error::{Result, VariationError};
use crate::layers::popup::PopupSessionState;

/// `localStorage` / `sessionStorage` backed store.
#[derive(Debug, Clone)]
pub struct BrowserStore {
    seed_key: String,
    popup_key: String,
}

impl BrowserStore {
    pub fn new(config: &VariationConfig) -> Self {
        Self {
            seed_key: config.seed_storage_key(),
            popup_key: config.popup_storage_key(),
        }
    }

    fn local(&self) -> Result<Storage> {
        let window = web_sys::window().ok_or_else(|| VariationError::Storage("No window".into()))?;
        window
            .local_storage()
            .map_err(|_| VariationError::Storage("localStorage not available".into()))?
            .ok_or_else(|| VariationError::Storage("localStorage is null".into()))
    }

    fn session(&self) -> Result<Storage> {
        let window = web_sys::window().ok_or_else(|| VariationError::Storage("No window".into()))?;
        window
            .session_storage()
            .map_err(|_| VariationError::Storage("sessionStorage not available".into()))?
            .ok_or_else(|| VariationError::Storage("sessionStorage is null".into()))
    }
}

impl SeedStore for BrowserStore {
    fn load_seed(&self) -> Option<String> {
        let storage = match self.local() {
            Ok(storage) => storage,
            Err(e) => {
                log::debug!("Seed storage unavailable: {}", e);
                return None;
            }
        };
        match storage.get_item(&self.seed_key) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("⚠️ Failed to read stored seed: {:?}", e);
                None
            }
        }
    }

    fn save_seed(&self, seed: u32) -> Result<()> {
        self.local()?
            .set_item(&self.seed_key, &seed.to_string())
            .map_err(|_| VariationError::Storage("Failed to save seed".into()))?;
        log::debug!("💾 Saved seed {}", seed);
        Ok(())
    }

    fn clear_seed(&self) -> Result<()> {
        self.local()?
            .remove_item(&self.seed_key)
            .map_err(|_| VariationError::Storage("Failed to clear seed".into()))
    }

    fn load_popup_session(&self) -> PopupSessionState {
        let json = match self.session().map(|s| s.get_item(&self.popup_key)) {
            Ok(Ok(Some(json))) => json,
            Ok(Ok(None)) => return PopupSessionState::new(),
            Ok(Err(e)) => {
                log::warn!("⚠️ Failed to read popup session: {:?}", e);
                return PopupSessionState::new();
            }
            Err(e) => {
                log::debug!("Session storage unavailable: {}", e);
                return PopupSessionState::new();
            }
        };
        PopupSessionState::from_json(&json).unwrap_or_else(|e| {
            log::warn!("⚠️ Discarding unreadable popup session: {}", e);
            PopupSessionState::new()
        })
    }

    fn save_popup_session(&self, state: &PopupSessionState) -> Result<()> {
        let json = state.to_json()?;
        self.session()?
            .set_item(&self.popup_key, &json)
            .map_err(|_| VariationError::Storage("Failed to save popup session".into()))
    }
}
