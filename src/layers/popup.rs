//! Popup layer (V4).
//!
//! Each definition moves through `Idle → Scheduled → Shown → Dismissed`.
//! At most one definition reaches `Shown` per tab session, and `Dismissed`
//! is sticky for the session. Which popup is tried first, whether its
//! probability gate passes, its delay, placement and copy are all derived
//! from the seed, so a given seed always produces the same overlay at the
//! same moment.
//!
//! Timers go through a [`TaskScheduler`]; the pending handle is dropped on
//! unmount so nothing fires after the page that scheduled it is gone.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use super::varying_seed;
use crate::error::{Result, VariationError};
use crate::scheduler::{DeferredTask, TaskScheduler};
use crate::selector::VariantSelector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Placement {
    Center,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    TopBanner,
    BottomBanner,
}

impl Placement {
    pub fn as_str(self) -> &'static str {
        match self {
            Placement::Center => "center",
            Placement::TopLeft => "top-left",
            Placement::TopRight => "top-right",
            Placement::BottomLeft => "bottom-left",
            Placement::BottomRight => "bottom-right",
            Placement::TopBanner => "top-banner",
            Placement::BottomBanner => "bottom-banner",
        }
    }
}

/// One overlay the layer may schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopupDefinition {
    pub id: String,
    /// Chance in `[0, 1]` that the popup is scheduled at all.
    pub probability: f64,
    /// `[min, max]` delay after mount, in milliseconds.
    pub delay_range_ms: (u32, u32),
    #[serde(default)]
    pub placements: Vec<Placement>,
    /// Copy variants per field (`title`, `body`, `cta`, ...).
    #[serde(default)]
    pub text_variants: BTreeMap<String, Vec<String>>,
}

impl PopupDefinition {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(VariationError::InvalidCatalog("popup id must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(VariationError::InvalidCatalog(format!(
                "popup {}: probability {} outside [0, 1]",
                self.id, self.probability
            )));
        }
        let (min, max) = self.delay_range_ms;
        if min > max {
            return Err(VariationError::InvalidCatalog(format!(
                "popup {}: delay range [{}, {}] is inverted",
                self.id, min, max
            )));
        }
        Ok(())
    }

    /// Seeded delay within `delay_range_ms`.
    pub fn delay_ms(&self, seed: u32) -> u32 {
        let (min, max) = self.delay_range_ms;
        let span = max.saturating_sub(min) as usize + 1;
        min + VariantSelector::select_index(seed, &format!("{}-delay", self.id), span) as u32
    }

    /// Whether the seeded probability gate lets this popup through.
    pub fn passes_gate(&self, seed: u32) -> bool {
        VariantSelector::roll(seed, &format!("{}-gate", self.id)) < self.probability
    }
}

/// Ordered popup definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PopupCatalog {
    definitions: Vec<PopupDefinition>,
}

impl PopupCatalog {
    /// Validated catalog from `definitions`.
    pub fn new(definitions: Vec<PopupDefinition>) -> Result<Self> {
        let catalog = Self { definitions };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: PopupCatalog = serde_json::from_str(json)
            .map_err(|e| VariationError::InvalidCatalog(format!("popup catalog: {}", e)))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// The built-in catalog shared by the storefront apps.
    pub fn standard() -> Self {
        fn texts(fields: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
            fields
                .iter()
                .map(|(field, values)| {
                    (field.to_string(), values.iter().map(|v| v.to_string()).collect())
                })
                .collect()
        }

        Self {
            definitions: vec![
                PopupDefinition {
                    id: "newsletter".into(),
                    probability: 0.5,
                    delay_range_ms: (3_000, 9_000),
                    placements: vec![Placement::Center, Placement::BottomRight, Placement::BottomBanner],
                    text_variants: texts(&[
                        ("title", &["Stay in the loop", "Get our newsletter", "Don't miss a thing"]),
                        ("body", &[
                            "Weekly picks straight to your inbox.",
                            "New arrivals and offers, once a week.",
                            "Be the first to hear about what's new.",
                        ]),
                        ("cta", &["Subscribe", "Sign me up", "Join now"]),
                        ("dismiss", &["No thanks", "Maybe later", "Close"]),
                    ]),
                },
                PopupDefinition {
                    id: "discount".into(),
                    probability: 0.35,
                    delay_range_ms: (5_000, 15_000),
                    placements: vec![Placement::Center, Placement::TopRight, Placement::BottomLeft],
                    text_variants: texts(&[
                        ("title", &["10% off your first order", "A little welcome gift", "Save on your first visit"]),
                        ("body", &[
                            "Use the code at checkout.",
                            "Apply it before you pay.",
                            "Valid for today only.",
                        ]),
                        ("cta", &["Claim offer", "Get my code", "Show me"]),
                        ("dismiss", &["No thanks", "Not now", "Close"]),
                    ]),
                },
                PopupDefinition {
                    id: "survey".into(),
                    probability: 0.25,
                    delay_range_ms: (10_000, 25_000),
                    placements: vec![Placement::BottomRight, Placement::BottomLeft],
                    text_variants: texts(&[
                        ("title", &["Quick question", "Help us improve", "Got a minute?"]),
                        ("body", &[
                            "How easy was it to find what you needed?",
                            "Tell us how we're doing.",
                            "One question, ten seconds.",
                        ]),
                        ("cta", &["Answer", "Take survey", "Sure"]),
                        ("dismiss", &["Skip", "Not now", "Close"]),
                    ]),
                },
                PopupDefinition {
                    id: "cookie-notice".into(),
                    probability: 0.6,
                    delay_range_ms: (500, 2_500),
                    placements: vec![Placement::BottomBanner, Placement::TopBanner],
                    text_variants: texts(&[
                        ("title", &["We use cookies", "Cookies on this site", "About cookies"]),
                        ("body", &[
                            "Cookies keep the site working and help us improve it.",
                            "We use cookies to remember your preferences.",
                            "Some cookies are needed for the site to work.",
                        ]),
                        ("cta", &["Accept", "OK", "Got it"]),
                        ("dismiss", &["Decline", "Reject", "Only necessary"]),
                    ]),
                },
        ],
        }
    }

    pub fn definitions(&self) -> &[PopupDefinition] {
        &self.definitions
    }

    pub fn get(&self, id: &str) -> Option<&PopupDefinition> {
        self.definitions.iter().find(|d| d.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Drop definitions that fail validation, keeping the first of any duplicate id.
    fn into_valid(self) -> Self {
        let mut ids = HashSet::new();
        let definitions = self
            .definitions
            .into_iter()
            .filter(|def| match def.validate() {
                Ok(()) if ids.insert(def.id.clone()) => true,
                Ok(()) => {
                    log::warn!("⚠️ Duplicate popup id {}, skipping", def.id);
                    false
                }
                Err(e) => {
                    log::warn!("⚠️ Skipping popup: {}", e);
                    false
                }
            })
            .collect();
        Self { definitions }
    }

    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for def in &self.definitions {
            def.validate()?;
            if !ids.insert(def.id.as_str()) {
                return Err(VariationError::InvalidCatalog(format!(
                    "duplicate popup id {}",
                    def.id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PopupState {
    Idle,
    Scheduled,
    Shown,
    Dismissed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DismissReason {
    Close,
    Escape,
    Navigation,
}

/// Per-tab record of popups shown and dismissed. Only ever grows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopupSessionState {
    shown: BTreeSet<String>,
    dismissed: BTreeSet<String>,
}

impl PopupSessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_shown_any(&self) -> bool {
        !self.shown.is_empty()
    }

    pub fn was_shown(&self, id: &str) -> bool {
        self.shown.contains(id)
    }

    pub fn is_dismissed(&self, id: &str) -> bool {
        self.dismissed.contains(id)
    }

    pub fn shown(&self) -> impl Iterator<Item = &str> {
        self.shown.iter().map(String::as_str)
    }

    pub fn record_shown(&mut self, id: &str) {
        self.shown.insert(id.to_string());
    }

    pub fn record_dismissed(&mut self, id: &str) {
        self.dismissed.insert(id.to_string());
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| VariationError::Storage(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| VariationError::Storage(e.to_string()))
    }
}

/// Concrete placement and copy for one popup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupView {
    pub id: String,
    pub placement: Placement,
    pub texts: BTreeMap<String, String>,
}

impl PopupView {
    pub fn build(def: &PopupDefinition, seed: u32) -> Self {
        let placement = VariantSelector::pick(seed, &format!("{}-placement", def.id), &def.placements)
            .copied()
            .unwrap_or(Placement::Center);
        let texts = def
            .text_variants
            .iter()
            .map(|(field, variants)| {
                let key = format!("{}-{}", def.id, field);
                let value = VariantSelector::pick(seed, &key, variants)
                    .cloned()
                    .unwrap_or_default();
                (field.clone(), value)
            })
            .collect();
        Self {
            id: def.id.clone(),
            placement,
            texts,
        }
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.texts.get(field).map(String::as_str)
    }
}

/// Puts a popup on screen.
///
/// `show` returning [`VariationError::DomUnavailable`] means there is no
/// render target; the layer treats that as a no-op.
pub trait PopupRenderer {
    fn show(&self, view: &PopupView, on_dismiss: Rc<dyn Fn(DismissReason)>) -> Result<()>;
    fn hide(&self, id: &str);
}

type SessionObserver = Rc<dyn Fn(&PopupSessionState)>;

struct PopupMachine {
    seed: Option<u32>,
    catalog: PopupCatalog,
    session: Rc<RefCell<PopupSessionState>>,
    renderer: Option<Rc<dyn PopupRenderer>>,
    observer: Option<SessionObserver>,
    states: BTreeMap<String, PopupState>,
    active: Option<String>,
    pending: Option<DeferredTask>,
}

/// V4 bound to a seed, a catalog and the tab's session record.
#[derive(Clone)]
pub struct PopupLayer {
    inner: Rc<RefCell<PopupMachine>>,
}

impl PopupLayer {
    pub fn new(
        seed: Option<u32>,
        catalog: PopupCatalog,
        session: Rc<RefCell<PopupSessionState>>,
        renderer: Option<Rc<dyn PopupRenderer>>,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(PopupMachine {
                seed,
                catalog: catalog.into_valid(),
                session,
                renderer,
                observer: None,
                states: BTreeMap::new(),
                active: None,
                pending: None,
            })),
        }
    }

    /// Called with the session record whenever it changes (for persistence).
    pub fn with_observer(self, observer: impl Fn(&PopupSessionState) + 'static) -> Self {
        self.inner.borrow_mut().observer = Some(Rc::new(observer));
        self
    }

    pub fn state(&self, id: &str) -> PopupState {
        let machine = self.inner.borrow();
        if machine.session.borrow().is_dismissed(id) {
            return PopupState::Dismissed;
        }
        machine.states.get(id).copied().unwrap_or(PopupState::Idle)
    }

    /// Id of the scheduled or shown popup, if any.
    pub fn active(&self) -> Option<String> {
        self.inner.borrow().active.clone()
    }

    /// Page mount: pick and schedule at most one popup. Returns its id.
    pub fn mount(&self, page: &str, scheduler: &dyn TaskScheduler) -> Option<String> {
        let (id, delay) = {
            let mut machine = self.inner.borrow_mut();
            if machine.active.is_some() {
                return None;
            }
            let seed = varying_seed(machine.seed)?;
            if machine.renderer.is_none() {
                log::debug!("No popup render target, skipping popups");
                return None;
            }
            let chosen = {
                let session = machine.session.borrow();
                if session.has_shown_any() {
                    return None;
                }
                let eligible: Vec<&PopupDefinition> = machine
                    .catalog
                    .definitions()
                    .iter()
                    .filter(|d| !session.is_dismissed(&d.id) && !session.was_shown(&d.id))
                    .collect();
                if eligible.is_empty() {
                    return None;
                }
                let n = eligible.len();
                let start = VariantSelector::select_index(seed, &format!("popup-start-{}", page), n);
                (0..n)
                    .map(|offset| eligible[(start + offset) % n])
                    .find(|def| def.passes_gate(seed))
                    .map(|def| (def.id.clone(), def.delay_ms(seed)))
            };
            let (id, delay) = chosen?;
            machine.states.insert(id.clone(), PopupState::Scheduled);
            machine.active = Some(id.clone());
            (id, delay)
        };

        log::debug!("Popup {} scheduled in {}ms", id, delay);
        let weak: Weak<RefCell<PopupMachine>> = Rc::downgrade(&self.inner);
        let fire_id = id.clone();
        let handle = scheduler.defer(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    PopupLayer { inner }.fire(&fire_id);
                }
            }),
        );
        self.inner.borrow_mut().pending = Some(handle);
        Some(id)
    }

    fn fire(&self, id: &str) {
        let (view, renderer) = {
            let mut machine = self.inner.borrow_mut();
            // The timer has fired; dropping the handle is a no-op now.
            drop(machine.pending.take());

            if machine.active.as_deref() != Some(id)
                || machine.states.get(id) != Some(&PopupState::Scheduled)
            {
                return;
            }
            let already_shown = machine.session.borrow().has_shown_any();
            let seed = varying_seed(machine.seed);
            let def = machine.catalog.get(id).cloned();
            let (Some(seed), Some(def), Some(renderer), false) =
                (seed, def, machine.renderer.clone(), already_shown)
            else {
                machine.states.insert(id.to_string(), PopupState::Idle);
                machine.active = None;
                return;
            };
            machine.states.insert(id.to_string(), PopupState::Shown);
            (PopupView::build(&def, seed), renderer)
        };

        let weak = Rc::downgrade(&self.inner);
        let on_dismiss: Rc<dyn Fn(DismissReason)> = Rc::new(move |reason| {
            if let Some(inner) = weak.upgrade() {
                PopupLayer { inner }.dismiss(reason);
            }
        });

        match renderer.show(&view, on_dismiss) {
            Ok(()) => {
                log::info!("Showing popup {} ({})", view.id, view.placement.as_str());
                let session = Rc::clone(&self.inner.borrow().session);
                session.borrow_mut().record_shown(id);
                self.notify();
            }
            Err(e) => {
                if e.is_headless() {
                    log::debug!("Popup {} not shown: {}", id, e);
                } else {
                    log::warn!("⚠️ Popup {} failed to render: {}", id, e);
                }
                let mut machine = self.inner.borrow_mut();
                if machine.states.get(id) == Some(&PopupState::Shown) {
                    machine.states.insert(id.to_string(), PopupState::Idle);
                    machine.active = None;
                }
            }
        }
    }

    /// Close the shown popup. Returns `false` if nothing was on screen.
    pub fn dismiss(&self, reason: DismissReason) -> bool {
        let (id, renderer) = {
            let mut machine = self.inner.borrow_mut();
            let Some(id) = machine.active.clone() else {
                return false;
            };
            if machine.states.get(&id) != Some(&PopupState::Shown) {
                return false;
            }
            machine.states.insert(id.clone(), PopupState::Dismissed);
            machine.session.borrow_mut().record_dismissed(&id);
            machine.active = None;
            (id, machine.renderer.clone())
        };
        log::debug!("Popup {} dismissed ({:?})", id, reason);
        if let Some(renderer) = renderer {
            renderer.hide(&id);
        }
        self.notify();
        true
    }

    /// Page teardown: cancel the pending timer and close anything shown.
    pub fn unmount(&self) {
        let scheduled = {
            let mut machine = self.inner.borrow_mut();
            if let Some(handle) = machine.pending.take() {
                handle.cancel();
            }
            match machine.active.clone() {
                Some(id) if machine.states.get(&id) == Some(&PopupState::Scheduled) => {
                    machine.states.insert(id.clone(), PopupState::Idle);
                    machine.active = None;
                    Some(id)
                }
                _ => None,
            }
        };
        if let Some(id) = scheduled {
            log::debug!("Cancelled pending popup {}", id);
        }
        self.dismiss(DismissReason::Navigation);
    }

    fn notify(&self) {
        let (observer, session) = {
            let machine = self.inner.borrow();
            (machine.observer.clone(), Rc::clone(&machine.session))
        };
        if let Some(observer) = observer {
            observer(&session.borrow());
        }
    }
}
