//! # Seed Variation
//!
//! A seed-driven variation engine for web front ends, compiled to
//! WebAssembly.
//!
//! One integer base seed in `[1, 999]` reproducibly perturbs a page across
//! four independent layers. Seed `1` always renders the unmodified page.
//!
//! ## Architecture
//!
//! ```text
//! URL ?seed= / localStorage
//!   ↓
//! VariationEngine ── SeedResolver ── (optional) /seeds/resolve
//!   ↓ RenderPass
//! V1 StructureLayer    wrappers, decoys, sibling order
//! V2 DataLayer         dataset sampling parameters
//! V3 AttributeTextLayer ids, classes, copy
//! V4 PopupLayer        one seeded overlay per session
//! ```
//!
//! Every layer is built on [`VariantSelector`], a pure
//! `(seed, key, count) -> index` function.

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::prelude::*;

pub mod config;
pub mod dom;
pub mod engine;
mod error;
pub mod flags;
pub mod layers;
pub mod markup;
pub mod network;
pub mod resolver;
pub mod scheduler;
pub mod selector;
pub mod storage;

pub use config::{clamp_seed, parse_seed, VariationConfig, CANONICAL_SEED, MAX_SEED, MIN_SEED};
pub use dom::BrowserPopupRenderer;
pub use engine::{EngineBuilder, RenderPass, UrlParams, VariationEngine};
pub use error::{ErrorCode, ErrorInfo, Result, VariationError};
pub use flags::{parse_layer_list, resolve_flags, FlagSet, Layer, RuntimeFlags};
pub use layers::{
    AttributeTextLayer, CandidateMap, DataLayer, DismissReason, Placement, PopupCatalog,
    PopupDefinition, PopupLayer, PopupRenderer, PopupSessionState, PopupState, PopupView,
    SampleRequest, SelectionMethod, StructureLayer, VariantCatalog, VariantKind,
};
pub use markup::{Element, Node};
pub use network::{
    DatasetClient, FetchTransport, NetworkConfig, RemoteSeeds, ResolveRequest, SeedTransport,
};
pub use resolver::{FallbackReason, Resolution, ResolvedSeeds, ResolverStats, SeedResolver};
pub use scheduler::{BrowserScheduler, DeferredTask, ManualScheduler, TaskScheduler};
pub use selector::VariantSelector;
pub use storage::{BrowserStore, MemoryStore, SeedStore};

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    // Already installed on re-init; keep the existing logger.
    let _ = console_log::init_with_level(log::Level::Info);
    log::info!("Seed variation module initialized");
}

fn js_error(err: VariationError) -> JsValue {
    serde_wasm_bindgen::to_value(&ErrorInfo::from(&err)).unwrap_or_else(|_| JsValue::from(err))
}

fn to_js<T: serde::Serialize>(value: &T) -> std::result::Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value)
        .map_err(|e| js_error(VariationError::Internal(format!("serialize: {}", e))))
}

#[derive(serde::Serialize)]
struct ResolutionSummary {
    seeds: ResolvedSeeds,
    confirmed: bool,
}

#[derive(serde::Serialize)]
struct SampleSummary {
    request: SampleRequest,
    url: Option<String>,
}

/// JavaScript handle to a [`VariationEngine`].
#[wasm_bindgen]
pub struct VariationClient {
    engine: Rc<RefCell<VariationEngine>>,
}

#[wasm_bindgen]
impl VariationClient {
    /// Create a client from an options object and an optional URL query.
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue, query: Option<String>) -> std::result::Result<VariationClient, JsValue> {
        let config = if options.is_undefined() || options.is_null() {
            VariationConfig::default()
        } else {
            serde_wasm_bindgen::from_value::<VariationConfig>(options)
                .map_err(|e| js_error(VariationError::Config(e.to_string())))?
        };

        let store = Rc::new(BrowserStore::new(&config));
        let mut builder = VariationEngine::builder(config).store(store);
        if let Some(query) = query {
            builder = builder.query(query);
        }
        if let Some(renderer) = BrowserPopupRenderer::detect() {
            builder = builder.renderer(Rc::new(renderer));
        }
        let engine = builder.build().map_err(js_error)?;

        Ok(VariationClient {
            engine: Rc::new(RefCell::new(engine)),
        })
    }

    /// Create a client reading `seed` / `enabled_layers` from `window.location`.
    #[wasm_bindgen(js_name = fromLocation)]
    pub fn from_location(options: JsValue) -> std::result::Result<VariationClient, JsValue> {
        let search = web_sys::window()
            .and_then(|w| w.location().search().ok())
            .unwrap_or_default();
        Self::new(options, Some(search))
    }

    #[wasm_bindgen(getter)]
    pub fn seed(&self) -> u32 {
        self.engine.borrow().base_seed()
    }

    #[wasm_bindgen(js_name = setSeed)]
    pub fn set_seed(&self, value: f64) -> u32 {
        self.engine.borrow_mut().set_seed(value)
    }

    pub fn shuffle(&self) -> u32 {
        self.engine.borrow_mut().shuffle()
    }

    /// Current per-layer seeds.
    pub fn seeds(&self) -> std::result::Result<JsValue, JsValue> {
        to_js(&self.engine.borrow().seeds())
    }

    /// Enabled layers as a tag list (`v1,v3`).
    pub fn layers(&self) -> String {
        self.engine.borrow().flags().to_tags()
    }

    /// Resolve the current seed. Resolves to `{ seeds, confirmed }`.
    pub fn resolve(&self) -> js_sys::Promise {
        let pending = self.engine.borrow().begin_refresh();
        let engine = Rc::clone(&self.engine);
        wasm_bindgen_futures::future_to_promise(async move {
            let resolution = pending.await;
            engine.borrow_mut().apply_resolution(&resolution);
            to_js(&ResolutionSummary {
                seeds: resolution.seeds(),
                confirmed: resolution.is_confirmed(),
            })
        })
    }

    #[wasm_bindgen(js_name = selectIndex)]
    pub fn select_index(seed: u32, key: &str, count: usize) -> usize {
        VariantSelector::select_index(seed, key, count)
    }

    #[wasm_bindgen(js_name = generateId)]
    pub fn generate_id(seed: u32, key: &str, prefix: Option<String>) -> String {
        VariantSelector::generate_id(seed, key, prefix.as_deref().unwrap_or(selector::DEFAULT_ID_PREFIX))
    }

    pub fn id(&self, key: &str, fallback: Option<String>) -> String {
        self.variant(VariantKind::Id, key, fallback)
    }

    #[wasm_bindgen(js_name = className)]
    pub fn class_name(&self, key: &str, fallback: Option<String>) -> String {
        self.variant(VariantKind::Class, key, fallback)
    }

    pub fn text(&self, key: &str, fallback: Option<String>) -> String {
        self.variant(VariantKind::Text, key, fallback)
    }

    #[wasm_bindgen(js_name = classList)]
    pub fn class_list(&self, base_class: &str, key: &str) -> String {
        let engine = self.engine.borrow();
        engine.render_pass().attributes().class_list(base_class, key)
    }

    /// Permutation of `[0, count)` for the list named `key`.
    pub fn reorder(&self, key: &str, count: usize) -> Vec<u32> {
        let engine = self.engine.borrow();
        engine
            .render_pass()
            .structure()
            .reorder(key, count)
            .into_iter()
            .map(|i| i as u32)
            .collect()
    }

    /// Apply the wrapper/decoy decision for `key` around trusted HTML.
    #[wasm_bindgen(js_name = wrapHtml)]
    pub fn wrap_html(&self, key: &str, inner_html: String) -> String {
        let engine = self.engine.borrow();
        engine
            .render_pass()
            .structure()
            .wrap(key, Node::raw(inner_html))
            .render()
    }

    /// Dataset request for `entity_type`. Resolves to `{ request, url }`.
    #[wasm_bindgen(js_name = sampleRequest)]
    pub fn sample_request(
        &self,
        entity_type: &str,
        limit: u32,
        method: &str,
    ) -> std::result::Result<JsValue, JsValue> {
        let method = SelectionMethod::parse(method).ok_or_else(|| {
            js_error(VariationError::Config(format!("unknown selection method {}", method)))
        })?;
        let engine = self.engine.borrow();
        let request = engine.sample_request(entity_type, limit, method);
        let url = engine
            .config()
            .dataset_endpoint
            .as_deref()
            .map(|endpoint| request.url(endpoint));
        to_js(&SampleSummary { request, url })
    }

    /// Schedule at most one popup for `page`. Returns the scheduled id.
    #[wasm_bindgen(js_name = mountPopups)]
    pub fn mount_popups(&self, page: &str) -> Option<String> {
        self.engine.borrow_mut().mount_popups(page, &BrowserScheduler)
    }

    #[wasm_bindgen(js_name = unmountPopups)]
    pub fn unmount_popups(&self) {
        self.engine.borrow_mut().unmount_popups();
    }

    #[wasm_bindgen(js_name = dismissPopup)]
    pub fn dismiss_popup(&self) -> bool {
        self.engine.borrow().dismiss_popup(DismissReason::Close)
    }

    pub fn stats(&self) -> std::result::Result<JsValue, JsValue> {
        to_js(&self.engine.borrow().resolver_stats())
    }
}

impl VariationClient {
    fn variant(&self, kind: VariantKind, key: &str, fallback: Option<String>) -> String {
        let engine = self.engine.borrow();
        engine
            .render_pass()
            .attributes()
            .variant(kind, key, fallback.as_deref())
    }
}
