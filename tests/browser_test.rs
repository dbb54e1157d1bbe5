//! Browser integration tests
//!
//! Run with: wasm-pack test --headless --chrome
//! (or --firefox)

#![cfg(target_arch = "wasm32")]

use std::cell::Cell;
use std::rc::Rc;

use gloo_timers::future::TimeoutFuture;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_test::*;

use seed_variation::{
    BrowserPopupRenderer, BrowserScheduler, BrowserStore, DismissReason, Placement,
    PopupRenderer, PopupSessionState, PopupView, SeedStore, TaskScheduler, VariationClient,
    VariationConfig,
};

wasm_bindgen_test_configure!(run_in_browser);

fn document() -> web_sys::Document {
    web_sys::window().unwrap().document().unwrap()
}

fn test_config(app_key: &str) -> VariationConfig {
    VariationConfig {
        app_key: app_key.to_string(),
        ..VariationConfig::default()
    }
}

// ===== Init =====

#[wasm_bindgen_test]
fn init_is_repeatable() {
    seed_variation::init();
    seed_variation::init();
    assert_eq!(log::max_level(), log::LevelFilter::Info);
}

// ===== Storage =====

#[wasm_bindgen_test]
fn browser_store_seed_roundtrip() {
    let store = BrowserStore::new(&test_config("browser-test-seed"));
    store.clear_seed().unwrap();
    assert_eq!(store.load_seed(), None);

    store.save_seed(512).unwrap();
    assert_eq!(store.load_seed().as_deref(), Some("512"));

    let raw = web_sys::window()
        .unwrap()
        .local_storage()
        .unwrap()
        .unwrap()
        .get_item("browser-test-seed:seed")
        .unwrap();
    assert_eq!(raw.as_deref(), Some("512"));
    store.clear_seed().unwrap();
}

#[wasm_bindgen_test]
fn browser_store_popup_session() {
    let store = BrowserStore::new(&test_config("browser-test-popups"));
    let mut state = PopupSessionState::new();
    state.record_shown("survey");
    store.save_popup_session(&state).unwrap();
    assert!(store.load_popup_session().was_shown("survey"));
}

// ===== Popup rendering =====

fn view(id: &str) -> PopupView {
    PopupView {
        id: id.to_string(),
        placement: Placement::BottomRight,
        texts: [
            ("title".to_string(), "Quick question".to_string()),
            ("dismiss".to_string(), "Not now".to_string()),
        ]
        .into_iter()
        .collect(),
    }
}

#[wasm_bindgen_test]
fn renderer_shows_and_hides() {
    let renderer = BrowserPopupRenderer::detect().expect("document available");
    renderer
        .show(&view("render-test"), Rc::new(|_| {}))
        .unwrap();

    let el = document()
        .query_selector("[data-popup-id=\"render-test\"]")
        .unwrap()
        .expect("popup mounted");
    assert_eq!(el.get_attribute("role").as_deref(), Some("dialog"));
    assert!(el.class_name().contains("popup--bottom-right"));

    renderer.hide("render-test");
    assert!(document()
        .query_selector("[data-popup-id=\"render-test\"]")
        .unwrap()
        .is_none());
}

#[wasm_bindgen_test]
fn close_button_reports_dismiss() {
    let renderer = BrowserPopupRenderer::detect().unwrap();
    let closed = Rc::new(Cell::new(false));
    let flag = Rc::clone(&closed);
    renderer
        .show(
            &view("close-test"),
            Rc::new(move |reason| flag.set(reason == DismissReason::Close)),
        )
        .unwrap();

    let button: web_sys::HtmlElement = document()
        .query_selector("[data-popup-id=\"close-test\"] .popup__close")
        .unwrap()
        .unwrap()
        .dyn_into()
        .unwrap();
    button.click();
    assert!(closed.get());
    renderer.hide("close-test");
}

// ===== Scheduling =====

#[wasm_bindgen_test]
async fn browser_scheduler_runs_and_cancels() {
    let ran = Rc::new(Cell::new(false));
    let cancelled = Rc::new(Cell::new(false));

    let r = Rc::clone(&ran);
    let _kept = BrowserScheduler.defer(10, Box::new(move || r.set(true)));
    let c = Rc::clone(&cancelled);
    BrowserScheduler
        .defer(10, Box::new(move || c.set(true)))
        .cancel();

    TimeoutFuture::new(50).await;
    assert!(ran.get());
    assert!(!cancelled.get());
}

#[wasm_bindgen_test]
async fn browser_scheduler_cancel_releases_task() {
    let cancelled = Rc::new(Cell::new(false));
    let c = Rc::clone(&cancelled);
    let handle = BrowserScheduler.defer(10, Box::new(move || c.set(true)));
    assert_eq!(Rc::strong_count(&cancelled), 2);

    handle.cancel();
    assert_eq!(Rc::strong_count(&cancelled), 1);

    TimeoutFuture::new(50).await;
    assert!(!cancelled.get());
}

// ===== JS facade =====

#[wasm_bindgen_test]
fn client_reads_query_and_clamps() {
    let options = serde_wasm_bindgen::to_value(&test_config("browser-test-client")).unwrap();
    let client = VariationClient::new(options, Some("?seed=42".into())).unwrap();
    assert_eq!(client.seed(), 42);
    assert_eq!(client.set_seed(100_000.0), 999);
    assert_eq!(client.set_seed(f64::NAN), 1);
}

#[wasm_bindgen_test]
fn client_canonical_markup_is_untouched() {
    let client = VariationClient::new(JsValue::UNDEFINED, Some("seed=1".into())).unwrap();
    assert_eq!(client.wrap_html("hero", "<b>Hi</b>".into()), "<b>Hi</b>");
    assert_eq!(client.reorder("nav-items", 4), vec![0, 1, 2, 3]);
    assert_eq!(client.text("cta", Some("Buy".into())), "Buy");
}

#[wasm_bindgen_test]
async fn client_resolves_locally() {
    let client = VariationClient::new(JsValue::UNDEFINED, Some("seed=42".into())).unwrap();
    let result = wasm_bindgen_futures::JsFuture::from(client.resolve())
        .await
        .unwrap();
    let confirmed = js_sys::Reflect::get(&result, &"confirmed".into()).unwrap();
    assert_eq!(confirmed.as_bool(), Some(false));
}
