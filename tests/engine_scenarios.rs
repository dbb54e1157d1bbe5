//! End-to-end rendering scenarios run natively against the engine.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;
use futures::executor::block_on;
use seed_variation::{
    CandidateMap, DismissReason, Element, FallbackReason, FlagSet, Layer, ManualScheduler,
    MemoryStore, Node, PopupRenderer, PopupView, RemoteSeeds, RenderPass, Resolution,
    ResolveRequest, ResolvedSeeds, Result, SeedResolver, SeedStore, SeedTransport,
    VariantCatalog, VariationConfig, VariationEngine, VariationError, CANONICAL_SEED,
};

const NAV: [&str; 5] = ["Home", "Shop", "Deals", "Help", "Account"];

fn catalog() -> VariantCatalog {
    VariantCatalog {
        ids: CandidateMap::from_pairs([
            ("search-input", vec!["search-input", "query-field", "q-box", "find-input", "lookup"]),
            ("search-button", vec!["search-button", "go-btn", "submit-query", "find-btn", "seek"]),
            ("cart-link", vec!["cart-link", "basket-link", "bag-link", "trolley", "my-cart"]),
        ]),
        classes: CandidateMap::from_pairs([
            ("header", vec!["header", "top-bar", "masthead", "site-head", "banner"]),
            ("nav", vec!["nav", "menu", "navigation", "links", "site-nav"]),
        ]),
        texts: CandidateMap::from_pairs([
            ("search-label", vec!["Search", "Find", "Look up", "Go", "Explore"]),
            ("cart-label", vec!["Cart", "Basket", "Bag", "Trolley", "My items"]),
            ("welcome", vec!["Welcome", "Hello", "Hi there", "Good to see you", "Hey"]),
        ]),
    }
}

fn config() -> VariationConfig {
    VariationConfig {
        variants: catalog(),
        ..VariationConfig::default()
    }
}

/// A small page header rendered through one pass.
fn render_header(pass: &RenderPass<'_>) -> String {
    let attrs = pass.attributes();
    let structure = pass.structure();

    let search = Element::new("form")
        .child(
            Element::new("input")
                .attr("id", attrs.id("search-input"))
                .attr("placeholder", attrs.text_or("search-label", "Search")),
        )
        .child(
            Element::new("button")
                .attr("id", attrs.id("search-button"))
                .text(attrs.text_or("search-label", "Search")),
        );

    let items: Vec<Node> = NAV
        .iter()
        .map(|label| Element::new("li").text(*label).into())
        .collect();
    let mut nav = Element::new("ul").attr("class", attrs.class_list("site", "nav"));
    for item in structure.apply_order("nav-items", items) {
        nav = nav.child(item);
    }

    Node::from(
        Element::new("header")
            .attr("class", attrs.class_list("site", "header"))
            .child(Element::new("h1").text(attrs.text_or("welcome", "Welcome")))
            .child(structure.wrap("search", search.into()))
            .child(nav)
            .child(
                Element::new("a")
                    .attr("id", attrs.id("cart-link"))
                    .text(attrs.text_or("cart-label", "Cart")),
            ),
    )
    .render()
}

fn canonical_header() -> String {
    let catalog = catalog();
    render_header(&RenderPass::new(
        ResolvedSeeds::canonical(),
        FlagSet::all(),
        &catalog,
        "default",
    ))
}

/// Same page with every V3 value replaced by its key, to compare skeletons.
fn structure_only(pass: &RenderPass<'_>) -> String {
    let empty = VariantCatalog::default();
    render_header(&RenderPass::new(
        ResolvedSeeds { v3: None, ..pass.seeds() },
        FlagSet::all(),
        &empty,
        "default",
    ))
}

#[test]
fn test_canonical_seed_renders_unmodified_page() {
    let engine = VariationEngine::headless(config(), "seed=1").unwrap();
    let html = render_header(&engine.render_pass());
    assert_eq!(html, canonical_header());
    assert!(!html.contains("data-variant-decoy"));
    assert!(!html.contains("data-variant-wrapper"));
    assert!(html.contains(r#"<input id="search-input" placeholder="Search">"#));
    assert!(html.contains("<li>Home</li><li>Shop</li><li>Deals</li><li>Help</li><li>Account</li>"));
}

#[test]
fn test_only_text_layer_keeps_structure() {
    let engine = VariationEngine::headless(config(), "seed=42&enabled_layers=v3").unwrap();
    let pass = engine.render_pass();
    assert_eq!(engine.flags(), FlagSet::only(&[Layer::V3]));

    let canonical = VariationEngine::headless(config(), "seed=1").unwrap();
    assert_eq!(structure_only(&pass), structure_only(&canonical.render_pass()));
    assert_ne!(render_header(&pass), canonical_header());

    let attrs = pass.attributes();
    let varied = ["search-input", "search-button", "cart-link"]
        .iter()
        .any(|key| attrs.id(key) != *key);
    let varied_text = ["search-label", "cart-label", "welcome"]
        .iter()
        .any(|key| attrs.text(key) != catalog().texts.get(key).unwrap()[0]);
    assert!(varied || varied_text);
}

struct FailingTransport {
    calls: Cell<u32>,
}

#[async_trait(?Send)]
impl SeedTransport for FailingTransport {
    async fn resolve(&self, _request: &ResolveRequest) -> Result<RemoteSeeds> {
        self.calls.set(self.calls.get() + 1);
        Err(VariationError::Network("connection refused".into()))
    }
}

#[test]
fn test_remote_failure_matches_local_derivation() {
    let transport = Rc::new(FailingTransport { calls: Cell::new(0) });
    let mut remote = VariationEngine::builder(config())
        .query("seed=42")
        .transport(transport.clone())
        .build()
        .unwrap();
    let mut local = VariationEngine::headless(config(), "seed=42").unwrap();

    let failed = block_on(remote.refresh());
    let offline = block_on(local.refresh());

    assert!(matches!(
        failed,
        Resolution::Fallback { reason: FallbackReason::Remote(_), .. }
    ));
    assert!(matches!(
        offline,
        Resolution::Fallback { reason: FallbackReason::NoTransport, .. }
    ));
    assert_eq!(failed.seeds(), offline.seeds());
    assert_eq!(remote.seeds(), local.seeds());
    assert_eq!(transport.calls.get(), 1);
}

struct CountingTransport {
    calls: Cell<u32>,
}

#[async_trait(?Send)]
impl SeedTransport for CountingTransport {
    async fn resolve(&self, request: &ResolveRequest) -> Result<RemoteSeeds> {
        self.calls.set(self.calls.get() + 1);
        Ok(RemoteSeeds {
            base: Some(request.seed as i64),
            v1: Some(4),
            v2: Some(request.seed as i64),
            v3: Some(12),
        })
    }
}

#[test]
fn test_concurrent_resolves_share_one_request() {
    let transport = Rc::new(CountingTransport { calls: Cell::new(0) });
    let resolver = SeedResolver::with_transport(FlagSet::all(), transport.clone());

    let first = resolver.resolve(42);
    let second = resolver.resolve(42);
    let (a, b) = block_on(futures::future::join(first, second));

    assert_eq!(transport.calls.get(), 1);
    assert_eq!(a, b);
    assert!(a.is_confirmed());
    assert_eq!(resolver.stats().coalesced, 1);

    // Later calls are answered from the cache.
    let again = block_on(resolver.resolve(42));
    assert_eq!(again, a);
    assert_eq!(transport.calls.get(), 1);
}

#[test]
fn test_reorder_stable_across_renders() {
    let engine = VariationEngine::headless(config(), "seed=7").unwrap();
    assert_ne!(engine.seeds().v1, Some(CANONICAL_SEED));
    let first = engine.render_pass().structure().reorder("nav-items", 5);
    let second = engine.render_pass().structure().reorder("nav-items", 5);
    assert_eq!(first, second);
    assert_ne!(first, vec![0, 1, 2, 3, 4]);

    let again = VariationEngine::headless(config(), "seed=7").unwrap();
    assert_eq!(render_header(&engine.render_pass()), render_header(&again.render_pass()));
}

#[test]
fn test_structure_layer_changes_every_varied_page() {
    let canonical = canonical_header();
    for base in 2..=999u32 {
        let engine =
            VariationEngine::headless(config(), &format!("seed={}&enabled_layers=v1", base)).unwrap();
        let pass = engine.render_pass();
        assert_ne!(
            pass.structure().reorder("nav-items", NAV.len()),
            (0..NAV.len()).collect::<Vec<_>>(),
            "seed {} kept the canonical order",
            base
        );
        assert_ne!(render_header(&pass), canonical, "seed {} rendered the canonical page", base);
    }
}

#[test]
fn test_seed_survives_reload_through_store() {
    let store = Rc::new(MemoryStore::new());
    {
        let mut engine = VariationEngine::builder(config())
            .store(store.clone())
            .build()
            .unwrap();
        engine.set_seed(314.0);
    }
    let reloaded = VariationEngine::builder(config())
        .store(store.clone())
        .build()
        .unwrap();
    assert_eq!(reloaded.base_seed(), 314);
    assert_eq!(store.load_seed().as_deref(), Some("314"));
}

#[derive(Default)]
struct RecordingRenderer {
    shown: RefCell<Vec<PopupView>>,
}

impl PopupRenderer for RecordingRenderer {
    fn show(&self, view: &PopupView, _on_dismiss: Rc<dyn Fn(DismissReason)>) -> Result<()> {
        self.shown.borrow_mut().push(view.clone());
        Ok(())
    }

    fn hide(&self, _id: &str) {}
}

#[test]
fn test_one_popup_per_session_across_pages() {
    let mut always = config();
    let mut defs = always.popups.definitions().to_vec();
    for def in defs.iter_mut() {
        def.probability = 1.0;
    }
    always.popups = seed_variation::PopupCatalog::new(defs).unwrap();

    let mut shown_total = 0;
    for session in 0..100u32 {
        let seed = 2 + (session * 13) % 997;
        let store = Rc::new(MemoryStore::new());
        let renderer = Rc::new(RecordingRenderer::default());
        let scheduler = ManualScheduler::new();

        for page in ["home", "listing", "detail", "cart"] {
            let mut engine = VariationEngine::builder(always.clone())
                .query(format!("seed={}", seed))
                .store(store.clone())
                .renderer(renderer.clone())
                .build()
                .unwrap();
            engine.mount_popups(page, &scheduler);
            scheduler.advance(60_000);
            engine.dismiss_popup(DismissReason::Close);
        }

        let shown = renderer.shown.borrow().len();
        assert!(shown <= 1, "session {} showed {} popups", session, shown);
        shown_total += shown;
        if shown == 1 {
            assert!(store.load_popup_session().has_shown_any());
        }
    }
    assert!(shown_total > 0);
}
