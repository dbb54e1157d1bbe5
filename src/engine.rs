//! The facade apps talk to.
//!
//! One engine per tab. It owns the base seed, the effective flags, the
//! resolver and the popup session, and hands out [`RenderPass`] snapshots.
//! A render reads every layer through one snapshot, so a resolution that
//! lands halfway through cannot change siblings already rendered; the new
//! seeds take effect on the next pass.

use std::cell::RefCell;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use rand::Rng;
use url::form_urlencoded;

use crate::config::{clamp_seed, select_base_seed, VariationConfig, MAX_SEED, MIN_SEED};
use crate::error::Result;
use crate::flags::{resolve_flags, FlagSet, Layer};
use crate::layers::{
    AttributeTextLayer, DataLayer, DismissReason, PopupLayer, PopupRenderer, PopupSessionState,
    PopupState, SampleRequest, SelectionMethod, StructureLayer, VariantCatalog,
};
use crate::network::{DatasetClient, FetchTransport, NetworkConfig, SeedTransport};
use crate::resolver::{Resolution, ResolvedSeeds, ResolverStats, SeedResolver};
use crate::scheduler::TaskScheduler;
use crate::storage::{MemoryStore, SeedStore};

/// Seeds and catalogs frozen for one render.
#[derive(Debug, Clone, Copy)]
pub struct RenderPass<'a> {
    seeds: ResolvedSeeds,
    flags: FlagSet,
    catalog: &'a VariantCatalog,
    project_key: &'a str,
}

impl<'a> RenderPass<'a> {
    pub fn new(
        seeds: ResolvedSeeds,
        flags: FlagSet,
        catalog: &'a VariantCatalog,
        project_key: &'a str,
    ) -> Self {
        Self {
            seeds,
            flags,
            catalog,
            project_key,
        }
    }

    pub fn seeds(&self) -> ResolvedSeeds {
        self.seeds
    }

    pub fn structure(&self) -> StructureLayer {
        StructureLayer::new(self.seeds.v1)
    }

    pub fn data(&self) -> DataLayer {
        DataLayer::new(self.seeds.v2, self.project_key)
    }

    pub fn attributes(&self) -> AttributeTextLayer<'a> {
        AttributeTextLayer::new(self.seeds.v3, self.catalog)
    }

    /// `None` whenever V4 is off, even if v1 could stand in.
    pub fn popup_seed(&self) -> Option<u32> {
        if self.flags.is_enabled(Layer::V4) {
            self.seeds.popup_seed()
        } else {
            None
        }
    }
}

/// Collaborators an engine is built with.
pub struct EngineBuilder {
    config: VariationConfig,
    query: Option<String>,
    store: Option<Rc<dyn SeedStore>>,
    transport: Option<Rc<dyn SeedTransport>>,
    renderer: Option<Rc<dyn PopupRenderer>>,
}

impl EngineBuilder {
    /// Raw URL query (`seed=42&enabled_layers=v1,v3`), with or without `?`.
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn store(mut self, store: Rc<dyn SeedStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport(mut self, transport: Rc<dyn SeedTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn renderer(mut self, renderer: Rc<dyn PopupRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn build(self) -> Result<VariationEngine> {
        let EngineBuilder {
            config,
            query,
            store,
            transport,
            renderer,
        } = self;
        config.validate()?;

        let params = UrlParams::parse(query.as_deref().unwrap_or(""), &config);
        let flags = resolve_flags(params.layers.as_deref(), &config.runtime, config.build_flags);

        let store: Rc<dyn SeedStore> = store.unwrap_or_else(|| Rc::new(MemoryStore::new()));
        let stored = store.load_seed();
        let base = select_base_seed(params.seed.as_deref(), stored.as_deref(), config.default_seed);
        if stored.as_deref() != Some(base.to_string().as_str()) {
            if let Err(e) = store.save_seed(base) {
                log::warn!("⚠️ Could not persist seed {}: {}", base, e);
            }
        }

        let transport = transport.or_else(|| {
            config.resolve_endpoint.as_ref().map(|endpoint| {
                let network = NetworkConfig {
                    endpoint: endpoint.clone(),
                    timeout_ms: config.remote_timeout_ms,
                };
                Rc::new(FetchTransport::new(network)) as Rc<dyn SeedTransport>
            })
        });
        let resolver = match transport {
            Some(transport) => SeedResolver::with_transport(flags, transport),
            None => SeedResolver::local(flags),
        };

        let seeds = resolver.resolve_sync(base);
        let session = Rc::new(RefCell::new(store.load_popup_session()));

        log::info!(
            "🎲 Variation engine ready: seed {} layers [{}]",
            base,
            flags.to_tags()
        );

        Ok(VariationEngine {
            config,
            flags,
            base,
            seeds,
            resolver,
            store,
            session,
            renderer,
            popups: None,
        })
    }
}

/// Seed and layer parameters pulled from a URL query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlParams {
    pub seed: Option<String>,
    pub layers: Option<String>,
}

impl UrlParams {
    pub fn parse(query: &str, config: &VariationConfig) -> Self {
        let query = query.trim_start_matches('?');
        let mut params = UrlParams::default();
        for (name, value) in form_urlencoded::parse(query.as_bytes()) {
            if name == config.seed_param.as_str() {
                params.seed.get_or_insert_with(|| value.into_owned());
            } else if name == config.layers_param.as_str() {
                params.layers.get_or_insert_with(|| value.into_owned());
            }
        }
        params
    }
}

/// Per-tab variation context.
pub struct VariationEngine {
    config: VariationConfig,
    flags: FlagSet,
    base: u32,
    seeds: ResolvedSeeds,
    resolver: SeedResolver,
    store: Rc<dyn SeedStore>,
    session: Rc<RefCell<PopupSessionState>>,
    renderer: Option<Rc<dyn PopupRenderer>>,
    popups: Option<PopupLayer>,
}

impl VariationEngine {
    pub fn builder(config: VariationConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            query: None,
            store: None,
            transport: None,
            renderer: None,
        }
    }

    /// Engine with in-memory storage and no popup renderer.
    pub fn headless(config: VariationConfig, query: &str) -> Result<Self> {
        Self::builder(config).query(query).build()
    }

    pub fn config(&self) -> &VariationConfig {
        &self.config
    }

    pub fn flags(&self) -> FlagSet {
        self.flags
    }

    pub fn base_seed(&self) -> u32 {
        self.base
    }

    /// Seeds the next render will use.
    pub fn seeds(&self) -> ResolvedSeeds {
        self.seeds
    }

    pub fn resolver_stats(&self) -> ResolverStats {
        self.resolver.stats()
    }

    pub fn render_pass(&self) -> RenderPass<'_> {
        RenderPass::new(
            self.seeds,
            self.flags,
            &self.config.variants,
            &self.config.project_key,
        )
    }

    /// Change the base seed. Input is clamped; the new seed is persisted
    /// and the local derivation applies immediately.
    pub fn set_seed(&mut self, value: f64) -> u32 {
        let base = clamp_seed(value);
        if base == self.base {
            return base;
        }
        log::info!("🎲 Seed changed: {} → {}", self.base, base);
        self.base = base;
        if let Err(e) = self.store.save_seed(base) {
            log::warn!("⚠️ Could not persist seed {}: {}", base, e);
        }
        self.seeds = self.resolver.resolve_sync(base);
        self.unmount_popups();
        base
    }

    /// Jump to a random non-canonical seed different from the current one.
    pub fn shuffle(&mut self) -> u32 {
        let mut rng = rand::thread_rng();
        let mut next = rng.gen_range(MIN_SEED + 1..=MAX_SEED);
        while next == self.base {
            next = rng.gen_range(MIN_SEED + 1..=MAX_SEED);
        }
        self.set_seed(next as f64)
    }

    /// Start resolving the current seed. The future does not borrow the
    /// engine; hand its output to [`apply_resolution`](Self::apply_resolution).
    pub fn begin_refresh(&self) -> LocalBoxFuture<'static, Resolution> {
        self.resolver.resolve(self.base)
    }

    /// Adopt a resolution if it still matches the current seed and flags.
    pub fn apply_resolution(&mut self, resolution: &Resolution) -> bool {
        let seeds = resolution.seeds();
        let matches_flags = Layer::ALL
            .into_iter()
            .all(|layer| seeds.seed_for(layer).is_some() == self.flags.is_enabled(layer));
        if seeds.base != self.base || !matches_flags {
            log::debug!("Dropping stale resolution for seed {}", seeds.base);
            return false;
        }
        if seeds != self.seeds {
            log::debug!("Applying resolved seeds {:?}", seeds);
            self.seeds = seeds;
        }
        true
    }

    /// Resolve the current seed and apply the result.
    pub async fn refresh(&mut self) -> Resolution {
        let resolution = self.begin_refresh().await;
        self.apply_resolution(&resolution);
        resolution
    }

    pub fn sample_request(&self, entity_type: &str, limit: u32, method: SelectionMethod) -> SampleRequest {
        self.render_pass()
            .data()
            .build_sample_request(entity_type, limit, method)
    }

    /// Client for the dataset endpoint, if one is configured.
    pub fn dataset_client(&self) -> Option<DatasetClient> {
        self.config.dataset_endpoint.as_ref().map(|endpoint| {
            DatasetClient::new(NetworkConfig {
                endpoint: endpoint.clone(),
                timeout_ms: self.config.remote_timeout_ms,
            })
        })
    }

    /// Mount popups for `page`. Tears down whatever the previous page left.
    pub fn mount_popups(&mut self, page: &str, scheduler: &dyn TaskScheduler) -> Option<String> {
        self.unmount_popups();
        let store = Rc::clone(&self.store);
        let layer = PopupLayer::new(
            self.render_pass().popup_seed(),
            self.config.popups.clone(),
            Rc::clone(&self.session),
            self.renderer.clone(),
        )
        .with_observer(move |state| {
            if let Err(e) = store.save_popup_session(state) {
                log::warn!("⚠️ Could not persist popup session: {}", e);
            }
        });
        let scheduled = layer.mount(page, scheduler);
        self.popups = Some(layer);
        scheduled
    }

    pub fn unmount_popups(&mut self) {
        if let Some(layer) = self.popups.take() {
            layer.unmount();
        }
    }

    pub fn dismiss_popup(&self, reason: DismissReason) -> bool {
        self.popups
            .as_ref()
            .map(|layer| layer.dismiss(reason))
            .unwrap_or(false)
    }

    pub fn popup_state(&self, id: &str) -> PopupState {
        match &self.popups {
            Some(layer) => layer.state(id),
            None if self.session.borrow().is_dismissed(id) => PopupState::Dismissed,
            None => PopupState::Idle,
        }
    }

    pub fn active_popup(&self) -> Option<String> {
        self.popups.as_ref().and_then(PopupLayer::active)
    }

    pub fn popup_session(&self) -> PopupSessionState {
        self.session.borrow().clone()
    }
}

impl Drop for VariationEngine {
    fn drop(&mut self) {
        self.unmount_popups();
    }
}
