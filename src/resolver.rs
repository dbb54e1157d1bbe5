//! Seed resolution
//!
//! Turns one base seed into independent per-layer seeds. The local
//! derivation is always available and never blocks; when a resolve
//! endpoint is configured and every layer is on, the derivation is
//! confirmed remotely. Remote failures degrade to the local formula and
//! are reported through [`Resolution::Fallback`], never as an error.
//!
//! ## Caching
//!
//! Confirmed results are cached per `(base, flags)` for the lifetime of the
//! resolver. Concurrent `resolve` calls for the same key share one
//! in-flight future, so simultaneous consumers produce a single request.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use futures::future::{self, FutureExt, LocalBoxFuture, Shared};
use serde::{Deserialize, Serialize};

use crate::config::{clamp_seed_int, CANONICAL_SEED};
use crate::error::{Result, VariationError};
use crate::flags::{FlagSet, Layer};
use crate::network::{RemoteSeeds, ResolveRequest, SeedTransport};

/// Per-layer seeds derived from one base seed. `None` = layer disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedSeeds {
    pub base: u32,
    pub v1: Option<u32>,
    pub v2: Option<u32>,
    pub v3: Option<u32>,
    pub v4: Option<u32>,
}

impl ResolvedSeeds {
    /// Local deterministic derivation.
    ///
    /// The mixing constants are arbitrary; they only have to make the
    /// layers diverge from one another for the same base. A non-canonical
    /// base never maps onto `CANONICAL_SEED`, so every layer stays varied.
    pub fn derive_local(base: u32, flags: FlagSet) -> Self {
        let base = clamp_seed_int(base as i64);
        let derive = |layer: Layer| -> Option<u32> {
            if !flags.is_enabled(layer) {
                return None;
            }
            if base == CANONICAL_SEED {
                return Some(CANONICAL_SEED);
            }
            let b = base as u64;
            Some(match layer {
                Layer::V1 => ((b * 37 + 11) % 9 + 2) as u32,
                Layer::V2 => base,
                Layer::V3 => ((b * 71 + 3) % 99 + 2) as u32,
                Layer::V4 => ((b * 53 + 17) % 49 + 2) as u32,
            })
        };
        Self {
            base,
            v1: derive(Layer::V1),
            v2: derive(Layer::V2),
            v3: derive(Layer::V3),
            v4: derive(Layer::V4),
        }
    }

    /// Every layer on, every layer canonical.
    pub fn canonical() -> Self {
        Self::derive_local(CANONICAL_SEED, FlagSet::all())
    }

    /// Merge a remote answer. `v4` has no remote field and stays local.
    pub fn from_remote(remote: &RemoteSeeds, base: u32, flags: FlagSet) -> Result<Self> {
        if let Some(remote_base) = remote.base {
            if clamp_seed_int(remote_base) != base {
                return Err(VariationError::MalformedResponse(format!(
                    "resolve answered base {} for requested {}",
                    remote_base, base
                )));
            }
        }
        let local = Self::derive_local(base, flags);
        let accept = |layer: Layer, value: Option<i64>| -> Option<u32> {
            if flags.is_enabled(layer) {
                value.map(clamp_seed_int)
            } else {
                None
            }
        };
        Ok(Self {
            base,
            v1: accept(Layer::V1, remote.v1),
            v2: accept(Layer::V2, remote.v2),
            v3: accept(Layer::V3, remote.v3),
            v4: local.v4,
        })
    }

    pub fn seed_for(&self, layer: Layer) -> Option<u32> {
        match layer {
            Layer::V1 => self.v1,
            Layer::V2 => self.v2,
            Layer::V3 => self.v3,
            Layer::V4 => self.v4,
        }
    }

    /// Popups use v4 and fall back to v1 when v4 is off.
    pub fn popup_seed(&self) -> Option<u32> {
        self.v4.or(self.v1)
    }
}

/// Why a resolution did not come from the remote service.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    /// Base seed is canonical; nothing to confirm.
    Canonical,
    /// At least one layer is off, which skips the round trip.
    LayerDisabled(Layer),
    /// No resolve endpoint configured.
    NoTransport,
    /// The remote call failed.
    Remote(VariationError),
}

/// Outcome of [`SeedResolver::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Confirmed(ResolvedSeeds),
    Fallback {
        seeds: ResolvedSeeds,
        reason: FallbackReason,
    },
}

impl Resolution {
    pub fn seeds(&self) -> ResolvedSeeds {
        match self {
            Resolution::Confirmed(seeds) => *seeds,
            Resolution::Fallback { seeds, .. } => *seeds,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Resolution::Confirmed(_))
    }
}

/// Resolver statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    /// Remote requests actually issued
    pub remote_requests: u64,
    /// Calls that joined an in-flight request
    pub coalesced: u64,
    /// Calls answered from the confirmed cache
    pub cache_hits: u64,
    /// Remote failures answered locally
    pub remote_failures: u64,
}

type CacheKey = (u32, FlagSet);
type InFlight = Shared<LocalBoxFuture<'static, Resolution>>;

#[derive(Default)]
struct ResolverState {
    cache: HashMap<CacheKey, ResolvedSeeds>,
    in_flight: HashMap<CacheKey, InFlight>,
    stats: ResolverStats,
}

/// Per-tab seed resolver. Clones share the same cache.
#[derive(Clone)]
pub struct SeedResolver {
    flags: FlagSet,
    transport: Option<Rc<dyn SeedTransport>>,
    state: Rc<RefCell<ResolverState>>,
}

impl SeedResolver {
    /// Resolver with local derivation only.
    pub fn local(flags: FlagSet) -> Self {
        Self {
            flags,
            transport: None,
            state: Rc::new(RefCell::new(ResolverState::default())),
        }
    }

    /// Resolver that confirms through `transport`.
    pub fn with_transport(flags: FlagSet, transport: Rc<dyn SeedTransport>) -> Self {
        Self {
            transport: Some(transport),
            ..Self::local(flags)
        }
    }

    pub fn flags(&self) -> FlagSet {
        self.flags
    }

    pub fn set_flags(&mut self, flags: FlagSet) {
        self.flags = flags;
    }

    pub fn stats(&self) -> ResolverStats {
        self.state.borrow().stats
    }

    /// Cached confirmed seeds if present, otherwise the local derivation.
    pub fn resolve_sync(&self, base: u32) -> ResolvedSeeds {
        let base = clamp_seed_int(base as i64);
        let state = self.state.borrow();
        match state.cache.get(&(base, self.flags)) {
            Some(seeds) => *seeds,
            None => ResolvedSeeds::derive_local(base, self.flags),
        }
    }

    /// Resolve `base`, confirming remotely when policy allows.
    ///
    /// The in-flight entry is registered before this returns, so two calls
    /// made back to back share one request even if neither has been polled.
    pub fn resolve(&self, base: u32) -> LocalBoxFuture<'static, Resolution> {
        let base = clamp_seed_int(base as i64);
        let flags = self.flags;
        let local = ResolvedSeeds::derive_local(base, flags);

        if base == CANONICAL_SEED {
            return fallback(local, FallbackReason::Canonical);
        }
        if let Some(layer) = Layer::ALL.into_iter().find(|l| !flags.is_enabled(*l)) {
            return fallback(local, FallbackReason::LayerDisabled(layer));
        }
        let transport = match &self.transport {
            Some(transport) => Rc::clone(transport),
            None => return fallback(local, FallbackReason::NoTransport),
        };

        let key = (base, flags);
        let mut state = self.state.borrow_mut();
        if let Some(seeds) = state.cache.get(&key).copied() {
            state.stats.cache_hits += 1;
            return future::ready(Resolution::Confirmed(seeds)).boxed_local();
        }
        if let Some(pending) = state.in_flight.get(&key).cloned() {
            state.stats.coalesced += 1;
            log::debug!("Joining in-flight resolution for seed {}", base);
            return pending.boxed_local();
        }

        let shared_state = Rc::clone(&self.state);
        let request = ResolveRequest::new(base, flags);
        let pending: InFlight = async move {
            let outcome = transport
                .resolve(&request)
                .await
                .and_then(|remote| ResolvedSeeds::from_remote(&remote, base, flags));

            let mut state = shared_state.borrow_mut();
            state.in_flight.remove(&key);
            match outcome {
                Ok(seeds) => {
                    log::debug!("✅ Seed {} confirmed remotely: {:?}", base, seeds);
                    state.cache.insert(key, seeds);
                    Resolution::Confirmed(seeds)
                }
                Err(e) => {
                    log::warn!("⚠️ Seed resolution failed for {}, using local derivation: {}", base, e);
                    state.stats.remote_failures += 1;
                    Resolution::Fallback {
                        seeds: local,
                        reason: FallbackReason::Remote(e),
                    }
                }
            }
        }
        .boxed_local()
        .shared();

        state.in_flight.insert(key, pending.clone());
        state.stats.remote_requests += 1;
        pending.boxed_local()
    }
}

fn fallback(seeds: ResolvedSeeds, reason: FallbackReason) -> LocalBoxFuture<'static, Resolution> {
    future::ready(Resolution::Fallback { seeds, reason }).boxed_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::executor::block_on;
    use std::cell::Cell;

    struct MockTransport {
        calls: Cell<u32>,
        answer: Result<RemoteSeeds>,
    }

    impl MockTransport {
        fn ok(base: i64, v1: i64, v2: i64, v3: i64) -> Rc<Self> {
            Rc::new(Self {
                calls: Cell::new(0),
                answer: Ok(RemoteSeeds {
                    base: Some(base),
                    v1: Some(v1),
                    v2: Some(v2),
                    v3: Some(v3),
                }),
            })
        }

        fn failing() -> Rc<Self> {
            Rc::new(Self {
                calls: Cell::new(0),
                answer: Err(VariationError::Network("connection refused".into())),
            })
        }
    }

    #[async_trait(?Send)]
    impl SeedTransport for MockTransport {
        async fn resolve(&self, _request: &ResolveRequest) -> Result<RemoteSeeds> {
            self.calls.set(self.calls.get() + 1);
            self.answer.clone()
        }
    }

    #[test]
    fn test_local_formulas() {
        let seeds = ResolvedSeeds::derive_local(42, FlagSet::all());
        assert_eq!(seeds.base, 42);
        assert_eq!(seeds.v1, Some((42 * 37 + 11) % 9 + 2));
        assert_eq!(seeds.v2, Some(42));
        assert_eq!(seeds.v3, Some((42 * 71 + 3) % 99 + 2));
        assert_eq!(seeds.v4, Some((42 * 53 + 17) % 49 + 2));
    }

    #[test]
    fn test_varied_base_never_canonical() {
        for base in 2..=999u32 {
            let seeds = ResolvedSeeds::derive_local(base, FlagSet::all());
            for layer in Layer::ALL {
                let seed = seeds.seed_for(layer);
                assert!(seed.is_some());
                assert_ne!(seed, Some(CANONICAL_SEED), "base {} collapsed {}", base, layer);
            }
        }
    }

    #[test]
    fn test_layers_diverge() {
        let seeds = ResolvedSeeds::derive_local(42, FlagSet::all());
        assert_ne!(seeds.v1, seeds.v3);
        assert_ne!(seeds.v3, seeds.v2);
    }

    #[test]
    fn test_canonical_base() {
        let seeds = ResolvedSeeds::derive_local(1, FlagSet::all());
        assert_eq!(seeds, ResolvedSeeds::canonical());
        assert_eq!(seeds.v1, Some(CANONICAL_SEED));
        assert_eq!(seeds.v4, Some(CANONICAL_SEED));
    }

    #[test]
    fn test_disabled_layers_are_none() {
        let seeds = ResolvedSeeds::derive_local(42, FlagSet::only(&[Layer::V3]));
        assert_eq!(seeds.v1, None);
        assert_eq!(seeds.v2, None);
        assert!(seeds.v3.is_some());
        assert_eq!(seeds.v4, None);
        assert_eq!(seeds.popup_seed(), None);
    }

    #[test]
    fn test_resolve_sync_is_stable() {
        let resolver = SeedResolver::local(FlagSet::all());
        assert_eq!(resolver.resolve_sync(42), resolver.resolve_sync(42));
        assert_eq!(resolver.resolve_sync(5000).base, 999);
    }

    #[test]
    fn test_canonical_skips_remote() {
        let transport = MockTransport::ok(1, 1, 1, 1);
        let resolver = SeedResolver::with_transport(FlagSet::all(), transport.clone());
        let resolution = block_on(resolver.resolve(1));
        assert_eq!(
            resolution,
            Resolution::Fallback {
                seeds: ResolvedSeeds::canonical(),
                reason: FallbackReason::Canonical
            }
        );
        assert_eq!(transport.calls.get(), 0);
    }

    #[test]
    fn test_disabled_layer_skips_remote() {
        let transport = MockTransport::ok(42, 3, 42, 5);
        let flags = FlagSet::only(&[Layer::V1, Layer::V2, Layer::V3]);
        let resolver = SeedResolver::with_transport(flags, transport.clone());
        let resolution = block_on(resolver.resolve(42));
        assert!(matches!(
            resolution,
            Resolution::Fallback {
                reason: FallbackReason::LayerDisabled(Layer::V4),
                ..
            }
        ));
        assert_eq!(transport.calls.get(), 0);
    }

    #[test]
    fn test_confirmed_result_is_cached() {
        let transport = MockTransport::ok(42, 3, 42, 17);
        let resolver = SeedResolver::with_transport(FlagSet::all(), transport.clone());

        let first = block_on(resolver.resolve(42));
        assert!(first.is_confirmed());
        assert_eq!(first.seeds().v1, Some(3));
        assert_eq!(first.seeds().v3, Some(17));

        let second = block_on(resolver.resolve(42));
        assert_eq!(first, second);
        assert_eq!(transport.calls.get(), 1);
        assert_eq!(resolver.stats().cache_hits, 1);

        // resolve_sync now reads the confirmed value
        assert_eq!(resolver.resolve_sync(42).v3, Some(17));
    }

    #[test]
    fn test_failure_falls_back_to_local() {
        let transport = MockTransport::failing();
        let resolver = SeedResolver::with_transport(FlagSet::all(), transport.clone());
        let resolution = block_on(resolver.resolve(42));
        match &resolution {
            Resolution::Fallback {
                reason: FallbackReason::Remote(VariationError::Network(_)),
                ..
            } => {}
            other => panic!("unexpected resolution {:?}", other),
        }
        assert_eq!(resolution.seeds(), SeedResolver::local(FlagSet::all()).resolve_sync(42));
        assert_eq!(resolver.stats().remote_failures, 1);

        // failures are not cached, a later call retries
        block_on(resolver.resolve(42));
        assert_eq!(transport.calls.get(), 2);
    }

    #[test]
    fn test_concurrent_calls_coalesce() {
        let transport = MockTransport::ok(42, 3, 42, 17);
        let resolver = SeedResolver::with_transport(FlagSet::all(), transport.clone());

        let a = resolver.resolve(42);
        let b = resolver.resolve(42);
        let (ra, rb) = block_on(future::join(a, b));

        assert_eq!(ra, rb);
        assert_eq!(transport.calls.get(), 1);
        assert_eq!(resolver.stats().remote_requests, 1);
        assert_eq!(resolver.stats().coalesced, 1);
    }

    #[test]
    fn test_remote_base_mismatch_falls_back() {
        let transport = MockTransport::ok(7, 3, 7, 17);
        let resolver = SeedResolver::with_transport(FlagSet::all(), transport);
        let resolution = block_on(resolver.resolve(42));
        assert!(matches!(
            resolution,
            Resolution::Fallback {
                reason: FallbackReason::Remote(VariationError::MalformedResponse(_)),
                ..
            }
        ));
    }

    #[test]
    fn test_remote_values_are_clamped() {
        let remote = RemoteSeeds {
            base: Some(42),
            v1: Some(-4),
            v2: Some(10_000),
            v3: None,
        };
        let seeds = ResolvedSeeds::from_remote(&remote, 42, FlagSet::all()).unwrap();
        assert_eq!(seeds.v1, Some(1));
        assert_eq!(seeds.v2, Some(999));
        assert_eq!(seeds.v3, None);
        assert_eq!(seeds.v4, ResolvedSeeds::derive_local(42, FlagSet::all()).v4);
    }
}
