//! `fetch`-backed transport.

use async_trait::async_trait;
use futures::future::{self, Either};
use gloo_timers::future::TimeoutFuture;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestInit, RequestMode, Response};

use super::{NetworkConfig, RemoteSeeds, ResolveRequest, SeedTransport};
use crate::error::{Result, VariationError};

/// GET `url` and return the body text, failing on non-2xx or timeout.
pub(crate) async fn get_text(url: &str, timeout_ms: u32) -> Result<String> {
    let request_fut = Box::pin(fetch_text(url));
    let timeout_fut = Box::pin(TimeoutFuture::new(timeout_ms));

    match future::select(request_fut, timeout_fut).await {
        Either::Left((outcome, _)) => outcome,
        Either::Right(((), _)) => Err(VariationError::Timeout(timeout_ms)),
    }
}

async fn fetch_text(url: &str) -> Result<String> {
    let opts = RequestInit::new();
    opts.set_method("GET");
    opts.set_mode(RequestMode::Cors);

    let request = Request::new_with_str_and_init(url, &opts)
        .map_err(|e| VariationError::Network(format!("Request::new: {:?}", e)))?;
    request
        .headers()
        .set("Accept", "application/json")
        .map_err(|e| VariationError::Network(format!("set header: {:?}", e)))?;

    let window = web_sys::window()
        .ok_or_else(|| VariationError::DomUnavailable("no window for fetch".into()))?;
    let resp_value = JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(|e| VariationError::Network(format!("fetch: {:?}", e)))?;

    let resp: Response = resp_value
        .dyn_into()
        .map_err(|_| VariationError::Network("not a Response".into()))?;

    let text = JsFuture::from(
        resp.text()
            .map_err(|e| VariationError::Network(format!("text(): {:?}", e)))?,
    )
    .await
    .map_err(|e| VariationError::Network(format!("await text: {:?}", e)))?;

    let body = text
        .as_string()
        .ok_or_else(|| VariationError::MalformedResponse("response not a string".into()))?;

    if !resp.ok() {
        return Err(VariationError::HttpStatus {
            status: resp.status(),
            body,
        });
    }
    Ok(body)
}

/// Seed transport talking to the resolve endpoint through `fetch`.
pub struct FetchTransport {
    config: NetworkConfig,
}

impl FetchTransport {
    pub fn new(config: NetworkConfig) -> Self {
        log::info!("Creating FetchTransport for {}", config.endpoint);
        Self { config }
    }
}

#[async_trait(?Send)]
impl SeedTransport for FetchTransport {
    async fn resolve(&self, request: &ResolveRequest) -> Result<RemoteSeeds> {
        let url = self
            .config
            .build_url(ResolveRequest::PATH, &request.query_string());
        log::debug!("📡 Resolving seeds: {}", url);

        let body = get_text(&url, self.config.timeout_ms).await?;
        Ok(serde_json::from_str::<RemoteSeeds>(&body)?)
    }
}
