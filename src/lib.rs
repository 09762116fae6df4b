//! Core library for Verdict.  This module wires together request
//! validation, rate limiting, the completion provider and response shaping
//! behind a small axum router.
//!
//! A request to `POST /api/analyze` moves through a fixed sequence of
//! stages: rate limit, size check, body parse, validation, sanitize and
//! prompt, provider call, response parse. The first failing stage ends the
//! request with its own status code.

pub mod analysis;
mod config;
pub mod error;
pub mod metrics;
pub mod prompt;
pub mod provider;
pub mod rate_limit;
pub mod sanitize;
pub mod util;
pub mod validate;

pub use config::{AppConfig, Environment};

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use http_body_util::LengthLimitError;

use crate::analysis::{parse_completion, AnalysisResult, ConfidenceHeuristic, WeightedIndicators};
use crate::error::AnalyzeError;
use crate::metrics::Metrics;
use crate::prompt::build_messages;
use crate::provider::{CompletionProvider, CompletionRequest, GroqProvider};
use crate::rate_limit::RateLimiter;
use crate::sanitize::sanitize_input;
use crate::util::client_key;
use crate::validate::{ensure_min_length, validate_request};

/// Shared, cheaply clonable handler state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub limiter: RateLimiter,
    /// `None` when no credential is configured; requests then fail with
    /// [`AnalyzeError::MissingCredential`].
    pub provider: Option<Arc<dyn CompletionProvider>>,
    pub heuristic: Arc<dyn ConfidenceHeuristic>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// State with an in-memory limiter sized from `config` and the default
    /// confidence heuristic.
    pub fn new(config: AppConfig, provider: Option<Arc<dyn CompletionProvider>>) -> Self {
        let limiter = RateLimiter::in_memory(
            config.rate_limit_max,
            Duration::from_millis(config.rate_limit_window_ms),
        );
        Self {
            config: Arc::new(config),
            limiter,
            provider,
            heuristic: Arc::new(WeightedIndicators::default()),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_heuristic(mut self, heuristic: Arc<dyn ConfidenceHeuristic>) -> Self {
        self.heuristic = heuristic;
        self
    }
}

/// Build state from environment variables (see [`AppConfig::from_env`]).
/// A Groq provider is created only when a credential is present.
pub async fn build_state_from_env() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env()?;
    let provider: Option<Arc<dyn CompletionProvider>> = match config.api_key.as_deref() {
        Some(key) => {
            let groq = GroqProvider::new(key, &config.provider_url)
                .context("failed to build completion provider client")?;
            tracing::info!(endpoint = %groq.endpoint(), "completion provider configured");
            Some(Arc::new(groq))
        }
        None => {
            tracing::warn!("GROQ_API_KEY not set; analyze requests will fail until it is configured");
            None
        }
    };
    Ok(AppState::new(config, provider))
}

/// Build the Axum router and attach handlers.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/analyze", post(analyze_handler))
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Handler for `POST /api/analyze`.
///
/// The body is taken unbuffered so the rate limit and the declared
/// `Content-Length` are decided before any of it is read.
async fn analyze_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> axum::response::Response {
    state.metrics.record_request();
    let client = client_key(&headers);
    let start = Instant::now();

    match analyze(&state, &client, &headers, body).await {
        Ok(result) => {
            state.metrics.record_judgment(result.judgment);
            tracing::info!(
                judgment = result.judgment.as_str(),
                confidence = result.confidence_score,
                latency_ms = start.elapsed().as_millis() as u64,
                "analysis complete"
            );
            (StatusCode::OK, Json(result)).into_response()
        }
        Err(err) => {
            let status = err.status();
            state.metrics.record_error(status.as_u16());
            match &err {
                AnalyzeError::RateLimited => {
                    state.metrics.record_rate_limited();
                    tracing::warn!(client = %client, "rate limit exceeded");
                }
                AnalyzeError::PayloadTooLarge
                | AnalyzeError::InvalidJson
                | AnalyzeError::Validation(_) => {
                    tracing::debug!(client = %client, error = %err, "rejected request");
                }
                _ => {
                    tracing::warn!(status = status.as_u16(), error = %err, "analysis failed");
                }
            }
            err.to_response(state.config.environment.exposes_error_detail())
        }
    }
}

async fn analyze(
    state: &AppState,
    client: &str,
    headers: &HeaderMap,
    body: Body,
) -> Result<AnalysisResult, AnalyzeError> {
    if !state.limiter.check(client).await.is_allowed() {
        return Err(AnalyzeError::RateLimited);
    }

    let limit = state.config.max_request_bytes;
    ensure_content_length(headers, limit)?;
    let bytes = read_body(body, limit).await?;
    let value: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|_| AnalyzeError::InvalidJson)?;

    let request = validate_request(&value)?;
    let post = sanitize_input(request.post);
    ensure_min_length(&post)?;
    let messages = build_messages(&request.options, &post);

    let provider = state
        .provider
        .as_ref()
        .ok_or(AnalyzeError::MissingCredential)?;
    let call_start = Instant::now();
    let outcome = provider.complete(&CompletionRequest::new(messages)).await;
    state
        .metrics
        .observe_provider_latency(call_start.elapsed().as_millis() as u64);
    let raw = outcome?;

    Ok(parse_completion(&raw, state.heuristic.as_ref()))
}

/// Reject on the declared `Content-Length` alone, before looking at the body.
fn ensure_content_length(headers: &HeaderMap, limit: usize) -> Result<(), AnalyzeError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    match declared {
        Some(len) if len > limit as u64 => Err(AnalyzeError::PayloadTooLarge),
        _ => Ok(()),
    }
}

/// Buffer at most `limit` bytes. Bodies without a usable `Content-Length`
/// (chunked uploads) are cut off here.
async fn read_body(body: Body, limit: usize) -> Result<Bytes, AnalyzeError> {
    axum::body::to_bytes(body, limit).await.map_err(|err| {
        let inner = err.into_inner();
        if inner.downcast_ref::<LengthLimitError>().is_some() {
            AnalyzeError::PayloadTooLarge
        } else {
            tracing::debug!(error = %inner, "failed to buffer request body");
            AnalyzeError::InvalidJson
        }
    })
}

/// Simple health endpoint for container readiness / liveness checks.
async fn healthz_handler(State(state): State<AppState>) -> axum::response::Response {
    let json = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "model": provider::MODEL,
        "providerConfigured": state.provider.is_some(),
    });
    (StatusCode::OK, Json(json)).into_response()
}

/// Prometheus-style metrics exposition.
async fn metrics_handler(State(state): State<AppState>) -> axum::response::Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
        .into_response()
}
