//! Rotas HTTP do gateway de IA
//! Cada provedor é chamado através do seu circuit breaker, com failover
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tracing::warn;

use crate::{
    BreakerError, BreakerRegistry, CircuitState, CircuitStats,
    breaker::saturating_millis,
    strategy::RouteStrategy,
    upstream::{UpstreamClient, UpstreamError},
};

/// Estado compartilhado pelos handlers
#[derive(Clone)]
pub struct AppState {
    primary: Arc<UpstreamClient>,
    fallback: Option<Arc<UpstreamClient>>,
    breakers: Arc<BreakerRegistry>,
    strategy: Arc<RouteStrategy>,
}

impl AppState {
    /// Registra um breaker por provedor para que `/breakers` os liste desde o início
    pub fn new(
        primary: UpstreamClient,
        fallback: Option<UpstreamClient>,
        breakers: Arc<BreakerRegistry>,
    ) -> Self {
        breakers.get_or_create(&primary.name);
        if let Some(fb) = &fallback {
            breakers.get_or_create(&fb.name);
        }
        Self {
            primary: Arc::new(primary),
            fallback: fallback.map(Arc::new),
            breakers,
            strategy: Arc::new(RouteStrategy::new()),
        }
    }

    /// Ordem de tentativa dos provedores, respeitando os breakers
    fn providers(&self) -> Vec<Arc<UpstreamClient>> {
        let Some(fallback) = &self.fallback else {
            return vec![Arc::clone(&self.primary)];
        };
        let a = self.breakers.get_or_create(&self.primary.name);
        let b = self.breakers.get_or_create(&fallback.name);
        if self.strategy.pick_a_first(&a, &b) {
            vec![Arc::clone(&self.primary), Arc::clone(fallback)]
        } else {
            vec![Arc::clone(fallback), Arc::clone(&self.primary)]
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BreakerView {
    name: String,
    state: CircuitState,
    failures: usize,
    successes: u32,
    last_failure_ms_ago: Option<u64>,
    last_success_ms_ago: Option<u64>,
    opened_ms_ago: Option<u64>,
}

impl BreakerView {
    fn new(name: String, s: CircuitStats) -> Self {
        let ago = |t: Option<tokio::time::Instant>| t.map(|t| saturating_millis(t.elapsed()));
        Self {
            name,
            state: s.state,
            failures: s.failures,
            successes: s.successes,
            last_failure_ms_ago: ago(s.last_failure),
            last_success_ms_ago: ago(s.last_success),
            opened_ms_ago: ago(s.opened_at),
        }
    }
}

/// Rotas do gateway (sem `/metrics` e sem camadas de middleware)
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/generate", post(generate))
        .route("/breakers", get(list_breakers))
        .route("/breakers/{name}/reset", post(reset_breaker))
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(|| async { "ready" }))
        .with_state(state)
}

async fn generate(State(st): State<AppState>, Json(body): Json<Value>) -> Response {
    let start = std::time::Instant::now();
    let mut failed: Option<UpstreamError> = None;
    let mut retry_after: Option<Duration> = None;

    for up in st.providers() {
        let breaker = st.breakers.get_or_create(&up.name);
        match breaker.execute(|| up.generate(&body)).await {
            Ok(result) => {
                metrics::histogram!("generate_latency_ms")
                    .record(start.elapsed().as_secs_f64() * 1000.0);
                metrics::counter!("generate_ok").increment(1);
                return Json(json!({ "provider": up.name, "result": result })).into_response();
            }
            Err(BreakerError::Open(e)) => {
                // circuito aberto: tenta o próximo sem esperar
                let wait = e.retry_after();
                retry_after = Some(retry_after.map_or(wait, |r| r.min(wait)));
            }
            Err(BreakerError::Operation(e)) => {
                warn!(provider = %up.name, "{e}");
                failed = Some(e);
            }
        }
    }

    metrics::histogram!("generate_latency_ms").record(start.elapsed().as_secs_f64() * 1000.0);

    match (failed, retry_after) {
        (Some(e), _) => {
            metrics::counter!("generate_err", "code" => "502").increment(1);
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
        (None, wait) => {
            metrics::counter!("generate_err", "code" => "503").increment(1);
            let secs = wait.unwrap_or_default().as_millis().div_ceil(1000).max(1);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, secs.to_string())],
                "all providers unavailable, circuit open",
            )
                .into_response()
        }
    }
}

async fn list_breakers(State(st): State<AppState>) -> Json<Vec<BreakerView>> {
    Json(
        st.breakers
            .snapshot()
            .into_iter()
            .map(|(name, stats)| BreakerView::new(name, stats))
            .collect(),
    )
}

async fn reset_breaker(State(st): State<AppState>, Path(name): Path<String>) -> StatusCode {
    if st.breakers.reset(&name) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
