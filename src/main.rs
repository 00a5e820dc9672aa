use anyhow::Context;
use axum::routing::get;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use scribe_guard::{
    BreakerRegistry,
    config::Cfg,
    gateway::{self, AppState},
    upstream::UpstreamClient,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    // tracing enxuto
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("scribe_guard=info".parse()?)
                .add_directive("tower_http=warn".parse()?),
        )
        .with_target(false)
        .compact()
        .init();

    let prom_handle: PrometheusHandle = PrometheusBuilder::new()
        .install_recorder()
        .context("install recorder")?;

    // config/env
    let cfg = Arc::new(Cfg::from_env()?);
    info!("cfg: {:?}", cfg.redacted());

    // provedores
    let primary = UpstreamClient::new("primary", &cfg.upstream_primary, &cfg)?;
    let fallback = match &cfg.upstream_fallback {
        Some(url) => Some(UpstreamClient::new("fallback", url, &cfg)?),
        None => None,
    };

    // um circuit breaker por provedor
    let breakers = Arc::new(BreakerRegistry::new(cfg.breaker_options()));
    let state = AppState::new(primary, fallback, breakers);

    let prom_handle_route = prom_handle.clone();
    let app = gateway::router(state)
        .route(
            "/metrics",
            get(move || {
                let h = prom_handle_route.clone();
                async move { h.render() }
            }),
        )
        .layer(ConcurrencyLimitLayer::new(cfg.concurrency_limit))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!("listening on {}", addr);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
