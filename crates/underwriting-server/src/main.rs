use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use underwriting_core::{artifacts::provision, config::Config, pipeline::AppCore};
use underwriting_server::{app, log_filter, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // tracing
    tracing_subscriber::registry()
        .with(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // metrics
    let prom = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install prometheus recorder")?;

    let cfg = Config::from_env();
    cfg.validate()?;

    // 训练是 CPU 密集型：放到 blocking 线程池
    let provision_cfg = cfg.clone();
    let models = tokio::task::spawn_blocking(move || provision(&provision_cfg))
        .await
        .context("model provisioning task panicked")??;

    let addr = cfg.bind_addr;
    let core = Arc::new(AppCore::new(cfg, models)?);
    let state = AppState { core, prom };

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!("underwriting-server listening on http://{addr}");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("underwriting-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(err = %e, "ctrl_c handler failed");
    }
}
