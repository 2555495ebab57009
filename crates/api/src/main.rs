use anyhow::Context;
use courseforge_api::app::{self, EngineParts};
use courseforge_infra::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    courseforge_observability::init();

    let config = EngineConfig::from_env().context("invalid configuration")?;
    let engine = EngineParts::from_config(&config).await?.assemble(&config);

    let worker = engine.worker.spawn();
    let app = app::build_app(engine.services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    worker.shutdown().await;
    served.context("http server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
