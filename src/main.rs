// src/main.rs
// Entrypoint: wires configuration, application state and background tasks,
// then serves the ingress HTTP surface. Grounded in the teacher's axum
// server bootstrap shape (tracing init, router construction, graceful
// shutdown on ctrl_c).

use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use pinokio_sentry::api::http::{create_ingress_router, healthz};
use pinokio_sentry::metrics::{init_metrics, metrics_handler};
use pinokio_sentry::state::AppState;
use pinokio_sentry::tasks::EngineTasks;
use pinokio_sentry::CONFIG;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&CONFIG.log_level)))
        .init();

    CONFIG.validate()?;
    init_metrics();

    let state = Arc::new(AppState::new(&CONFIG).await?);
    let tasks = EngineTasks::spawn(state.clone());

    let app = create_ingress_router(state.clone())
        .route("/healthz", axum::routing::get(healthz))
        .route("/metrics", axum::routing::get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&CONFIG.bind_address).await?;
    tracing::info!(address = %CONFIG.bind_address, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped, running shutdown sequence");
    tasks.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
