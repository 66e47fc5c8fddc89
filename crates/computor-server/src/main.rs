//! Control-plane binary entry point: loads configuration, wires up the
//! Postgres pool and Redis client, builds [`AppState`], and serves the
//! combined HTTP/WebSocket router.

mod blob;
mod db;
mod executor;
mod middleware;
mod realtime;
mod routes;
mod state;
mod telemetry;

use computor_core::ComputorConfig;
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ComputorConfig::from_env();
    telemetry::init_tracing(&config);

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.postgres_url())
        .await?;

    let redis = redis::Client::open(config.redis_url())?;

    let state = AppState::new(&config, pool, redis);
    let app = routes::router(state)
        .layer(axum::middleware::from_fn(middleware::request_id_span))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!(address = %config.bind_address, "computor-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

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
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
