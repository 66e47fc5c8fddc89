//! Structured logging init, in the style of
//! `mockforge-observability::logging::init_logging`: an `EnvFilter` from
//! `RUST_LOG`, plain text in development, JSON when configured.

use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use computor_core::ComputorConfig;

pub fn init_tracing(config: &ComputorConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_env_filter(env_filter)
            .init();
    }

    tracing::info!(json = config.log_json, "tracing initialized");
}
