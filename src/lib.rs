mod adapters;
mod app;
pub mod config;
pub mod error;
mod ports;
pub mod push;
mod state;
mod types;

pub use push::{dispatch_once, generate_vapid_credentials};
pub use types::push::DispatchSummary;

use std::sync::Arc;

use adapters::TokioTimeProvider;

pub async fn serve(config: config::AppConfig) -> std::io::Result<()> {
    let state = state::AppState::connect(&config).await;
    if state.dispatch_token.is_none() {
        tracing::warn!("no dispatch token configured; service routes are disabled");
    }

    match (config.interval, state.push.as_ref()) {
        (Some(interval), Some(services)) => {
            tracing::info!(interval_secs = interval.as_secs(), "periodic dispatch enabled");
            tokio::spawn(push::run_periodically(
                Arc::clone(&services.dispatcher),
                TokioTimeProvider,
                interval,
            ));
        }
        (Some(_), None) => {
            tracing::warn!("periodic dispatch requested but push is not configured");
        }
        (None, _) => {}
    }

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!("listening on http://{}", config.bind);
    axum::serve(listener, app::app(state)).await
}
