use crate::adapters::postgres::{self, PgStore};
use crate::adapters::{HttpPushSender, TokioTimeProvider};
use crate::config::AppConfig;
use crate::error::{ConfigError, DispatchError};
use crate::types::push::DispatchSummary;

pub(crate) mod delivery;
pub(crate) mod dispatcher;
pub mod jwt;
pub(crate) mod payload;
pub(crate) mod scheduler;
pub mod vapid;

pub(crate) use dispatcher::{DispatchRunner, Dispatcher, run_periodically};
pub use jwt::VapidSigner;
pub use vapid::{VapidCredentials, VapidKeys, generate_vapid_credentials};

/// Connects to the database named by `DATABASE_URL` and applies pending migrations.
pub(crate) async fn connect_store(config: &AppConfig) -> Result<PgStore, DispatchError> {
    let url = config
        .database_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or(ConfigError::Missing("DATABASE_URL"))?;
    let pool = postgres::create_pool(url).await?;
    postgres::run_migrations(&pool).await?;
    Ok(PgStore::new(pool))
}

pub(crate) fn live_sender(config: &AppConfig, keys: VapidKeys) -> Result<HttpPushSender, DispatchError> {
    let sender = HttpPushSender::new(
        VapidSigner::new(keys),
        config.dispatch.push_ttl,
        config.dispatch.request_timeout,
    )?;
    Ok(sender.with_urgency(config.dispatch.urgency))
}

/// One complete pass with production adapters. Configuration problems surface
/// before any connection is opened or any push is attempted.
pub async fn dispatch_once(config: &AppConfig) -> Result<DispatchSummary, DispatchError> {
    let keys = VapidKeys::from_settings(&config.vapid)?;
    let sender = live_sender(config, keys)?;
    let store = connect_store(config).await?;
    let dispatcher = Dispatcher::new(store, sender, TokioTimeProvider, &config.dispatch)?;
    dispatcher.run_once().await
}
