use std::sync::Arc;

use crate::adapters::{HttpPushSender, PgStore, TokioTimeProvider};
use crate::config::AppConfig;
use crate::error::DispatchError;
use crate::push::{self, DispatchRunner, Dispatcher, VapidKeys};

#[derive(Clone)]
pub struct AppState<S = PgStore, P = HttpPushSender> {
    pub public_key: Option<String>,
    /// Bearer token for the service routes. They answer 503 while it is unset.
    pub dispatch_token: Option<String>,
    pub icon: String,
    pub badge: String,
    /// `None` when VAPID keys or the database are unavailable.
    pub push: Option<PushServices<S, P>>,
}

#[derive(Clone)]
pub struct PushServices<S, P> {
    pub store: S,
    pub sender: P,
    pub dispatcher: Arc<dyn DispatchRunner>,
}

impl<S, P> AppState<S, P> {
    pub fn new(config: &AppConfig, public_key: Option<String>, push: Option<PushServices<S, P>>) -> Self {
        Self {
            public_key,
            dispatch_token: config.dispatch_token.clone(),
            icon: config.dispatch.icon.clone(),
            badge: config.dispatch.badge.clone(),
            push,
        }
    }
}

impl AppState {
    /// Builds the production state. Problems with the push configuration are
    /// logged and leave the push routes answering 503 instead of stopping the
    /// server.
    pub async fn connect(config: &AppConfig) -> Self {
        let keys = match VapidKeys::from_settings(&config.vapid) {
            Ok(keys) => keys,
            Err(err) => {
                tracing::warn!(error = %err, "push notifications disabled");
                return Self::new(config, None, None);
            }
        };
        let public_key = Some(keys.public_key().to_string());

        match connect_push(config, keys).await {
            Ok(services) => Self::new(config, public_key, Some(services)),
            Err(err) => {
                tracing::warn!(error = %err, "push dispatch disabled");
                Self::new(config, public_key, None)
            }
        }
    }
}

async fn connect_push(
    config: &AppConfig,
    keys: VapidKeys,
) -> Result<PushServices<PgStore, HttpPushSender>, DispatchError> {
    let sender = push::live_sender(config, keys)?;
    let store = push::connect_store(config).await?;
    let dispatcher = Dispatcher::new(
        store.clone(),
        sender.clone(),
        TokioTimeProvider,
        &config.dispatch,
    )?;
    Ok(PushServices {
        store,
        sender,
        dispatcher: Arc::new(dispatcher),
    })
}
