use std::net::SocketAddr;
use std::time::Duration;

pub use crate::push::delivery::Urgency;

pub const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";
pub const DEFAULT_CONCURRENCY: usize = 16;
pub const DEFAULT_PUSH_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_ICON: &str = "/pwa-192.png";

#[derive(Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub database_url: Option<String>,
    pub vapid: VapidSettings,
    pub dispatch: DispatchConfig,
    pub dispatch_token: Option<String>,
    pub interval: Option<Duration>,
}

/// Raw VAPID values as supplied by the environment. Validated by
/// [`crate::push::vapid::VapidKeys::from_settings`].
#[derive(Debug, Clone, Default)]
pub struct VapidSettings {
    pub private_key: Option<String>,
    pub public_key: Option<String>,
    pub subject: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub concurrency: usize,
    pub default_timezone: String,
    pub push_ttl: Duration,
    pub urgency: Urgency,
    pub request_timeout: Duration,
    pub icon: String,
    pub badge: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            default_timezone: DEFAULT_TIMEZONE.to_string(),
            push_ttl: DEFAULT_PUSH_TTL,
            urgency: Urgency::default(),
            request_timeout: Duration::from_secs(10),
            icon: DEFAULT_ICON.to_string(),
            badge: DEFAULT_ICON.to_string(),
        }
    }
}

#[cfg(test)]
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database_url: None,
            vapid: VapidSettings::default(),
            dispatch: DispatchConfig::default(),
            dispatch_token: None,
            interval: None,
        }
    }
}
