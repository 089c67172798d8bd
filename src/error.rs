/// Problems with the process configuration. Any of these aborts a dispatch run
/// before a single delivery is attempted.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not configured")]
    Missing(&'static str),

    #[error("{name} is not valid base64url")]
    InvalidEncoding { name: &'static str },

    #[error("VAPID private key is not a P-256 scalar or PKCS#8 document")]
    InvalidPrivateKey,

    #[error("VAPID public key is not an uncompressed P-256 point")]
    InvalidPublicKey,

    #[error("VAPID public key does not belong to the private key")]
    KeyMismatch,

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("invalid duration '{0}'; expected <number>[s|m|h|d]")]
    InvalidDuration(String),

    #[error("concurrency must be greater than 0")]
    InvalidConcurrency,

    #[error("invalid urgency '{0}'; expected very-low, low, normal or high")]
    InvalidUrgency(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("endpoint '{0}' has no usable origin")]
    InvalidAudience(String),

    #[error("malformed DER signature: {0}")]
    MalformedSignature(&'static str),

    #[error("failed to serialize token: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to encrypt payload: {0}")]
    Encrypt(#[from] web_push::WebPushError),

    #[error("encrypted payload missing")]
    Empty,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid row: {0}")]
    InvalidRow(String),
}

/// Failures that end a whole dispatch run.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to list subscribers: {0}")]
    Subscribers(#[source] StoreError),

    #[error("database unavailable: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to apply migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("worker pool closed")]
    WorkerPool(#[from] tokio::sync::AcquireError),
}

/// Reasons a single push request could not be built.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Payload(#[from] PayloadError),
}
