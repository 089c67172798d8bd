mod cli;

use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "habitpush=info,tower_http=info";

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let code = cli::run().await;
    if code != 0 {
        std::process::exit(code);
    }
}
