use clap::{Args, Parser, Subcommand};
use habitpush::config::{self, AppConfig, DispatchConfig, Urgency, VapidSettings};
use habitpush::error::ConfigError;
use std::net::SocketAddr;
use std::time::Duration;

pub(crate) async fn run() -> i32 {
    let cli = Cli::parse();
    if let Some(Command::Init(args)) = cli.command {
        return run_init(args);
    }

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return 2;
        }
    };

    match cli.command {
        Some(Command::Dispatch) => run_dispatch(&config).await,
        _ => match habitpush::serve(config).await {
            Ok(()) => 0,
            Err(err) => {
                tracing::error!(error = %err, "server error");
                1
            }
        },
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "habitpush",
    version,
    about = "Web Push reminders for habits and evening briefings"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[arg(long, env = "HABITPUSH_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
    #[arg(long, env = "VAPID_PRIVATE_KEY")]
    vapid_private_key: Option<String>,
    #[arg(long, env = "VAPID_PUBLIC_KEY")]
    vapid_public_key: Option<String>,
    #[arg(long, env = "VAPID_SUBJECT")]
    vapid_subject: Option<String>,
    #[arg(long, env = "HABITPUSH_DISPATCH_TOKEN")]
    dispatch_token: Option<String>,
    #[arg(long, env = "HABITPUSH_CONCURRENCY", default_value_t = config::DEFAULT_CONCURRENCY)]
    concurrency: usize,
    #[arg(long, env = "HABITPUSH_DEFAULT_TIMEZONE", default_value = config::DEFAULT_TIMEZONE)]
    default_timezone: String,
    #[arg(long, env = "HABITPUSH_PUSH_TTL")]
    push_ttl: Option<String>,
    /// Urgency header sent with every push: very-low, low, normal or high.
    #[arg(long, env = "HABITPUSH_PUSH_URGENCY")]
    push_urgency: Option<String>,
    /// Run a dispatch pass on this period while serving, e.g. `5m`.
    #[arg(long, env = "HABITPUSH_INTERVAL")]
    interval: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (the default).
    Serve,
    /// Run one dispatch pass and print the summary as JSON.
    Dispatch,
    /// Generate a VAPID key pair.
    Init(InitArgs),
}

#[derive(Args, Debug)]
struct InitArgs {
    #[arg(long)]
    subject: Option<String>,
}

fn run_init(args: InitArgs) -> i32 {
    let credentials = match habitpush::generate_vapid_credentials() {
        Ok(credentials) => credentials,
        Err(err) => {
            eprintln!("failed to generate VAPID credentials: {err}");
            return 1;
        }
    };
    let (subject, show_subject_note) = match args.subject {
        Some(subject) => (subject, false),
        None => ("mailto:you@example.com".to_string(), true),
    };

    println!("VAPID credentials generated.");
    println!();
    println!("VAPID_PRIVATE_KEY=\"{}\"", credentials.private_key);
    println!("VAPID_PUBLIC_KEY=\"{}\"", credentials.public_key);
    println!("VAPID_SUBJECT=\"{subject}\"");
    if show_subject_note {
        println!();
        println!("Note: replace VAPID_SUBJECT with a contact URI you control.");
    }
    0
}

async fn run_dispatch(config: &AppConfig) -> i32 {
    match habitpush::dispatch_once(config).await {
        Ok(summary) => match serde_json::to_string_pretty(&summary) {
            Ok(json) => {
                println!("{json}");
                0
            }
            Err(err) => {
                eprintln!("failed to encode summary: {err}");
                1
            }
        },
        Err(err) => {
            tracing::error!(error = %err, "dispatch failed");
            eprintln!("error: {err}");
            1
        }
    }
}

fn resolve_config(cli: &Cli) -> Result<AppConfig, ConfigError> {
    if cli.concurrency == 0 {
        return Err(ConfigError::InvalidConcurrency);
    }
    let push_ttl = match cli.push_ttl.as_deref() {
        Some(raw) => parse_duration(raw)?,
        None => config::DEFAULT_PUSH_TTL,
    };
    let urgency = match cli.push_urgency.as_deref() {
        Some(raw) => raw.parse()?,
        None => Urgency::default(),
    };
    let interval = cli.interval.as_deref().map(parse_duration).transpose()?;

    Ok(AppConfig {
        bind: cli.bind,
        database_url: non_blank(&cli.database_url),
        vapid: VapidSettings {
            private_key: non_blank(&cli.vapid_private_key),
            public_key: non_blank(&cli.vapid_public_key),
            subject: non_blank(&cli.vapid_subject),
        },
        dispatch: DispatchConfig {
            concurrency: cli.concurrency,
            default_timezone: cli.default_timezone.trim().to_string(),
            push_ttl,
            urgency,
            ..DispatchConfig::default()
        },
        dispatch_token: non_blank(&cli.dispatch_token),
        interval,
    })
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    let value = raw.trim();
    let invalid = || ConfigError::InvalidDuration(value.to_string());
    if value.is_empty() {
        return Err(invalid());
    }

    let (amount, unit) = match value.chars().last() {
        Some(ch) if ch.is_ascii_alphabetic() => {
            (&value[..value.len() - 1], ch.to_ascii_lowercase())
        }
        _ => (value, 's'),
    };

    let amount: u64 = amount.parse().map_err(|_| invalid())?;
    if amount == 0 {
        return Err(invalid());
    }

    let seconds = match unit {
        's' => Some(amount),
        'm' => amount.checked_mul(60),
        'h' => amount.checked_mul(60 * 60),
        'd' => amount.checked_mul(24 * 60 * 60),
        _ => None,
    };
    seconds.map(Duration::from_secs).ok_or_else(invalid)
}
