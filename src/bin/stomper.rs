use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use stomper::dispatcher::{DispatcherConfig, RetryConfig};
use stomper::report::{self, OutputFormat, Reporter};
use stomper::{ReqwestHttpClient, Spray, SprayConfig};
use tokio_util::sync::CancellationToken;

/// Spray username/password combinations at a form login endpoint
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// File of usernames, one per line
    #[arg(short = 'u', long)]
    user_file: PathBuf,

    /// File of passwords, one per line
    #[arg(short = 'p', long)]
    pass_file: PathBuf,

    /// Login endpoint to POST to
    #[arg(short = 't', long)]
    target: String,

    /// Form field as key:value, where the value may use {USER} and {PASS} (repeatable)
    #[arg(short = 'f', long = "form-field", required = true)]
    form_fields: Vec<String>,

    /// Body text that marks a failed login
    #[arg(short = 'm', long)]
    failure_message: Option<String>,

    /// Status code that marks a failed login
    #[arg(short = 's', long)]
    failure_status: Option<u16>,

    /// Delay between consecutive request launches, in milliseconds
    #[arg(short = 'i', long)]
    interval: Option<u64>,

    /// Maximum requests in flight
    #[arg(short = 'c', long, default_value_t = 16)]
    concurrency: usize,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value_t = 10000)]
    timeout: u64,

    /// Retries per request on transport errors, 429 or 503
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Also print responses that match the failure signature
    #[arg(long)]
    show_failures: bool,

    /// Print one JSON record per line
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn into_config(self) -> SprayConfig {
        let mut config = SprayConfig::new(
            self.user_file,
            self.pass_file,
            self.target,
            self.form_fields,
        );
        config.failure_message = self.failure_message;
        config.failure_status = self.failure_status;
        config.interval_ms = self.interval;
        config.dispatcher = DispatcherConfig {
            concurrency: self.concurrency,
            timeout_ms: self.timeout,
            retry: RetryConfig {
                max_retries: self.retries,
                ..Default::default()
            },
            ..Default::default()
        };
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let reporter = Reporter::new(format, cli.show_failures);

    let spray = Spray::load(cli.into_config())
        .await
        .context("Failed to prepare spray")?;

    let placeholders = spray.placeholders();
    if !placeholders.user || !placeholders.pass {
        tracing::warn!(
            uses_user = placeholders.user,
            uses_pass = placeholders.pass,
            "Form fields do not reference both {{USER}} and {{PASS}}; requests will repeat values"
        );
    }
    if spray.config().signature().is_empty() {
        tracing::warn!("No failure message or status given; every response will be reported");
    }

    let http_client = Arc::new(ReqwestHttpClient::new().context("Failed to build HTTP client")?);

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping");
            signal_token.cancel();
        }
    });

    let stats = spray
        .run(http_client, shutdown_token, |outcome| {
            if let Some(line) = reporter.report(&outcome) {
                println!("{}", line);
            }
        })
        .await
        .context("Spray failed")?;

    report::log_summary(&stats, spray.total_jobs());
    Ok(())
}
