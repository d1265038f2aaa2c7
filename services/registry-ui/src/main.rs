//! Registry UI API server.

use std::net::SocketAddr;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use eyre::WrapErr as _;
use registry_ui::{Config, Overrides, RegistryUiBuilder};
use tracing_subscriber::EnvFilter;

/// Serve a JSON API in front of a container registry.
#[derive(Debug, Parser)]
#[command(name = "registry-ui", version, about)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long, env = "REGISTRY_UI_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Base URL of the registry.
    #[arg(long, env = "REGISTRY_URL")]
    registry_url: Option<String>,

    /// Address to listen on.
    #[arg(long, env = "REGISTRY_UI_BIND")]
    bind: Option<SocketAddr>,

    /// Timeout for single registry calls, in seconds.
    #[arg(long, env = "REGISTRY_UI_TIMEOUT", value_parser = parse_seconds)]
    timeout: Option<Duration>,

    /// Timeout for registry calls made while aggregating, in seconds.
    #[arg(long, env = "REGISTRY_UI_AGGREGATE_TIMEOUT", value_parser = parse_seconds)]
    aggregate_timeout: Option<Duration>,

    /// Registry calls allowed in flight per aggregation request.
    #[arg(long, env = "REGISTRY_UI_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Allow cross-origin requests from any origin.
    #[arg(long, env = "REGISTRY_UI_CORS")]
    cors: Option<bool>,

    /// Emit logs as JSON.
    #[arg(long, env = "REGISTRY_UI_LOG_JSON")]
    log_json: Option<bool>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            registry_url: self.registry_url.clone(),
            bind: self.bind,
            timeout: self.timeout,
            aggregate_timeout: self.aggregate_timeout,
            concurrency: self.concurrency,
            cors: self.cors,
            log_json: self.log_json,
        }
    }
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value.parse().map_err(|error| format!("{error}"))?;
    Duration::try_from_secs_f64(seconds).map_err(|error| error.to_string())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = Args::parse();
    let config =
        Config::load(args.config.as_deref(), args.overrides()).wrap_err("loading configuration")?;

    init_tracing(config.log_json);
    tracing::info!(
        registry = %config.registry_url,
        bind = %config.bind,
        concurrency = config.concurrency,
        "starting registry UI"
    );

    let app = RegistryUiBuilder::new().config(config.clone()).build();

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .wrap_err_with(|| format!("binding {}", config.bind))?;

    tracing::info!("listening on http://{}", config.bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
