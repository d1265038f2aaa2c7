//! # Registry UI API
//!
//! A JSON API in front of a container registry. Single-resource endpoints pass
//! registry calls through; aggregation endpoints fan out across repositories and
//! tags and fold the results into summaries and statistics.
//!
//! ## Endpoints
//!
//! - `GET /` service identity
//! - `GET /api/health` registry reachability
//! - `GET /api/v2/_catalog`, `GET /api/v2/{repository}/tags/list`,
//!   `GET /api/v2/{repository}/manifests/{reference}` passthrough
//! - `DELETE /api/v2/{repository}/manifests/{digest}` manifest deletion
//! - `GET /api/repositories`, `GET /api/repository/{repository}` tag details per repository
//! - `GET /api/statistics` registry-wide totals, histograms and rankings
//!
//! ## Example
//!
//! ```no_run
//! use registry_ui::{Config, RegistryUiBuilder};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let app = RegistryUiBuilder::new().config(config.clone()).build();
//!
//! let listener = tokio::net::TcpListener::bind(config.bind).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

use axum::Router;
use axum::http::{HeaderValue, header};
use axum::routing::get;
use registry_client::RegistryClient;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

mod aggregate;
mod api;
mod config;
mod error;
mod resolve;
mod statistics;

pub use aggregate::{
    DEFAULT_CONCURRENCY, Fanout, RegistrySummary, RepositoryScan, RepositorySummary, TagEntry,
    last_updated, summarize_registry, summarize_repository,
};
pub use config::{Config, ConfigError, DEFAULT_REGISTRY_URL, Overrides};
pub use error::{ApiError, ApiResult};
pub use resolve::{TagDetails, UNKNOWN, resolve_tag};
pub use statistics::{RepositoryRanking, StatisticsSnapshot, TOP_N, compute_statistics};

/// Builder for the registry UI router.
#[derive(Debug, Default)]
pub struct RegistryUiBuilder {
    config: Config,
    client: Option<RegistryClient>,
    aggregate_client: Option<RegistryClient>,
}

impl RegistryUiBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use this client for single registry calls instead of one built from the configuration.
    pub fn client(mut self, client: RegistryClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Use this client for aggregation instead of one built from the configuration.
    pub fn aggregate_client(mut self, client: RegistryClient) -> Self {
        self.aggregate_client = Some(client);
        self
    }

    /// Build the API router.
    ///
    /// Returns a Router that can be served with any tower-compatible server
    pub fn build(self) -> Router {
        let config = self.config;
        let client = self.client.unwrap_or_else(|| {
            RegistryClient::new(config.registry_url.clone(), config.timeout)
        });
        let aggregate = self.aggregate_client.unwrap_or_else(|| {
            RegistryClient::new(config.registry_url.clone(), config.aggregate_timeout)
        });

        let state = api::AppState {
            client,
            aggregate,
            registry_url: config.registry_url_display(),
            concurrency: config.concurrency,
        };

        let router = Router::new()
            .route("/", get(api::root))
            .route("/api/health", get(api::health))
            .route("/api/v2/_catalog", get(api::catalog))
            .route("/api/v2/{*path}", get(api::get_v2).delete(api::delete_v2))
            .route("/api/repositories", get(api::repositories))
            .route("/api/statistics", get(api::statistics))
            .route("/api/repository/{*repository}", get(api::repository))
            .with_state(state)
            .layer(SetResponseHeaderLayer::overriding(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-store"),
            ));

        let router = if config.cors {
            router.layer(CorsLayer::permissive())
        } else {
            router
        };

        router.layer(TraceLayer::new_for_http())
    }
}
