//! HTTP handlers.

use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{SecondsFormat, Utc};
use registry_client::{RegistryClient, RegistryClientError, TagList};
use serde::Serialize;
use serde_json::{Value, json};

use crate::aggregate::{self, Fanout, RegistrySummary, RepositorySummary};
use crate::error::{ApiError, ApiResult};
use crate::statistics::{self, StatisticsSnapshot};

/// Shared state for every handler.
#[derive(Debug, Clone)]
pub(crate) struct AppState {
    /// Client for single registry calls.
    pub(crate) client: RegistryClient,

    /// Client for aggregation, with a longer timeout.
    pub(crate) aggregate: RegistryClient,

    /// Registry URL as shown to callers.
    pub(crate) registry_url: String,

    /// Registry calls allowed in flight per aggregation request.
    pub(crate) concurrency: usize,
}

impl AppState {
    fn fanout(&self) -> Fanout {
        Fanout::new(self.aggregate.clone(), self.concurrency)
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// A response body with the time it was produced.
#[derive(Debug, Serialize)]
pub(crate) struct Timestamped<T> {
    #[serde(flatten)]
    body: T,
    timestamp: String,
}

impl<T> Timestamped<T> {
    fn now(body: T) -> Self {
        Timestamped {
            body,
            timestamp: timestamp(),
        }
    }
}

/// A path below `/api/v2/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum V2Path {
    /// `{repository}/tags/list`
    Tags { repository: String },

    /// `{repository}/manifests/{reference}`
    Manifest {
        repository: String,
        reference: String,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("Not found: /api/v2/{0}")]
pub(crate) struct UnknownPath(String);

impl From<UnknownPath> for ApiError {
    fn from(error: UnknownPath) -> Self {
        ApiError::NotFound(error.to_string())
    }
}

impl FromStr for V2Path {
    type Err = UnknownPath;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let trimmed = path.trim_matches('/');

        if let Some(repository) = trimmed.strip_suffix("/tags/list") {
            if !repository.is_empty() {
                return Ok(V2Path::Tags {
                    repository: repository.to_owned(),
                });
            }
        }

        if let Some((repository, reference)) = trimmed.rsplit_once("/manifests/") {
            if !repository.is_empty() && !reference.is_empty() && !reference.contains('/') {
                return Ok(V2Path::Manifest {
                    repository: repository.to_owned(),
                    reference: reference.to_owned(),
                });
            }
        }

        Err(UnknownPath(path.to_owned()))
    }
}

/// Service identity.
pub(crate) async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": "Docker Registry UI API",
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "registry_url": state.registry_url,
    }))
}

#[derive(Debug, Serialize)]
pub(crate) struct Health {
    status: &'static str,
    registry_url: String,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Probe the registry. Always answers 200; an unreachable registry is reported as unhealthy.
pub(crate) async fn health(State(state): State<AppState>) -> Json<Health> {
    let (status, error) = match state.client.ping().await {
        Ok(status) if status == StatusCode::OK => ("healthy", None),
        Ok(status) => {
            tracing::warn!(%status, "registry answered health probe with unexpected status");
            ("unhealthy", None)
        }
        Err(error) => {
            tracing::warn!(%error, "registry health probe failed");
            ("unhealthy", Some(error.to_string()))
        }
    };

    Json(Health {
        status,
        registry_url: state.registry_url,
        timestamp: timestamp(),
        error,
    })
}

/// Catalog passthrough.
pub(crate) async fn catalog(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let repositories = state.client.list_repositories().await?;
    Ok(Json(json!({ "repositories": repositories })))
}

#[derive(Debug, Serialize)]
pub(crate) struct ManifestBody {
    manifest: Value,
    digest: String,
    size: u64,
    content_type: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum V2Body {
    Tags(TagList),
    Manifest(ManifestBody),
}

/// Tag list and manifest passthrough.
pub(crate) async fn get_v2(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> ApiResult<Json<V2Body>> {
    match path.parse::<V2Path>()? {
        V2Path::Tags { repository } => {
            let tags = state.client.list_tags(&repository).await.map_err(|error| {
                tracing::debug!(%repository, %error, "listing tags failed");
                ApiError::NotFound(format!("Repository not found: {repository}"))
            })?;
            Ok(Json(V2Body::Tags(tags)))
        }
        V2Path::Manifest {
            repository,
            reference,
        } => {
            let response = state
                .client
                .get_manifest(&repository, &reference)
                .await
                .map_err(|error| {
                    tracing::debug!(%repository, %reference, %error, "fetching manifest failed");
                    ApiError::NotFound(format!("Tag not found: {reference}"))
                })?;

            Ok(Json(V2Body::Manifest(ManifestBody {
                manifest: response.manifest,
                digest: response.digest.unwrap_or_default(),
                size: response.size,
                content_type: response.content_type.unwrap_or_default(),
            })))
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Deleted {
    message: &'static str,
    repository: String,
    digest: String,
    note: &'static str,
}

/// Delete a manifest by digest.
pub(crate) async fn delete_v2(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> ApiResult<Json<Deleted>> {
    let V2Path::Manifest {
        repository,
        reference: digest,
    } = path.parse::<V2Path>()?
    else {
        return Err(UnknownPath(path).into());
    };

    match state.client.delete_manifest(&repository, &digest).await {
        Ok(()) => {
            tracing::info!(%repository, %digest, "deleted manifest");
            Ok(Json(Deleted {
                message: "Image deleted successfully",
                repository,
                digest,
                note: "Run garbage collection to free disk space",
            }))
        }
        Err(RegistryClientError::Response(error)) => Err(ApiError::Upstream {
            status: error.status,
            detail: format!("Failed to delete image: {}", error.message),
        }),
        Err(error) => Err(error.into()),
    }
}

/// Every repository with tag details and registry totals.
pub(crate) async fn repositories(
    State(state): State<AppState>,
) -> ApiResult<Json<Timestamped<RegistrySummary>>> {
    let summary = aggregate::summarize_registry(&state.fanout()).await?;
    Ok(Json(Timestamped::now(summary)))
}

/// Registry-wide statistics.
pub(crate) async fn statistics(
    State(state): State<AppState>,
) -> ApiResult<Json<StatisticsSnapshot>> {
    let snapshot = statistics::compute_statistics(&state.fanout()).await?;
    Ok(Json(snapshot))
}

/// A single repository with tag details.
pub(crate) async fn repository(
    State(state): State<AppState>,
    Path(repository): Path<String>,
) -> ApiResult<Json<Timestamped<RepositorySummary>>> {
    let repository = repository.trim_matches('/');
    let summary = aggregate::summarize_repository(&state.fanout(), repository)
        .await
        .map_err(|error| {
            tracing::debug!(%repository, %error, "listing tags failed");
            ApiError::NotFound(format!("Repository not found: {repository}"))
        })?;
    Ok(Json(Timestamped::now(summary)))
}
