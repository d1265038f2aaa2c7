//! Per-tag detail resolution: one manifest fetch plus a best-effort config blob fetch.

use registry_client::{ImageConfig, RegistryClient, RegistryClientError};
use serde::Serialize;

/// Label used for OS and architecture when the image config could not be read.
pub const UNKNOWN: &str = "unknown";

/// Everything the UI shows about a single tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagDetails {
    /// Tag name.
    pub name: String,

    /// Manifest digest reported by the registry, empty when the registry sent none.
    pub digest: String,

    /// Config blob size plus every layer size, in bytes.
    pub size: u64,

    /// Operating system from the image config.
    pub os: String,

    /// CPU architecture from the image config.
    pub architecture: String,

    /// Image creation time from the image config.
    pub created: Option<String>,

    /// Image author from the image config.
    pub author: Option<String>,

    /// Number of layers in the manifest.
    pub layers: usize,
}

impl TagDetails {
    /// Details for a tag nothing could be learned about.
    pub fn unresolved(name: impl Into<String>) -> Self {
        TagDetails {
            name: name.into(),
            digest: String::new(),
            size: 0,
            os: UNKNOWN.to_owned(),
            architecture: UNKNOWN.to_owned(),
            created: None,
            author: None,
            layers: 0,
        }
    }

    fn enrich(&mut self, config: ImageConfig) {
        self.os = config.os.unwrap_or_else(|| UNKNOWN.to_owned());
        self.architecture = config.architecture.unwrap_or_else(|| UNKNOWN.to_owned());
        self.created = config.created;
        self.author = config.author;
    }
}

/// Resolve the details of `repository:tag`.
///
/// Fails only when the manifest cannot be fetched or decoded. The config blob is
/// optional: when it is missing or unreadable the descriptive fields stay [`UNKNOWN`].
#[tracing::instrument(skip(client))]
pub async fn resolve_tag(
    client: &RegistryClient,
    repository: &str,
    tag: &str,
) -> Result<TagDetails, RegistryClientError> {
    let response = client.get_manifest(repository, tag).await?;
    let manifest = response.image()?;

    let mut details = TagDetails {
        digest: response.digest.clone().unwrap_or_default(),
        size: manifest.total_size(),
        layers: manifest.layer_count(),
        ..TagDetails::unresolved(tag)
    };

    let Some(config_digest) = manifest.config_digest() else {
        tracing::debug!("manifest has no config blob");
        return Ok(details);
    };

    match client.get_config(repository, config_digest).await {
        Ok(config) => details.enrich(config),
        Err(error) => {
            tracing::debug!(%config_digest, %error, "config blob unavailable");
        }
    }

    Ok(details)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use api_client::ApiClient;
    use api_client::mock::{MockResponse, MockService};
    use axum::http::StatusCode;
    use serde_json::json;

    use super::*;

    fn client(mock: MockService) -> RegistryClient {
        RegistryClient::from_api_client(ApiClient::new_with_inner_service(
            "http://registry:5000".parse().unwrap(),
            Duration::from_secs(1),
            mock,
        ))
    }

    fn manifest(config_digest: Option<&str>) -> serde_json::Value {
        let mut config = json!({"size": 10});
        if let Some(digest) = config_digest {
            config["digest"] = json!(digest);
        }
        json!({
            "schemaVersion": 2,
            "config": config,
            "layers": [{"size": 60}, {"size": 30}]
        })
    }

    #[tokio::test]
    async fn resolves_manifest_and_config() {
        let mut mock = MockService::new();
        mock.add(
            "/v2/app/manifests/v1",
            MockResponse::json(&manifest(Some("sha256:cfg")))
                .with_header(registry_client::DOCKER_CONTENT_DIGEST, "sha256:m1"),
        );
        mock.add(
            "/v2/app/blobs/sha256:cfg",
            MockResponse::json(&json!({
                "os": "linux",
                "architecture": "amd64",
                "created": "2024-03-01T12:00:00Z",
                "author": "ops"
            })),
        );

        let details = resolve_tag(&client(mock), "app", "v1").await.unwrap();
        assert_eq!(
            details,
            TagDetails {
                name: "v1".into(),
                digest: "sha256:m1".into(),
                size: 100,
                os: "linux".into(),
                architecture: "amd64".into(),
                created: Some("2024-03-01T12:00:00Z".into()),
                author: Some("ops".into()),
                layers: 2,
            }
        );
    }

    #[tokio::test]
    async fn missing_config_digest_skips_blob_fetch() {
        let mut mock = MockService::new();
        mock.add("/v2/app/manifests/v1", MockResponse::json(&manifest(None)));

        let details = resolve_tag(&client(mock.clone()), "app", "v1")
            .await
            .unwrap();
        assert_eq!(details.size, 100);
        assert_eq!(details.os, UNKNOWN);
        assert_eq!(details.architecture, UNKNOWN);
        assert_eq!(details.digest, "");
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn unreadable_config_leaves_fields_unknown() {
        let mut mock = MockService::new();
        mock.add(
            "/v2/app/manifests/v1",
            MockResponse::json(&manifest(Some("sha256:cfg"))),
        );
        mock.add(
            "/v2/app/manifests/v2",
            MockResponse::json(&manifest(Some("sha256:bad"))),
        );
        mock.add(
            "/v2/app/blobs/sha256:bad",
            MockResponse::new(StatusCode::OK, Default::default(), "{not json"),
        );
        let client = client(mock.clone());

        // sha256:cfg is not configured, so the blob fetch is a 404.
        let details = resolve_tag(&client, "app", "v1").await.unwrap();
        assert_eq!(details.size, 100);
        assert_eq!(details.os, UNKNOWN);
        assert_eq!(details.created, None);

        let details = resolve_tag(&client, "app", "v2").await.unwrap();
        assert_eq!(details.architecture, UNKNOWN);
        assert_eq!(details.author, None);
        assert_eq!(mock.calls(), 4);
    }

    #[tokio::test]
    async fn manifest_failure_fails_resolution() {
        let error = resolve_tag(&client(MockService::new()), "app", "v1")
            .await
            .unwrap_err();
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn resolution_is_repeatable() {
        let mut mock = MockService::new();
        mock.add(
            "/v2/app/manifests/v1",
            MockResponse::json(&manifest(Some("sha256:cfg")))
                .with_header(registry_client::DOCKER_CONTENT_DIGEST, "sha256:m1"),
        );
        mock.add(
            "/v2/app/blobs/sha256:cfg",
            MockResponse::json(&json!({"os": "linux", "architecture": "arm64"})),
        );
        let client = client(mock);

        let first = resolve_tag(&client, "app", "v1").await.unwrap();
        let second = resolve_tag(&client, "app", "v1").await.unwrap();
        assert_eq!(first, second);
    }
}
