//! A client for the container registry HTTP API (distribution spec `/v2/`).
//!
//! Each method maps to a single registry primitive. Failures are returned as
//! [`RegistryClientError`] and are never retried here.

use std::collections::HashSet;
use std::time::Duration;

use api_client::ApiClient;
use api_client::response::{Response, ResponseExt as _};
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderName, StatusCode, Uri};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::de::DeserializeOwned;

mod error;
pub mod models;
mod pagination;

pub use self::error::{RegistryClientError, Result};
pub use self::models::{
    Catalog, Descriptor, ImageConfig, ImageManifest, ManifestResponse, TagList,
};

/// Media types requested when fetching manifests.
pub const MANIFEST_ACCEPT: &str =
    "application/vnd.docker.distribution.manifest.v2+json, application/vnd.oci.image.manifest.v1+json";

/// Header carrying the content digest of a manifest.
pub const DOCKER_CONTENT_DIGEST: HeaderName = HeaderName::from_static("docker-content-digest");

/// Characters escaped inside a single URL path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Escape a repository name, keeping its `/` namespace separators.
fn repository_path(repository: &str) -> String {
    repository
        .split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn segment(value: &str) -> String {
    utf8_percent_encode(value, SEGMENT).to_string()
}

/// Client for a single registry.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    inner: ApiClient,
}

impl RegistryClient {
    /// Create a client for the registry at `base`, bounding each call by `timeout`.
    pub fn new(base: Uri, timeout: Duration) -> Self {
        RegistryClient {
            inner: ApiClient::new(base, timeout),
        }
    }

    /// Wrap an existing API client.
    pub fn from_api_client(inner: ApiClient) -> Self {
        RegistryClient { inner }
    }

    /// Access the inner API client.
    pub fn api_client(&self) -> &ApiClient {
        &self.inner
    }

    /// Base URL of the registry.
    pub fn base(&self) -> &Uri {
        self.inner.base()
    }

    async fn get_success(&self, endpoint: &str) -> Result<Response> {
        let response = self.inner.get(endpoint)?.send().await?;
        Ok(response.error_for_status().await?)
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let body = Self::read_bytes(response).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn read_bytes(response: Response) -> Result<Bytes> {
        Ok(response
            .bytes()
            .await
            .map_err(api_client::Error::ResponseBody)?)
    }

    /// Probe `GET /v2/` and return the status the registry answered with.
    #[tracing::instrument(skip(self))]
    pub async fn ping(&self) -> Result<StatusCode> {
        let response = self.inner.get("v2/")?.send().await?;
        Ok(response.status())
    }

    /// Fetch `endpoint` and every page linked from it with `rel="next"`.
    ///
    /// Stops at the first link to a page that was already fetched.
    async fn for_each_page<T: DeserializeOwned>(
        &self,
        endpoint: String,
        mut each: impl FnMut(T),
    ) -> Result<()> {
        let mut visited = HashSet::new();
        let mut next = Some(endpoint);

        while let Some(endpoint) = next.take() {
            if !visited.insert(self.inner.endpoint(&endpoint)?) {
                tracing::warn!(%endpoint, "pagination link leads back to a page already fetched");
                break;
            }

            let response = self.get_success(&endpoint).await?;
            next = pagination::next_page(response.headers());
            each(Self::read_json(response).await?);

            if let Some(next) = &next {
                tracing::trace!(%next, "requesting next page");
            }
        }

        Ok(())
    }

    /// List every repository in the catalog, following pagination links.
    #[tracing::instrument(skip(self))]
    pub async fn list_repositories(&self) -> Result<Vec<String>> {
        let mut repositories = Vec::new();
        self.for_each_page("v2/_catalog".to_owned(), |page: Catalog| {
            repositories.extend(page.repositories)
        })
        .await?;

        Ok(repositories)
    }

    /// List every tag of a repository, following pagination links.
    #[tracing::instrument(skip(self))]
    pub async fn list_tags(&self, repository: &str) -> Result<TagList> {
        let mut tags = TagList {
            name: repository.to_owned(),
            tags: Vec::new(),
        };

        let endpoint = format!("v2/{}/tags/list", repository_path(repository));
        self.for_each_page(endpoint, |page: TagList| {
            if !page.name.is_empty() {
                tags.name = page.name;
            }
            tags.tags.extend(page.tags);
        })
        .await?;

        Ok(tags)
    }

    /// Fetch a manifest by tag or digest.
    #[tracing::instrument(skip(self))]
    pub async fn get_manifest(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<ManifestResponse> {
        let endpoint = format!(
            "v2/{}/manifests/{}",
            repository_path(repository),
            segment(reference)
        );
        let response = self
            .inner
            .get(&endpoint)?
            .header(ACCEPT, MANIFEST_ACCEPT)
            .send()
            .await?;
        let response = response.error_for_status().await?;

        let digest = response
            .header_str(&DOCKER_CONTENT_DIGEST)
            .map(str::to_owned);
        let content_type = response.header_str(CONTENT_TYPE).map(str::to_owned);

        let body = Self::read_bytes(response).await?;
        let manifest = serde_json::from_slice(&body)?;

        Ok(ManifestResponse {
            manifest,
            digest,
            content_type,
            size: body.len() as u64,
        })
    }

    /// Fetch a blob by digest.
    #[tracing::instrument(skip(self))]
    pub async fn get_blob(&self, repository: &str, digest: &str) -> Result<Bytes> {
        let endpoint = format!(
            "v2/{}/blobs/{}",
            repository_path(repository),
            segment(digest)
        );
        let response = self.get_success(&endpoint).await?;
        Self::read_bytes(response).await
    }

    /// Fetch and decode an image configuration blob.
    pub async fn get_config(&self, repository: &str, digest: &str) -> Result<ImageConfig> {
        let blob = self.get_blob(repository, digest).await?;
        Ok(serde_json::from_slice(&blob)?)
    }

    /// Delete a manifest by digest.
    ///
    /// Only `202 Accepted` counts as success. Deleting a manifest does not free storage;
    /// the registry's garbage collector has to be run separately.
    #[tracing::instrument(skip(self))]
    pub async fn delete_manifest(&self, repository: &str, digest: &str) -> Result<()> {
        let endpoint = format!(
            "v2/{}/manifests/{}",
            repository_path(repository),
            segment(digest)
        );
        let response = self
            .inner
            .delete(&endpoint)?
            .header(ACCEPT, MANIFEST_ACCEPT)
            .send()
            .await?;

        if response.status() == StatusCode::ACCEPTED {
            return Ok(());
        }

        tracing::warn!(status = %response.status(), "registry refused manifest deletion");
        Err(response.into_error().await.into())
    }
}

#[cfg(test)]
mod tests {
    use api_client::mock::{MockResponse, MockService};
    use http::header::LINK;
    use serde_json::json;

    use super::*;

    static_assertions::assert_impl_all!(RegistryClient: Send, Sync, Clone);

    fn client(mock: MockService) -> RegistryClient {
        RegistryClient::from_api_client(ApiClient::new_with_inner_service(
            "http://registry:5000".parse().unwrap(),
            Duration::from_millis(200),
            mock,
        ))
    }

    #[test]
    fn repository_names_keep_namespaces() {
        assert_eq!(repository_path("library/nginx"), "library/nginx");
        assert_eq!(repository_path("team a/app"), "team%20a/app");
        assert_eq!(segment("sha256:abc"), "sha256:abc");
        assert_eq!(segment("a/b"), "a%2Fb");
    }

    #[tokio::test]
    async fn ping_reports_status() {
        let mut mock = MockService::new();
        mock.add("/v2/", MockResponse::status(StatusCode::UNAUTHORIZED));

        let status = client(mock).ping().await.unwrap();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn catalog_follows_pages() {
        let mut mock = MockService::new();
        mock.add(
            "/v2/_catalog",
            MockResponse::json(&json!({"repositories": ["a", "b"]}))
                .with_header(LINK, "</v2/_catalog?last=b&n=2>; rel=\"next\""),
        );
        mock.add(
            "/v2/_catalog?last=b&n=2",
            MockResponse::json(&json!({"repositories": ["c"]})),
        );

        let repositories = client(mock.clone()).list_repositories().await.unwrap();
        assert_eq!(repositories, vec!["a", "b", "c"]);
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn catalog_stops_at_page_cycle() {
        let mut mock = MockService::new();
        mock.add(
            "/v2/_catalog",
            MockResponse::json(&json!({"repositories": ["a"]}))
                .with_header(LINK, "</v2/_catalog?last=a>; rel=\"next\""),
        );
        mock.add(
            "/v2/_catalog?last=a",
            MockResponse::json(&json!({"repositories": ["b"]}))
                .with_header(LINK, "</v2/_catalog>; rel=\"next\""),
        );

        let repositories = client(mock.clone()).list_repositories().await.unwrap();
        assert_eq!(repositories, vec!["a", "b"]);
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn tag_page_linking_to_itself_is_fetched_once() {
        let mut mock = MockService::new();
        mock.add(
            "/v2/app/tags/list",
            MockResponse::json(&json!({"name": "app", "tags": ["v1", "v2"]}))
                .with_header(LINK, "</v2/app/tags/list>; rel=\"next\""),
        );

        let tags = client(mock.clone()).list_tags("app").await.unwrap();
        assert_eq!(tags.tags, vec!["v1", "v2"]);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn catalog_failure_carries_status() {
        let mut mock = MockService::new();
        mock.add(
            "/v2/_catalog",
            MockResponse::new(StatusCode::SERVICE_UNAVAILABLE, Default::default(), "down"),
        );

        let error = client(mock).list_repositories().await.unwrap_err();
        assert_eq!(error.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert!(error.to_string().contains("down"));
    }

    #[tokio::test]
    async fn unknown_repository_is_not_found() {
        let error = client(MockService::new())
            .list_tags("nope")
            .await
            .unwrap_err();
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn tags_of_nested_repository() {
        let mut mock = MockService::new();
        mock.add(
            "/v2/team/app/tags/list",
            MockResponse::json(&json!({"name": "team/app", "tags": ["v1", "v2"]})),
        );

        let tags = client(mock).list_tags("team/app").await.unwrap();
        assert_eq!(tags.name, "team/app");
        assert_eq!(tags.tags, vec!["v1", "v2"]);
    }

    #[tokio::test]
    async fn manifest_carries_digest_and_size() {
        let body = json!({
            "schemaVersion": 2,
            "config": {"digest": "sha256:cfg", "size": 10},
            "layers": [{"digest": "sha256:l1", "size": 90}]
        });
        let mut mock = MockService::new();
        mock.add(
            "/v2/app/manifests/v1",
            MockResponse::json(&body).with_header(DOCKER_CONTENT_DIGEST, "sha256:manifest"),
        );

        let manifest = client(mock).get_manifest("app", "v1").await.unwrap();
        assert_eq!(manifest.digest.as_deref(), Some("sha256:manifest"));
        assert_eq!(manifest.content_type.as_deref(), Some("application/json"));
        assert_eq!(manifest.size, body.to_string().len() as u64);
        assert_eq!(manifest.manifest, body);
        assert_eq!(manifest.image().unwrap().total_size(), 100);
    }

    #[tokio::test]
    async fn malformed_manifest_is_a_decode_error() {
        let mut mock = MockService::new();
        mock.add(
            "/v2/app/manifests/v1",
            MockResponse::new(StatusCode::OK, Default::default(), "not json"),
        );

        let error = client(mock).get_manifest("app", "v1").await.unwrap_err();
        assert!(matches!(error, RegistryClientError::Decode(_)));
    }

    #[tokio::test]
    async fn config_blob_is_decoded() {
        let mut mock = MockService::new();
        mock.add(
            "/v2/app/blobs/sha256:cfg",
            MockResponse::json(&json!({
                "os": "linux",
                "architecture": "amd64",
                "created": "2024-01-01T00:00:00Z"
            })),
        );

        let config = client(mock).get_config("app", "sha256:cfg").await.unwrap();
        assert_eq!(config.os.as_deref(), Some("linux"));
        assert_eq!(config.architecture.as_deref(), Some("amd64"));
        assert_eq!(config.author, None);
    }

    #[tokio::test]
    async fn delete_requires_accepted() {
        let mut mock = MockService::new();
        mock.add_method(
            http::Method::DELETE,
            "/v2/app/manifests/sha256:ok",
            MockResponse::status(StatusCode::ACCEPTED),
        );
        mock.add_method(
            http::Method::DELETE,
            "/v2/app/manifests/sha256:nope",
            MockResponse::new(
                StatusCode::METHOD_NOT_ALLOWED,
                Default::default(),
                "{\"errors\":[{\"code\":\"UNSUPPORTED\"}]}",
            ),
        );
        let client = client(mock);

        client.delete_manifest("app", "sha256:ok").await.unwrap();

        let error = client
            .delete_manifest("app", "sha256:nope")
            .await
            .unwrap_err();
        assert_eq!(error.status(), Some(StatusCode::METHOD_NOT_ALLOWED));
        match error {
            RegistryClientError::Response(response) => {
                assert!(response.message.contains("UNSUPPORTED"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_registry_times_out() {
        let mut mock = MockService::new();
        mock.add("/v2/_catalog", MockResponse::hang());

        let error = client(mock).list_repositories().await.unwrap_err();
        assert!(error.is_timeout());
        assert_eq!(error.status(), None);
    }
}
