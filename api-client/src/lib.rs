//! Shared plumbing for HTTP API clients.
//!
//! [`ApiClient`] owns a base URI and a cloneable tower service. Individual API clients
//! wrap it and turn endpoints into typed calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use http::Uri;
use hyperdriver::service::SharedService;
use tower::ServiceExt;

pub mod error;
pub mod request;
pub mod response;
pub mod uri;

pub use self::error::{BoxError, Error, HttpResponseError};
pub use self::request::RequestBuilder;
pub use self::request::RequestExt;
use self::response::Response;
use self::uri::UriExtension as _;

/// Boxed future used by services in this crate.
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A request as sent by [`ApiClient`].
pub type HttpRequest = http::Request<hyperdriver::Body>;

/// A response as received by [`ApiClient`].
pub type HttpResponse = http::Response<hyperdriver::Body>;

type ClientService = hyperdriver::client::SharedClientService<hyperdriver::Body, hyperdriver::Body>;

/// A client for accessing APIs over HTTP / HTTPS
///
/// Useful inner object to wrap for individual API clients.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base: Arc<Uri>,
    timeout: Duration,
    inner: ClientService,
}

impl ApiClient {
    /// Create a new API client from a base URL.
    ///
    /// Every exchange, from sending the request to reading the last byte of the
    /// response body, is bounded by `timeout`.
    pub fn new(base: Uri, timeout: Duration) -> Self {
        let inner = hyperdriver::Client::build_tcp_http()
            .with_default_tls()
            .build_service();

        ApiClient {
            base: Arc::new(base),
            timeout,
            inner,
        }
    }

    /// Create a new API client which sends requests through an arbitrary service.
    pub fn new_with_inner_service<S>(base: Uri, timeout: Duration, inner: S) -> Self
    where
        S: tower::Service<HttpRequest, Response = HttpResponse, Error = hyperdriver::client::Error>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        ApiClient {
            base: Arc::new(base),
            timeout,
            inner: SharedService::new(inner),
        }
    }

    /// The base URI all endpoints are joined onto.
    pub fn base(&self) -> &Uri {
        &self.base
    }

    /// The deadline applied to each exchange.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve an endpoint relative to the base URI.
    pub fn endpoint(&self, endpoint: &str) -> Result<Uri, Error> {
        Ok((*self.base).clone().join(endpoint)?)
    }

    /// Start a `GET` request.
    pub fn get(&self, endpoint: &str) -> Result<RequestBuilder, Error> {
        Ok(RequestBuilder::new(self.clone(), self.endpoint(endpoint)?, Method::GET))
    }

    /// Start a `DELETE` request.
    pub fn delete(&self, endpoint: &str) -> Result<RequestBuilder, Error> {
        Ok(RequestBuilder::new(self.clone(), self.endpoint(endpoint)?, Method::DELETE))
    }

    /// Send a fully built request and buffer the response body.
    pub async fn execute(&self, req: HttpRequest) -> Result<Response, Error> {
        self.execute_within(req, self.timeout).await
    }

    pub(crate) async fn execute_within(
        &self,
        req: HttpRequest,
        timeout: Duration,
    ) -> Result<Response, Error> {
        let parts = req.parts();
        let uri = parts.uri.clone();
        tracing::trace!(method = %parts.method, %uri, "sending request");

        let exchange = async {
            let response = self
                .inner
                .clone()
                .oneshot(req)
                .await
                .map_err(Error::Request)?;
            tracing::trace!(status = %response.status(), uri = %parts.uri, "received response");
            Response::new(parts, response).buffered().await
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(%uri, ?timeout, "request timed out");
                Err(Error::Request(hyperdriver::client::Error::RequestTimeout))
            }
        }
    }
}

pub mod mock {
    //! A canned-response transport for testing API clients without a network.

    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use bytes::Bytes;
    use http::response;

    use crate::BoxFuture;

    #[derive(Debug, Clone)]
    enum Reply {
        Respond {
            status: http::StatusCode,
            headers: http::HeaderMap,
            body: Bytes,
            delay: Option<Duration>,
        },
        Hang,
    }

    /// A response to hand back for a configured method and path.
    #[derive(Debug, Clone)]
    pub struct MockResponse {
        reply: Reply,
    }

    impl MockResponse {
        /// Respond with a status, headers and a body.
        pub fn new(
            status: http::StatusCode,
            headers: http::HeaderMap,
            body: impl Into<Bytes>,
        ) -> Self {
            Self {
                reply: Reply::Respond {
                    status,
                    headers,
                    body: body.into(),
                    delay: None,
                },
            }
        }

        /// Respond with `200 OK` and a JSON body.
        pub fn json(value: &serde_json::Value) -> Self {
            let mut headers = http::HeaderMap::new();
            headers.insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            );
            Self::new(http::StatusCode::OK, headers, value.to_string())
        }

        /// Respond with an empty body.
        pub fn status(status: http::StatusCode) -> Self {
            Self::new(status, http::HeaderMap::new(), Bytes::new())
        }

        /// Never respond. Useful for exercising timeouts.
        pub fn hang() -> Self {
            Self { reply: Reply::Hang }
        }

        /// Wait before responding.
        pub fn delayed(mut self, duration: Duration) -> Self {
            if let Reply::Respond { delay, .. } = &mut self.reply {
                *delay = Some(duration);
            }
            self
        }

        /// Add a response header.
        pub fn with_header(mut self, name: http::HeaderName, value: &str) -> Self {
            if let Reply::Respond { headers, .. } = &mut self.reply {
                headers.append(
                    name,
                    http::HeaderValue::from_str(value).expect("valid mock header value"),
                );
            }
            self
        }
    }

    /// Serves configured responses keyed by method and path (including the query string).
    ///
    /// Paths with nothing configured answer `404 Not Found`.
    #[derive(Debug, Default, Clone)]
    pub struct MockService {
        responses: HashMap<(http::Method, String), MockResponse>,
        calls: Arc<AtomicUsize>,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    /// Marks one request as outstanding until dropped.
    struct InFlight(Arc<AtomicUsize>);

    impl Drop for InFlight {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl MockService {
        /// Create an empty mock service.
        pub fn new() -> Self {
            Self::default()
        }

        /// Configure the response for `GET path`.
        pub fn add(&mut self, path: &str, response: MockResponse) -> &mut Self {
            self.add_method(http::Method::GET, path, response)
        }

        /// Configure the response for a method and path.
        pub fn add_method(
            &mut self,
            method: http::Method,
            path: &str,
            response: MockResponse,
        ) -> &mut Self {
            self.responses.insert((method, path.to_owned()), response);
            self
        }

        /// Number of requests this service (and its clones) has received.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Largest number of requests that were outstanding at the same time.
        pub fn peak_in_flight(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    impl tower::Service<crate::HttpRequest> for MockService {
        type Response = crate::HttpResponse;
        type Error = hyperdriver::client::Error;
        type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

        fn poll_ready(
            &mut self,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: crate::HttpRequest) -> Self::Future {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            let in_flight = InFlight(self.in_flight.clone());

            let key = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_owned())
                .unwrap_or_else(|| req.uri().path().to_owned());

            let reply = self
                .responses
                .get(&(req.method().clone(), key))
                .map(|r| r.reply.clone())
                .unwrap_or(Reply::Respond {
                    status: http::StatusCode::NOT_FOUND,
                    headers: http::HeaderMap::new(),
                    body: Bytes::from_static(b"{\"errors\":[{\"code\":\"NAME_UNKNOWN\"}]}"),
                    delay: None,
                });

            Box::pin(async move {
                let _in_flight = in_flight;
                let (status, headers, body, delay) = match reply {
                    Reply::Hang => return std::future::pending().await,
                    Reply::Respond {
                        status,
                        headers,
                        body,
                        delay,
                    } => (status, headers, body, delay),
                };

                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }

                let mut builder = response::Builder::new()
                    .status(status)
                    .version(http::Version::HTTP_11);

                for (key, value) in headers.iter() {
                    builder = builder.header(key, value);
                }

                let response = builder
                    .body(hyperdriver::Body::from(body))
                    .expect("mock response parts are valid");

                Ok(response)
            })
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::mock::{MockResponse, MockService};
    use super::response::ResponseExt as _;

    use super::*;

    fn mock_client(mock: MockService, timeout: Duration) -> ApiClient {
        ApiClient::new_with_inner_service(
            "http://registry.test/".parse().unwrap(),
            timeout,
            mock,
        )
    }

    #[test]
    fn extensions_produce_send_futures() {
        let client = mock_client(MockService::new(), Duration::from_secs(1));
        let builder = client.get("frobulator").unwrap();

        fn assert_send<T: Send>(_t: T) {}

        let fut = builder.send();
        assert_send(fut);
    }

    #[tokio::test]
    async fn mock_client_works() {
        let mut mock = MockService::new();
        mock.add("/get/", MockResponse::json(&serde_json::json!({"ok": true})));

        let client = mock_client(mock.clone(), Duration::from_secs(1));

        let response = client.get("get/").unwrap().send().await.unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);

        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["ok"], true);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn unconfigured_path_is_not_found() {
        let client = mock_client(MockService::new(), Duration::from_secs(1));

        let response = client.get("missing").unwrap().send().await.unwrap();
        assert_eq!(response.status(), http::StatusCode::NOT_FOUND);

        let error = response.error_for_status().await.unwrap_err();
        assert_eq!(error.status, http::StatusCode::NOT_FOUND);
        assert!(error.message.contains("NAME_UNKNOWN"));
    }

    #[tokio::test]
    async fn hanging_upstream_times_out() {
        let mut mock = MockService::new();
        mock.add("/slow", MockResponse::hang());

        let client = mock_client(mock, Duration::from_millis(20));

        let error = client.get("slow").unwrap().send().await.unwrap_err();
        assert!(error.is_timeout(), "expected timeout, got {error:?}");
    }

    #[tokio::test]
    async fn request_timeout_overrides_client_default() {
        let mut mock = MockService::new();
        mock.add(
            "/slow",
            MockResponse::status(http::StatusCode::OK).delayed(Duration::from_millis(200)),
        );

        let client = mock_client(mock, Duration::from_secs(5));

        let error = client
            .get("slow")
            .unwrap()
            .timeout(Duration::from_millis(20))
            .send()
            .await
            .unwrap_err();
        assert!(error.is_timeout());
    }

    #[tokio::test]
    async fn stalled_body_times_out() {
        use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Send the head and part of the body, then go quiet.
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await.unwrap();
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n{\"repos")
                .await
                .unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client = ApiClient::new(
            format!("http://{addr}").parse().unwrap(),
            Duration::from_millis(200),
        );

        let error = client.get("v2/_catalog").unwrap().send().await.unwrap_err();
        assert!(error.is_timeout(), "expected timeout, got {error:?}");

        server.abort();
    }
}
