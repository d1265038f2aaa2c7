//! Building and sending requests through an [`ApiClient`].

use std::time::Duration;

use http::{HeaderName, Uri, header::HeaderValue};

use crate::error::Error;
use crate::{ApiClient, response::Response};

/// Extension methods for request types.
pub trait RequestExt {
    /// Copy the method, URI and headers of a request, leaving the body behind.
    fn parts(&self) -> http::request::Parts;
}

impl<B> RequestExt for http::Request<B> {
    fn parts(&self) -> http::request::Parts {
        let (mut parts, _) = http::Request::new(()).into_parts();
        parts.method = self.method().clone();
        parts.uri = self.uri().clone();
        parts.version = self.version();
        parts.headers = self.headers().clone();
        parts
    }
}

/// Builder for a single bodiless request against an [`ApiClient`].
#[derive(Debug)]
pub struct RequestBuilder {
    req: http::request::Builder,
    client: ApiClient,
    timeout: Option<Duration>,
}

impl RequestBuilder {
    /// Start a request for `uri` using `method`.
    pub fn new(client: ApiClient, uri: Uri, method: http::Method) -> Self {
        Self {
            req: http::Request::builder().method(method).uri(uri),
            client,
            timeout: None,
        }
    }

    /// Add a header to the request.
    pub fn header<K, V>(mut self, key: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        self.req = self.req.header(key, value);
        self
    }

    /// Bound this request by `timeout`, if it is shorter than the client-wide timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Assemble the request without sending it.
    pub fn build(self) -> Result<crate::HttpRequest, Error> {
        Ok(self.req.body(hyperdriver::Body::empty())?)
    }

    /// Send the request and buffer the response body.
    ///
    /// The whole exchange is bounded by the client timeout, or by the request
    /// timeout if that is shorter.
    pub async fn send(self) -> Result<Response, Error> {
        let client = self.client.clone();
        let timeout = self
            .timeout
            .map_or(client.timeout(), |timeout| timeout.min(client.timeout()));
        let req = self.build()?;

        client.execute_within(req, timeout).await
    }
}
