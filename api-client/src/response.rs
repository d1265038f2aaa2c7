//! Response types and traits for working with HTTP responses.

use bytes::Bytes;
use http_body_util::BodyExt as _;
use hyperdriver::Body;

use crate::error::{BoxError, Error, HttpResponseError};

/// Extension trait for inspecting HTTP response metadata.
pub trait ResponseExt {
    /// Get the status code of the response.
    fn status(&self) -> http::StatusCode;

    /// Get the headers of the response.
    fn headers(&self) -> &http::HeaderMap;

    /// Get a header as a string, if present and valid UTF-8.
    fn header_str(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.headers().get(name).and_then(|v| v.to_str().ok())
    }
}

/// An HTTP response together with the parts of the request which produced it.
#[derive(Debug)]
pub struct Response {
    request: http::request::Parts,
    response: http::response::Parts,
    body: Body,
}

impl Response {
    /// Create a new `Response` instance.
    pub fn new(request: http::request::Parts, response: http::Response<Body>) -> Self {
        let (response, body) = response.into_parts();

        Self {
            request,
            response,
            body,
        }
    }

    /// Get the URI of the request that generated the response.
    pub fn uri(&self) -> &http::Uri {
        &self.request.uri
    }

    /// Get the method of the request that generated the response.
    pub fn method(&self) -> &http::Method {
        &self.request.method
    }

    /// Read the whole body into memory.
    pub(crate) async fn buffered(self) -> Result<Self, Error> {
        let Self {
            request,
            response,
            body,
        } = self;
        let collected = body.collect().await.map_err(Error::ResponseBody)?;

        Ok(Self {
            request,
            response,
            body: Body::from(collected.to_bytes()),
        })
    }

    /// Collect the response body into a `Bytes` instance.
    pub async fn bytes(self) -> Result<Bytes, BoxError> {
        let collected = self.body.collect().await.map_err(Into::<BoxError>::into)?;
        Ok(collected.to_bytes())
    }

    /// Collect the response body into a `String` instance.
    pub async fn text(self) -> Result<String, BoxError> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(Into::into)
    }

    /// Collect the body and deserialize it as JSON.
    pub async fn json<T>(self) -> Result<T, BoxError>
    where
        T: serde::de::DeserializeOwned,
    {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(Into::into)
    }

    /// Convert the `Response` into an `HttpResponseError` instance.
    pub async fn into_error(self) -> HttpResponseError {
        HttpResponseError::from_response(self).await
    }

    /// Convert the `Response` into an `HttpResponseError` if its status is not a success.
    pub async fn error_for_status(self) -> Result<Self, HttpResponseError> {
        if self.status().is_success() {
            Ok(self)
        } else {
            Err(self.into_error().await)
        }
    }
}

impl ResponseExt for Response {
    fn status(&self) -> http::StatusCode {
        self.response.status
    }

    fn headers(&self) -> &http::HeaderMap {
        &self.response.headers
    }
}

impl<B> ResponseExt for http::Response<B> {
    fn status(&self) -> http::StatusCode {
        self.status()
    }

    fn headers(&self) -> &http::HeaderMap {
        self.headers()
    }
}
