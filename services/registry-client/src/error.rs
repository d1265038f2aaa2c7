use api_client::HttpResponseError;
use http::StatusCode;
use thiserror::Error;

/// Results from the registry API can be errors or data.
pub type Result<T, E = RegistryClientError> = std::result::Result<T, E>;

/// A call to the registry failed.
#[derive(Debug, Error)]
pub enum RegistryClientError {
    /// The registry could not be reached, the request timed out, or the body could not be read.
    #[error(transparent)]
    Client(#[from] api_client::Error),

    /// The registry answered with an unexpected status.
    #[error(transparent)]
    Response(#[from] HttpResponseError),

    /// The registry answered with a body that is not the expected JSON document.
    #[error("Decoding registry response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RegistryClientError {
    /// Upstream status code, when the registry answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RegistryClientError::Response(error) => Some(error.status),
            _ => None,
        }
    }

    /// The registry reported the repository, manifest or blob as unknown.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    /// The request did not complete in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RegistryClientError::Client(error) if error.is_timeout())
    }
}
