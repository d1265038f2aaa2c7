//! URI utilities.

use camino::Utf8Path;
use http::Uri;
use http::uri::PathAndQuery;
use thiserror::Error;
use url::Url;

/// A URL was parsed, but cannot serve as the base of an API.
#[derive(Debug, Error)]
pub enum ParseUriError {
    /// The text is not a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// The URL has no hierarchical path (for example `data:` or `mailto:` URLs).
    #[error("cannot be a base URL: {0}")]
    CannotBeABase(Url),

    /// The URL is not a valid HTTP URI.
    #[error("invalid URI: {0}")]
    Invalid(#[from] http::uri::InvalidUri),
}

/// Convert a value into a URI.
pub trait IntoUri {
    /// Convert the value into a URI.
    fn into_uri(self) -> Result<Uri, ParseUriError>;
}

impl IntoUri for &str {
    fn into_uri(self) -> Result<Uri, ParseUriError> {
        let url: Url = self.parse()?;
        if url.cannot_be_a_base() {
            return Err(ParseUriError::CannotBeABase(url));
        }
        Ok(url.as_str().parse::<Uri>()?)
    }
}

/// Serialize and deserialize a URI as a string.
pub mod serde {
    use http::Uri;
    use serde::{Deserialize as _, Deserializer};

    /// Parse a URI from a string.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Uri, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }

    /// Write a URI as a string.
    pub fn serialize<S>(uri: &Uri, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(uri)
    }
}

/// Extension trait for URIs.
pub trait UriExtension {
    /// Join a path, which may carry a query string, onto a URI.
    ///
    /// Relative paths extend the URI's path; absolute paths replace it.
    fn join<P: AsRef<str>>(self, path: P) -> Result<Uri, http::Error>;
}

impl UriExtension for Uri {
    fn join<P: AsRef<str>>(self, path: P) -> Result<Uri, http::Error> {
        let mut parts = self.into_parts();
        let base = parts.path_and_query.as_ref().map_or("/", PathAndQuery::path);
        let joined = Utf8Path::new(base).join(path.as_ref());

        parts.path_and_query = Some(PathAndQuery::from_maybe_shared(joined.into_string())?);
        Ok(Uri::from_parts(parts)?)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[track_caller]
    fn joined(base: &str, path: &str) -> String {
        base.parse::<Uri>().unwrap().join(path).unwrap().to_string()
    }

    #[test]
    fn join_relative_and_absolute_paths() {
        assert_eq!(joined("http://registry:5000", "v2/"), "http://registry:5000/v2/");
        assert_eq!(
            joined("http://registry:5000/", "v2/library/nginx/tags/list"),
            "http://registry:5000/v2/library/nginx/tags/list"
        );
        assert_eq!(
            joined("http://example.com/mirror", "v2/_catalog"),
            "http://example.com/mirror/v2/_catalog"
        );
        assert_eq!(
            joined("http://example.com/mirror/", "/v2/_catalog"),
            "http://example.com/v2/_catalog"
        );
    }

    #[test]
    fn join_keeps_query() {
        let uri = "http://registry:5000/"
            .parse::<Uri>()
            .unwrap()
            .join("/v2/_catalog?last=b&n=2")
            .unwrap();
        assert_eq!(uri.path(), "/v2/_catalog");
        assert_eq!(uri.query(), Some("last=b&n=2"));
    }

    #[test]
    fn join_rejects_invalid_paths() {
        let uri = "http://registry:5000/".parse::<Uri>().unwrap();
        assert!(uri.join("v2/bad path").is_err());
    }

    #[test]
    fn parse_base_urls() {
        let uri = "http://registry:5000/".into_uri().unwrap();
        assert_eq!(uri.host(), Some("registry"));
        assert_eq!(uri.port_u16(), Some(5000));

        assert!(matches!(
            "data:text/plain,hello".into_uri(),
            Err(ParseUriError::CannotBeABase(_))
        ));
        assert!("not a url".into_uri().is_err());
    }
}
