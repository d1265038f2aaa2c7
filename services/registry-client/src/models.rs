//! Documents exchanged with the distribution API.

use serde::{Deserialize, Deserializer, Serialize};

/// Treat an explicit JSON `null` the same as a missing field.
///
/// Registries answer `{"tags": null}` for repositories whose tags were all deleted.
fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

/// One page of `GET /v2/_catalog`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Repository names, in registry order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub repositories: Vec<String>,
}

/// One page of `GET /v2/<name>/tags/list`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagList {
    /// Repository name as reported by the registry.
    #[serde(default)]
    pub name: String,

    /// Tag names, in registry order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
}

/// Reference to a blob from a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    /// Content digest of the referenced blob.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    /// Size of the referenced blob in bytes.
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: u64,
}

/// An image manifest (Docker schema 2 or OCI), reduced to the fields used for sizing.
///
/// Every field is optional on the wire so that partial manifests still produce a size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    /// Manifest schema version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,

    /// Manifest media type, when the manifest declares one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    /// Image configuration blob.
    #[serde(default, deserialize_with = "null_as_default")]
    pub config: Descriptor,

    /// Layer blobs, base layer first.
    #[serde(default, deserialize_with = "null_as_default")]
    pub layers: Vec<Descriptor>,
}

impl ImageManifest {
    /// Size of the config blob plus every layer.
    pub fn total_size(&self) -> u64 {
        self.layers
            .iter()
            .fold(self.config.size, |total, layer| total.saturating_add(layer.size))
    }

    /// Number of layers in the image.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Digest of the config blob, if the manifest names a non-empty one.
    pub fn config_digest(&self) -> Option<&str> {
        self.config.digest.as_deref().filter(|digest| !digest.is_empty())
    }
}

/// Image configuration blob, reduced to the descriptive fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Operating system the image targets.
    #[serde(default)]
    pub os: Option<String>,

    /// CPU architecture the image targets.
    #[serde(default)]
    pub architecture: Option<String>,

    /// Creation time, normally RFC 3339.
    #[serde(default)]
    pub created: Option<String>,

    /// Image author.
    #[serde(default)]
    pub author: Option<String>,
}

/// A fetched manifest together with the response metadata the registry sent with it.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestResponse {
    /// The manifest body exactly as the registry returned it.
    pub manifest: serde_json::Value,

    /// `Docker-Content-Digest` response header.
    pub digest: Option<String>,

    /// `Content-Type` response header.
    pub content_type: Option<String>,

    /// Length of the manifest body in bytes.
    pub size: u64,
}

impl ManifestResponse {
    /// Decode the manifest body as an image manifest.
    pub fn image(&self) -> Result<ImageManifest, serde_json::Error> {
        ImageManifest::deserialize(&self.manifest)
    }
}
