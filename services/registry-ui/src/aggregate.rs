//! Concurrent aggregation of tag details into repository and registry summaries.
//!
//! Every registry call made while aggregating goes through a [`Fanout`], which bounds the
//! number of outstanding calls with a semaphore. Per-item failures are carried as values
//! in a [`RepositoryScan`] and folded afterwards by the coordinating task.

use std::sync::Arc;

use chrono::DateTime;
use futures::future::join_all;
use registry_client::{RegistryClient, RegistryClientError};
use serde::Serialize;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::resolve::{TagDetails, resolve_tag};

/// Default number of registry calls allowed in flight during one aggregation.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// A registry client whose calls share a fixed number of in-flight slots.
///
/// A `Fanout` is created per aggregation request, so separate requests do not
/// compete for the same slots.
#[derive(Debug, Clone)]
pub struct Fanout {
    client: RegistryClient,
    permits: Arc<Semaphore>,
}

impl Fanout {
    /// Allow at most `limit` registry calls in flight. A limit of zero is treated as one.
    pub fn new(client: RegistryClient, limit: usize) -> Self {
        Fanout {
            client,
            permits: Arc::new(Semaphore::new(limit.max(1))),
        }
    }

    /// Number of currently unused slots.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    async fn permit(&self) -> Option<SemaphorePermit<'_>> {
        // The semaphore is never closed, so acquisition only fails if that changes.
        self.permits.acquire().await.ok()
    }

    /// List the catalog.
    pub async fn catalog(&self) -> Result<Vec<String>, RegistryClientError> {
        let _permit = self.permit().await;
        self.client.list_repositories().await
    }

    async fn tags(&self, repository: &str) -> Result<Vec<String>, RegistryClientError> {
        let _permit = self.permit().await;
        Ok(self.client.list_tags(repository).await?.tags)
    }

    async fn resolve(
        &self,
        repository: &str,
        tag: &str,
    ) -> Result<TagDetails, RegistryClientError> {
        let _permit = self.permit().await;
        resolve_tag(&self.client, repository, tag).await
    }

    /// List a repository's tags and resolve every one of them concurrently.
    ///
    /// The permit for the tag listing is released before tag resolution starts, so
    /// nested fan-out cannot exhaust the slots.
    #[tracing::instrument(skip(self))]
    pub async fn scan(&self, repository: &str) -> RepositoryScan {
        let tags = match self.tags(repository).await {
            Ok(tags) => tags,
            Err(error) => {
                tracing::warn!(%error, "listing tags failed");
                return RepositoryScan {
                    name: repository.to_owned(),
                    tags: Err(error),
                };
            }
        };

        let outcomes = join_all(tags.iter().map(|tag| self.resolve(repository, tag))).await;

        RepositoryScan {
            name: repository.to_owned(),
            tags: Ok(tags.into_iter().zip(outcomes).collect()),
        }
    }

    /// Scan every repository concurrently. Results are in the order given.
    pub async fn scan_all(&self, repositories: &[String]) -> Vec<RepositoryScan> {
        join_all(repositories.iter().map(|repository| self.scan(repository))).await
    }
}

/// The raw outcome of scanning one repository, before any failure policy is applied.
#[derive(Debug)]
pub struct RepositoryScan {
    /// Repository name.
    pub name: String,

    /// Every listed tag paired with its resolution, in tag-list order, or the
    /// error from listing the tags.
    pub tags: Result<Vec<(String, Result<TagDetails, RegistryClientError>)>, RegistryClientError>,
}

/// A tag as it appears in a repository listing: fully resolved, or a placeholder
/// carrying the reason resolution failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagEntry {
    /// Resolved details, or placeholder values.
    #[serde(flatten)]
    pub details: TagDetails,

    /// Why the tag could not be resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TagEntry {
    /// An entry for a resolved tag.
    pub fn resolved(details: TagDetails) -> Self {
        TagEntry {
            details,
            error: None,
        }
    }

    /// A placeholder for a tag whose details could not be resolved.
    ///
    /// Keeps the tag's name, with zero size and unknown OS and architecture.
    pub fn placeholder(name: impl Into<String>, error: &RegistryClientError) -> Self {
        TagEntry {
            details: TagDetails::unresolved(name),
            error: Some(error.to_string()),
        }
    }

    /// Whether this entry is a placeholder.
    pub fn is_placeholder(&self) -> bool {
        self.error.is_some()
    }
}

/// One repository with its tags, as shown in repository listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositorySummary {
    /// Repository name.
    pub name: String,

    /// One entry per listed tag, in tag-list order.
    pub tags: Vec<TagEntry>,

    /// Number of tags the registry listed.
    pub tag_count: usize,

    /// Sum of all tag sizes, placeholders included.
    pub total_size: u64,

    /// Latest creation time among the tags.
    pub last_updated: Option<String>,

    /// Why the tags could not be listed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RepositorySummary {
    /// Fold a scan, replacing every failed tag with a placeholder.
    ///
    /// A repository whose tags could not be listed becomes an empty summary carrying the error.
    pub fn from_scan(scan: RepositoryScan) -> Self {
        match scan.tags {
            Ok(tags) => {
                let tags = tags
                    .into_iter()
                    .map(|(name, outcome)| match outcome {
                        Ok(details) => TagEntry::resolved(details),
                        Err(error) => {
                            tracing::debug!(
                                repository = %scan.name,
                                tag = %name,
                                %error,
                                "tag resolution failed"
                            );
                            TagEntry::placeholder(name, &error)
                        }
                    })
                    .collect();
                Self::from_tags(scan.name, tags)
            }
            Err(error) => RepositorySummary {
                name: scan.name,
                tags: Vec::new(),
                tag_count: 0,
                total_size: 0,
                last_updated: None,
                error: Some(error.to_string()),
            },
        }
    }

    fn from_tags(name: String, tags: Vec<TagEntry>) -> Self {
        let total_size = total_size(tags.iter().map(|tag| tag.details.size));
        let last_updated =
            last_updated(tags.iter().filter_map(|tag| tag.details.created.as_deref()));

        RepositorySummary {
            name,
            tag_count: tags.len(),
            tags,
            total_size,
            last_updated,
            error: None,
        }
    }
}

/// Sum sizes, saturating at `u64::MAX`.
pub(crate) fn total_size(sizes: impl IntoIterator<Item = u64>) -> u64 {
    sizes.into_iter().fold(0, u64::saturating_add)
}

/// The latest of a set of creation times.
///
/// RFC 3339 timestamps are compared as instants and rank above anything unparseable;
/// remaining ties fall back to string order. Empty strings are ignored.
pub fn last_updated<'a>(created: impl IntoIterator<Item = &'a str>) -> Option<String> {
    created
        .into_iter()
        .filter(|created| !created.is_empty())
        .max_by_key(|created| (DateTime::parse_from_rfc3339(created).ok(), *created))
        .map(str::to_owned)
}

/// Every repository in the registry with registry-wide totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrySummary {
    /// One summary per catalog entry, in catalog order.
    pub repositories: Vec<RepositorySummary>,

    /// Length of the catalog.
    pub total_repositories: usize,

    /// Number of tag entries across all repositories, placeholders included.
    pub total_tags: usize,

    /// Sum of all repository sizes.
    pub total_size: u64,
}

impl RegistrySummary {
    /// Fold repository summaries into registry totals.
    pub fn from_repositories(repositories: Vec<RepositorySummary>) -> Self {
        RegistrySummary {
            total_repositories: repositories.len(),
            total_tags: repositories.iter().map(|repo| repo.tags.len()).sum(),
            total_size: total_size(repositories.iter().map(|repo| repo.total_size)),
            repositories,
        }
    }
}

/// Summarize every repository in the catalog.
///
/// Fails only if the catalog itself cannot be listed.
#[tracing::instrument(skip(fanout))]
pub async fn summarize_registry(
    fanout: &Fanout,
) -> Result<RegistrySummary, RegistryClientError> {
    let repositories = fanout.catalog().await?;
    let scans = fanout.scan_all(&repositories).await;

    Ok(RegistrySummary::from_repositories(
        scans.into_iter().map(RepositorySummary::from_scan).collect(),
    ))
}

/// Summarize a single repository.
///
/// Unlike [`summarize_registry`], failing to list the repository's tags is an error.
#[tracing::instrument(skip(fanout))]
pub async fn summarize_repository(
    fanout: &Fanout,
    repository: &str,
) -> Result<RepositorySummary, RegistryClientError> {
    let scan = fanout.scan(repository).await;
    let tags = scan.tags?;
    Ok(RepositorySummary::from_scan(RepositoryScan {
        name: scan.name,
        tags: Ok(tags),
    }))
}
