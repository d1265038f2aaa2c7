//! Registry-wide statistics.
//!
//! Statistics are best effort: repositories whose tags cannot be listed are left out
//! entirely, and tags that cannot be resolved count toward their repository's tag
//! count without adding size or histogram entries.

use std::collections::BTreeMap;

use registry_client::RegistryClientError;
use serde::Serialize;

use crate::aggregate::{Fanout, RepositoryScan};

/// Number of entries kept in each ranking.
pub const TOP_N: usize = 10;

/// A repository's position in a ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryRanking {
    /// Repository name.
    pub name: String,

    /// Sum of the sizes of the repository's resolved tags.
    pub size: u64,

    /// Number of tags the registry listed.
    pub tags: usize,
}

/// Aggregate statistics for the whole registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    /// Length of the catalog, including repositories that were skipped.
    pub total_repositories: usize,

    /// Tags listed across all included repositories.
    pub total_tags: usize,

    /// Size of all resolved tags across included repositories.
    pub total_size: u64,

    /// Resolved tags per architecture.
    pub tags_by_architecture: BTreeMap<String, usize>,

    /// Resolved tags per operating system.
    pub tags_by_os: BTreeMap<String, usize>,

    /// Up to [`TOP_N`] repositories by size, largest first.
    pub largest_repositories: Vec<RepositoryRanking>,

    /// Up to [`TOP_N`] repositories by tag count, most tags first.
    pub most_tagged_repositories: Vec<RepositoryRanking>,
}

impl StatisticsSnapshot {
    /// Fold repository scans, given in catalog order.
    pub fn from_scans(
        total_repositories: usize,
        scans: impl IntoIterator<Item = RepositoryScan>,
    ) -> Self {
        let mut snapshot = StatisticsSnapshot {
            total_repositories,
            ..Default::default()
        };
        let mut rankings = Vec::new();

        for scan in scans {
            let tags = match scan.tags {
                Ok(tags) => tags,
                Err(error) => {
                    tracing::debug!(repository = %scan.name, %error, "skipping repository");
                    continue;
                }
            };

            let mut size = 0u64;
            for (_, outcome) in &tags {
                let Ok(details) = outcome else { continue };
                size = size.saturating_add(details.size);
                *snapshot
                    .tags_by_architecture
                    .entry(details.architecture.clone())
                    .or_default() += 1;
                *snapshot.tags_by_os.entry(details.os.clone()).or_default() += 1;
            }

            snapshot.total_tags += tags.len();
            snapshot.total_size = snapshot.total_size.saturating_add(size);
            rankings.push(RepositoryRanking {
                name: scan.name,
                size,
                tags: tags.len(),
            });
        }

        snapshot.largest_repositories = top(&rankings, |ranking| ranking.size);
        snapshot.most_tagged_repositories = top(&rankings, |ranking| ranking.tags as u64);
        snapshot
    }
}

/// The first [`TOP_N`] rankings by `key`, descending. Ties keep their input order.
fn top<F>(rankings: &[RepositoryRanking], key: F) -> Vec<RepositoryRanking>
where
    F: Fn(&RepositoryRanking) -> u64,
{
    let mut sorted = rankings.to_vec();
    sorted.sort_by(|a, b| key(b).cmp(&key(a)));
    sorted.truncate(TOP_N);
    sorted
}

/// Compute statistics for every repository in the catalog.
///
/// Fails only if the catalog itself cannot be listed.
#[tracing::instrument(skip(fanout))]
pub async fn compute_statistics(
    fanout: &Fanout,
) -> Result<StatisticsSnapshot, RegistryClientError> {
    let repositories = fanout.catalog().await?;
    let scans = fanout.scan_all(&repositories).await;
    Ok(StatisticsSnapshot::from_scans(repositories.len(), scans))
}
