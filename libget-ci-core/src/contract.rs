//! # contract: network seams of the pipeline
//!
//! Every remote the pipeline talks to sits behind one of the traits below so
//! that orchestration code can be driven by real clients in production and by
//! `mockall` mocks in tests.
//!
//! - [`ManifestFetcher`]: the published manifest of a package on the CDN.
//! - [`RepoIndexSource`]: the published `repo.json` listing of a platform.
//! - [`Announcer`]: a social channel that announces package updates.

use async_trait::async_trait;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::announce::PackagePost;
use crate::manifest::Manifest;
use crate::platform::Platform;
use crate::repo::RepoIndex;

/// Failure talking to the CDN. "Not found" is not a failure; fetchers report
/// it as `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("invalid repo listing: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure announcing on a channel.
#[derive(Debug, thiserror::Error)]
pub enum AnnounceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{channel} responded with status {status}")]
    Status { channel: &'static str, status: u16 },
}

/// Source of previously published manifests.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ManifestFetcher: Send + Sync {
    /// `Ok(Some)` on success, `Ok(None)` when nothing is published for the
    /// package, `Err` on any other outcome.
    async fn fetch_manifest(&self, package: &str) -> Result<Option<Manifest>, FetchError>;
}

/// Source of a platform's repository listing.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RepoIndexSource: Send + Sync {
    async fn fetch_repo_index(&self, platform: Platform) -> Result<RepoIndex, FetchError>;
}

#[async_trait]
impl<T: RepoIndexSource + ?Sized> RepoIndexSource for Box<T> {
    async fn fetch_repo_index(&self, platform: Platform) -> Result<RepoIndex, FetchError> {
        (**self).fetch_repo_index(platform).await
    }
}

/// A channel package updates are announced on.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Announcer: Send + Sync {
    /// Short channel name used in logs.
    fn channel(&self) -> &'static str;

    /// Publish one announcement. Delivery is attempted once.
    async fn announce(&self, post: &PackagePost) -> Result<(), AnnounceError>;
}
