//! HTTP client for the published repository on the CDN.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info};

use crate::contract::{FetchError, ManifestFetcher, RepoIndexSource};
use crate::manifest::{Manifest, MANIFEST_FILE};
use crate::platform::Platform;
use crate::repo::RepoIndex;

/// Upper bound on a single CDN request.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Reads manifests and listings from a CDN root such as
/// `https://wiiu.cdn.fortheusers.org`.
#[derive(Debug, Clone)]
pub struct CdnClient {
    client: reqwest::Client,
    base_url: String,
}

impl CdnClient {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        Self::with_timeout(base_url, FETCH_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Client for the platform's own CDN root.
    pub fn for_platform(platform: Platform) -> Result<Self, FetchError> {
        Self::new(&platform.cdn_url())
    }

    /// Underlying HTTP client, configured with this client's timeout.
    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `<cdn>/packages/<package>/<file>`
    pub fn package_file_url(&self, package: &str, file: &str) -> String {
        format!("{}/packages/{}/{}", self.base_url, package, file)
    }

    /// Fetch the listing at `<cdn>/repo.json`.
    pub async fn fetch_index(&self) -> Result<RepoIndex, FetchError> {
        let url = format!("{}/repo.json", self.base_url);
        info!(url = %url, "Fetching repo listing");
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }
        let body = response.text().await?;
        let index = RepoIndex::from_json(&body)?;
        debug!(packages = index.len(), "Parsed repo listing");
        Ok(index)
    }

    /// Download a package file. `Ok(None)` for any non-200 answer.
    pub async fn fetch_package_file(
        &self,
        package: &str,
        file: &str,
    ) -> Result<Option<Vec<u8>>, FetchError> {
        let url = self.package_file_url(package, file);
        let response = self.client.get(&url).send().await?;
        if response.status() != StatusCode::OK {
            debug!(url = %url, status = %response.status(), "Package file not available");
            return Ok(None);
        }
        Ok(Some(response.bytes().await?.to_vec()))
    }
}

#[async_trait]
impl ManifestFetcher for CdnClient {
    async fn fetch_manifest(&self, package: &str) -> Result<Option<Manifest>, FetchError> {
        let url = self.package_file_url(package, MANIFEST_FILE);
        debug!(package, url = %url, "[MANIFEST] Fetching published manifest");
        let response = self.client.get(&url).send().await?;
        match response.status() {
            StatusCode::OK => {
                let body = response.text().await?;
                Ok(Some(Manifest::parse(&body)))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(FetchError::Status {
                status: status.as_u16(),
                url,
            }),
        }
    }
}

/// Fetches listings from each platform's own CDN root.
#[derive(Debug, Clone, Default)]
pub struct PlatformRepoSource;

#[async_trait]
impl RepoIndexSource for PlatformRepoSource {
    async fn fetch_repo_index(&self, platform: Platform) -> Result<RepoIndex, FetchError> {
        CdnClient::for_platform(platform)?.fetch_index().await
    }
}

#[async_trait]
impl RepoIndexSource for CdnClient {
    async fn fetch_repo_index(&self, _platform: Platform) -> Result<RepoIndex, FetchError> {
        self.fetch_index().await
    }
}
