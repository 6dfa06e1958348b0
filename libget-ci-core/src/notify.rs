//! Announcing package updates, as a CI batch and as on-demand requests.
//!
//! Announcements are best effort: each channel gets one attempt per package,
//! failures are logged, and one package's failure never stops the others.

use serde::Deserialize;
use tracing::{info, warn};

use crate::announce::PackagePost;
use crate::contract::{Announcer, RepoIndexSource};
use crate::platform::Platform;
use crate::repo::RepoIndex;

/// Result of announcing one package on one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub package: String,
    pub channel: &'static str,
    pub outcome: Result<(), String>,
}

/// Channels an update is announced on.
pub struct Channels<'a> {
    pub discord: &'a dyn Announcer,
    /// `None` when Bluesky credentials are not configured.
    pub bluesky: Option<&'a dyn Announcer>,
}

async fn deliver(announcer: &dyn Announcer, post: &PackagePost) -> Delivery {
    let outcome = match announcer.announce(post).await {
        Ok(()) => {
            info!(package = %post.package, channel = announcer.channel(), "[NOTIFY] Notification sent for {}", post.package);
            Ok(())
        }
        Err(e) => {
            warn!(
                package = %post.package,
                channel = announcer.channel(),
                error = %e,
                "[NOTIFY] Failed to send notification for {}: {e}",
                post.package
            );
            Err(e.to_string())
        }
    };
    Delivery {
        package: post.package.clone(),
        channel: announcer.channel(),
        outcome,
    }
}

/// Announce every package in `packages` on every configured channel.
///
/// If the listing cannot be fetched the run continues with bare posts and
/// Bluesky is left out, since its link cards need listing data.
pub async fn notify_updates<R>(
    platform: Platform,
    packages: &[String],
    repo_source: &R,
    channels: Channels<'_>,
) -> Vec<Delivery>
where
    R: RepoIndexSource + ?Sized,
{
    let mut bluesky = channels.bluesky;
    if bluesky.is_none() {
        info!("[NOTIFY] Bluesky not configured, skipping Bluesky announcements");
    }

    let index = match repo_source.fetch_repo_index(platform).await {
        Ok(index) => index,
        Err(e) => {
            warn!(platform = %platform, error = %e, "[NOTIFY] Failed to fetch repo data");
            bluesky = None;
            RepoIndex::default()
        }
    };

    let mut deliveries = Vec::new();
    for package in packages.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        let post = PackagePost::from_index(platform, package, &index);
        deliveries.push(deliver(channels.discord, &post).await);
        match bluesky {
            Some(announcer) => deliveries.push(deliver(announcer, &post).await),
            None => info!(package, "[NOTIFY] bsky not loaded, skipping bsky announcement for {package}"),
        }
    }
    deliveries
}

/// Query string of an on-demand announcement request. Flags are set when
/// present with any non-empty value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyQuery {
    pub key: Option<String>,
    pub platform: Option<String>,
    pub package: Option<String>,
    pub bsky: Option<String>,
    pub discord: Option<String>,
}

fn flag(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

fn given(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Serves on-demand announcements guarded by a shared key.
pub struct NotifyService<R> {
    pub announce_key: Option<String>,
    pub repo_source: R,
    pub discord: Option<Box<dyn Announcer>>,
    pub bluesky: Option<Box<dyn Announcer>>,
}

impl<R: RepoIndexSource> NotifyService<R> {
    /// Validate and carry out one request, returning the plain-text answer.
    pub async fn handle(&self, query: &NotifyQuery) -> String {
        let Some(expected) = self.announce_key.as_deref() else {
            return "No announce key set in environment variables".to_string();
        };
        if query.key.as_deref() != Some(expected) {
            warn!("[NOTIFY] Rejected request with invalid announce key");
            return "Invalid announce key".to_string();
        }
        let Some(platform) = given(&query.platform) else {
            return "No platform specified".to_string();
        };
        let platform: Platform = match platform.parse() {
            Ok(platform) => platform,
            Err(e) => return e.to_string(),
        };

        let index = match self.repo_source.fetch_repo_index(platform).await {
            Ok(index) => index,
            Err(e) => {
                warn!(platform = %platform, error = %e, "[NOTIFY] Failed to fetch repo data");
                RepoIndex::default()
            }
        };

        let Some(package) = given(&query.package) else {
            return "No package specified".to_string();
        };
        if !index.contains(package) {
            return format!("Package {package} not found in repo data");
        }

        let (announcer, name) = if flag(&query.bsky) {
            (self.bluesky.as_deref(), "Bluesky")
        } else if flag(&query.discord) {
            (self.discord.as_deref(), "Discord")
        } else {
            return "No announce method specified".to_string();
        };
        let Some(announcer) = announcer else {
            info!(package, "[NOTIFY] {name} not configured, skipping announcement for {package}");
            return format!("{name} is not configured");
        };

        let post = PackagePost::from_index(platform, package, &index);
        match deliver(announcer, &post).await.outcome {
            Ok(()) => format!("Notification sent for {package}"),
            Err(e) => format!("Failed to send notification for {package}: {e}"),
        }
    }
}
