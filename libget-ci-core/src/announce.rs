//! Update announcements: post content derived from the repo listing, and the
//! Discord webhook and Bluesky clients that publish it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::contract::{AnnounceError, Announcer};
use crate::platform::{Platform, ANNOUNCE_AVATAR_URL};
use crate::repo::RepoIndex;

/// Longest changelog/details excerpt carried by a post.
pub const EXCERPT_LIMIT: usize = 200;
/// Upper bound on a single request to an announcement channel.
pub const ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(10);

fn http_client(timeout: Duration) -> Result<reqwest::Client, AnnounceError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Everything an announcement says about one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagePost {
    pub platform: Platform,
    pub package: String,
    /// `"<title> by <author>"`, when both are known.
    pub title: Option<String>,
    /// Short description, with the licence in parentheses when known.
    pub description: Option<String>,
    pub changelog: Option<String>,
    pub details: Option<String>,
    pub version: Option<String>,
    pub icon_url: String,
    pub page_url: String,
}

impl PackagePost {
    /// Build a post from the listing. Unknown packages get a bare post.
    pub fn from_index(platform: Platform, package: &str, index: &RepoIndex) -> Self {
        let entry = index.get(package).cloned().unwrap_or_default();

        let title = match (entry.title, entry.author) {
            (Some(title), Some(author)) if !title.is_empty() && !author.is_empty() => {
                Some(format!("{title} by {author}"))
            }
            _ => None,
        };
        let description = non_empty(entry.description).map(|description| {
            match non_empty(entry.license) {
                Some(license) => format!("{description} ({license})"),
                None => description,
            }
        });

        Self {
            platform,
            package: package.to_string(),
            title,
            description,
            changelog: non_empty(entry.changelog).map(|c| excerpt(&c)),
            details: non_empty(entry.details).map(|d| excerpt(&d)),
            version: non_empty(entry.version),
            icon_url: format!("{}/packages/{}/icon.png", platform.cdn_url(), package),
            page_url: platform.store_page(package),
        }
    }

    /// `<title or package> (v<version>)`
    pub fn headline(&self) -> String {
        let name = self.title.as_deref().unwrap_or(&self.package);
        match &self.version {
            Some(version) => format!("{name} (v{version})"),
            None => name.to_string(),
        }
    }

    /// Changelog when there is one, otherwise the long description.
    pub fn summary(&self) -> Option<&str> {
        self.changelog.as_deref().or(self.details.as_deref())
    }

    /// Discord webhook payload.
    pub fn discord_payload(&self) -> Value {
        let description = [self.description.as_deref(), self.summary()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("\n\n");

        json!({
            "username": format!("{} App Update", self.platform.display_name()),
            "avatar_url": ANNOUNCE_AVATAR_URL,
            "tts": false,
            "embeds": [{
                "title": self.headline(),
                "type": "rich",
                "description": description,
                "url": self.page_url,
                "color": self.platform.embed_color(),
                "thumbnail": { "url": self.icon_url },
            }],
        })
    }

    /// Text of the Bluesky post.
    pub fn bluesky_text(&self) -> String {
        format!("{} App Update: {}", self.platform.display_name(), self.headline())
    }

    /// Title of the Bluesky link card: the post title with the description.
    pub fn bluesky_card_title(&self) -> String {
        match (&self.title, &self.description) {
            (Some(title), Some(description)) => format!("{title} - {description}"),
            (Some(title), None) => title.clone(),
            _ => self.package.clone(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Flatten escaped newlines and cut to [`EXCERPT_LIMIT`] characters.
pub fn excerpt(text: &str) -> String {
    let flat = text.replace("\\n", " ");
    if flat.chars().count() > EXCERPT_LIMIT {
        let cut: String = flat.chars().take(EXCERPT_LIMIT).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

/// Announces through a Discord webhook.
pub struct DiscordWebhook {
    client: reqwest::Client,
    webhook_url: String,
}

impl DiscordWebhook {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, AnnounceError> {
        Self::with_timeout(webhook_url, ANNOUNCE_TIMEOUT)
    }

    pub fn with_timeout(
        webhook_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AnnounceError> {
        Ok(Self {
            client: http_client(timeout)?,
            webhook_url: webhook_url.into(),
        })
    }
}

#[async_trait]
impl Announcer for DiscordWebhook {
    fn channel(&self) -> &'static str {
        "discord"
    }

    async fn announce(&self, post: &PackagePost) -> Result<(), AnnounceError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&post.discord_payload())
            .send()
            .await?;
        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            return Err(AnnounceError::Status {
                channel: "discord",
                status: status.as_u16(),
            });
        }
        info!(package = %post.package, "[NOTIFY] Discord webhook accepted announcement");
        Ok(())
    }
}

/// Default Bluesky PDS.
pub const BLUESKY_SERVICE: &str = "https://bsky.social";
/// Account the store posts from.
pub const BLUESKY_HANDLE: &str = "hb-app.store";

/// Announces as posts with a link card on Bluesky.
pub struct BlueskyClient {
    client: reqwest::Client,
    service: String,
    handle: String,
    app_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_jwt: String,
    did: String,
}

#[derive(Debug, Deserialize)]
struct UploadedBlob {
    blob: Value,
}

#[derive(Debug, Serialize)]
struct ExternalCard<'a> {
    uri: &'a str,
    title: String,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumb: Option<Value>,
}

impl BlueskyClient {
    /// Client with the default [`ANNOUNCE_TIMEOUT`] on every request.
    pub fn new(
        service: impl Into<String>,
        handle: impl Into<String>,
        app_password: impl Into<String>,
    ) -> Result<Self, AnnounceError> {
        Ok(Self {
            client: http_client(ANNOUNCE_TIMEOUT)?,
            service: service.into().trim_end_matches('/').to_string(),
            handle: handle.into(),
            app_password: app_password.into(),
        })
    }

    fn xrpc(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.service, method)
    }

    async fn create_session(&self) -> Result<Session, AnnounceError> {
        let response = self
            .client
            .post(self.xrpc("com.atproto.server.createSession"))
            .json(&json!({ "identifier": self.handle, "password": self.app_password }))
            .send()
            .await?;
        expect_success(response.status())?;
        Ok(response.json::<Session>().await?)
    }

    /// Fetch the package icon and upload it; `None` if there is no icon.
    async fn upload_icon(
        &self,
        session: &Session,
        icon_url: &str,
    ) -> Result<Option<Value>, AnnounceError> {
        let icon = self.client.get(icon_url).send().await?;
        if icon.status() != StatusCode::OK {
            debug!(icon_url, status = %icon.status(), "[NOTIFY] No icon to attach");
            return Ok(None);
        }
        let bytes = icon.bytes().await?;

        let response = self
            .client
            .post(self.xrpc("com.atproto.repo.uploadBlob"))
            .bearer_auth(&session.access_jwt)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(bytes)
            .send()
            .await?;
        expect_success(response.status())?;
        Ok(Some(response.json::<UploadedBlob>().await?.blob))
    }
}

fn expect_success(status: StatusCode) -> Result<(), AnnounceError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(AnnounceError::Status {
            channel: "bluesky",
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl Announcer for BlueskyClient {
    fn channel(&self) -> &'static str {
        "bluesky"
    }

    async fn announce(&self, post: &PackagePost) -> Result<(), AnnounceError> {
        let session = self.create_session().await?;
        let thumb = self.upload_icon(&session, &post.icon_url).await?;

        let card = ExternalCard {
            uri: &post.page_url,
            title: post.bluesky_card_title(),
            description: post.summary().unwrap_or_default(),
            thumb,
        };
        let record = json!({
            "repo": session.did,
            "collection": "app.bsky.feed.post",
            "record": {
                "$type": "app.bsky.feed.post",
                "text": post.bluesky_text(),
                "createdAt": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                "embed": {
                    "$type": "app.bsky.embed.external",
                    "external": card,
                },
            },
        });

        let response = self
            .client
            .post(self.xrpc("com.atproto.repo.createRecord"))
            .bearer_auth(&session.access_jwt)
            .json(&record)
            .send()
            .await?;
        expect_success(response.status())?;
        info!(package = %post.package, "[NOTIFY] Post with URL successfully sent to Bluesky");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::RepoPackage;

    fn index_with(entry: RepoPackage) -> RepoIndex {
        RepoIndex::from_packages(vec![entry])
    }

    fn full_entry() -> RepoPackage {
        RepoPackage {
            name: Some("appstore".into()),
            title: Some("App Store".into()),
            author: Some("vgmoose".into()),
            description: Some("Homebrew store".into()),
            license: Some("GPLv3".into()),
            changelog: Some("Fixed things\\nAdded stuff".into()),
            details: Some("Long details".into()),
            version: Some("2.3".into()),
            ..Default::default()
        }
    }

    #[test]
    fn post_is_derived_from_listing() {
        let post = PackagePost::from_index(Platform::WiiU, "appstore", &index_with(full_entry()));
        assert_eq!(post.title.as_deref(), Some("App Store by vgmoose"));
        assert_eq!(post.description.as_deref(), Some("Homebrew store (GPLv3)"));
        assert_eq!(post.changelog.as_deref(), Some("Fixed things Added stuff"));
        assert_eq!(post.headline(), "App Store by vgmoose (v2.3)");
        assert_eq!(
            post.icon_url,
            "https://wiiu.cdn.fortheusers.org/packages/appstore/icon.png"
        );
        assert_eq!(post.bluesky_text(), "WiiU App Update: App Store by vgmoose (v2.3)");
        assert_eq!(post.bluesky_card_title(), "App Store by vgmoose - Homebrew store (GPLv3)");
    }

    #[test]
    fn unknown_package_falls_back_to_its_name() {
        let post = PackagePost::from_index(Platform::Switch, "mystery", &RepoIndex::default());
        assert_eq!(post.headline(), "mystery");
        assert_eq!(post.bluesky_card_title(), "mystery");
        assert_eq!(post.summary(), None);
    }

    #[test]
    fn excerpts_are_cut_at_the_limit() {
        let long = "x".repeat(250);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), EXCERPT_LIMIT + 3);
        assert!(cut.ends_with("..."));
        assert_eq!(excerpt(&"y".repeat(EXCERPT_LIMIT)), "y".repeat(EXCERPT_LIMIT));
    }

    #[test]
    fn discord_payload_shape() {
        let post = PackagePost::from_index(Platform::WiiU, "appstore", &index_with(full_entry()));
        let payload = post.discord_payload();
        assert_eq!(payload["username"], "WiiU App Update");
        assert_eq!(payload["tts"], false);
        let embed = &payload["embeds"][0];
        assert_eq!(embed["title"], "App Store by vgmoose (v2.3)");
        assert_eq!(embed["type"], "rich");
        assert_eq!(embed["color"], 0x0098c6);
        assert_eq!(embed["url"], "https://hb-app.store/wiiu/appstore");
        assert_eq!(
            embed["description"],
            "Homebrew store (GPLv3)\n\nFixed things Added stuff"
        );
        assert_eq!(
            embed["thumbnail"]["url"],
            "https://wiiu.cdn.fortheusers.org/packages/appstore/icon.png"
        );
    }
}
