/// `load_config` module: collects runtime settings for the CLI.
///
/// Two sources feed the commands:
/// - the process environment (optionally seeded from `.env` by `main`), read once
///   into [`Settings`];
/// - `creds.json`, holding the submission queue login used by `stage`.
///
/// # Errors
/// All errors in this module use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{anyhow, Result};
use libget_ci_core::announce::{BLUESKY_HANDLE, BLUESKY_SERVICE};
use libget_ci_core::stage::SubmissionCredentials;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{error, info, warn};

/// Submission queue login, next to `packages/`.
pub const CREDS_FILE: &str = "creds.json";

/// Environment the commands read. Blank variables count as unset.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub github_token: Option<String>,
    pub github_repository: Option<String>,
    pub pr_number: Option<String>,
    pub discord_webhook_url: Option<String>,
    /// Bluesky app password; Bluesky is disabled without it.
    pub bsky_auth: Option<String>,
    pub bsky_handle: String,
    pub bsky_service: String,
    pub announce_key: Option<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let settings = Self {
            github_token: get("GITHUB_TOKEN"),
            github_repository: get("GITHUB_REPOSITORY"),
            pr_number: get("PR_NUMBER"),
            discord_webhook_url: get("DISCORD_WEBHOOK_URL"),
            bsky_auth: get("BSKY_AUTH"),
            bsky_handle: get("BSKY_HANDLE").unwrap_or_else(|| BLUESKY_HANDLE.to_string()),
            bsky_service: get("BSKY_SERVICE").unwrap_or_else(|| BLUESKY_SERVICE.to_string()),
            announce_key: get("ANNOUNCE_KEY"),
        };
        info!(
            github_repository = settings.github_repository.as_deref().unwrap_or("none"),
            pr_number = settings.pr_number.as_deref().unwrap_or("none"),
            github_token = settings.github_token.is_some(),
            discord = settings.discord_webhook_url.is_some(),
            bluesky = settings.bsky_auth.is_some(),
            announce_key = settings.announce_key.is_some(),
            "Loaded settings from environment"
        );
        settings
    }

    /// The Discord webhook, which `notify` cannot run without.
    pub fn discord_webhook(&self) -> Result<&str> {
        self.discord_webhook_url
            .as_deref()
            .ok_or_else(|| anyhow!("DISCORD_WEBHOOK_URL is not set"))
    }
}

/// Loads the submission queue login. A missing file is not an error: `stage`
/// then only seeds from the listing or the empty template.
pub fn load_submission_credentials<P: AsRef<Path>>(path: P) -> Result<Option<SubmissionCredentials>> {
    let path_ref = path.as_ref();
    info!(creds_path = ?path_ref, "Loading submission credentials from file");

    let content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(creds_path = ?path_ref, "[STAGE] No {CREDS_FILE} found, submissions will not be checked");
            return Ok(None);
        }
        Err(e) => {
            error!(error = ?e, creds_path = ?path_ref, "Failed to read credentials file");
            return Err(anyhow!("Failed to read credentials file {:?}: {}", path_ref, e));
        }
    };

    let creds: SubmissionCredentials = match serde_json::from_str(&content) {
        Ok(creds) => {
            info!(creds_path = ?path_ref, "Parsed credentials JSON successfully");
            creds
        }
        Err(e) => {
            error!(error = ?e, creds_path = ?path_ref, "Failed to parse credentials JSON");
            return Err(anyhow!("Failed to parse credentials JSON: {e}"));
        }
    };

    if !creds.is_complete() {
        warn!(creds_path = ?path_ref, "[STAGE] Submission credentials are incomplete");
    }
    Ok(Some(creds))
}
