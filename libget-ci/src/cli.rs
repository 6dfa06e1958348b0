///
/// This module implements the CLI interface for libget-ci: command parsing,
/// argument validation and the wiring of real clients into the core pipelines.
///
/// All business logic (manifest diffs, announcements, scaffolding) lives in the
/// [`libget-ci-core`] crate. This module is strictly CLI glue.
///
/// ## How To Use
/// - From CI: `libget-ci pr-comment <cdn_url>`, `libget-ci notify`, and so on; see `--help`.
/// - Programmatically / in integration tests: call [`run`] with a constructed [`Cli`].
///
/// Every path resolves against `--root` (default: the current directory).
///
/// [`libget-ci-core`]: ../../libget-ci-core/
use crate::load_config::{load_submission_credentials, Settings, CREDS_FILE};
use crate::serve::{run_server, ServerState, DEFAULT_PORT};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use libget_ci_core::announce::{BlueskyClient, DiscordWebhook};
use libget_ci_core::cdn::{CdnClient, PlatformRepoSource};
use libget_ci_core::comment::{load_updated_packages, run_manifest_report, ManifestReportConfig};
use libget_ci_core::commit::{read_packages_in_commit, write_packages_in_commit, SKIP_NOTIFY};
use libget_ci_core::contract::Announcer;
use libget_ci_core::notify::{notify_updates, Channels};
use libget_ci_core::platform::Platform;
use libget_ci_core::stage::{stage_package, StageConfig};
use std::path::PathBuf;

/// CI automation for the homebrew app repositories.
#[derive(Parser)]
#[clap(
    name = "libget-ci",
    version,
    about = "Manifest diffs, update announcements and package scaffolding for libget repositories"
)]
pub struct Cli {
    /// Working directory holding `packages/` and the report files
    #[clap(long, global = true, default_value = ".")]
    pub root: PathBuf,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compare rebuilt manifests with the published ones and write comment.md
    PrComment {
        /// CDN root the packages are published under
        cdn_url: String,
    },
    /// Announce the packages in updated_packages.txt on Discord and Bluesky
    Notify {
        #[clap(long, default_value = "wiiu")]
        platform: Platform,
    },
    /// Run the on-demand announcement server
    Serve {
        #[clap(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Write the packages mentioned in a commit message to packages_in_commit.txt
    CommitPackages {
        /// Full commit message
        message: String,
    },
    /// Create packages/<package>/pkgbuild.json
    Stage {
        package: String,
        #[clap(long, default_value = "wiiu")]
        platform: Platform,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    let root = cli.root;
    match cli.command {
        Commands::PrComment { cdn_url } => {
            tracing::info!(command = "pr-comment", cdn_url = %cdn_url, "Starting manifest report");
            let settings = Settings::from_env();
            let config = ManifestReportConfig {
                root,
                pr_number: settings.pr_number,
            };
            let packages = load_updated_packages(&config.packages_dir())?;
            let fetcher = CdnClient::new(&cdn_url).context("Failed to build CDN client")?;
            let report = run_manifest_report(&config, &fetcher, &packages).await?;
            tracing::info!(
                command = "pr-comment",
                reported = report.fragments.len(),
                skipped = report.skipped.len(),
                written = ?report.written,
                "Manifest report complete"
            );
        }
        Commands::Notify { platform } => {
            tracing::info!(command = "notify", platform = %platform, "Starting update notifications");
            let settings = Settings::from_env();
            let webhook = settings.discord_webhook()?;

            let in_commit = read_packages_in_commit(&root)
                .context("Failed to read packages_in_commit.txt")?;
            if in_commit.contains(SKIP_NOTIFY) {
                tracing::info!("[NOTIFY] Found skip_notify in commit, skipping notifications");
                return Ok(());
            }

            let packages = load_updated_packages(&root.join("packages"))?;
            let discord = DiscordWebhook::new(webhook).context("Failed to build Discord client")?;
            let bluesky = settings
                .bsky_auth
                .as_deref()
                .map(|password| {
                    BlueskyClient::new(settings.bsky_service.as_str(), settings.bsky_handle.as_str(), password)
                })
                .transpose()
                .context("Failed to build Bluesky client")?;
            let channels = Channels {
                discord: &discord,
                bluesky: bluesky.as_ref().map(|client| client as &dyn Announcer),
            };

            let deliveries = notify_updates(platform, &packages, &PlatformRepoSource, channels).await;
            let failed = deliveries.iter().filter(|d| d.outcome.is_err()).count();
            tracing::info!(
                command = "notify",
                delivered = deliveries.len() - failed,
                failed,
                "Update notifications complete"
            );
        }
        Commands::Serve { port } => {
            tracing::info!(command = "serve", port, "Starting notify server");
            let state = ServerState::from_settings(&Settings::from_env(), port)
                .context("Failed to build announcement clients")?;
            run_server(state)
                .await
                .with_context(|| format!("Notify server on port {port} failed"))?;
        }
        Commands::CommitPackages { message } => {
            tracing::info!(command = "commit-packages", "Scanning commit message for packages");
            let (path, count) = write_packages_in_commit(&root, &message)
                .with_context(|| format!("Failed to scan packages under {:?}", root.join("packages")))?;
            tracing::info!(command = "commit-packages", count, path = ?path, "Commit scan complete");
        }
        Commands::Stage { package, platform } => {
            tracing::info!(command = "stage", package = %package, platform = %platform, "Staging package");
            let credentials = load_submission_credentials(root.join(CREDS_FILE))?;
            let cdn = CdnClient::for_platform(platform).context("Failed to build CDN client")?;
            let config = StageConfig {
                root,
                package,
                credentials,
            };
            let report = stage_package(&cdn, &config).await?;
            tracing::info!(
                command = "stage",
                source = ?report.source,
                descriptor = ?report.descriptor,
                "Staging complete"
            );
        }
    }

    Ok(())
}
