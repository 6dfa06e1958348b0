//! Manifest report pipeline: local build output → published manifest → diff → PR comment.
//!
//! For every package rebuilt in this run the freshly built manifest is
//! compared with the one currently on the CDN and a Markdown fragment is
//! rendered. Fragments are joined into a single comment body that a later CI
//! step posts on the pull request.
//!
//! # Behaviour
//! - Packages without a local manifest are skipped with a warning.
//! - A package with nothing published (HTTP 404) is reported as new.
//! - Any other fetch failure is logged and also reported as new. A flaky CDN
//!   can therefore make a changed package look new; the warning line is the
//!   only way to tell the two apart.
//! - A local read error other than "missing" aborts the whole run.
//! - An empty package list writes nothing at all.
//!
//! # Navigation
//! - Main entrypoint: [`run_manifest_report`]
//! - Degrade policy: [`fetch_current_manifest`]

use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::contract::ManifestFetcher;
use crate::manifest::{read_local_manifest, Manifest};
use crate::report::{compose_comment, render, Fragment};

/// List of rebuilt packages written by the build step.
pub const UPDATED_PACKAGES_FILE: &str = "updated_packages.txt";
/// Rendered comment body.
pub const COMMENT_FILE: &str = "comment.md";
/// Pull request the comment belongs to.
pub const PR_NUMBER_FILE: &str = "pr_number.txt";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to read local manifest for {package}: {source}")]
    LocalManifest {
        package: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to read {path}: {source}")]
    PackageList {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Inputs of one report run.
#[derive(Debug, Clone)]
pub struct ManifestReportConfig {
    /// Directory holding `comment.md`/`pr_number.txt` and `packages/`.
    pub root: PathBuf,
    /// Pull request number from the CI environment, if any.
    pub pr_number: Option<String>,
}

impl ManifestReportConfig {
    pub fn packages_dir(&self) -> PathBuf {
        self.root.join("packages")
    }
}

/// What a run produced.
#[derive(Debug, Default)]
pub struct ManifestReport {
    pub fragments: Vec<Fragment>,
    pub skipped: Vec<String>,
    /// `None` when there was nothing to report.
    pub comment: Option<String>,
    pub written: Vec<PathBuf>,
}

/// Read `packages/updated_packages.txt`: comma separated, trimmed, blanks
/// dropped. A missing file means nothing was rebuilt.
pub fn load_updated_packages(packages_dir: &Path) -> Result<Vec<String>, ReportError> {
    let path = packages_dir.join(UPDATED_PACKAGES_FILE);
    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(parse_package_list(&content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "[MANIFEST] WARNING: No {UPDATED_PACKAGES_FILE} found");
            Ok(Vec::new())
        }
        Err(source) => Err(ReportError::PackageList { path, source }),
    }
}

/// Split a comma separated package list.
pub fn parse_package_list(content: &str) -> Vec<String> {
    content
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// Published manifest for `package`, degrading every failure to `None`.
pub async fn fetch_current_manifest<F>(fetcher: &F, package: &str) -> Option<Manifest>
where
    F: ManifestFetcher + ?Sized,
{
    match fetcher.fetch_manifest(package).await {
        Ok(Some(manifest)) => Some(manifest),
        Ok(None) => {
            info!(package, "[MANIFEST] No published manifest, treating as a new package");
            None
        }
        Err(e) => {
            warn!(
                package,
                error = %e,
                "[MANIFEST] WARNING: Could not fetch manifest for {package}: {e}"
            );
            None
        }
    }
}

/// Run the report for `packages`, writing the comment files under
/// `config.root`.
pub async fn run_manifest_report<F>(
    config: &ManifestReportConfig,
    fetcher: &F,
    packages: &[String],
) -> Result<ManifestReport, ReportError>
where
    F: ManifestFetcher + ?Sized,
{
    let mut report = ManifestReport::default();

    if packages.is_empty() {
        info!("[MANIFEST] No packages to process");
        return Ok(report);
    }

    let mut ordered: Vec<&String> = packages.iter().collect();
    ordered.sort();
    info!(count = ordered.len(), packages = ?ordered, "[MANIFEST] Found package(s) to report on");

    let packages_dir = config.packages_dir();
    for package in ordered {
        info!(package = %package, "[MANIFEST] Processing {package}...");

        let new_manifest = read_local_manifest(&packages_dir, package).map_err(|source| {
            ReportError::LocalManifest {
                package: package.clone(),
                source,
            }
        })?;
        let Some(new_manifest) = new_manifest else {
            info!(package = %package, "[MANIFEST] Skipping {package} - no local manifest found");
            report.skipped.push(package.clone());
            continue;
        };

        let old_manifest = fetch_current_manifest(fetcher, package).await;
        let fragment = render(package, old_manifest.as_ref(), &new_manifest);
        info!(package = %package, kind = fragment.kind(), "[MANIFEST] Rendered manifest fragment");
        report.fragments.push(fragment);
    }

    let comment = compose_comment(&report.fragments);
    report.written = save_comment(&config.root, &comment, config.pr_number.as_deref())?;
    report.comment = Some(comment);
    Ok(report)
}

/// Write `comment.md` and, when known, `pr_number.txt`.
pub fn save_comment(
    root: &Path,
    body: &str,
    pr_number: Option<&str>,
) -> Result<Vec<PathBuf>, ReportError> {
    let mut written = Vec::new();

    let comment_path = root.join(COMMENT_FILE);
    write_file(&comment_path, body)?;
    written.push(comment_path);

    if let Some(pr_number) = pr_number {
        let pr_path = root.join(PR_NUMBER_FILE);
        write_file(&pr_path, pr_number)?;
        written.push(pr_path);
    }

    info!(
        pr_number = pr_number.unwrap_or("none"),
        "[MANIFEST] Saved comment for PR #{} to {COMMENT_FILE}",
        pr_number.unwrap_or("?")
    );
    Ok(written)
}

fn write_file(path: &Path, content: &str) -> Result<(), ReportError> {
    std::fs::write(path, content).map_err(|source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    })
}
