//! Scaffolding of a package build descriptor (`pkgbuild.json`).
//!
//! A new package folder is seeded from the best source available, in order:
//! the package's entry in the published listing, a pending entry in the
//! submission queue, or an empty template.

use std::io;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::cdn::CdnClient;
use crate::contract::FetchError;
use crate::repo::RepoPackage;

/// Descriptor file name inside a package folder.
pub const PKGBUILD_FILE: &str = "pkgbuild.json";
/// Install path used for the binary asset when the listing has none.
pub const DEFAULT_BINARY_DEST: &str = "/wiiu/apps/path/etc.wuhb";

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("failed to download repo.json: {0}")]
    RepoListing(#[source] FetchError),
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialise pkgbuild.json: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StageError + '_ {
    move |source| StageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Read `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PkgInfo {
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub author: String,
    #[serde(deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub license: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub details: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipRule {
    pub path: String,
    pub dest: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PkgAsset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<Vec<ZipRule>>,
    /// Keys this tool does not interpret, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PkgAsset {
    fn file(kind: &str, url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            kind: Some(kind.to_string()),
            dest: None,
            zip: None,
            extra: Map::new(),
        }
    }
}

/// Contents of `pkgbuild.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PkgBuild {
    pub package: String,
    #[serde(default)]
    pub info: PkgInfo,
    #[serde(default, deserialize_with = "null_as_default")]
    pub changelog: String,
    #[serde(default)]
    pub assets: Vec<PkgAsset>,
    /// Top-level keys carried over from a submission.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PkgBuild {
    /// Empty template for `package`.
    pub fn template(package: &str) -> Self {
        Self {
            package: package.to_string(),
            info: PkgInfo::default(),
            changelog: String::new(),
            assets: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Template seeded from a listing entry: every info field the entry
    /// carries is copied, plus placeholder archive and binary assets.
    pub fn from_repo_entry(package: &str, entry: &RepoPackage) -> Self {
        let mut build = Self::template(package);
        let copy = |field: &mut String, value: &Option<String>| {
            if let Some(value) = value {
                *field = value.clone();
            }
        };
        copy(&mut build.info.title, &entry.title);
        copy(&mut build.info.author, &entry.author);
        copy(&mut build.info.category, &entry.category);
        copy(&mut build.info.version, &entry.version);
        copy(&mut build.info.url, &entry.url);
        copy(&mut build.info.license, &entry.license);
        copy(&mut build.info.description, &entry.description);
        copy(&mut build.info.details, &entry.details);
        copy(&mut build.changelog, &entry.changelog);

        build.assets.push(PkgAsset {
            url: Some("https://example.com/file.zip".to_string()),
            kind: Some("zip".to_string()),
            dest: None,
            zip: Some(vec![ZipRule {
                path: "/**/*".to_string(),
                dest: "/".to_string(),
                kind: "update".to_string(),
            }]),
            extra: Map::new(),
        });
        build.assets.push(PkgAsset {
            url: Some("https://example.com/file.nro".to_string()),
            kind: Some("update".to_string()),
            dest: Some(
                entry
                    .binary
                    .clone()
                    .unwrap_or_else(|| DEFAULT_BINARY_DEST.to_string()),
            ),
            zip: None,
            extra: Map::new(),
        });
        build
    }
}

/// Login for the submission queue, as stored in `creds.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmissionCredentials {
    pub submission_endpoint: String,
    pub submission_username: String,
    pub submission_authkey: String,
}

impl SubmissionCredentials {
    pub fn is_complete(&self) -> bool {
        !self.submission_endpoint.is_empty()
            && !self.submission_username.is_empty()
            && !self.submission_authkey.is_empty()
    }
}

/// An asset as sent with a submission; image data may be inlined. Keys
/// other than these pass through untouched.
#[derive(Debug, Clone, Deserialize)]
struct SubmittedAsset {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Submission keys that describe the queue entry, not the package.
const QUEUE_ONLY_KEYS: [&str; 3] = ["console", "submitter", "type"];

/// The `pkg` object of a submission.
#[derive(Debug, Clone, Deserialize)]
struct SubmittedPackage {
    package: String,
    #[serde(default, deserialize_with = "null_as_default")]
    info: PkgInfo,
    #[serde(default)]
    changelog: Option<String>,
    /// Legacy name of `changelog`; wins when present.
    #[serde(default)]
    changes: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    assets: Vec<SubmittedAsset>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Decode the payload of a `data:` URI (`data:image/png;base64,<payload>`).
fn decode_data_uri(data: &str) -> Option<Vec<u8>> {
    let (_, payload) = data.split_once(',')?;
    base64::engine::general_purpose::STANDARD.decode(payload).ok()
}

/// Turn a submission into a descriptor. Everything is kept except the queue
/// bookkeeping keys and the `format`/`data` of assets; base64 images are
/// written next to the descriptor as `<type>.png`.
fn convert_submission(
    submitted: SubmittedPackage,
    package_dir: &Path,
) -> Result<PkgBuild, StageError> {
    let mut assets = Vec::new();
    for asset in submitted.assets {
        let SubmittedAsset {
            kind,
            mut url,
            format,
            data,
            extra,
        } = asset;
        if let (Some("base64"), Some(data)) = (format.as_deref(), data) {
            let Some((kind, bytes)) = kind.as_deref().zip(decode_data_uri(&data)) else {
                warn!(
                    kind = kind.as_deref().unwrap_or("none"),
                    "[STAGE] Error processing an asset, skipping"
                );
                continue;
            };
            let file_name = format!("{kind}.png");
            let path = package_dir.join(&file_name);
            std::fs::write(&path, bytes).map_err(io_err(&path))?;
            info!(path = %path.display(), "[STAGE] Wrote inlined asset");
            url = Some(file_name);
        }
        assets.push(PkgAsset {
            url,
            kind,
            dest: None,
            zip: None,
            extra,
        });
    }

    let mut extra = submitted.extra;
    for key in QUEUE_ONLY_KEYS {
        extra.remove(key);
    }

    Ok(PkgBuild {
        package: submitted.package,
        info: submitted.info,
        changelog: submitted.changes.or(submitted.changelog).unwrap_or_default(),
        assets,
        extra,
    })
}

/// Where a descriptor's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSource {
    Repo,
    Submission,
    Empty,
}

#[derive(Debug, Clone)]
pub struct StageReport {
    pub source: StageSource,
    pub descriptor: PathBuf,
    pub build: PkgBuild,
}

/// Inputs of one scaffolding run.
#[derive(Debug, Clone)]
pub struct StageConfig {
    /// Directory holding `packages/`.
    pub root: PathBuf,
    pub package: String,
    pub credentials: Option<SubmissionCredentials>,
}

/// Create `packages/<package>/pkgbuild.json`, downloading images alongside.
pub async fn stage_package(cdn: &CdnClient, config: &StageConfig) -> Result<StageReport, StageError> {
    let package = config.package.as_str();
    let index = cdn.fetch_index().await.map_err(StageError::RepoListing)?;

    let package_dir = config.root.join("packages").join(package);
    std::fs::create_dir_all(&package_dir).map_err(io_err(&package_dir))?;

    let (source, build) = match index.get(package) {
        Some(entry) => {
            let mut build = PkgBuild::from_repo_entry(package, entry);
            download_images(cdn, package, entry.screens.unwrap_or(0), &package_dir, &mut build).await?;
            (StageSource::Repo, build)
        }
        None => match find_submission(cdn, config, package).await {
            Some(submitted) => {
                (StageSource::Submission, convert_submission(submitted, &package_dir)?)
            }
            None => {
                info!(package, "[STAGE] Package {package} not found in repo.json, or recent submissions, making empty {PKGBUILD_FILE}");
                (StageSource::Empty, PkgBuild::template(package))
            }
        },
    };

    let descriptor = package_dir.join(PKGBUILD_FILE);
    write_descriptor(&descriptor, &build)?;
    info!(package, source = ?source, path = %descriptor.display(), "[STAGE] Created new package folder for {package} in packages");
    Ok(StageReport {
        source,
        descriptor,
        build,
    })
}

async fn download_images(
    cdn: &CdnClient,
    package: &str,
    screens: u32,
    package_dir: &Path,
    build: &mut PkgBuild,
) -> Result<(), StageError> {
    let names = ["icon".to_string(), "screen".to_string()]
        .into_iter()
        .chain((1..=screens).map(|i| format!("screen{i}")));

    for name in names {
        let file_name = format!("{name}.png");
        let bytes = match cdn.fetch_package_file(package, &file_name).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => continue,
            Err(e) => {
                warn!(package, file = %file_name, error = %e, "[STAGE] Failed to download image");
                continue;
            }
        };
        let path = package_dir.join(&file_name);
        std::fs::write(&path, bytes).map_err(io_err(&path))?;

        let kind = match name.as_str() {
            "icon" => "icon",
            "screen" => "banner",
            _ => "screenshot",
        };
        build.assets.push(PkgAsset::file(kind, &file_name));
    }
    Ok(())
}

/// First pending submission for `package`, if the queue is reachable.
/// The queue is read with the CDN client, so the same request timeout applies.
async fn find_submission(
    cdn: &CdnClient,
    config: &StageConfig,
    package: &str,
) -> Option<SubmittedPackage> {
    let Some(creds) = config.credentials.as_ref().filter(|c| c.is_complete()) else {
        warn!("[STAGE] No credentials found for package submission endpoint");
        return None;
    };

    let response = cdn
        .http()
        .get(&creds.submission_endpoint)
        .basic_auth(&creds.submission_username, Some(&creds.submission_authkey))
        .send()
        .await;
    let entries: Vec<Value> = match response {
        Ok(response) if response.status().is_success() => match response.json().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "[STAGE] Recent submissions are not a JSON list");
                return None;
            }
        },
        Ok(response) => {
            warn!(status = %response.status(), "[STAGE] Failed to download recent submissions");
            return None;
        }
        Err(e) => {
            warn!(error = %e, "[STAGE] Failed to download recent submissions");
            return None;
        }
    };

    let pkg = entries
        .into_iter()
        .filter_map(|mut entry| entry.get_mut("pkg").map(Value::take))
        .find(|pkg| pkg.get("package").and_then(Value::as_str) == Some(package))?;
    match serde_json::from_value::<SubmittedPackage>(pkg) {
        Ok(submitted) => {
            info!(package, "[STAGE] Found package in recent submissions");
            Some(submitted)
        }
        Err(e) => {
            warn!(package, error = %e, "[STAGE] Submission for {package} is malformed");
            None
        }
    }
}

/// Write `build` as JSON indented by four spaces.
pub fn write_descriptor(path: &Path, build: &PkgBuild) -> Result<(), StageError> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    build.serialize(&mut serializer)?;
    std::fs::write(path, out).map_err(io_err(path))
}
