//! Packages mentioned in a commit message.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Output of the commit scan, one entry per line.
pub const PACKAGES_IN_COMMIT_FILE: &str = "packages_in_commit.txt";
/// Commit keyword that suppresses update announcements.
pub const SKIP_NOTIFY: &str = "skip_notify";
/// Commit keyword that selects every package.
pub const FORCE_REFRESH_ALL: &str = "force_refresh_all";

/// Names of the package directories under `packages_dir`.
pub fn list_packages(packages_dir: &Path) -> io::Result<BTreeSet<String>> {
    let mut packages = BTreeSet::new();
    for entry in std::fs::read_dir(packages_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            packages.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(packages)
}

/// Select the packages whose names occur in `message`.
///
/// `skip_notify` in the message is passed through as a marker;
/// `force_refresh_all` selects every known package instead.
pub fn packages_in_commit(known: &BTreeSet<String>, message: &str) -> BTreeSet<String> {
    if message.contains(FORCE_REFRESH_ALL) {
        return known.clone();
    }

    let mut selected: BTreeSet<String> = known
        .iter()
        .filter(|package| message.contains(package.as_str()))
        .cloned()
        .collect();
    if message.contains(SKIP_NOTIFY) {
        selected.insert(SKIP_NOTIFY.to_string());
    }
    selected
}

/// Scan `<root>/packages` against `message` and write the selection to
/// `<root>/packages_in_commit.txt`.
pub fn write_packages_in_commit(root: &Path, message: &str) -> io::Result<(PathBuf, usize)> {
    let known = list_packages(&root.join("packages"))?;
    let selected = packages_in_commit(&known, message);

    let path = root.join(PACKAGES_IN_COMMIT_FILE);
    let content: String = selected.iter().map(|p| format!("{p}\n")).collect();
    std::fs::write(&path, content)?;

    info!(count = selected.len(), path = %path.display(), "[COMMIT] Wrote to {PACKAGES_IN_COMMIT_FILE}, count: {}", selected.len());
    Ok((path, selected.len()))
}

/// Entries of `<root>/packages_in_commit.txt`; empty when the file is absent.
pub fn read_packages_in_commit(root: &Path) -> io::Result<BTreeSet<String>> {
    let path = root.join(PACKAGES_IN_COMMIT_FILE);
    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "[COMMIT] No {PACKAGES_IN_COMMIT_FILE} found");
            Ok(BTreeSet::new())
        }
        Err(e) => Err(e),
    }
}
