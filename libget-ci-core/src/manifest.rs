//! Package manifests: the ordered list of files a package installs.
//!
//! A manifest is compared line by line, so parsing normalises it once: every
//! line is trimmed and blank lines are dropped. Two manifests built from text
//! with different line terminators or stray indentation therefore compare
//! equal.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of a manifest, both locally and on the CDN.
pub const MANIFEST_FILE: &str = "manifest.install";

/// Ordered, trimmed, non-blank manifest lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    lines: Vec<String>,
}

impl Manifest {
    /// Parse manifest text. Handles `\n` and `\r\n` terminators alike.
    pub fn parse(content: &str) -> Self {
        let lines = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// The manifest as text, one path per line, no trailing newline.
    pub fn to_text(&self) -> String {
        self.lines.join("\n")
    }
}

impl<S: Into<String>> FromIterator<S> for Manifest {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let text: Vec<String> = iter.into_iter().map(Into::into).collect();
        Self::parse(&text.join("\n"))
    }
}

/// `packages/<package>/manifest.install` under `packages_dir`.
pub fn local_manifest_path(packages_dir: &Path, package: &str) -> PathBuf {
    packages_dir.join(package).join(MANIFEST_FILE)
}

/// Read the freshly built manifest for `package`.
///
/// A missing file is `Ok(None)`: the build produced nothing for this package
/// and the caller skips it. Any other I/O failure, including invalid UTF-8,
/// is returned as an error.
pub fn read_local_manifest(packages_dir: &Path, package: &str) -> io::Result<Option<Manifest>> {
    let path = local_manifest_path(packages_dir, package);
    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let manifest = Manifest::parse(&content);
            debug!(package, path = %path.display(), lines = manifest.len(), "[MANIFEST] Read local manifest");
            Ok(Some(manifest))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(
                package,
                path = %path.display(),
                "[MANIFEST] WARNING: Could not find local manifest for {package} at {}",
                path.display()
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_trims_and_drops_blank_lines() {
        let manifest = Manifest::parse("  U /a.elf \r\n\r\n\tU /b.txt\n   \n");
        assert_eq!(manifest.lines(), &["U /a.elf", "U /b.txt"]);
    }

    #[test]
    fn terminators_do_not_affect_equality() {
        assert_eq!(Manifest::parse("a\r\nb\r\n"), Manifest::parse("a\nb"));
    }

    #[test]
    fn missing_local_manifest_is_none() {
        let dir = tempdir().unwrap();
        let manifest = read_local_manifest(dir.path(), "ghost").unwrap();
        assert!(manifest.is_none());
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let dir = tempdir().unwrap();
        let pkg_dir = dir.path().join("broken");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(pkg_dir.join(MANIFEST_FILE), [0xff, 0xfe, 0x00]).unwrap();

        assert!(read_local_manifest(dir.path(), "broken").is_err());
    }

    #[test]
    fn reads_existing_manifest() {
        let dir = tempdir().unwrap();
        let pkg_dir = dir.path().join("appstore");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(pkg_dir.join(MANIFEST_FILE), "U /wiiu/apps/appstore.wuhb\n\n").unwrap();

        let manifest = read_local_manifest(dir.path(), "appstore").unwrap().unwrap();
        assert_eq!(manifest.to_text(), "U /wiiu/apps/appstore.wuhb");
    }
}
