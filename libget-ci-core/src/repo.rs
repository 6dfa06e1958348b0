//! The published repository listing (`repo.json`).

use serde::Deserialize;
use std::collections::BTreeMap;

/// One package as listed in `repo.json`. Every field is optional; the
/// listing is produced by an external tool and keys come and go.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RepoPackage {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub changelog: Option<String>,
    #[serde(default)]
    pub binary: Option<String>,
    #[serde(default)]
    pub screens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RepoListing {
    #[serde(default)]
    packages: Vec<RepoPackage>,
}

/// Repository listing keyed by package name. Built fresh for every use and
/// handed around by value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepoIndex {
    packages: BTreeMap<String, RepoPackage>,
}

impl RepoIndex {
    /// Parse a `repo.json` body. Entries without a name are ignored; when a
    /// name repeats, the first entry wins.
    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        let listing: RepoListing = serde_json::from_str(body)?;
        Ok(Self::from_packages(listing.packages))
    }

    pub fn from_packages(packages: impl IntoIterator<Item = RepoPackage>) -> Self {
        let mut index = BTreeMap::new();
        for package in packages {
            if let Some(name) = package.name.clone() {
                index.entry(name).or_insert(package);
            }
        }
        Self { packages: index }
    }

    pub fn get(&self, name: &str) -> Option<&RepoPackage> {
        self.packages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_named_packages() {
        let body = r#"{
            "packages": [
                {"name": "appstore", "title": "App Store", "screens": 2, "extra": true},
                {"title": "nameless"},
                {"name": "appstore", "title": "duplicate"}
            ]
        }"#;
        let index = RepoIndex::from_json(body).unwrap();
        assert_eq!(index.len(), 1);
        let entry = index.get("appstore").unwrap();
        assert_eq!(entry.title.as_deref(), Some("App Store"));
        assert_eq!(entry.screens, Some(2));
        assert_eq!(entry.author, None);
    }

    #[test]
    fn listing_without_packages_is_empty() {
        assert!(RepoIndex::from_json("{}").unwrap().is_empty());
    }
}
