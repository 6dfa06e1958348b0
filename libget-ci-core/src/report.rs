//! Rendering of per-package manifest comparisons as Markdown fragments.

use crate::diff::{unified_diff, DEFAULT_CONTEXT};
use crate::manifest::Manifest;

/// Outcome of comparing a package's published manifest with its new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Nothing published yet; carries the full new manifest.
    New { package: String, manifest: Manifest },
    /// Layout identical to the published version.
    Unchanged { package: String },
    /// Layout changed; carries the unified diff body.
    Changed { package: String, diff: String },
}

impl Fragment {
    pub fn package(&self) -> &str {
        match self {
            Fragment::New { package, .. }
            | Fragment::Unchanged { package }
            | Fragment::Changed { package, .. } => package,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Fragment::New { .. } => "new",
            Fragment::Unchanged { .. } => "unchanged",
            Fragment::Changed { .. } => "changed",
        }
    }

    pub fn to_markdown(&self) -> String {
        match self {
            Fragment::New { package, manifest } => format!(
                "### New Manifest: `{package}`\n\n```\n{}\n```\n",
                manifest.to_text()
            ),
            Fragment::Unchanged { package } => format!(
                "### Manifest Check: `{package}`\n\n✅ File layout looks good: Manifest matches the previous version\n"
            ),
            Fragment::Changed { package, diff } => format!(
                "### Manifest Diff: `{package}`\n\nThe following files would be added/removed on update:\n\n```diff\n{diff}\n```\n"
            ),
        }
    }
}

/// Compare `old` (the published manifest, if any) against `new`.
pub fn render(package: &str, old: Option<&Manifest>, new: &Manifest) -> Fragment {
    let Some(old) = old else {
        return Fragment::New {
            package: package.to_string(),
            manifest: new.clone(),
        };
    };

    if old == new {
        return Fragment::Unchanged {
            package: package.to_string(),
        };
    }

    let diff = unified_diff(old.lines(), new.lines(), DEFAULT_CONTEXT);
    if diff.is_empty() {
        return Fragment::Unchanged {
            package: package.to_string(),
        };
    }

    Fragment::Changed {
        package: package.to_string(),
        diff: diff.join("\n"),
    }
}

/// Join rendered fragments into one comment body, ordered by package.
pub fn compose_comment(fragments: &[Fragment]) -> String {
    let mut ordered: Vec<&Fragment> = fragments.iter().collect();
    ordered.sort_by(|a, b| a.package().cmp(b.package()));
    ordered
        .iter()
        .map(|f| f.to_markdown())
        .collect::<Vec<_>>()
        .join("\n\n")
}
