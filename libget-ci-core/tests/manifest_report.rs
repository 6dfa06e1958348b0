use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use httpmock::Method::GET;
use httpmock::MockServer;
use libget_ci_core::cdn::CdnClient;
use libget_ci_core::comment::{
    run_manifest_report, ManifestReportConfig, COMMENT_FILE, PR_NUMBER_FILE,
};
use libget_ci_core::contract::{FetchError, MockManifestFetcher};
use libget_ci_core::manifest::{Manifest, MANIFEST_FILE};
use tempfile::tempdir;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{Layer, Registry};

/// Collects every emitted event, formatted with `Debug`.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S: Subscriber> Layer<S> for EventCollector {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}

fn write_local_manifest(root: &Path, package: &str, content: &str) {
    let dir = root.join("packages").join(package);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(MANIFEST_FILE), content).unwrap();
}

fn packages(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn config(root: &Path) -> ManifestReportConfig {
    ManifestReportConfig {
        root: root.to_path_buf(),
        pr_number: Some("42".to_string()),
    }
}

#[tokio::test]
async fn test_report_covers_new_unchanged_and_changed_packages() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_local_manifest(root, "pkgB", "U /b.wuhb\nU /b/data.bin\n");
    write_local_manifest(root, "pkgA", "U /a.wuhb\r\n");
    write_local_manifest(root, "pkgC", "U /c.wuhb\n");

    let mut fetcher = MockManifestFetcher::new();
    fetcher
        .expect_fetch_manifest()
        .times(3)
        .returning(|package: &str| match package {
            "pkgA" => Ok(Some(Manifest::parse("U /a.wuhb\n"))),
            "pkgB" => Ok(Some(Manifest::parse("U /b.wuhb\nU /b/old.bin\n"))),
            _ => Ok(None),
        });

    let report = run_manifest_report(&config(root), &fetcher, &packages(&["pkgC", "pkgB", "pkgA"]))
        .await
        .expect("report should succeed");

    let kinds: Vec<_> = report.fragments.iter().map(|f| f.kind()).collect();
    assert_eq!(kinds, vec!["unchanged", "changed", "new"]);

    let comment = fs::read_to_string(root.join(COMMENT_FILE)).unwrap();
    let expected = [
        "### Manifest Check: `pkgA`\n\n✅ File layout looks good: Manifest matches the previous version\n",
        "### Manifest Diff: `pkgB`\n\nThe following files would be added/removed on update:\n\n```diff\n@@ -1,2 +1,2 @@\n U /b.wuhb\n-U /b/old.bin\n+U /b/data.bin\n```\n",
        "### New Manifest: `pkgC`\n\n```\nU /c.wuhb\n```\n",
    ]
    .join("\n\n");
    assert_eq!(comment, expected);
    assert_eq!(fs::read_to_string(root.join(PR_NUMBER_FILE)).unwrap(), "42");
}

#[tokio::test]
async fn test_package_without_local_manifest_is_skipped() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_local_manifest(root, "pkgA", "U /a.wuhb\n");

    let mut fetcher = MockManifestFetcher::new();
    fetcher
        .expect_fetch_manifest()
        .withf(|package: &str| package == "pkgA")
        .times(1)
        .returning(|_| Ok(None));

    let report = run_manifest_report(&config(root), &fetcher, &packages(&["pkgA", "pkgX"]))
        .await
        .unwrap();

    assert_eq!(report.skipped, vec!["pkgX".to_string()]);
    let comment = report.comment.unwrap();
    assert!(comment.contains("`pkgA`"));
    assert!(!comment.contains("pkgX"));
}

#[tokio::test]
async fn test_empty_package_list_writes_nothing() {
    let dir = tempdir().unwrap();
    let mut fetcher = MockManifestFetcher::new();
    fetcher.expect_fetch_manifest().never();

    let report = run_manifest_report(&config(dir.path()), &fetcher, &[])
        .await
        .unwrap();

    assert!(report.comment.is_none());
    assert!(report.written.is_empty());
    assert!(!dir.path().join(COMMENT_FILE).exists());
    assert!(!dir.path().join(PR_NUMBER_FILE).exists());
}

#[tokio::test]
async fn test_every_package_skipped_still_writes_empty_comment() {
    let dir = tempdir().unwrap();
    let mut fetcher = MockManifestFetcher::new();
    fetcher.expect_fetch_manifest().never();

    let report = run_manifest_report(&config(dir.path()), &fetcher, &packages(&["ghost"]))
        .await
        .unwrap();

    assert_eq!(report.comment.as_deref(), Some(""));
    assert_eq!(fs::read_to_string(dir.path().join(COMMENT_FILE)).unwrap(), "");
}

// A failed fetch is indistinguishable from "nothing published" in the
// comment; only the log line tells them apart.
#[tokio::test]
async fn test_fetch_failure_is_reported_as_new() {
    let dir = tempdir().unwrap();
    write_local_manifest(dir.path(), "pkgA", "U /a.wuhb\n");

    let mut fetcher = MockManifestFetcher::new();
    fetcher.expect_fetch_manifest().returning(|_| {
        Err(FetchError::Status {
            status: 503,
            url: "https://cdn.example/packages/pkgA/manifest.install".to_string(),
        })
    });

    let report = run_manifest_report(&config(dir.path()), &fetcher, &packages(&["pkgA"]))
        .await
        .unwrap();

    assert_eq!(report.fragments.len(), 1);
    assert_eq!(report.fragments[0].kind(), "new");
}

#[tokio::test]
async fn test_timed_out_fetch_is_logged_but_missing_manifest_is_not() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/packages/pkgSlow/manifest.install");
            then.status(200)
                .body("U /slow.wuhb\n")
                .delay(Duration::from_millis(500));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/packages/pkgNew/manifest.install");
            then.status(404);
        })
        .await;

    let dir = tempdir().unwrap();
    write_local_manifest(dir.path(), "pkgSlow", "U /slow.wuhb\n");
    write_local_manifest(dir.path(), "pkgNew", "U /new.wuhb\n");
    let cdn = CdnClient::with_timeout(&server.base_url(), Duration::from_millis(50)).unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = Registry::default().with(EventCollector {
        events: events.clone(),
    });
    let _guard = tracing::subscriber::set_default(subscriber);

    let report = run_manifest_report(&config(dir.path()), &cdn, &packages(&["pkgSlow", "pkgNew"]))
        .await
        .unwrap();

    let kinds: Vec<_> = report.fragments.iter().map(|f| f.kind()).collect();
    assert_eq!(kinds, vec!["new", "new"]);

    let events = events.lock().unwrap();
    assert!(
        events
            .iter()
            .any(|e| e.contains("[MANIFEST] WARNING: Could not fetch manifest for pkgSlow")),
        "timed out fetch should be logged, got: {events:#?}"
    );
    assert!(
        !events.iter().any(|e| e.contains("Could not fetch manifest for pkgNew")),
        "404 is not a fetch failure, got: {events:#?}"
    );
    assert!(events.iter().any(|e| e.contains("No published manifest")));
}

#[tokio::test]
async fn test_no_pr_number_skips_pr_file() {
    let dir = tempdir().unwrap();
    write_local_manifest(dir.path(), "pkgA", "U /a.wuhb\n");

    let mut fetcher = MockManifestFetcher::new();
    fetcher.expect_fetch_manifest().returning(|_| Ok(None));

    let config = ManifestReportConfig {
        root: dir.path().to_path_buf(),
        pr_number: None,
    };
    let report = run_manifest_report(&config, &fetcher, &packages(&["pkgA"]))
        .await
        .unwrap();

    assert_eq!(report.written, vec![dir.path().join(COMMENT_FILE)]);
    assert!(!dir.path().join(PR_NUMBER_FILE).exists());
}
