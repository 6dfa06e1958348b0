use std::time::Duration;

use httpmock::Method::GET;
use httpmock::MockServer;
use libget_ci_core::cdn::CdnClient;
use libget_ci_core::contract::{FetchError, ManifestFetcher};

#[tokio::test]
async fn test_published_manifest_is_parsed() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/packages/appstore/manifest.install");
            then.status(200).body("U /wiiu/apps/appstore.wuhb\r\n\r\nU /wiiu/apps/appstore/icon.png\r\n");
        })
        .await;

    let client = CdnClient::new(&server.base_url()).unwrap();
    let manifest = client
        .fetch_manifest("appstore")
        .await
        .expect("fetch should succeed")
        .expect("manifest should be published");

    mock.assert_async().await;
    assert_eq!(
        manifest.lines(),
        ["U /wiiu/apps/appstore.wuhb", "U /wiiu/apps/appstore/icon.png"]
    );
}

#[tokio::test]
async fn test_not_found_means_nothing_published() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/packages/newpkg/manifest.install");
            then.status(404);
        })
        .await;

    let client = CdnClient::new(&server.base_url()).unwrap();
    assert!(client.fetch_manifest("newpkg").await.unwrap().is_none());
}

#[tokio::test]
async fn test_server_error_is_a_fetch_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/packages/appstore/manifest.install");
            then.status(500);
        })
        .await;

    let client = CdnClient::new(&server.base_url()).unwrap();
    let err = client.fetch_manifest("appstore").await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 500, .. }), "got {err:?}");
}

#[tokio::test]
async fn test_slow_cdn_times_out() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/packages/appstore/manifest.install");
            then.status(200).delay(Duration::from_millis(500)).body("U /a");
        })
        .await;

    let client = CdnClient::with_timeout(&server.base_url(), Duration::from_millis(50)).unwrap();
    let err = client.fetch_manifest("appstore").await.unwrap_err();
    assert!(matches!(err, FetchError::Request(_)), "got {err:?}");
}

#[tokio::test]
async fn test_repo_listing_is_indexed_by_name() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/repo.json");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"packages":[{"name":"appstore","version":"2.3","screens":2},{"name":"hbmenu"}]}"#);
        })
        .await;

    let client = CdnClient::new(&format!("{}/", server.base_url())).unwrap();
    let index = client.fetch_index().await.unwrap();
    assert_eq!(index.len(), 2);
    assert_eq!(index.get("appstore").unwrap().screens, Some(2));
}

#[tokio::test]
async fn test_missing_package_file_is_none() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/packages/appstore/icon.png");
            then.status(200).body("png-bytes");
        })
        .await;

    let client = CdnClient::new(&server.base_url()).unwrap();
    assert_eq!(
        client.fetch_package_file("appstore", "icon.png").await.unwrap(),
        Some(b"png-bytes".to_vec())
    );
    assert_eq!(client.fetch_package_file("appstore", "screen.png").await.unwrap(), None);
}
