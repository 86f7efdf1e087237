//! Synchronizer integration tests.

use serde_json::json;
use tempfile::TempDir;
use tokio::fs;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use etagsync::{Profile, SyncState, Synchronizer, Url};

/// Upstream serving `payload` under `/api/data` with `etag`.
async fn upstream(server: &MockServer, etag: &str, payload: serde_json::Value) {
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/api/data"))
        .and(header("If-None-Match", etag))
        .respond_with(ResponseTemplate::new(304))
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/data"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", etag)
                .set_body_json(payload),
        )
        .mount(server)
        .await;
}

async fn synchronizer(tmp: &TempDir, server: &MockServer) -> anyhow::Result<Synchronizer> {
    let database = format!("{}", tmp.path().join("etagsync.sqlite").display());
    let endpoint = Url::parse(&format!("{}/api/", server.uri()))?;
    let sync = Synchronizer::builder(&database, tmp.path().join("data"), endpoint)
        .profile(Profile::Flat {
            resource: "data".to_string(),
        })
        .build()
        .await?;
    Ok(sync)
}

async fn data_files(tmp: &TempDir) -> anyhow::Result<usize> {
    let mut count = 0;
    let mut entries = fs::read_dir(tmp.path().join("data")).await?;
    while entries.next_entry().await?.is_some() {
        count += 1;
    }
    Ok(count)
}

#[tokio::test]
async fn test_sync_scenarios() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let server = MockServer::start().await;
    let mut sync = synchronizer(&tmp, &server).await?;
    assert_eq!(sync.state("data").await?, SyncState::Initial);

    // Empty metadata table, upstream at "v1"
    upstream(&server, "v1", json!([{"id": 1}])).await;
    let report = sync.run().await?;
    let a = report.outcomes[0].record().clone();
    assert_eq!(a.etag, "v1");
    assert!(!a.is_pseudo);
    assert_eq!(fs::read_to_string(a.path()).await?, "id\n1\n");
    assert_eq!(data_files(&tmp).await?, 1);

    // Upstream still at "v1": pseudo record pointing at the same file
    let report = sync.run().await?;
    let pseudo = report.outcomes[0].record().clone();
    assert_eq!(pseudo.etag, "v1");
    assert!(pseudo.is_pseudo);
    assert_eq!(pseudo.file_reference, a.file_reference);
    assert_eq!(data_files(&tmp).await?, 1);

    // Upstream moved to "v2": new file, new record owns it
    upstream(&server, "v2", json!([{"id": 1}, {"id": 2}])).await;
    let report = sync.run().await?;
    let b = report.outcomes[0].record().clone();
    assert_eq!(b.etag, "v2");
    assert!(!b.is_pseudo);
    assert_ne!(b.file_reference, a.file_reference);
    assert_eq!(fs::read_to_string(b.path()).await?, "id\n1\n2\n");
    assert_eq!(data_files(&tmp).await?, 2);

    assert_eq!(sync.list("data").await?, vec![a, pseudo, b.clone()]);
    assert_eq!(sync.state("data").await?, SyncState::Tracking(b));
    Ok(())
}

#[tokio::test]
async fn test_state_survives_restart() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let server = MockServer::start().await;
    upstream(&server, "v1", json!([{"id": 1}])).await;

    let first = synchronizer(&tmp, &server).await?.run().await?;

    // Fresh process: last ETag comes from the database, not from memory
    let second = synchronizer(&tmp, &server).await?.run().await?;

    let original = first.outcomes[0].record();
    let pseudo = second.outcomes[0].record();
    assert!(pseudo.is_pseudo);
    assert_eq!(pseudo.file_reference, original.file_reference);
    assert_eq!(data_files(&tmp).await?, 1);
    Ok(())
}
