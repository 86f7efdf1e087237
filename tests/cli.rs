//! CLI integration tests.

use std::process::Output;

use serde_json::json;
use tempfile::TempDir;
use tokio::process::Command;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn etagsync(tmp: &TempDir, endpoint: &str, args: &[&str]) -> anyhow::Result<Output> {
    let output = Command::new(env!("CARGO_BIN_EXE_etagsync"))
        .args(args)
        .env("ETAGSYNC_ENDPOINT_URL", endpoint)
        .env("ETAGSYNC_DATABASE", tmp.path().join("etagsync.sqlite"))
        .env("ETAGSYNC_DATA_DIR", tmp.path().join("data"))
        .env("ETAGSYNC_PROFILE", "flat")
        .env("ETAGSYNC_RESOURCE", "planets")
        .env("ETAGSYNC_TIMEOUT", "5")
        .output()
        .await?;
    Ok(output)
}

#[tokio::test]
async fn test_cli() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/planets"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"w1\"")
                .set_body_json(json!([
                    {"name": "Tatooine", "climate": "arid"},
                    {"name": "Alderaan", "climate": "temperate"},
                    {"name": "Hoth", "climate": "frozen"},
                    {"name": "Jakku", "climate": "arid"},
                ])),
        )
        .mount(&server)
        .await;
    let endpoint = format!("{}/api/", server.uri());

    // No arguments: run synchronization
    let output = etagsync(&tmp, &endpoint, &[]).await?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.starts_with("planets: downloaded starwars_data_planets_"));
    assert!(stdout.contains("(4 rows, etag \"w1\")"));

    let output = etagsync(&tmp, &endpoint, &["list"]).await?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert_eq!(stdout.lines().count(), 1);
    assert!(stdout.starts_with("#1 "));

    let output = etagsync(&tmp, &endpoint, &["list", "--all", "--json"]).await?;
    let record: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(record["id"], json!(1));
    assert_eq!(record["resource"], json!("planets"));
    assert_eq!(record["etag"], json!("\"w1\""));
    assert_eq!(record["is_pseudo"], json!(false));

    let output = etagsync(&tmp, &endpoint, &["show", "1"]).await?;
    assert_eq!(
        String::from_utf8(output.stdout)?,
        "name,climate\nTatooine,arid\nAlderaan,temperate\nHoth,frozen\nJakku,arid\n"
    );

    let output = etagsync(&tmp, &endpoint, &["count", "1", "--columns", "climate"]).await?;
    assert_eq!(
        String::from_utf8(output.stdout)?,
        "climate,count\narid,2\ntemperate,1\nfrozen,1\n"
    );

    let output = etagsync(&tmp, &endpoint, &["show", "42"]).await?;
    assert!(!output.status.success());
    Ok(())
}

#[tokio::test]
async fn test_cli_unreachable_upstream() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let output = etagsync(&tmp, "http://127.0.0.1:9/api/", &["sync"]).await?;
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("run failed"));
    Ok(())
}
