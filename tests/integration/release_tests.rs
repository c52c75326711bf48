//! Updates from the latest GitHub release

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::json;
use upkeep_cli::core::UpkeepError;
use upkeep_cli::source::{FetchSettings, GithubSource, SourceDescriptor, http_date};
use upkeep_cli::test_utils::ArchiveBuilder;
use upkeep_cli::update::{self, UpdateContext, UpdateOutcome};
use upkeep_cli::utils::UpdateProgress;

use crate::common::{MockServer, TestProject};

const REPO: &str = "acme/tool";
const LATEST_PATH: &str = "/repos/acme/tool/releases/latest";

fn time(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, hour, 30, 0).unwrap()
}

fn release_context(project: &TestProject, server: &MockServer, token: Option<&str>) -> UpdateContext {
    let source = SourceDescriptor::GithubRelease(GithubSource {
        name: "tool64".to_string(),
        owner: "acme".to_string(),
        project: "tool".to_string(),
        pattern: Regex::new(r"^tool-.*-x64\.zip$").unwrap(),
        strip: 1,
    });
    let fetch = FetchSettings {
        github_api_url: server.base_url().to_string(),
        github_user: token.map(|_| "builder".to_string()),
        github_token: token.map(str::to_string),
        ..FetchSettings::default()
    };
    project.context(source, fetch)
}

/// Publish a release with an x86 and an x64 asset, both served by `server`.
fn publish(server: &MockServer, tag: &str, updated_at: DateTime<Utc>, state: &str) {
    let x64_path = format!("/download/{tag}/tool-{tag}-x64.zip");
    let x86_path = format!("/download/{tag}/tool-{tag}-x86.zip");
    let x64 = ArchiveBuilder::new()
        .file(&format!("tool-{tag}/bin/tool.exe"), format!("x64 {tag}").as_bytes())
        .file(&format!("tool-{tag}/VERSION"), tag.as_bytes())
        .build()
        .unwrap();
    let x86 = ArchiveBuilder::new()
        .file(&format!("tool-{tag}/bin/tool.exe"), format!("x86 {tag}").as_bytes())
        .build()
        .unwrap();
    server.put_archive(&x64_path, x64, None);
    server.put_archive(&x86_path, x86, None);

    let release = json!({
        "tag_name": tag,
        "draft": false,
        "prerelease": false,
        "assets": [
            {
                "name": format!("tool-{tag}-x86.zip"),
                "state": "uploaded",
                "updated_at": updated_at.to_rfc3339(),
                "browser_download_url": server.url(&x86_path),
            },
            {
                "name": format!("tool-{tag}-x64.zip"),
                "state": state,
                "updated_at": updated_at.to_rfc3339(),
                "browser_download_url": server.url(&x64_path),
            }
        ]
    });
    server.put_release(REPO, release, updated_at);
}

#[tokio::test]
async fn test_installs_matching_asset() -> Result<()> {
    upkeep_cli::test_utils::init_test_logging(None);

    let project = TestProject::new()?;
    let server = MockServer::start().await?;
    let ctx = release_context(&project, &server, None);
    publish(&server, "v1.0", time(8), "uploaded");

    let outcome = update::update(&ctx, &UpdateProgress::hidden()).await?;
    let UpdateOutcome::Updated(summary) = outcome else {
        panic!("Expected an update");
    };
    assert_eq!(summary.anchor_time, time(8));
    assert_eq!(project.read("bin/tool.exe"), b"x64 v1.0");
    assert_eq!(project.read("VERSION"), b"v1.0");
    assert_eq!(ctx.read_anchor(), Some(time(8)));
    assert_eq!(server.hits("/download/v1.0/tool-v1.0-x86.zip"), 0);

    Ok(())
}

#[tokio::test]
async fn test_unchanged_release_is_not_downloaded_again() -> Result<()> {
    let project = TestProject::new()?;
    let server = MockServer::start().await?;
    let ctx = release_context(&project, &server, None);
    publish(&server, "v1.0", time(8), "uploaded");

    update::update(&ctx, &UpdateProgress::hidden()).await?;
    let outcome = update::update(&ctx, &UpdateProgress::hidden()).await?;
    assert_eq!(outcome, UpdateOutcome::UpToDate);

    let api_requests: Vec<_> =
        server.requests().into_iter().filter(|r| r.path == LATEST_PATH).collect();
    assert_eq!(api_requests.len(), 2);
    assert_eq!(api_requests[1].if_modified_since, Some(http_date(time(8))));
    assert_eq!(server.hits("/download/v1.0/tool-v1.0-x64.zip"), 1);

    Ok(())
}

#[tokio::test]
async fn test_asset_not_newer_than_anchor() -> Result<()> {
    let project = TestProject::new()?;
    let server = MockServer::start().await?;
    let ctx = release_context(&project, &server, None);
    publish(&server, "v1.0", time(8), "uploaded");
    update::update(&ctx, &UpdateProgress::hidden()).await?;

    // The release document changed but the asset is older than what we have.
    let release = json!({
        "tag_name": "v1.0-rebuild",
        "assets": [{
            "name": "tool-v1.0-x64.zip",
            "state": "uploaded",
            "updated_at": time(7).to_rfc3339(),
            "browser_download_url": server.url("/download/v1.0/tool-v1.0-x64.zip"),
        }]
    });
    server.put_release(REPO, release, time(9));

    let outcome = update::update(&ctx, &UpdateProgress::hidden()).await?;
    assert_eq!(outcome, UpdateOutcome::UpToDate);
    assert_eq!(server.hits("/download/v1.0/tool-v1.0-x64.zip"), 1);
    assert_eq!(ctx.read_anchor(), Some(time(8)));

    Ok(())
}

#[tokio::test]
async fn test_newer_release_upgrades_and_rotates() -> Result<()> {
    let project = TestProject::new()?;
    let server = MockServer::start().await?;
    let ctx = release_context(&project, &server, None);

    publish(&server, "v1.0", time(8), "uploaded");
    update::update(&ctx, &UpdateProgress::hidden()).await?;
    publish(&server, "v1.1", time(10), "uploaded");

    let outcome = update::update(&ctx, &UpdateProgress::hidden()).await?;
    let UpdateOutcome::Updated(summary) = outcome else {
        panic!("Expected an update");
    };
    assert_eq!(summary.rotated, 1);
    assert_eq!(project.read("bin/tool.exe"), b"x64 v1.1");
    assert_eq!(project.read("bin/tool.1.exe"), b"x64 v1.0");
    assert_eq!(project.read("VERSION"), b"v1.1");
    assert_eq!(ctx.read_anchor(), Some(time(10)));

    Ok(())
}

#[tokio::test]
async fn test_incomplete_asset_is_an_error() -> Result<()> {
    let project = TestProject::new()?;
    let server = MockServer::start().await?;
    let ctx = release_context(&project, &server, None);
    publish(&server, "v1.0", time(8), "starter");

    let err = update::update(&ctx, &UpdateProgress::hidden()).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<UpkeepError>(), Some(UpkeepError::AssetIncomplete { .. })));
    assert!(ctx.read_anchor().is_none());
    assert!(project.snapshot().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_prerelease_and_missing_asset() -> Result<()> {
    let project = TestProject::new()?;
    let server = MockServer::start().await?;
    let ctx = release_context(&project, &server, None);

    server.put_release(
        REPO,
        json!({"tag_name": "v2.0-rc1", "prerelease": true, "assets": []}),
        time(8),
    );
    let err = update::update(&ctx, &UpdateProgress::hidden()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<UpkeepError>(),
        Some(UpkeepError::NoQualifyingRelease { .. })
    ));

    server.put_release(
        REPO,
        json!({"tag_name": "v2.0", "assets": [{
            "name": "tool-v2.0-arm64.zip",
            "state": "uploaded",
            "updated_at": time(8).to_rfc3339(),
            "browser_download_url": server.url("/nowhere"),
        }]}),
        time(8),
    );
    let err = update::update(&ctx, &UpdateProgress::hidden()).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<UpkeepError>(), Some(UpkeepError::NoMatchingAsset { .. })));

    Ok(())
}

#[tokio::test]
async fn test_unknown_repository() -> Result<()> {
    let project = TestProject::new()?;
    let server = MockServer::start().await?;
    let ctx = release_context(&project, &server, None);

    let err = update::update(&ctx, &UpdateProgress::hidden()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<UpkeepError>(),
        Some(UpkeepError::NoQualifyingRelease { .. })
    ));

    Ok(())
}

#[tokio::test]
async fn test_token_is_sent_as_basic_auth() -> Result<()> {
    let project = TestProject::new()?;
    let server = MockServer::start().await?;
    let ctx = release_context(&project, &server, Some("s3cret"));
    publish(&server, "v1.0", time(8), "uploaded");

    update::update(&ctx, &UpdateProgress::hidden()).await?;

    let api = server.requests().into_iter().find(|r| r.path == LATEST_PATH).unwrap();
    let auth = api.authorization.expect("Authorization header");
    assert!(auth.starts_with("Basic "), "Unexpected authorization: {auth}");

    Ok(())
}
