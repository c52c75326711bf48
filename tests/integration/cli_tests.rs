//! Command line behavior of the `upkeep` binary
//!
//! The binary blocks the test thread while it runs, so every test that
//! talks to the mock server uses the multi-threaded runtime.

use anyhow::Result;
use assert_cmd::Command;
use chrono::{DateTime, TimeZone, Utc};
use predicates::prelude::*;
use upkeep_cli::test_utils::ArchiveBuilder;

use crate::common::{MockServer, TestProject};

const ARCHIVE_PATH: &str = "/nightly/tool.zip";

fn time(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 1, 6, minute, 0).unwrap()
}

/// Write `upkeep.toml` into the project root with a direct source for the
/// `test` platform key.
fn write_config(project: &TestProject, url: &str) -> Result<()> {
    let config = format!(
        r#"source = "nightly"
target_dir = '{target}'
work_dir = '{work}'
exe_rotate_count = 2
log_rotate_count = 2

[sources.nightly.test]
kind = "direct"
name = "tool-nightly"
url = "{url}"
strip = 1
"#,
        target = project.target_dir().display(),
        work = project.work_dir().display(),
    );
    std::fs::write(project.root().join("upkeep.toml"), config)?;
    Ok(())
}

/// The binary, run from the project root with a clean environment.
fn upkeep_bare(project: &TestProject) -> Command {
    let mut cmd = Command::cargo_bin("upkeep").unwrap();
    cmd.current_dir(project.root())
        .env_remove("UPKEEP_CONFIG")
        .env_remove("RUST_LOG")
        .env("UPKEEP_NO_PROGRESS", "1")
        .env("NO_COLOR", "1");
    cmd
}

fn upkeep(project: &TestProject) -> Command {
    let mut cmd = upkeep_bare(project);
    cmd.args(["--platform", "test"]);
    cmd
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_then_up_to_date() -> Result<()> {
    let project = TestProject::new()?;
    let server = MockServer::start().await?;
    write_config(&project, &server.url(ARCHIVE_PATH))?;
    server.put_archive(
        ARCHIVE_PATH,
        ArchiveBuilder::new().file("nightly/bin/tool.exe", b"build 1").build()?,
        Some(time(0)),
    );

    upkeep(&project)
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated").and(predicate::str::contains("tool-nightly")));
    assert_eq!(project.read("bin/tool.exe"), b"build 1");

    upkeep(&project).assert().success().stdout(predicate::str::contains("is up to date"));

    let logs: Vec<_> = std::fs::read_dir(project.work_dir().join("log"))?.collect();
    assert!(!logs.is_empty(), "Each run should write a log file");
    assert!(logs.len() <= 2, "Log rotation keeps at most log_rotate_count files");

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_restore_and_sweep_flags() -> Result<()> {
    let project = TestProject::new()?;
    let server = MockServer::start().await?;
    write_config(&project, &server.url(ARCHIVE_PATH))?;

    for (minute, build) in [(0, b"build 1"), (5, b"build 2")] {
        server.put_archive(
            ARCHIVE_PATH,
            ArchiveBuilder::new().file("nightly/bin/tool.exe", build).build()?,
            Some(time(minute)),
        );
        upkeep(&project).assert().success();
    }
    assert_eq!(project.read("bin/tool.1.exe"), b"build 1");

    project.write("bin/tool.exe", b"tampered");
    upkeep(&project).arg("--restore").assert().success();
    assert_eq!(project.read("bin/tool.exe"), b"build 2");

    upkeep(&project).arg("--sweep").assert().success().stdout(predicate::str::contains("Removed"));
    assert_eq!(
        project.snapshot().keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["bin/tool.exe"]
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_quiet_prints_nothing() -> Result<()> {
    let project = TestProject::new()?;
    let server = MockServer::start().await?;
    write_config(&project, &server.url(ARCHIVE_PATH))?;
    server.put_archive(
        ARCHIVE_PATH,
        ArchiveBuilder::new().file("nightly/README", b"hello").build()?,
        Some(time(0)),
    );

    upkeep(&project).arg("-q").assert().success().stdout(predicate::str::is_empty());
    assert_eq!(project.read("README"), b"hello");

    Ok(())
}

#[test]
fn test_sweep_without_recipe_fails() -> Result<()> {
    let project = TestProject::new()?;
    write_config(&project, "http://127.0.0.1:9/unused.zip")?;

    upkeep(&project)
        .arg("--sweep")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Recipe not found"));

    Ok(())
}

#[test]
fn test_unknown_source_set() -> Result<()> {
    let project = TestProject::new()?;
    write_config(&project, "http://127.0.0.1:9/unused.zip")?;

    upkeep(&project)
        .args(["--source", "stable"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Source 'stable' is not defined"));

    Ok(())
}

#[test]
fn test_unsupported_platform() -> Result<()> {
    let project = TestProject::new()?;
    write_config(&project, "http://127.0.0.1:9/unused.zip")?;

    upkeep_bare(&project)
        .args(["--platform", "sparc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not support platform 'sparc'"));

    Ok(())
}

#[test]
fn test_invalid_config() -> Result<()> {
    let project = TestProject::new()?;
    std::fs::write(project.root().join("upkeep.toml"), "exe_rotate_count = \"many\"")?;

    upkeep(&project).assert().failure().stderr(predicate::str::contains("Configuration error"));

    Ok(())
}

#[test]
fn test_help() {
    Command::cargo_bin("upkeep")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--restore").and(predicate::str::contains("--sweep")));
}
