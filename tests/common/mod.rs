//! Common test utilities for upkeep integration tests
//!
//! [`MockServer`] is an in-process HTTP server that plays both roles upkeep
//! talks to: a plain file server with `Last-Modified` / `If-Modified-Since`
//! handling, and the GitHub "latest release" endpoint. [`TestProject`] lays
//! out a target directory and a separate working directory so snapshots of
//! the target only contain installed files.

// Allow dead code because these utilities are used across different test files
// and not all utilities are used in every test file
#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use upkeep_cli::source::{FetchSettings, SourceDescriptor, http_date};
use upkeep_cli::test_utils::snapshot_tree;
use upkeep_cli::update::UpdateContext;

/// One request the server received.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub if_modified_since: Option<String>,
    pub authorization: Option<String>,
}

struct Served {
    body: Vec<u8>,
    last_modified: Option<DateTime<Utc>>,
    content_type: &'static str,
}

#[derive(Default)]
struct ServerState {
    files: HashMap<String, Served>,
    requests: Vec<RecordedRequest>,
    ignore_if_modified_since: bool,
}

type Shared = Arc<Mutex<ServerState>>;

/// In-process HTTP server on an ephemeral port.
pub struct MockServer {
    base_url: String,
    state: Shared,
    handle: tokio::task::JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> Result<Self> {
        let state: Shared = Arc::default();
        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to bind mock server")?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self {
            base_url: format!("http://{addr}"),
            state,
            handle,
        })
    }

    /// Base URL without trailing slash, usable as `github_api_url`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Serve `body` at `path`. With a `last_modified`, conditional requests
    /// get `304` when nothing changed.
    pub fn put_archive(&self, path: &str, body: Vec<u8>, last_modified: Option<DateTime<Utc>>) {
        self.put(path, body, last_modified, "application/zip");
    }

    /// Serve a release document as `/repos/<repo>/releases/latest`.
    pub fn put_release(&self, repo: &str, release: serde_json::Value, last_modified: DateTime<Utc>) {
        let path = format!("/repos/{repo}/releases/latest");
        self.put(&path, release.to_string().into_bytes(), Some(last_modified), "application/json");
    }

    /// Answer every request with `200`, like a server that does not
    /// implement conditional requests. `Last-Modified` is still sent.
    pub fn ignore_if_modified_since(&self) {
        self.state.lock().unwrap().ignore_if_modified_since = true;
    }

    pub fn remove(&self, path: &str) {
        self.state.lock().unwrap().files.remove(path);
    }

    fn put(
        &self,
        path: &str,
        body: Vec<u8>,
        last_modified: Option<DateTime<Utc>>,
        content_type: &'static str,
    ) {
        self.state.lock().unwrap().files.insert(
            path.to_string(),
            Served {
                body,
                last_modified,
                content_type,
            },
        );
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Number of requests for `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle(State(state): State<Shared>, uri: Uri, headers: HeaderMap) -> Response {
    let header_text = |name: header::HeaderName| {
        headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
    };
    let if_modified_since = header_text(header::IF_MODIFIED_SINCE);

    let mut state = state.lock().unwrap();
    state.requests.push(RecordedRequest {
        path: uri.path().to_string(),
        if_modified_since: if_modified_since.clone(),
        authorization: header_text(header::AUTHORIZATION),
    });

    let Some(served) = state.files.get(uri.path()) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let since = if_modified_since.filter(|_| !state.ignore_if_modified_since);
    if let (Some(since), Some(modified)) = (since, served.last_modified) {
        let since = DateTime::parse_from_rfc2822(&since).map(|t| t.with_timezone(&Utc));
        if since.is_ok_and(|since| modified <= since) {
            return StatusCode::NOT_MODIFIED.into_response();
        }
    }

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::CONTENT_TYPE, served.content_type.parse().unwrap());
    if let Some(modified) = served.last_modified {
        response_headers.insert(header::LAST_MODIFIED, http_date(modified).parse().unwrap());
    }
    (StatusCode::OK, response_headers, served.body.clone()).into_response()
}

/// A target directory and a separate working directory in one temp dir.
pub struct TestProject {
    pub temp: TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp: TempDir::new()?,
        })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn target_dir(&self) -> PathBuf {
        self.temp.path().join("target")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.temp.path().join("work")
    }

    pub fn target_file(&self, relative: &str) -> PathBuf {
        self.target_dir().join(relative)
    }

    pub fn read(&self, relative: &str) -> Vec<u8> {
        std::fs::read(self.target_file(relative)).unwrap()
    }

    pub fn write(&self, relative: &str, content: &[u8]) {
        let path = self.target_file(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    /// Installed files, keyed by relative path.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        snapshot_tree(&self.target_dir())
    }

    pub fn context(&self, source: SourceDescriptor, fetch: FetchSettings) -> UpdateContext {
        UpdateContext {
            target_dir: self.target_dir(),
            work_dir: self.work_dir(),
            source,
            exe_rotate_count: 3,
            fetch,
        }
    }
}
