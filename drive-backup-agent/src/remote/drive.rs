//! Google Drive v3 implementation of [`RemoteStore`].
//!
//! Uploads use the resumable protocol: one POST opens a session, then the
//! body goes up in `PUT` requests of at most one chunk each. Only a single
//! chunk is held in memory at a time.

use super::auth::Credentials;
use super::{ListQuery, NewObject, RemoteArtifact, RemoteStore};
use crate::transfer::progress::{format_bytes, format_duration, format_speed, ProgressTracker};
use crate::utils::{AgentError, Result};
use async_trait::async_trait;
use reqwest::header::{CONTENT_RANGE, LOCATION, RANGE};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const DEFAULT_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Drive requires every non-final chunk to be a multiple of 256 KiB.
pub const MIN_CHUNK_SIZE: u64 = 256 * 1024;
/// Chunk size used when none is configured.
pub const DEFAULT_CHUNK_SIZE: u64 = 16 * 1024 * 1024;

const LIST_FIELDS: &str = "nextPageToken,files(id,name,createdTime,parents)";
const PAGE_SIZE: &str = "1000";

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteArtifact>,
    next_page_token: Option<String>,
}

pub struct DriveClient {
    http: Client,
    credentials: Credentials,
    api_base: String,
    upload_base: String,
}

impl DriveClient {
    pub fn new(credentials: Credentials, api_base: &str, upload_base: &str) -> Result<Self> {
        // 308 is "resume incomplete" in the upload protocol, never a redirect.
        let http = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("drive-backup-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            credentials,
            api_base: api_base.trim_end_matches('/').to_string(),
            upload_base: upload_base.trim_end_matches('/').to_string(),
        })
    }

    async fn start_session(&self, object: NewObject<'_>) -> Result<String> {
        let url = format!("{}/files", self.upload_base);
        let metadata = serde_json::json!({
            "name": object.name,
            "parents": [object.parent],
        });

        let token = self.credentials.bearer().await?;
        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .query(&[
                ("uploadType", "resumable"),
                ("supportsAllDrives", "true"),
                ("fields", "id"),
            ])
            .header("X-Upload-Content-Type", "application/octet-stream")
            .header("X-Upload-Content-Length", object.size.to_string())
            .json(&metadata)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(upload_error(object.name, resp).await);
        }

        resp.headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AgentError::Upload {
                name: object.name.to_string(),
                reason: "upload session response has no Location header".into(),
            })
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn create_object(
        &self,
        object: NewObject<'_>,
        mut body: tokio::fs::File,
        chunk_size: Option<u64>,
    ) -> Result<String> {
        let chunk = effective_chunk_size(chunk_size);
        let session = self.start_session(object).await?;
        debug!(name = %object.name, chunk_size = chunk, "Upload session opened");

        let mut tracker = ProgressTracker::new(object.size);
        let mut offset = 0u64;

        loop {
            let len = chunk.min(object.size - offset);
            let mut buf = vec![0u8; len as usize];
            body.read_exact(&mut buf).await?;

            let resp = self
                .http
                .put(&session)
                .header(CONTENT_RANGE, content_range(offset, len, object.size))
                .body(buf)
                .send()
                .await?;

            match resp.status() {
                StatusCode::OK | StatusCode::CREATED => {
                    let created: CreatedFile = resp.json().await?;
                    tracker.update(object.size);
                    info!(
                        name = %object.name,
                        id = %created.id,
                        size = %format_bytes(object.size),
                        speed = %format_speed(tracker.average_speed()),
                        "Upload complete"
                    );
                    return Ok(created.id);
                }
                StatusCode::PERMANENT_REDIRECT => {
                    let acked = resp
                        .headers()
                        .get(RANGE)
                        .and_then(|v| v.to_str().ok())
                        .and_then(acknowledged_bytes)
                        .unwrap_or(0);

                    if acked != offset + len {
                        body.seek(SeekFrom::Start(acked)).await?;
                    }
                    offset = acked;

                    let progress = tracker.update(offset);
                    debug!(
                        name = %object.name,
                        sent = %format_bytes(progress.transferred_bytes),
                        percent = progress.percent_complete,
                        speed = %format_speed(progress.bytes_per_second),
                        eta = %format_duration(progress.eta_seconds),
                        "Chunk acknowledged"
                    );

                    if progress.is_complete() {
                        return Err(AgentError::Upload {
                            name: object.name.to_string(),
                            reason: "server acknowledged every byte but did not finalize".into(),
                        });
                    }
                }
                _ => return Err(upload_error(object.name, resp).await),
            }
        }
    }

    async fn list_objects(&self, query: &ListQuery) -> Result<Vec<RemoteArtifact>> {
        let url = format!("{}/files", self.api_base);
        let q = drive_query(query);
        debug!(query = %q, "Listing remote artifacts");

        let mut artifacts = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let token = self.credentials.bearer().await?;
            let mut request = self.http.get(&url).bearer_auth(token).query(&[
                ("q", q.as_str()),
                ("fields", LIST_FIELDS),
                ("pageSize", PAGE_SIZE),
                ("corpora", "allDrives"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ]);
            if let Some(next) = &page_token {
                request = request.query(&[("pageToken", next.as_str())]);
            }

            let resp = request.send().await?;
            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                return Err(AgentError::List(format!("{status}: {text}")));
            }

            let page: FileList = resp.json().await?;
            artifacts.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(count = artifacts.len(), "Listed remote artifacts");
        Ok(artifacts)
    }

    async fn delete_object(&self, id: &str) -> Result<()> {
        let url = format!("{}/files/{}", self.api_base, id);
        let token = self.credentials.bearer().await?;
        let resp = self
            .http
            .delete(&url)
            .bearer_auth(token)
            .query(&[("supportsAllDrives", "true")])
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            Err(AgentError::Delete {
                id: id.to_string(),
                reason: format!("{status}: {text}"),
            })
        }
    }
}

async fn upload_error(name: &str, resp: reqwest::Response) -> AgentError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    AgentError::Upload {
        name: name.to_string(),
        reason: format!("{status}: {text}"),
    }
}

/// Round a requested chunk size up to the 256 KiB granularity Drive accepts.
pub fn effective_chunk_size(requested: Option<u64>) -> u64 {
    match requested {
        Some(size) if size > 0 => size.div_ceil(MIN_CHUNK_SIZE) * MIN_CHUNK_SIZE,
        _ => DEFAULT_CHUNK_SIZE,
    }
}

/// `Content-Range` for `len` bytes at `offset` of a `total`-byte object.
fn content_range(offset: u64, len: u64, total: u64) -> String {
    if len == 0 {
        format!("bytes */{total}")
    } else {
        format!("bytes {}-{}/{}", offset, offset + len - 1, total)
    }
}

/// Bytes persisted so far according to a `Range: bytes=0-N` header.
fn acknowledged_bytes(range: &str) -> Option<u64> {
    let (_, last) = range.strip_prefix("bytes=")?.split_once('-')?;
    last.trim().parse::<u64>().ok().map(|n| n + 1)
}

/// Render a [`ListQuery`] in Drive's query language.
fn drive_query(query: &ListQuery) -> String {
    let names = query
        .name_contains
        .iter()
        .map(|needle| format!("name contains '{}'", escape(needle)))
        .collect::<Vec<_>>()
        .join(" or ");

    format!(
        "'{}' in parents and ({}) and trashed = false",
        escape(&query.container),
        names
    )
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::extract::{Path, Query, State};
    use axum::http::{header, HeaderMap, StatusCode as HttpStatus};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{delete, get, post, put};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Just enough of the Drive API to exercise the client.
    #[derive(Default)]
    struct FakeDrive {
        base: String,
        auth: Vec<String>,
        session_metadata: Option<Value>,
        reject_session: bool,
        /// Persist only this many bytes of the next chunk
        short_ack: Option<usize>,
        content_ranges: Vec<String>,
        received: Vec<u8>,
        list_params: Vec<HashMap<String, String>>,
        fail_list: bool,
        deleted: Vec<String>,
    }

    type Shared = Arc<Mutex<FakeDrive>>;

    fn authorization(headers: &HeaderMap) -> String {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    async fn open_session(
        State(drive): State<Shared>,
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
        Json(metadata): Json<Value>,
    ) -> Response {
        let mut drive = drive.lock().unwrap();
        drive.auth.push(authorization(&headers));
        if drive.reject_session || params.get("uploadType").map(String::as_str) != Some("resumable") {
            return (HttpStatus::FORBIDDEN, "insufficient permissions").into_response();
        }
        drive.session_metadata = Some(metadata);
        let location = format!("{}/session/1", drive.base);
        (HttpStatus::OK, [(header::LOCATION, location)]).into_response()
    }

    async fn upload_chunk(State(drive): State<Shared>, headers: HeaderMap, body: Bytes) -> Response {
        let mut drive = drive.lock().unwrap();
        let range = headers
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        drive.content_ranges.push(range.clone());

        let parsed = range
            .strip_prefix("bytes ")
            .and_then(|r| r.split_once('/'))
            .and_then(|(span, total)| Some((span.split_once('-')?.0.parse::<usize>().ok()?, total.parse::<usize>().ok()?)));
        let Some((start, total)) = parsed else {
            return HttpStatus::BAD_REQUEST.into_response();
        };
        if start != drive.received.len() {
            return HttpStatus::BAD_REQUEST.into_response();
        }

        let keep = drive.short_ack.take().unwrap_or(body.len()).min(body.len());
        drive.received.extend_from_slice(&body[..keep]);

        let have = drive.received.len();
        if have == total {
            (HttpStatus::OK, Json(json!({"id": "file-1"}))).into_response()
        } else {
            let acked = format!("bytes=0-{}", have - 1);
            (HttpStatus::PERMANENT_REDIRECT, [(header::RANGE, acked)]).into_response()
        }
    }

    async fn list_files(
        State(drive): State<Shared>,
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> Response {
        let mut drive = drive.lock().unwrap();
        drive.auth.push(authorization(&headers));
        drive.list_params.push(params.clone());
        if drive.fail_list {
            return (HttpStatus::INTERNAL_SERVER_ERROR, "backend error").into_response();
        }

        let file = |id: &str, name: &str| {
            json!({"id": id, "name": name, "createdTime": "2025-01-01T00:00:00.000Z", "parents": ["dest"]})
        };
        let page = match params.get("pageToken").map(String::as_str) {
            None => json!({"nextPageToken": "page-2", "files": [file("1", "a_1.tar.gz")]}),
            Some("page-2") => json!({"files": [file("2", "b_1.tar.gz.part001"), file("3", "b_1.tar.gz.part002")]}),
            Some(_) => json!({"files": []}),
        };
        Json(page).into_response()
    }

    async fn delete_file(State(drive): State<Shared>, Path(id): Path<String>) -> Response {
        if id == "missing" {
            return (HttpStatus::NOT_FOUND, "File not found: missing").into_response();
        }
        drive.lock().unwrap().deleted.push(id);
        HttpStatus::NO_CONTENT.into_response()
    }

    async fn fake_drive() -> (DriveClient, Shared) {
        let drive: Shared = Arc::default();
        let app = Router::new()
            .route("/upload/files", post(open_session))
            .route("/session/1", put(upload_chunk))
            .route("/api/files", get(list_files))
            .route("/api/files/{id}", delete(delete_file))
            .with_state(drive.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drive.lock().unwrap().base = base.clone();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = DriveClient::new(
            Credentials::Static("test-token".into()),
            &format!("{base}/api"),
            &format!("{base}/upload/"),
        )
        .unwrap();
        (client, drive)
    }

    async fn body_file(temp: &TempDir, data: &[u8]) -> tokio::fs::File {
        let path = temp.path().join("body.bin");
        std::fs::write(&path, data).unwrap();
        tokio::fs::File::open(&path).await.unwrap()
    }

    #[tokio::test]
    async fn test_chunked_upload_resumes_from_acknowledged_offset() {
        let (client, drive) = fake_drive().await;
        drive.lock().unwrap().short_ack = Some(100_000);

        let temp = TempDir::new().unwrap();
        let data: Vec<u8> = (0..614_400u32).map(|i| (i % 251) as u8).collect();
        let object = NewObject {
            name: "f_ts.tar.gz",
            parent: "dest",
            size: data.len() as u64,
        };

        let id = client
            .create_object(object, body_file(&temp, &data).await, Some(1))
            .await
            .unwrap();

        assert_eq!(id, "file-1");
        let drive = drive.lock().unwrap();
        assert_eq!(
            drive.content_ranges,
            vec![
                "bytes 0-262143/614400",
                "bytes 100000-362143/614400",
                "bytes 362144-614399/614400",
            ]
        );
        assert!(drive.received == data);
        assert_eq!(
            drive.session_metadata,
            Some(json!({"name": "f_ts.tar.gz", "parents": ["dest"]}))
        );
        assert_eq!(drive.auth, vec!["Bearer test-token"]);
    }

    #[tokio::test]
    async fn test_rejected_session_is_upload_error() {
        let (client, drive) = fake_drive().await;
        drive.lock().unwrap().reject_session = true;

        let temp = TempDir::new().unwrap();
        let object = NewObject {
            name: "f_ts.tar.gz",
            parent: "dest",
            size: 3,
        };
        let err = client
            .create_object(object, body_file(&temp, b"abc").await, None)
            .await
            .unwrap_err();

        match err {
            AgentError::Upload { name, reason } => {
                assert_eq!(name, "f_ts.tar.gz");
                assert!(reason.contains("403"), "reason {reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(drive.lock().unwrap().content_ranges.is_empty());
    }

    #[tokio::test]
    async fn test_listing_follows_page_tokens() {
        let (client, drive) = fake_drive().await;

        let artifacts = client
            .list_objects(&ListQuery::backup_artifacts("dest"))
            .await
            .unwrap();

        let names: Vec<_> = artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a_1.tar.gz", "b_1.tar.gz.part001", "b_1.tar.gz.part002"]);

        let drive = drive.lock().unwrap();
        assert_eq!(drive.list_params.len(), 2);
        let first = &drive.list_params[0];
        assert_eq!(first.get("corpora").map(String::as_str), Some("allDrives"));
        assert_eq!(first.get("includeItemsFromAllDrives").map(String::as_str), Some("true"));
        assert!(first["q"].starts_with("'dest' in parents"));
        assert!(!first.contains_key("pageToken"));
        assert_eq!(drive.list_params[1].get("pageToken").map(String::as_str), Some("page-2"));
        assert!(drive.auth.iter().all(|a| a == "Bearer test-token"));
    }

    #[tokio::test]
    async fn test_listing_error_status_is_list_error() {
        let (client, drive) = fake_drive().await;
        drive.lock().unwrap().fail_list = true;

        let err = client
            .list_objects(&ListQuery::backup_artifacts("dest"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::List(ref msg) if msg.contains("500")));
    }

    #[tokio::test]
    async fn test_delete_maps_client_errors() {
        let (client, drive) = fake_drive().await;

        client.delete_object("abc").await.unwrap();
        let err = client.delete_object("missing").await.unwrap_err();

        match err {
            AgentError::Delete { id, reason } => {
                assert_eq!(id, "missing");
                assert!(reason.contains("404"), "reason {reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(drive.lock().unwrap().deleted, vec!["abc"]);
    }

    #[test]
    fn test_effective_chunk_size() {
        assert_eq!(effective_chunk_size(None), DEFAULT_CHUNK_SIZE);
        assert_eq!(effective_chunk_size(Some(0)), DEFAULT_CHUNK_SIZE);
        assert_eq!(effective_chunk_size(Some(1)), MIN_CHUNK_SIZE);
        assert_eq!(effective_chunk_size(Some(MIN_CHUNK_SIZE)), MIN_CHUNK_SIZE);
        assert_eq!(effective_chunk_size(Some(8 * 1024 * 1024)), 8 * 1024 * 1024);
        assert_eq!(effective_chunk_size(Some(MIN_CHUNK_SIZE + 1)), 2 * MIN_CHUNK_SIZE);
    }

    #[test]
    fn test_content_range() {
        assert_eq!(content_range(0, 10, 25), "bytes 0-9/25");
        assert_eq!(content_range(20, 5, 25), "bytes 20-24/25");
        assert_eq!(content_range(0, 0, 0), "bytes */0");
    }

    #[test]
    fn test_acknowledged_bytes() {
        assert_eq!(acknowledged_bytes("bytes=0-262143"), Some(262_144));
        assert_eq!(acknowledged_bytes("bytes=0-0"), Some(1));
        assert_eq!(acknowledged_bytes("garbage"), None);
    }

    #[test]
    fn test_drive_query() {
        let query = ListQuery::backup_artifacts("root");
        assert_eq!(
            drive_query(&query),
            "'root' in parents and (name contains '.tar.gz' or name contains '.part') and trashed = false"
        );
    }

    #[test]
    fn test_drive_query_escapes_quotes() {
        let query = ListQuery {
            container: "it's".into(),
            name_contains: vec!["a\\b".into()],
        };
        assert_eq!(
            drive_query(&query),
            r"'it\'s' in parents and (name contains 'a\\b') and trashed = false"
        );
    }

    #[test]
    fn test_file_list_parses_pages() {
        let json = r#"{
            "nextPageToken": "next",
            "files": [
                {"id": "1", "name": "a.tar.gz", "createdTime": "2025-01-01T00:00:00.000Z", "parents": ["root"]}
            ]
        }"#;
        let page: FileList = serde_json::from_str(json).unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("next"));
        assert_eq!(page.files.len(), 1);
        assert_eq!(page.files[0].parents, vec!["root"]);

        let last: FileList = serde_json::from_str("{}").unwrap();
        assert!(last.files.is_empty());
        assert!(last.next_page_token.is_none());
    }
}
