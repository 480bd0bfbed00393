use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_RANGE, LOCATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize, Serializer};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info};

use crate::auth::Credential;
use crate::error::{AuthError, UploadError};
use crate::progress::ProgressSender;

/// Resumable upload endpoint of the video service.
pub const UPLOAD_ENDPOINT: &str =
    "https://www.googleapis.com/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status";

/// Category every upload is filed under ("People & Blogs").
const VIDEO_CATEGORY_ID: &str = "22";

/// Chunk size for the transfer loop. Must be a multiple of 256 KiB per the
/// service's resumable protocol.
const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Visibility of the published video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Private,
    Unlisted,
    Public,
}

/// One confirmed upload request. Consumed entirely by a single
/// [`ResumableUploader::upload`] invocation.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub source_path: PathBuf,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub privacy: Privacy,
    /// Scheduled publish time, UTC. `None` means "no schedule" and the field
    /// is omitted from the metadata payload entirely.
    pub publish_at: Option<DateTime<Utc>>,
}

/// Split a comma-separated tag string, trimming whitespace and dropping
/// empty entries.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Opaque identifier the service assigns to a finished upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoId(pub String);

#[derive(Debug, Serialize)]
struct Snippet<'a> {
    title: &'a str,
    description: &'a str,
    tags: &'a [String],
    #[serde(rename = "categoryId")]
    category_id: &'static str,
}

#[derive(Debug, Serialize)]
struct UploadStatus {
    #[serde(rename = "privacyStatus")]
    privacy_status: Privacy,
    // Omitted, not null-filled, when no schedule is set: the service reads
    // an explicit null as ambiguous with "publish immediately".
    #[serde(
        rename = "publishAt",
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_publish_at"
    )]
    publish_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct VideoMetadata<'a> {
    snippet: Snippet<'a>,
    status: UploadStatus,
}

fn serialize_publish_at<S: Serializer>(
    value: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(dt) => {
            serializer.serialize_str(&dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        }
        None => serializer.serialize_none(),
    }
}

fn metadata_payload(job: &UploadJob) -> VideoMetadata<'_> {
    VideoMetadata {
        snippet: Snippet {
            title: &job.title,
            description: &job.description,
            tags: &job.tags,
            category_id: VIDEO_CATEGORY_ID,
        },
        status: UploadStatus {
            privacy_status: job.privacy,
            publish_at: job.publish_at,
        },
    }
}

/// Drives a chunked, resumable transfer against the remote service until the
/// file is fully uploaded or an unrecoverable error occurs.
///
/// Resumability here is protocol-level: the loop could retry a chunk, but a
/// failed chunk aborts the whole job rather than being retried internally.
pub struct ResumableUploader {
    client: reqwest::Client,
    endpoint: String,
    chunk_size: usize,
}

impl Default for ResumableUploader {
    fn default() -> Self {
        Self::new()
    }
}

impl ResumableUploader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: UPLOAD_ENDPOINT.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Point the uploader at a different service endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Upload `job`'s source file, reporting chunk-level progress.
    ///
    /// Emits `floor(sent / total * 100)` after every intermediate chunk and
    /// 100 once the service returns the assigned video id; any failure emits
    /// the failure sentinel instead.
    pub async fn upload(
        &self,
        job: &UploadJob,
        credential: &Credential,
        progress: &ProgressSender,
    ) -> Result<VideoId, UploadError> {
        match self.run(job, credential, progress).await {
            Ok(id) => {
                progress.percent(100);
                info!("✅ Upload complete, video id: {}", id.0);
                Ok(id)
            }
            Err(e) => {
                error!("❌ Upload failed for {}: {}", job.source_path.display(), e);
                progress.fail();
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        job: &UploadJob,
        credential: &Credential,
        progress: &ProgressSender,
    ) -> Result<VideoId, UploadError> {
        let total = match tokio::fs::metadata(&job.source_path).await {
            Ok(meta) if meta.len() > 0 => meta.len(),
            _ => {
                return Err(UploadError::Input {
                    path: job.source_path.clone(),
                })
            }
        };

        let session_uri = self.open_session(job, credential, total).await?;
        debug!("🚚 Upload session opened: {}", session_uri);

        self.transfer(&session_uri, job, credential, total, progress)
            .await
    }

    /// POST the metadata payload and obtain the session URI for the binary
    /// transfer from the `Location` header.
    async fn open_session(
        &self,
        job: &UploadJob,
        credential: &Credential,
        total: u64,
    ) -> Result<String, UploadError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&credential.access_token)
            .header("X-Upload-Content-Length", total)
            .json(&metadata_payload(job))
            .send()
            .await
            .map_err(|e| UploadError::Session(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthError::Rejected(format!("session open returned {status}")).into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Session(format!("{status}: {body}")));
        }

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| UploadError::Session("no session URI in response".to_string()))
    }

    /// Send the file chunk by chunk. Each intermediate chunk is acknowledged
    /// with 308; the final chunk's response carries the video id.
    async fn transfer(
        &self,
        session_uri: &str,
        job: &UploadJob,
        credential: &Credential,
        total: u64,
        progress: &ProgressSender,
    ) -> Result<VideoId, UploadError> {
        let mut file = tokio::fs::File::open(&job.source_path).await?;
        let mut sent: u64 = 0;

        loop {
            let remaining = total - sent;
            if remaining == 0 {
                // Every chunk was acknowledged as intermediate; the session
                // never produced a terminal response.
                return Err(UploadError::Protocol(
                    "service kept the session open after the final chunk".to_string(),
                ));
            }

            let len = remaining.min(self.chunk_size as u64) as usize;
            let mut chunk = vec![0u8; len];
            file.read_exact(&mut chunk).await?;

            let range = format!("bytes {}-{}/{}", sent, sent + len as u64 - 1, total);
            let response = self
                .client
                .put(session_uri)
                .bearer_auth(&credential.access_token)
                .header(CONTENT_RANGE, range)
                .body(chunk)
                .send()
                .await
                .map_err(|e| UploadError::Transfer(e.to_string()))?;

            match response.status() {
                // 308 Resume Incomplete: the chunk landed, keep going.
                StatusCode::PERMANENT_REDIRECT => {
                    sent += len as u64;
                    // 100 is reserved for the terminal success path; a server
                    // that 308-acks the final chunk must not look finished.
                    progress.percent(((sent * 100 / total) as u8).min(99));
                    debug!("📦 Uploaded {}/{} bytes", sent, total);
                }
                status if status.is_success() => {
                    let body: serde_json::Value = response
                        .json()
                        .await
                        .map_err(|e| UploadError::Protocol(e.to_string()))?;
                    let id = body["id"].as_str().ok_or_else(|| {
                        UploadError::Protocol("terminal response carries no id".to_string())
                    })?;
                    return Ok(VideoId(id.to_string()));
                }
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    return Err(AuthError::Rejected(format!(
                        "chunk at offset {sent} rejected with {}",
                        response.status()
                    ))
                    .into());
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(UploadError::Transfer(format!(
                        "chunk at offset {sent} failed with {status}: {body}"
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::progress_channel;
    use chrono::TimeZone;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn job_in(dir: &TempDir, publish_at: Option<DateTime<Utc>>) -> UploadJob {
        UploadJob {
            source_path: dir.path().join("video.mp4"),
            title: "Night Loop".to_string(),
            description: "One hour of rain".to_string(),
            tags: vec!["rain".to_string(), "loop".to_string()],
            privacy: Privacy::Unlisted,
            publish_at,
        }
    }

    fn test_credential() -> Credential {
        Credential {
            access_token: "tok-upload".to_string(),
            refresh_token: None,
            expires_at: Utc::now() + chrono::Duration::hours(1),
        }
    }

    async fn write_source(dir: &TempDir, bytes: &[u8]) {
        tokio::fs::write(dir.path().join("video.mp4"), bytes)
            .await
            .unwrap();
    }

    #[test]
    fn test_parse_tags_trims_and_drops_empties() {
        assert_eq!(
            parse_tags(" rain , lofi,, loop "),
            vec!["rain", "lofi", "loop"]
        );
        assert!(parse_tags("").is_empty());
    }

    #[test]
    fn test_payload_omits_publish_at_when_unset() {
        let dir = TempDir::new().unwrap();
        let job = job_in(&dir, None);

        let value = serde_json::to_value(metadata_payload(&job)).unwrap();
        assert_eq!(value["snippet"]["title"], "Night Loop");
        assert_eq!(value["snippet"]["categoryId"], "22");
        assert_eq!(value["status"]["privacyStatus"], "unlisted");
        assert!(value["status"].get("publishAt").is_none());
    }

    #[test]
    fn test_payload_carries_publish_at_verbatim() {
        let dir = TempDir::new().unwrap();
        let when = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap();
        let job = job_in(&dir, Some(when));

        let value = serde_json::to_value(metadata_payload(&job)).unwrap();
        assert_eq!(value["status"]["publishAt"], "2024-05-01T10:30:00.000Z");
    }

    #[tokio::test]
    async fn test_missing_source_is_input_error() {
        let dir = TempDir::new().unwrap();
        let job = job_in(&dir, None); // file never written
        let (tx, mut rx) = progress_channel();

        let err = ResumableUploader::new()
            .upload(&job, &test_credential(), &tx)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Input { .. }));
        assert_eq!(rx.drain_latest(), Some(crate::progress::ProgressEvent::Failed));
    }

    #[tokio::test]
    async fn test_chunked_upload_reports_progress_and_id() {
        let dir = TempDir::new().unwrap();
        write_source(&dir, b"abcdefgh").await; // 8 bytes, two 4-byte chunks

        let server = MockServer::start().await;
        let session_uri = format!("{}/session/xyz", server.uri());

        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(header("Authorization", "Bearer tok-upload"))
            .and(header("X-Upload-Content-Length", "8"))
            .respond_with(ResponseTemplate::new(200).insert_header("Location", session_uri.as_str()))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/session/xyz"))
            .and(header("Content-Range", "bytes 0-3/8"))
            .respond_with(ResponseTemplate::new(308))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/session/xyz"))
            .and(header("Content-Range", "bytes 4-7/8"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "vid-123"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let uploader = ResumableUploader::new()
            .with_endpoint(format!("{}/upload", server.uri()))
            .with_chunk_size(4);

        let (tx, mut rx) = progress_channel();
        let id = uploader
            .upload(&job_in(&dir, None), &test_credential(), &tx)
            .await
            .unwrap();

        assert_eq!(id, VideoId("vid-123".to_string()));

        let mut seen = Vec::new();
        while let Some(ev) = rx.try_next() {
            seen.push(ev.value());
        }
        assert_eq!(seen, vec![50, 100]);
    }

    #[tokio::test]
    async fn test_session_never_closing_keeps_failure_as_only_terminal() {
        let dir = TempDir::new().unwrap();
        write_source(&dir, b"abcdefgh").await;

        let server = MockServer::start().await;
        let session_uri = format!("{}/session/stuck", server.uri());

        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200).insert_header("Location", session_uri.as_str()))
            .mount(&server)
            .await;

        // A misbehaving server that 308-acks every chunk, the final one included.
        Mock::given(method("PUT"))
            .and(path("/session/stuck"))
            .respond_with(ResponseTemplate::new(308))
            .mount(&server)
            .await;

        let uploader = ResumableUploader::new()
            .with_endpoint(format!("{}/upload", server.uri()))
            .with_chunk_size(4);

        let (tx, mut rx) = progress_channel();
        let err = uploader
            .upload(&job_in(&dir, None), &test_credential(), &tx)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Protocol(_)));

        // The stream must carry exactly one terminal value: the sentinel.
        // Intermediate chunks are capped below 100 so a consumer that stops
        // at the first terminal never reports success for a failed job.
        let mut seen = Vec::new();
        while let Some(ev) = rx.try_next() {
            seen.push(ev.value());
        }
        assert_eq!(seen, vec![50, 99, -1]);
        assert_eq!(seen.iter().filter(|v| **v == 100 || **v == -1).count(), 1);
    }

    #[tokio::test]
    async fn test_chunk_failure_aborts_with_sentinel() {
        let dir = TempDir::new().unwrap();
        write_source(&dir, b"abcdefgh").await;

        let server = MockServer::start().await;
        let session_uri = format!("{}/session/bad", server.uri());

        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200).insert_header("Location", session_uri.as_str()))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/session/bad"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend exploded"))
            .mount(&server)
            .await;

        let uploader = ResumableUploader::new()
            .with_endpoint(format!("{}/upload", server.uri()))
            .with_chunk_size(4);

        let (tx, mut rx) = progress_channel();
        let err = uploader
            .upload(&job_in(&dir, None), &test_credential(), &tx)
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Transfer(_)));
        assert_eq!(rx.drain_latest().unwrap().value(), -1);
    }

    #[tokio::test]
    async fn test_rejected_credential_is_auth_error() {
        let dir = TempDir::new().unwrap();
        write_source(&dir, b"abcdefgh").await;

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let uploader = ResumableUploader::new().with_endpoint(format!("{}/upload", server.uri()));

        let (tx, _rx) = progress_channel();
        let err = uploader
            .upload(&job_in(&dir, None), &test_credential(), &tx)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Auth(AuthError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_session_without_location_is_session_error() {
        let dir = TempDir::new().unwrap();
        write_source(&dir, b"abcdefgh").await;

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let uploader = ResumableUploader::new().with_endpoint(format!("{}/upload", server.uri()));

        let (tx, _rx) = progress_channel();
        let err = uploader
            .upload(&job_in(&dir, None), &test_credential(), &tx)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Session(_)));
    }
}
