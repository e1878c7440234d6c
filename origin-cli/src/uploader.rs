//! Pushing local videos to replicas.

use std::path::{Path, PathBuf};
use std::time::Duration;

use cdn_common::{ReplicaSpec, load_replicas_file};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

/// Header carrying the video id on upload.
const VIDEO_ID_HEADER: &str = "video-id";

/// Replica statuses that count as a delivered upload.
const ACCEPTED_STATUSES: [u16; 4] = [200, 201, 204, 409];

pub type Result<T> = std::result::Result<T, UploadError>;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Replica list not found: {}", .0.display())]
    MissingReplicaList(PathBuf),

    #[error("Replica list is empty: {}", .0.display())]
    EmptyReplicaList(PathBuf),

    #[error(transparent)]
    Config(#[from] cdn_common::Error),

    #[error("Cannot read videos directory {}: {source}", path.display())]
    VideosDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Load the replicas to push to. A missing or empty list is an error.
pub fn load_targets(path: &Path) -> Result<Vec<ReplicaSpec>> {
    match load_replicas_file(path)? {
        None => Err(UploadError::MissingReplicaList(path.to_path_buf())),
        Some(replicas) if replicas.is_empty() => {
            Err(UploadError::EmptyReplicaList(path.to_path_buf()))
        }
        Some(replicas) => Ok(replicas),
    }
}

/// All `*.mp4` files directly inside `dir`, sorted by name.
pub async fn find_videos(dir: &Path) -> Result<Vec<PathBuf>> {
    let videos_dir = |source| UploadError::VideosDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(videos_dir)?;
    let mut videos = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(videos_dir)? {
        let path = entry.path();
        let is_mp4 = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("mp4"));
        let is_file = entry
            .file_type()
            .await
            .map(|file_type| file_type.is_file())
            .unwrap_or(false);
        if is_mp4 && is_file {
            videos.push(path);
        }
    }

    videos.sort();
    Ok(videos)
}

/// Result of pushing one video to one replica.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub video: String,
    pub replica: String,
    pub status: Option<u16>,
    pub error: Option<String>,
}

impl UploadOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Every outcome of a run.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub outcomes: Vec<UploadOutcome>,
}

impl UploadReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &UploadOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Uploads videos with a bounded time per request.
pub struct Uploader {
    client: reqwest::Client,
}

impl Uploader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Push every video to every replica, best effort.
    pub async fn push_all(&self, replicas: &[ReplicaSpec], videos: &[PathBuf]) -> UploadReport {
        let mut report = UploadReport::default();

        for video in videos {
            let video_id = video
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();

            for replica in replicas {
                let outcome = match self.upload(replica, video, &video_id).await {
                    Ok(status) if ACCEPTED_STATUSES.contains(&status) => {
                        info!(video = %video_id, replica = %replica.name, status, "Uploaded");
                        UploadOutcome {
                            video: video_id.clone(),
                            replica: replica.name.clone(),
                            status: Some(status),
                            error: None,
                        }
                    }
                    Ok(status) => {
                        warn!(video = %video_id, replica = %replica.name, status, "Upload rejected");
                        UploadOutcome {
                            video: video_id.clone(),
                            replica: replica.name.clone(),
                            status: Some(status),
                            error: Some(format!("replica answered {}", status)),
                        }
                    }
                    Err(e) => {
                        warn!(video = %video_id, replica = %replica.name, error = %e, "Upload failed");
                        UploadOutcome {
                            video: video_id.clone(),
                            replica: replica.name.clone(),
                            status: None,
                            error: Some(e.to_string()),
                        }
                    }
                };
                report.outcomes.push(outcome);
            }
        }

        report
    }

    /// Stream one file to `POST {replica}/upload`, returning the status.
    async fn upload(&self, replica: &ReplicaSpec, video: &Path, video_id: &str) -> anyhow::Result<u16> {
        let file = tokio::fs::File::open(video).await?;
        let size = file.metadata().await?.len();
        let url = format!("{}/upload", replica.url);
        debug!(url = %url, size, "Uploading");

        let response = self
            .client
            .post(&url)
            .header(VIDEO_ID_HEADER, video_id)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, size)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;

        Ok(response.status().as_u16())
    }
}
