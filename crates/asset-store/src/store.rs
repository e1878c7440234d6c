//! Asset storage rooted in a single directory.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, Take};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::index::{INDEX_FILE_NAME, VersionIndex};

/// Default read size for streamed responses.
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

/// A bounded, sequential stream of file chunks.
///
/// The underlying file handle is closed as soon as the stream is dropped.
pub type ChunkStream = ReaderStream<Take<File>>;

/// A stored video and the metadata that feeds its cache validators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoAsset {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub version: u64,
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct StoreReceipt {
    pub asset: VideoAsset,
    /// `true` if no asset with this name existed before the upload.
    pub created: bool,
}

/// Directory-backed store for video assets.
pub struct AssetStore {
    root: PathBuf,
    index: VersionIndex,
    upload_seq: AtomicU64,
}

impl AssetStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| StoreError::io_path("creating", root, e))?;
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(|e| StoreError::io_path("resolving", root, e))?;

        let index = VersionIndex::load(&root).await;
        info!(root = %root.display(), "Asset store opened");

        Ok(Self {
            root,
            index,
            upload_seq: AtomicU64::new(0),
        })
    }

    /// Canonical root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an asset name to its path inside the store.
    ///
    /// Names are single path components; separators, `..`, hidden names and
    /// control characters are rejected so the path cannot leave the root.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name != INDEX_FILE_NAME
            && !name
                .chars()
                .any(|c| c == '/' || c == '\\' || c == ':' || c.is_control());
        if !valid {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    /// Current metadata for `name`, or `None` when it is not stored here.
    pub async fn stat(&self, name: &str) -> Result<Option<VideoAsset>> {
        let path = self.resolve(name)?;

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io_path("reading metadata of", &path, e)),
        };
        if !metadata.is_file() {
            return Ok(None);
        }

        // A symlink planted in the root must not expose files outside of it
        let canonical = tokio::fs::canonicalize(&path)
            .await
            .map_err(|e| StoreError::io_path("resolving", &path, e))?;
        if !canonical.starts_with(&self.root) {
            warn!(name, target = %canonical.display(), "Asset resolves outside the store root");
            return Err(StoreError::InvalidName(name.to_string()));
        }

        let modified = metadata
            .modified()
            .map_err(|e| StoreError::io_path("reading mtime of", &path, e))?;

        Ok(Some(VideoAsset {
            name: name.to_string(),
            path,
            size: metadata.len(),
            modified: DateTime::<Utc>::from(modified),
            version: self.index.get(name).await,
        }))
    }

    /// Increment the version counter of an existing asset, forcing a new etag.
    pub async fn bump_version(&self, name: &str) -> Result<VideoAsset> {
        let Some(mut asset) = self.stat(name).await? else {
            return Err(StoreError::NotFound(name.to_string()));
        };
        asset.version = self.index.bump(name).await?;
        info!(name, version = asset.version, "Asset version bumped");
        Ok(asset)
    }

    /// Store `bytes` under `name`, replacing any previous content.
    pub async fn store(&self, name: &str, bytes: Bytes) -> Result<StoreReceipt> {
        let body = futures::stream::once(async move { Ok::<_, std::io::Error>(bytes) });
        self.store_stream(name, body, None).await
    }

    /// Stream an upload into the store.
    ///
    /// The body is written to a temporary file in the root and renamed over the
    /// final path only once it is complete, so readers never observe a partial
    /// upload. The version counter is reset to 0.
    pub async fn store_stream<S, E>(
        &self,
        name: &str,
        body: S,
        limit: Option<u64>,
    ) -> Result<StoreReceipt>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        let path = self.resolve(name)?;
        let seq = self.upload_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .root
            .join(format!(".{name}.{}.{seq}.part", std::process::id()));

        let written = match self.write_body(name, &tmp, body, limit).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(e);
            }
        };

        if written == 0 {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::EmptyUpload(name.to_string()));
        }

        let previous = tokio::fs::metadata(&path)
            .await
            .ok()
            .filter(|metadata| metadata.is_file());
        let created = previous.is_none();
        let not_before = previous.and_then(|metadata| metadata.modified().ok());
        if let Err(e) = stamp_modified(&tmp, not_before).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::io_path("renaming upload to", &path, e));
        }
        self.index.reset(name).await?;

        let asset = self
            .stat(name)
            .await?
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        info!(name, size = asset.size, created, "Asset stored");

        Ok(StoreReceipt { asset, created })
    }

    async fn write_body<S, E>(
        &self,
        name: &str,
        tmp: &Path,
        body: S,
        limit: Option<u64>,
    ) -> Result<u64>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        let mut file = File::create(tmp)
            .await
            .map_err(|e| StoreError::io_path("creating", tmp, e))?;

        let mut body = std::pin::pin!(body);
        let mut written: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| StoreError::Body {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
            written += chunk.len() as u64;
            if let Some(limit) = limit
                && written > limit
            {
                return Err(StoreError::TooLarge {
                    name: name.to_string(),
                    limit,
                });
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| StoreError::io_path("writing", tmp, e))?;
        }

        file.flush()
            .await
            .map_err(|e| StoreError::io_path("flushing", tmp, e))?;
        file.sync_all()
            .await
            .map_err(|e| StoreError::io_path("syncing", tmp, e))?;

        debug!(name, written, "Upload body written");
        Ok(written)
    }

    /// Delete an asset and its version counter.
    pub async fn purge(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()));
            }
            Err(e) => return Err(StoreError::io_path("removing", &path, e)),
        }
        self.index.reset(name).await?;
        info!(name, "Asset purged");
        Ok(())
    }

    /// Open `len` bytes of `asset` starting at `start` as a chunk stream.
    pub async fn read_window(
        &self,
        asset: &VideoAsset,
        start: u64,
        len: u64,
        chunk_size: usize,
    ) -> Result<ChunkStream> {
        let mut file = File::open(&asset.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(asset.name.clone())
            } else {
                StoreError::io_path("opening", &asset.path, e)
            }
        })?;
        if start > 0 {
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|e| StoreError::io_path("seeking", &asset.path, e))?;
        }
        Ok(ReaderStream::with_capacity(
            file.take(len),
            chunk_size.max(1),
        ))
    }
}

/// Set the modification time of `path` to now, or to just after `not_before`
/// when the clock has not moved past it.
///
/// An overwrite never keeps the (size, mtime, version) triple of the content
/// it replaces.
async fn stamp_modified(path: &Path, not_before: Option<SystemTime>) -> Result<()> {
    let mut stamp = SystemTime::now();
    if let Some(previous) = not_before {
        stamp = stamp.max(previous + Duration::from_nanos(1));
    }

    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        std::fs::OpenOptions::new()
            .write(true)
            .open(&target)?
            .set_modified(stamp)
    })
    .await
    .map_err(std::io::Error::other)
    .and_then(|result| result)
    .map_err(|e| StoreError::io_path("setting mtime of", path, e))
}
