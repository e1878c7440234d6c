use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid asset name `{0}`")]
    InvalidName(String),

    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("upload for `{0}` is empty")]
    EmptyUpload(String),

    #[error("upload for `{name}` exceeds the {limit} byte limit")]
    TooLarge { name: String, limit: u64 },

    #[error("upload body for `{name}` failed: {reason}")]
    Body { name: String, reason: String },

    #[error("I/O error while {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("version index error: {0}")]
    Index(#[from] serde_json::Error),
}

impl StoreError {
    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
