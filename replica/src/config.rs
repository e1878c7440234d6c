//! Replica configuration.

use std::path::PathBuf;

use asset_store::DEFAULT_CHUNK_SIZE;
use cdn_common::ServerConfig;
use cdn_common::server::env_parse;

/// Default listen port of a replica.
pub const DEFAULT_PORT: u16 = 9101;

/// Default `Cache-Control` sent with every video response.
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=3600";

/// Replica configuration.
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    /// Name reported by `/healthz` and in logs.
    pub name: String,
    /// Directory holding the video files.
    pub videos_dir: PathBuf,
    /// Read size used when streaming a file.
    pub chunk_size: usize,
    /// Maximum accepted upload size, unlimited when `None`.
    pub max_upload_bytes: Option<u64>,
    /// `Cache-Control` header value for video responses.
    pub cache_control: String,
    /// HTTP server settings.
    pub server: ServerConfig,
}

impl ReplicaConfig {
    pub fn new(name: impl Into<String>, videos_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            videos_dir: videos_dir.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_upload_bytes: None,
            cache_control: DEFAULT_CACHE_CONTROL.to_string(),
            server: ServerConfig::new(DEFAULT_PORT),
        }
    }

    /// Load replica config from environment variables, falling back to defaults.
    ///
    /// Supported env vars (besides the server ones):
    /// - `REPLICA_NAME` (defaults to `replica-{port}`)
    /// - `VIDEOS_DIR` (defaults to `videos`)
    /// - `CHUNK_SIZE` in bytes
    /// - `MAX_UPLOAD_BYTES`
    /// - `CACHE_CONTROL`
    pub fn from_env_or_default() -> Self {
        let server = ServerConfig::from_env_or_default(DEFAULT_PORT);

        let name = std::env::var("REPLICA_NAME")
            .ok()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("replica-{}", server.port));

        let videos_dir = std::env::var("VIDEOS_DIR")
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .unwrap_or_else(|| "videos".to_string());

        let mut config = Self::new(name, videos_dir);
        config.server = server;

        if let Some(chunk_size) = env_parse::<usize>("CHUNK_SIZE")
            && chunk_size > 0
        {
            config.chunk_size = chunk_size;
        }

        config.max_upload_bytes = env_parse::<u64>("MAX_UPLOAD_BYTES").filter(|limit| *limit > 0);

        if let Ok(cache_control) = std::env::var("CACHE_CONTROL")
            && !cache_control.trim().is_empty()
        {
            config.cache_control = cache_control.trim().to_string();
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReplicaConfig::new("ReplicaA", "videos");
        assert_eq!(config.chunk_size, 512 * 1024);
        assert_eq!(config.cache_control, "public, max-age=3600");
        assert_eq!(config.server.port, 9101);
        assert!(config.max_upload_bytes.is_none());
    }
}
