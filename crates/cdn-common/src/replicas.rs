//! Replica list configuration.
//!
//! The list lives in a JSON file shared by the controller and the uploader.
//! Accepted shapes:
//!
//! ```json
//! ["http://127.0.0.1:9101", "http://127.0.0.1:9102"]
//! {"replicas": [{"name": "ReplicaA", "url": "http://127.0.0.1:9101/"}]}
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// One configured replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSpec {
    /// Stable identifier used in logs and diagnostics.
    pub name: String,
    /// Base URL without a trailing slash.
    pub url: String,
}

impl ReplicaSpec {
    /// Build a replica entry, validating and normalizing the URL.
    pub fn new(name: Option<&str>, url: &str) -> Result<Self> {
        let url = normalize_base_url(url)?;
        let name = match name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => url.clone(),
        };
        Ok(Self { name, url })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReplicaEntry {
    Url(String),
    Named {
        #[serde(default)]
        name: Option<String>,
        url: String,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReplicaFile {
    List(Vec<ReplicaEntry>),
    Object {
        #[serde(default)]
        replicas: Vec<ReplicaEntry>,
    },
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::replica_list("empty replica URL"));
    }

    let parsed = Url::parse(trimmed)
        .map_err(|e| Error::replica_list(format!("invalid replica URL {:?}: {}", raw, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(Error::replica_list(format!(
            "replica URL must be http(s) with a host: {:?}",
            raw
        )));
    }

    Ok(trimmed.to_string())
}

/// Parse the contents of a replica list file.
///
/// A leading UTF-8 BOM is tolerated. The result may be empty.
pub fn parse_replicas(content: &str) -> Result<Vec<ReplicaSpec>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let file: ReplicaFile = serde_json::from_str(content).map_err(|e| {
        Error::replica_list(format!(
            "expected a list or an object with 'replicas': {}",
            e
        ))
    })?;

    let entries = match file {
        ReplicaFile::List(entries) => entries,
        ReplicaFile::Object { replicas } => replicas,
    };

    entries
        .into_iter()
        .map(|entry| match entry {
            ReplicaEntry::Url(url) => ReplicaSpec::new(None, &url),
            ReplicaEntry::Named { name, url } => ReplicaSpec::new(name.as_deref(), &url),
        })
        .collect()
}

/// Parse a comma separated list of replica URLs.
pub fn parse_replica_urls(list: &str) -> Result<Vec<ReplicaSpec>> {
    list.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(|url| ReplicaSpec::new(None, url))
        .collect()
}

/// Read a replica list file. A missing file yields `Ok(None)`.
pub fn load_replicas_file(path: &Path) -> Result<Option<Vec<ReplicaSpec>>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io_path("reading replica list", path, e)),
    };

    parse_replicas(&content).map(Some)
}

/// Two local replicas, used when nothing is configured.
pub fn default_replicas() -> Vec<ReplicaSpec> {
    vec![
        ReplicaSpec {
            name: "ReplicaA".to_string(),
            url: "http://127.0.0.1:9101".to_string(),
        },
        ReplicaSpec {
            name: "ReplicaB".to_string(),
            url: "http://127.0.0.1:9102".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_list() {
        let replicas =
            parse_replicas(r#"["http://127.0.0.1:9101/", "http://127.0.0.1:9102"]"#).unwrap();
        assert_eq!(replicas.len(), 2);
        assert_eq!(replicas[0].url, "http://127.0.0.1:9101");
        assert_eq!(replicas[0].name, "http://127.0.0.1:9101");
        assert_eq!(replicas[1].url, "http://127.0.0.1:9102");
    }

    #[test]
    fn test_parse_object_with_names() {
        let replicas = parse_replicas(
            r#"{"replicas": [{"name": "ReplicaA", "url": "http://a.local:9101//"}, "http://b.local"]}"#,
        )
        .unwrap();
        assert_eq!(
            replicas,
            vec![
                ReplicaSpec {
                    name: "ReplicaA".to_string(),
                    url: "http://a.local:9101".to_string()
                },
                ReplicaSpec {
                    name: "http://b.local".to_string(),
                    url: "http://b.local".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_parse_with_bom() {
        let replicas = parse_replicas("\u{feff}[\"http://127.0.0.1:9101\"]").unwrap();
        assert_eq!(replicas.len(), 1);
    }

    #[test]
    fn test_parse_empty_inputs() {
        assert!(parse_replicas("").unwrap().is_empty());
        assert!(parse_replicas("[]").unwrap().is_empty());
        assert!(parse_replicas("{}").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert!(matches!(parse_replicas("42"), Err(Error::ReplicaList(_))));
        assert!(matches!(parse_replicas("[\"ftp://x\"]"), Err(Error::ReplicaList(_))));
        assert!(matches!(parse_replicas("[\"not a url\"]"), Err(Error::ReplicaList(_))));
    }

    #[test]
    fn test_parse_url_list() {
        let replicas = parse_replica_urls("http://a:1/, ,http://b:2").unwrap();
        assert_eq!(replicas.len(), 2);
        assert_eq!(replicas[0].url, "http://a:1");
        assert_eq!(replicas[1].url, "http://b:2");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_replicas_file(&dir.path().join("replicas.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replicas.json");
        std::fs::write(&path, r#"{"replicas": ["http://127.0.0.1:9101"]}"#).unwrap();
        let loaded = load_replicas_file(&path).unwrap().unwrap();
        assert_eq!(loaded[0].url, "http://127.0.0.1:9101");
    }

    #[test]
    fn test_defaults() {
        let defaults = default_replicas();
        assert_eq!(defaults[0].name, "ReplicaA");
        assert_eq!(defaults[1].url, "http://127.0.0.1:9102");
    }
}
