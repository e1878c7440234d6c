//! Video id rules shared by the controller, replicas and the uploader.
//!
//! Clients address videos by id. An id with a known video extension is used
//! as-is, anything else gets `.mp4` appended, so `clip` and `clip.mp4` name
//! the same stored file.

use crate::error::{Error, Result};

/// Extension appended to ids that carry no known video extension.
pub const DEFAULT_EXTENSION: &str = "mp4";

/// Known video extensions and their content types.
const VIDEO_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mov", "video/quicktime"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
    ("ts", "video/mp2t"),
];

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Characters that may not appear in a stored file name.
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

fn extension(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

fn known_type(ext: &str) -> Option<&'static str> {
    VIDEO_TYPES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map(|(_, content_type)| *content_type)
}

/// Whether `name` ends in a known video extension.
pub fn has_video_extension(name: &str) -> bool {
    extension(name).and_then(known_type).is_some()
}

/// Content type for a stored file name, inferred from its extension.
pub fn content_type_for(name: &str) -> &'static str {
    extension(name)
        .and_then(known_type)
        .unwrap_or(FALLBACK_CONTENT_TYPE)
}

/// Map a requested id to its stored file name.
///
/// Rejects ids that could leave the asset directory or would be hidden:
/// empty ids, ids starting with `.`, path separators and control characters.
pub fn normalize_video_name(id: &str) -> Result<String> {
    let id = id.trim();
    if id.is_empty()
        || id.starts_with('.')
        || id
            .chars()
            .any(|c| c.is_control() || INVALID_CHARS.contains(&c))
    {
        return Err(Error::InvalidName(id.to_string()));
    }

    if has_video_extension(id) {
        Ok(id.to_string())
    } else {
        Ok(format!("{}.{}", id, DEFAULT_EXTENSION))
    }
}

/// Turn a client supplied upload id into a stored file name.
///
/// Invalid characters are replaced by a single `_`, leading and trailing
/// dots and spaces are dropped. Fails when nothing usable remains.
pub fn sanitize_video_id(input: &str) -> Result<String> {
    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars() {
        if c.is_control() || INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = result.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_') {
        return Err(Error::InvalidName(input.to_string()));
    }

    normalize_video_name(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_appends_extension() {
        assert_eq!(normalize_video_name("clip").unwrap(), "clip.mp4");
        assert_eq!(normalize_video_name("clip.mp4").unwrap(), "clip.mp4");
        assert_eq!(normalize_video_name("talk.WEBM").unwrap(), "talk.WEBM");
        assert_eq!(normalize_video_name("season.1").unwrap(), "season.1.mp4");
    }

    #[test]
    fn test_normalize_rejects_traversal() {
        for id in ["", "  ", "../secret", "a/b", "a\\b", ".hidden", "..", "c:clip", "a\nb"] {
            assert!(
                matches!(normalize_video_name(id), Err(Error::InvalidName(_))),
                "{:?} should be rejected",
                id
            );
        }
    }

    #[test]
    fn test_sanitize_upload_id() {
        assert_eq!(sanitize_video_id("clip").unwrap(), "clip.mp4");
        assert_eq!(sanitize_video_id("my clip?.mp4").unwrap(), "my clip_.mp4");
        assert_eq!(sanitize_video_id("../etc/passwd").unwrap(), "_etc_passwd.mp4");
        assert_eq!(sanitize_video_id("  .movie. ").unwrap(), "movie.mp4");
        assert_eq!(sanitize_video_id("观看.mkv").unwrap(), "观看.mkv");
    }

    #[test]
    fn test_sanitize_rejects_empty() {
        assert!(sanitize_video_id("").is_err());
        assert!(sanitize_video_id(" . ").is_err());
        assert!(sanitize_video_id("///").is_err());
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type_for("clip.mp4"), "video/mp4");
        assert_eq!(content_type_for("clip.MOV"), "video/quicktime");
        assert_eq!(content_type_for("clip.webm"), "video/webm");
        assert_eq!(content_type_for("notes.txt"), "application/octet-stream");
        assert_eq!(content_type_for("mp4"), "application/octet-stream");
    }
}
