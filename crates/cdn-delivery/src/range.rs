//! `Range` header parsing.
//!
//! Only a single range is supported, either `bytes=<start>-<end>` (the end may be
//! omitted) or the suffix form `bytes=-<length>`. Everything else is rejected
//! rather than guessed at, so a caller never streams bytes the client did not
//! ask for.

use thiserror::Error;

/// An inclusive, zero-indexed byte window inside a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Create a range, returning `None` when `start > end`.
    pub fn new(start: u64, end: u64) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Number of bytes covered by the range, never zero.
    #[inline]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value of the `Content-Range` header for a resource of `size` bytes.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Reasons a `Range` header cannot be served.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("unsupported range unit in `{0}`")]
    UnsupportedUnit(String),

    #[error("multiple ranges are not supported")]
    MultipleRanges,

    #[error("malformed range `{0}`")]
    Malformed(String),

    #[error("suffix length must be greater than zero")]
    EmptySuffix,

    #[error("range {start}-{end} is not satisfiable for {size} bytes")]
    NotSatisfiable { start: u64, end: u64, size: u64 },
}

/// Parse a `Range` header against a resource of `size` bytes.
///
/// The end offset is clamped to `size - 1`; a start beyond the end of the
/// resource, or past the (clamped) end offset, is not satisfiable.
pub fn parse_range(header: &str, size: u64) -> Result<ByteRange, RangeError> {
    let header = header.trim();
    let (unit, spec) = header
        .split_once('=')
        .ok_or_else(|| RangeError::Malformed(header.to_string()))?;

    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return Err(RangeError::UnsupportedUnit(header.to_string()));
    }

    let spec = spec.trim();
    if spec.contains(',') {
        return Err(RangeError::MultipleRanges);
    }

    let (start_raw, end_raw) = spec
        .split_once('-')
        .ok_or_else(|| RangeError::Malformed(header.to_string()))?;
    let (start_raw, end_raw) = (start_raw.trim(), end_raw.trim());

    let (start, end) = if start_raw.is_empty() {
        if end_raw.is_empty() {
            return Err(RangeError::Malformed(header.to_string()));
        }
        let length = parse_offset(end_raw, header)?;
        if length == 0 {
            return Err(RangeError::EmptySuffix);
        }
        (size.saturating_sub(length), size.saturating_sub(1))
    } else {
        let start = parse_offset(start_raw, header)?;
        let end = if end_raw.is_empty() {
            size.saturating_sub(1)
        } else {
            parse_offset(end_raw, header)?
        };
        (start, end)
    };

    if size == 0 {
        return Err(RangeError::NotSatisfiable { start, end, size });
    }

    let clamped_end = end.min(size - 1);
    if start > clamped_end || start >= size {
        return Err(RangeError::NotSatisfiable { start, end, size });
    }

    Ok(ByteRange {
        start,
        end: clamped_end,
    })
}

fn parse_offset(raw: &str, header: &str) -> Result<u64, RangeError> {
    // `u64::from_str` accepts a leading `+`, which is not valid in a range
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeError::Malformed(header.to_string()));
    }
    raw.parse::<u64>()
        .map_err(|_| RangeError::Malformed(header.to_string()))
}
