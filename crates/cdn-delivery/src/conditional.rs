//! Request outcome decision: conditional headers first, then ranges.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::range::{ByteRange, parse_range};
use crate::validator::{CacheValidator, parse_http_date};

/// Metadata of a stored resource that influences delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMeta {
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub version: u64,
}

/// A resource paired with its cache validator.
#[derive(Debug, Clone)]
pub struct Resource {
    meta: ResourceMeta,
    validator: CacheValidator,
}

impl Resource {
    pub fn new(meta: ResourceMeta) -> Self {
        let validator = CacheValidator::compute(meta.size, meta.modified, meta.version);
        Self { meta, validator }
    }

    pub fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    pub fn validator(&self) -> &CacheValidator {
        &self.validator
    }
}

/// Request headers that steer the outcome, as raw header values.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestConditions<'a> {
    pub range: Option<&'a str>,
    pub if_none_match: Option<&'a str>,
    pub if_modified_since: Option<&'a str>,
}

/// What to answer for a single request. Exactly one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `200`, the whole resource.
    Full { size: u64 },
    /// `206`, a single byte window.
    Partial { range: ByteRange, size: u64 },
    /// `304`, the client's cached copy is current.
    NotModified,
    /// `416`, the range could not be parsed or lies outside the resource.
    RangeNotSatisfiable { size: u64 },
    /// `404`, no such resource on this node.
    NotFound,
}

impl Outcome {
    /// HTTP status code for the outcome.
    pub fn status(&self) -> u16 {
        match self {
            Outcome::Full { .. } => 200,
            Outcome::Partial { .. } => 206,
            Outcome::NotModified => 304,
            Outcome::RangeNotSatisfiable { .. } => 416,
            Outcome::NotFound => 404,
        }
    }

    /// Number of body bytes, if the outcome carries a body.
    pub fn content_length(&self) -> Option<u64> {
        match self {
            Outcome::Full { size } => Some(*size),
            Outcome::Partial { range, .. } => Some(range.len()),
            _ => None,
        }
    }

    /// Byte window to stream, if any. `Full` on an empty resource streams nothing.
    pub fn window(&self) -> Option<ByteRange> {
        match self {
            Outcome::Full { size } if *size > 0 => ByteRange::new(0, size - 1),
            Outcome::Partial { range, .. } => Some(*range),
            _ => None,
        }
    }
}

/// Decide how to answer a request for `resource`.
///
/// `If-None-Match` is evaluated first and, when present, `If-Modified-Since` is
/// ignored. A matching conditional short-circuits range handling, so a client
/// revalidating a cached chunk gets `304` even when it also sent `Range`.
pub fn decide(resource: Option<&Resource>, conditions: &RequestConditions<'_>) -> Outcome {
    let Some(resource) = resource else {
        return Outcome::NotFound;
    };
    let size = resource.meta.size;

    if let Some(if_none_match) = conditions.if_none_match {
        if resource.validator.matches_if_none_match(if_none_match) {
            return Outcome::NotModified;
        }
    } else if let Some(since) = conditions.if_modified_since.and_then(parse_http_date)
        && resource.meta.modified.timestamp() <= since.timestamp()
    {
        return Outcome::NotModified;
    }

    let Some(range_header) = conditions.range else {
        return Outcome::Full { size };
    };

    match parse_range(range_header, size) {
        Ok(range) => Outcome::Partial { range, size },
        Err(e) => {
            debug!(range = %range_header, size, error = %e, "Rejecting range request");
            Outcome::RangeNotSatisfiable { size }
        }
    }
}
