//! Cache validators (`ETag` / `Last-Modified`) and HTTP-date helpers.

use chrono::{DateTime, NaiveDateTime, Utc};
use sha2::{Digest, Sha256};

/// IMF-fixdate layout, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// RFC 850 layout, e.g. `Sunday, 06-Nov-94 08:49:37 GMT`.
const RFC850_DATE: &str = "%A, %d-%b-%y %H:%M:%S GMT";

/// asctime layout, e.g. `Sun Nov  6 08:49:37 1994`.
const ASCTIME_DATE: &str = "%a %b %e %H:%M:%S %Y";

/// Validator pair derived from a resource's size, modification time and
/// version counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheValidator {
    etag: String,
    last_modified: String,
}

impl CacheValidator {
    /// Compute the validator for a resource.
    ///
    /// The etag covers the modification time at nanosecond precision, so two
    /// uploads within the same second still produce different etags.
    pub fn compute(size: u64, modified: DateTime<Utc>, version: u64) -> Self {
        let nanos = i128::from(modified.timestamp()) * 1_000_000_000
            + i128::from(modified.timestamp_subsec_nanos());

        let mut hasher = Sha256::new();
        hasher.update(format!("{size}-{nanos}-{version}").as_bytes());
        let digest = hasher.finalize();

        Self {
            etag: format!("\"{}\"", hex::encode(&digest[..16])),
            last_modified: format_http_date(modified),
        }
    }

    /// Quoted strong etag.
    pub fn etag(&self) -> &str {
        &self.etag
    }

    /// `Last-Modified` header value.
    pub fn last_modified(&self) -> &str {
        &self.last_modified
    }

    /// Evaluate an `If-None-Match` header against this validator.
    ///
    /// Uses weak comparison: a `W/` prefix on a listed tag is ignored.
    pub fn matches_if_none_match(&self, header: &str) -> bool {
        header
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .any(|tag| {
                if tag == "*" {
                    return true;
                }
                let tag = tag.strip_prefix("W/").unwrap_or(tag);
                tag == self.etag
            })
    }
}

/// Format a timestamp as an IMF-fixdate.
pub fn format_http_date(at: DateTime<Utc>) -> String {
    at.format(IMF_FIXDATE).to_string()
}

/// Parse any of the three date formats HTTP/1.1 recipients must accept.
pub fn parse_http_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc2822(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, RFC850_DATE)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, ASCTIME_DATE))
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap()
    }

    #[test]
    fn test_etag_is_quoted_and_deterministic() {
        let a = CacheValidator::compute(5000, sample_time(), 0);
        let b = CacheValidator::compute(5000, sample_time(), 0);
        assert_eq!(a, b);
        assert!(a.etag().starts_with('"') && a.etag().ends_with('"'));
        assert_eq!(a.etag().len(), 34);
    }

    #[test]
    fn test_any_input_change_alters_etag() {
        let base = CacheValidator::compute(5000, sample_time(), 0);
        let resized = CacheValidator::compute(5001, sample_time(), 0);
        let touched =
            CacheValidator::compute(5000, sample_time() + chrono::Duration::nanoseconds(1), 0);
        let busted = CacheValidator::compute(5000, sample_time(), 1);

        assert_ne!(base.etag(), resized.etag());
        assert_ne!(base.etag(), touched.etag());
        assert_ne!(base.etag(), busted.etag());
        assert_ne!(touched.etag(), busted.etag());
    }

    #[test]
    fn test_last_modified_format() {
        let validator = CacheValidator::compute(1, sample_time(), 0);
        assert_eq!(validator.last_modified(), "Fri, 01 Mar 2024 12:30:45 GMT");
    }

    #[test]
    fn test_if_none_match_list() {
        let validator = CacheValidator::compute(10, sample_time(), 3);
        let etag = validator.etag().to_string();

        assert!(validator.matches_if_none_match(&etag));
        assert!(validator.matches_if_none_match(&format!("\"other\", {etag}")));
        assert!(validator.matches_if_none_match(&format!("W/{etag}")));
        assert!(validator.matches_if_none_match("*"));
        assert!(!validator.matches_if_none_match("\"other\""));
        assert!(!validator.matches_if_none_match(etag.trim_matches('"')));
        assert!(!validator.matches_if_none_match(""));
    }

    #[test]
    fn test_parse_http_date_formats() {
        let expected = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        assert_eq!(parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT"), Some(expected));
        assert_eq!(parse_http_date("Sunday, 06-Nov-94 08:49:37 GMT"), Some(expected));
        assert_eq!(parse_http_date("Sun Nov  6 08:49:37 1994"), Some(expected));
        assert_eq!(parse_http_date("yesterday"), None);
    }

    #[test]
    fn test_format_then_parse_is_stable() {
        let at = sample_time();
        assert_eq!(parse_http_date(&format_http_date(at)), Some(at));
    }
}
