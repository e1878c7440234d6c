//! Delivery decisions for byte-range video serving.
//!
//! Pure logic shared by the replica server: `Range` parsing, cache validators
//! and the ordering of conditional checks that decides between `200`, `206`,
//! `304`, `404` and `416`.

pub mod conditional;
pub mod range;
pub mod validator;

pub use conditional::{Outcome, RequestConditions, Resource, ResourceMeta, decide};
pub use range::{ByteRange, RangeError, parse_range};
pub use validator::{CacheValidator, format_http_date, parse_http_date};
