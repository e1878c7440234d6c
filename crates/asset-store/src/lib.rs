//! Directory-backed video asset store.
//!
//! Each asset is a regular file in the store root. Next to the files the store
//! keeps a version counter per asset, which is bumped explicitly to invalidate
//! cache validators without touching the content.

pub mod error;
mod index;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{AssetStore, ChunkStream, DEFAULT_CHUNK_SIZE, StoreReceipt, VideoAsset};
