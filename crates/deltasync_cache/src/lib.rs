//! # DeltaSync Cache
//!
//! Client-side persistent cache and offline queue for DeltaSync.
//!
//! This crate provides:
//! - `CacheBackend` trait with in-memory and file implementations
//! - `LocalCache`: one record collection per model, secondary indexes per
//!   indexed property plus a mandatory sync-id index, a `last_sync_id`
//!   metadata slot and a durable FIFO offline transaction queue
//! - Schema-hash comparison at open time; a mismatch wipes the cache so a
//!   fresh bootstrap can rebuild it
//!
//! The cache is a mirror, never the authority: deletes here are physical,
//! only the server keeps tombstones.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod cache;
mod error;

pub use backend::{CacheBackend, FileBackend, MemoryBackend};
pub use cache::LocalCache;
pub use error::{CacheError, CacheResult};
