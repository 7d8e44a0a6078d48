//! # DeltaSync Server
//!
//! Authoritative store and change log for DeltaSync.
//!
//! This crate provides:
//! - `ServerStore`: the single authority over records, the append-only
//!   change log and the global sync id counter
//! - `TransactionValidator`: the gate invoked before any transaction
//!   reaches the store (a rejection consumes zero sync ids)
//! - `RequestHandler` / `SyncServer`: the bootstrap, pull and push contracts
//!   with their HTTP status mapping; the transport itself is supplied by
//!   the embedding application
//!
//! # Ordering
//!
//! All `apply_transaction` calls execute in one atomic critical section:
//! counter increment, record mutation and log append never interleave with
//! a concurrent writer. Reads run concurrently and always observe a fully
//! applied (pre- or post-transaction) state.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod handler;
mod server;
mod store;
mod validate;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::RequestHandler;
pub use server::SyncServer;
pub use store::ServerStore;
pub use validate::{AcceptAll, RecordCapValidator, TransactionValidator};
