//! # DeltaSync Client
//!
//! Sync orchestrator and transport abstraction for DeltaSync.
//!
//! This crate provides:
//! - `SyncClient`: the orchestrator owning the in-memory mirror and
//!   coordinating bootstrap, optimistic push, ordered pull and offline
//!   queue flushing
//! - `SyncTransport` trait with mock, HTTP and loopback implementations
//! - A pull scheduler for timer-driven polling with clean cancellation
//!
//! ## Key invariants
//!
//! - The server is authoritative; its sync ids replace optimistic state
//! - Delta actions are applied in ascending sync id order
//! - A transaction is durably queued *before* its network send, so a crash
//!   mid-flight never loses a mutation
//! - Queued transactions replay strictly in original submission order
//! - Push, pull and flush are mutually exclusive per client instance; a
//!   push's confirmed state is never overwritten by a concurrent pull

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod error;
mod http;
mod poller;
mod transport;

pub use client::{RecordChange, SubscriptionId, SyncClient};
pub use config::ClientConfig;
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpTransport, LoopbackClient, LoopbackServer};
pub use poller::PullScheduler;
pub use transport::{MockTransport, SyncTransport};
