//! # DeltaSync Protocol
//!
//! Shared sync protocol types for DeltaSync.
//!
//! This crate provides:
//! - `SyncAction` / `Transaction` for client-submitted mutations
//! - `SyncRecord` for server-owned record state
//! - `DeltaSyncAction` / `DeltaPacket` for confirmed change deltas
//! - Request/response bodies for the bootstrap, pull and push endpoints
//! - The shared shallow-merge rule applied by server and client alike
//!
//! This is a pure protocol crate with no I/O. All types serialize to the
//! camelCase JSON shapes used on the wire.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod messages;
mod record;

pub use action::{ActionType, DeltaPacket, DeltaSyncAction, SyncAction, Transaction};
pub use messages::{BootstrapResponse, PullResponse, PushRequest, PushResponse};
pub use record::{merge_data, now_millis, DataMap, SyncRecord};
