//! # DeltaSync Model
//!
//! Model registry and schema fingerprinting for DeltaSync.
//!
//! This crate provides:
//! - `ModelMeta` / `PropertyMeta` descriptors for synced entity types
//! - `ModelRegistry` for looking up registered models
//! - A deterministic schema hash used to detect incompatible client caches
//!
//! The registry is an explicit instance passed by handle to every consumer,
//! never a process-global. Models are expected to be registered once at
//! startup from a static table; re-registering a name is a non-fatal
//! last-write-wins with a warning.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod meta;
mod registry;

pub use meta::{ModelMeta, PropertyMeta, PropertyType};
pub use registry::ModelRegistry;
