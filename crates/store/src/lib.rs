//! Durable meta-store abstraction for the ODL coordinator.
//!
//! Architecture role:
//! - binary key layout for job and region-work records
//! - [`MetaStore`] contract consumed by the consensus seam and rehydration
//! - in-memory implementation with JSON snapshot persistence
//!
//! Key modules:
//! - [`keys`]
//! - [`meta_store`]

pub mod keys;
pub mod meta_store;

pub use meta_store::{MemMetaStore, MetaStore};
