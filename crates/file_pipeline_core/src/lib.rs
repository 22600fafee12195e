//! Shared file pipeline domain primitives.
//!
//! This crate owns notification parsing, the metadata record and result
//! message contracts, and key derivation. It intentionally excludes AWS SDK
//! and Lambda runtime concerns.

pub mod contract;
pub mod keys;
pub mod notification;
