//! AWS-oriented adapters and handlers for the file pipeline.
//!
//! This crate owns runtime integration details (Lambda handlers, queue
//! publishing, table and object storage adapters). Domain contracts and
//! notification parsing live in `file_pipeline_core`.

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod telemetry;
