pub mod aws;
pub mod metadata_store;
pub mod object_inspector;
pub mod result_queue;
