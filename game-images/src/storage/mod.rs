//! Storage module
//!
//! Deduplicated, reference-counted storage for image payloads.

pub mod blob_store;
pub mod hash;

pub use blob_store::BlobStore;
pub use hash::digest;
