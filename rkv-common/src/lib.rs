// rkv-common - Shared types for the replicated key-value access layer
//
// This crate defines the error taxonomy, configuration records, glob helpers
// and the store boundary every other crate builds on.

pub mod config;
pub mod error;
pub mod glob;
pub mod store;
pub mod types;

// Re-export for convenience
pub use config::*;
pub use error::*;
pub use store::{scan, KvStore, ScanIter, ScanPage};
pub use types::*;
