//! # rkv-engine
//!
//! In-process implementation of the store boundary. Useful as an embedded
//! store and as a stand-in primary/replica when exercising the controller.

mod memory;

pub use memory::MemoryStore;
