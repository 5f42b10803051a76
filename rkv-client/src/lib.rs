//! # rkv-client
//!
//! Purpose: Provide a lightweight, synchronous RESP2 client with connection
//! pooling for one store endpoint, implementing the `KvStore` boundary.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse authenticated TCP connections.
//! 2. **Minimal Allocation**: Reuse buffers for RESP framing and parsing.
//! 3. **Protocol Clarity**: Encode/parse RESP2 explicitly for correctness.

mod client;
mod pool;
mod resp;

pub use client::{ClientConfig, ClientError, ClientResult, StoreClient};
