//! HashHunt - distributed hash preimage search
//!
//! HashHunt coordinates a brute-force search over a large ordered numeric
//! keyspace, splitting it across many remote workers that each test
//! candidates against a fixed target digest until one reports a match.
//!
//! # Architecture
//!
//! - **Coordinator**: owns the keyspace cursor, assignment tracking, and
//!   the single-shot found state; broadcasts stop exactly once
//! - **Worker**: polls for blocks and fans each one out across local
//!   parallel units racing to the first match
//! - **Protocol**: length-framed MessagePack messages over TCP
//! - **Reclaim queue**: blocks abandoned by disconnected workers are
//!   reissued, so no keyspace is ever silently lost

pub mod config;
pub mod coordinator;
pub mod fingerprint;
pub mod keyspace;
pub mod protocol;
pub mod worker;

// Re-export commonly used types
pub use config::{CoordinatorConfig, WorkerConfig};
pub use coordinator::SearchCoordinator;
pub use fingerprint::Fingerprint;
pub use keyspace::{BlockRange, SearchSpace};

/// Result type used throughout HashHunt
pub type Result<T> = anyhow::Result<T>;
