/// Kevo gRPC Client Library
///
/// This crate provides a Rust client for the Kevo key-value store: single-key
/// operations, filtered scans, atomic batches, interactive transactions and
/// topology discovery.

pub mod error;
pub mod config;
pub mod types;
pub mod transport;
pub mod grpc;
pub mod memory;
pub mod connection;
pub mod topology;
pub mod scan;
pub mod batch;
pub mod transaction;
pub mod retry;
pub mod client;

// Re-export key types
pub use client::Client;
pub use config::{ClientOptions, DEFAULT_ENDPOINT};
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{ClientError, Result};
pub use grpc::{GrpcConnector, GrpcTransport};
pub use memory::MemoryStore;
pub use retry::{retry, retry_with_policy, RetryPolicy};
pub use scan::{ScanCursor, ScanOptions};
pub use topology::{OperationKind, Route, TopologyRouter};
pub use transaction::{Transaction, TransactionState};
pub use transport::{Connector, ScanRequest, ScanStream, Transport};
pub use types::{BatchOperation, KeyValue, NodeInfo, NodeRole, ReplicaInfo, Stats};
pub use batch::WriteBatch;
