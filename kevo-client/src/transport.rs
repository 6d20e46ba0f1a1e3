/// Transport abstraction over the Kevo RPC surface
///
/// A `Transport` issues exactly one remote call per method. It performs no
/// retries, no caching and no client-side validation; those belong to the
/// session layer built on top of it.

use crate::config::ClientOptions;
use crate::error::Result;
use crate::types::{BatchOperation, KeyValue, NodeInfo, Stats};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Server-side scan bounds for one scan call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanRequest {
    pub prefix: Option<Bytes>,
    pub suffix: Option<Bytes>,
    /// Inclusive lower bound
    pub start_key: Option<Bytes>,
    /// Exclusive upper bound
    pub end_key: Option<Bytes>,
    pub limit: Option<u32>,
    /// Scope the scan to a transaction's visible state
    pub transaction_id: Option<String>,
}

/// Incrementally delivered scan results of one call
pub type ScanStream = BoxStream<'static, Result<KeyValue>>;

/// One open channel to a Kevo node
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch storage statistics; also used as the liveness probe
    async fn get_stats(&self) -> Result<Stats>;

    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    /// Returns the server's success flag
    async fn put(&self, key: &[u8], value: &[u8], sync: bool) -> Result<bool>;

    async fn delete(&self, key: &[u8], sync: bool) -> Result<bool>;

    async fn batch_write(&self, operations: &[BatchOperation], sync: bool) -> Result<bool>;

    /// Start a server-side transaction, returning its handle
    async fn begin_transaction(&self, read_only: bool) -> Result<String>;

    async fn tx_get(&self, transaction_id: &str, key: &[u8]) -> Result<Option<Bytes>>;

    async fn tx_put(&self, transaction_id: &str, key: &[u8], value: &[u8]) -> Result<bool>;

    async fn tx_delete(&self, transaction_id: &str, key: &[u8]) -> Result<bool>;

    async fn commit_transaction(&self, transaction_id: &str) -> Result<bool>;

    async fn rollback_transaction(&self, transaction_id: &str) -> Result<bool>;

    /// Open a scan; results are pulled lazily from the returned stream
    async fn scan(&self, request: ScanRequest) -> Result<ScanStream>;

    /// Fetch topology information; `None` if the server lacks the feature
    async fn get_node_info(&self) -> Result<Option<NodeInfo>>;

    /// Release the channel. Calls made afterwards fail with a connection error.
    async fn close(&self) -> Result<()>;
}

/// Opens transports for a client
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, options: &ClientOptions) -> Result<Arc<dyn Transport>>;
}
