/// Kevo client facade
use crate::batch::WriteBatch;
use crate::config::ClientOptions;
use crate::connection::{ensure_applied, ConnectionManager, ConnectionState};
use crate::error::Result;
use crate::grpc::GrpcConnector;
use crate::retry::RetryPolicy;
use crate::scan::{ScanCursor, ScanOptions};
use crate::topology::TopologyRouter;
use crate::transaction::Transaction;
use crate::transport::Connector;
use crate::types::{BatchOperation, NodeInfo, Stats};
use bytes::Bytes;
use std::sync::Arc;

/// Kevo remote client
///
/// Holds one logical connection. Methods take `&self`, so a client can be
/// shared behind an `Arc`; calls made while disconnected fail with a
/// connection error without touching the network.
pub struct Client {
    connections: ConnectionManager,
}

impl Client {
    /// Create a gRPC client. No connection is made until [`connect`](Client::connect).
    ///
    /// # Example
    /// ```no_run
    /// # use kevo_client::{Client, ClientOptions};
    /// # async fn example() -> kevo_client::Result<()> {
    /// let client = Client::new(ClientOptions::new("localhost:50051"))?;
    /// client.connect().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(options: ClientOptions) -> Result<Self> {
        Self::with_connector(options, Arc::new(GrpcConnector))
    }

    /// Create a client over a custom transport, such as a
    /// [`MemoryStore`](crate::MemoryStore)
    pub fn with_connector(options: ClientOptions, connector: Arc<dyn Connector>) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            connections: ConnectionManager::new(options, connector),
        })
    }

    pub fn options(&self) -> &ClientOptions {
        self.connections.options()
    }

    /// Connect and probe the server; a no-op when already connected
    pub async fn connect(&self) -> Result<()> {
        self.connections.connect().await
    }

    /// Close the connection, rolling back transactions still open on it
    pub async fn close(&self) -> Result<()> {
        self.connections.close().await
    }

    pub fn is_connected(&self) -> bool {
        self.connections.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.connections.state()
    }

    /// Get the value stored under `key`
    ///
    /// # Returns
    /// The value if found, None otherwise
    pub async fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let connection = self.connections.current()?;
        connection
            .call(
                "Get",
                connection.request_timeout(),
                connection.transport().get(key),
            )
            .await
    }

    /// Store `value` under `key`
    ///
    /// # Arguments
    /// * `key` - Key to write
    /// * `value` - Value bytes, stored verbatim
    /// * `sync` - Wait for durable persistence before returning
    ///
    /// # Example
    /// ```no_run
    /// # use kevo_client::{Client, ClientOptions};
    /// # async fn example() -> kevo_client::Result<()> {
    /// let client = Client::new(ClientOptions::default())?;
    /// client.connect().await?;
    ///
    /// client.put(b"user:1001", b"alice", true).await?;
    /// assert_eq!(client.get(b"user:1001").await?.as_deref(), Some(&b"alice"[..]));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn put(&self, key: &[u8], value: &[u8], sync: bool) -> Result<()> {
        let connection = self.connections.current()?;
        let success = connection
            .call(
                "Put",
                connection.write_timeout(sync),
                connection.transport().put(key, value, sync),
            )
            .await?;
        ensure_applied("Put", success)
    }

    /// Delete `key`; deleting an absent key succeeds
    pub async fn delete(&self, key: &[u8], sync: bool) -> Result<()> {
        let connection = self.connections.current()?;
        let success = connection
            .call(
                "Delete",
                connection.write_timeout(sync),
                connection.transport().delete(key, sync),
            )
            .await?;
        ensure_applied("Delete", success)
    }

    /// Apply `operations` atomically, in order
    pub async fn batch_write(&self, operations: Vec<BatchOperation>, sync: bool) -> Result<()> {
        self.write(WriteBatch::from_operations(operations, sync)).await
    }

    /// Apply a prepared [`WriteBatch`]
    pub async fn write(&self, batch: WriteBatch) -> Result<()> {
        let connection = self.connections.current()?;
        batch.execute(&connection).await
    }

    /// Start a scan. No request is sent until the cursor is first advanced.
    ///
    /// # Example
    /// ```no_run
    /// # use kevo_client::{Client, ClientOptions, ScanOptions};
    /// # async fn example() -> kevo_client::Result<()> {
    /// let client = Client::new(ClientOptions::default())?;
    /// client.connect().await?;
    ///
    /// let mut cursor = client.scan(ScanOptions::new().prefix("user:").limit(10))?;
    /// while let Some(entry) = cursor.next().await? {
    ///     println!("{:?} = {:?}", entry.key, entry.value);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn scan(&self, options: ScanOptions) -> Result<ScanCursor> {
        options.validate()?;
        let connection = self.connections.current()?;
        Ok(ScanCursor::new(connection, options, None))
    }

    /// Begin a server-side transaction
    ///
    /// # Arguments
    /// * `read_only` - Reject writes client-side, before any round trip
    pub async fn begin_transaction(&self, read_only: bool) -> Result<Transaction> {
        let connection = self.connections.current()?;
        Transaction::begin(connection, read_only).await
    }

    /// Storage statistics of the connected node
    pub async fn get_stats(&self) -> Result<Stats> {
        let connection = self.connections.current()?;
        connection
            .call(
                "GetStats",
                connection.request_timeout(),
                connection.transport().get_stats(),
            )
            .await
    }

    /// Topology queries over this client's connection
    pub fn topology(&self) -> Result<TopologyRouter> {
        Ok(TopologyRouter::new(self.connections.current()?))
    }

    /// Fresh node info, or `None` if the server does not report topology
    pub async fn get_node_info(&self) -> Result<Option<NodeInfo>> {
        self.topology()?.get_node_info().await
    }

    /// Retry policy bounded by the configured `max_retries`
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.options().max_retries,
            ..RetryPolicy::fast()
        }
    }
}
