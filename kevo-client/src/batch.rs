/// Atomic batch writes
use crate::connection::{ensure_applied, Connection};
use crate::error::Result;
use crate::types::BatchOperation;
use bytes::Bytes;

/// Batch write request builder
///
/// Operations are sent in the order they were added and applied all or
/// nothing by the server.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    operations: Vec<BatchOperation>,
    sync: bool,
}

impl WriteBatch {
    /// Create an empty, non-durable batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a batch from prepared operations
    pub fn from_operations(operations: Vec<BatchOperation>, sync: bool) -> Self {
        Self { operations, sync }
    }

    /// Add a put operation
    pub fn put(mut self, key: &[u8], value: &[u8]) -> Self {
        self.operations.push(BatchOperation::Put {
            key: Bytes::copy_from_slice(key),
            value: Bytes::copy_from_slice(value),
        });
        self
    }

    /// Add a delete operation
    pub fn delete(mut self, key: &[u8]) -> Self {
        self.operations.push(BatchOperation::Delete {
            key: Bytes::copy_from_slice(key),
        });
        self
    }

    /// Wait for durable persistence before the call returns
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[BatchOperation] {
        &self.operations
    }

    /// Send the batch as one BatchWrite call.
    ///
    /// An empty batch succeeds without a round trip.
    pub(crate) async fn execute(self, connection: &Connection) -> Result<()> {
        if self.operations.is_empty() {
            return Ok(());
        }

        let success = connection
            .call(
                "BatchWrite",
                connection.write_timeout(self.sync),
                connection.transport().batch_write(&self.operations, self.sync),
            )
            .await?;
        ensure_applied("BatchWrite", success)
    }
}
