/// Server-side interactive transactions
///
/// A [`Transaction`] carries the handle the server issued at begin time and
/// scopes every read, write and scan to it until commit or rollback.
///
/// A transaction is not meant to be shared between tasks; callers that do
/// so must synchronize access themselves.

use crate::connection::{ensure_applied, Connection};
use crate::error::{ClientError, Result};
use crate::scan::{ScanCursor, ScanOptions};
use bytes::Bytes;
use tracing::{debug, warn};

/// Lifecycle state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
    /// The commit was sent but its reply was lost; the server may have applied it
    Unknown,
}

/// One server-side transaction.
///
/// Once committed or rolled back, every further operation fails with
/// [`ClientError::InvalidState`] without a round trip. Dropping an active
/// transaction sends a best-effort rollback in the background.
pub struct Transaction {
    id: String,
    read_only: bool,
    state: TransactionState,
    connection: Connection,
}

impl Transaction {
    pub(crate) async fn begin(connection: Connection, read_only: bool) -> Result<Self> {
        let id = connection
            .call(
                "BeginTransaction",
                connection.request_timeout(),
                connection.transport().begin_transaction(read_only),
            )
            .await?;

        connection.track_transaction(&id);
        connection
            .observe(async {
                debug!(transaction_id = %id, read_only, "transaction started");
            })
            .await;

        Ok(Self {
            id,
            read_only,
            state: TransactionState::Active,
            connection,
        })
    }

    /// Server-issued handle
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Current state; a transaction abandoned by `Client::close` reads as
    /// rolled back
    pub fn state(&self) -> TransactionState {
        if self.state == TransactionState::Active && self.connection.is_abandoned(&self.id) {
            TransactionState::RolledBack
        } else {
            self.state
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(ClientError::finished())
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_active()?;
        if self.read_only {
            return Err(ClientError::ReadOnlyViolation);
        }
        Ok(())
    }

    /// Read `key` as this transaction sees it, including its own staged writes
    pub async fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.ensure_active()?;
        self.connection
            .call(
                "TxGet",
                self.connection.request_timeout(),
                self.connection.transport().tx_get(&self.id, key),
            )
            .await
    }

    /// Stage a write, visible only inside this transaction until commit
    pub async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let success = self
            .connection
            .call(
                "TxPut",
                self.connection.request_timeout(),
                self.connection.transport().tx_put(&self.id, key, value),
            )
            .await?;
        ensure_applied("TxPut", success)
    }

    /// Stage a delete
    pub async fn delete(&self, key: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let success = self
            .connection
            .call(
                "TxDelete",
                self.connection.request_timeout(),
                self.connection.transport().tx_delete(&self.id, key),
            )
            .await?;
        ensure_applied("TxDelete", success)
    }

    /// Scan this transaction's view of the store
    pub fn scan(&self, options: ScanOptions) -> Result<ScanCursor> {
        self.ensure_active()?;
        options.validate()?;
        Ok(ScanCursor::new(
            self.connection.clone(),
            options,
            Some(self.id.clone()),
        ))
    }

    /// Apply every staged write atomically.
    ///
    /// On [`ClientError::CommitConflict`] the server has already discarded
    /// the transaction; retry the whole transaction, not the commit. When the
    /// reply is lost to a timeout or a broken connection the writes may have
    /// been applied: the transaction ends `Unknown` and the error is
    /// [`ClientError::CommitOutcomeUnknown`], which is not retryable. Any
    /// other failure leaves the transaction `RolledBack`.
    pub async fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;

        let result = self
            .connection
            .call(
                "CommitTransaction",
                self.connection.commit_timeout(),
                self.connection.transport().commit_transaction(&self.id),
            )
            .await
            .and_then(|success| ensure_applied("CommitTransaction", success));

        match result {
            Ok(()) => {
                self.state = TransactionState::Committed;
                self.connection.untrack_transaction(&self.id);
                self.connection
                    .observe(async {
                        debug!(transaction_id = %self.id, "transaction committed");
                    })
                    .await;
                Ok(())
            }
            Err(e @ ClientError::CommitConflict(_)) => {
                self.state = TransactionState::RolledBack;
                self.connection.untrack_transaction(&self.id);
                self.connection
                    .observe(async {
                        debug!(transaction_id = %self.id, error = %e, "commit conflict");
                    })
                    .await;
                Err(e)
            }
            Err(e @ (ClientError::Timeout(_) | ClientError::Connection(_))) => {
                self.state = TransactionState::Unknown;
                self.connection.untrack_transaction(&self.id);
                self.connection
                    .observe(async {
                        warn!(transaction_id = %self.id, error = %e, "commit outcome unknown");
                    })
                    .await;
                Err(ClientError::CommitOutcomeUnknown(format!(
                    "transaction {}: {}",
                    self.id, e
                )))
            }
            Err(e) => {
                // The server answered, so nothing was applied
                self.rollback_remote().await;
                self.state = TransactionState::RolledBack;
                self.connection.untrack_transaction(&self.id);
                Err(e)
            }
        }
    }

    /// Discard every staged write.
    ///
    /// Never fails for an active transaction; a failed notification is
    /// logged and the transaction still ends `RolledBack`. A no-op on a
    /// finished transaction.
    pub async fn rollback(&mut self) {
        if !self.is_active() {
            return;
        }

        self.rollback_remote().await;
        self.state = TransactionState::RolledBack;
        self.connection.untrack_transaction(&self.id);
    }

    async fn rollback_remote(&self) {
        let result = self
            .connection
            .call(
                "RollbackTransaction",
                self.connection.request_timeout(),
                self.connection.transport().rollback_transaction(&self.id),
            )
            .await;

        self.connection
            .observe(async {
                match result {
                    Ok(true) => debug!(transaction_id = %self.id, "transaction rolled back"),
                    Ok(false) => {
                        warn!(transaction_id = %self.id, "server reported rollback failure")
                    }
                    Err(e) => warn!(transaction_id = %self.id, error = %e, "rollback failed"),
                }
            })
            .await;
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("read_only", &self.read_only)
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        // Closing the client already notified the server
        if !self.is_active() || !self.connection.is_tracked(&self.id) {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(transaction_id = %self.id, "transaction dropped outside a runtime, not rolled back");
            return;
        };

        let connection = self.connection.clone();
        let id = std::mem::take(&mut self.id);
        handle.spawn(async move {
            let result = connection
                .call(
                    "RollbackTransaction",
                    connection.request_timeout(),
                    connection.transport().rollback_transaction(&id),
                )
                .await;
            connection.untrack_transaction(&id);
            if let Err(e) = result {
                connection
                    .observe(async {
                        warn!(transaction_id = %id, error = %e, "rollback of dropped transaction failed");
                    })
                    .await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientOptions;
    use crate::connection::ConnectionManager;
    use crate::memory::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    async fn connected(store: &MemoryStore) -> ConnectionManager {
        let manager = ConnectionManager::new(ClientOptions::default(), Arc::new(store.clone()));
        manager.connect().await.unwrap();
        manager
    }

    #[tokio::test]
    async fn test_read_your_own_writes() {
        let store = MemoryStore::new();
        let manager = connected(&store).await;

        let mut tx = Transaction::begin(manager.current().unwrap(), false).await.unwrap();
        tx.put(b"k", b"v").await.unwrap();
        assert_eq!(tx.get(b"k").await.unwrap().as_deref(), Some(&b"v"[..]));
        // Not visible outside before commit
        assert!(store.committed(b"k").is_none());

        tx.commit().await.unwrap();
        assert_eq!(tx.state(), TransactionState::Committed);
        assert_eq!(store.committed(b"k").as_deref(), Some(&b"v"[..]));
    }

    #[tokio::test]
    async fn test_read_only_rejects_writes_without_rpc() {
        let store = MemoryStore::new();
        let manager = connected(&store).await;

        let tx = Transaction::begin(manager.current().unwrap(), true).await.unwrap();
        let before = store.total_calls();

        assert!(matches!(tx.put(b"k", b"v").await, Err(ClientError::ReadOnlyViolation)));
        assert!(matches!(tx.delete(b"k").await, Err(ClientError::ReadOnlyViolation)));
        assert_eq!(store.total_calls(), before);
        assert_eq!(store.call_count("TxPut"), 0);
        assert_eq!(store.call_count("TxDelete"), 0);
    }

    #[tokio::test]
    async fn test_terminal_transaction_rejects_everything() {
        let store = MemoryStore::new();
        let manager = connected(&store).await;

        let mut tx = Transaction::begin(manager.current().unwrap(), false).await.unwrap();
        tx.commit().await.unwrap();
        let before = store.total_calls();

        assert!(matches!(tx.commit().await, Err(ClientError::InvalidState(_))));
        assert!(matches!(tx.get(b"k").await, Err(ClientError::InvalidState(_))));
        assert!(matches!(tx.put(b"k", b"v").await, Err(ClientError::InvalidState(_))));
        assert!(matches!(tx.delete(b"k").await, Err(ClientError::InvalidState(_))));
        assert!(tx.scan(ScanOptions::new()).is_err());
        tx.rollback().await;
        assert_eq!(tx.state(), TransactionState::Committed);
        assert_eq!(store.total_calls(), before);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = MemoryStore::new();
        let manager = connected(&store).await;

        let mut tx = Transaction::begin(manager.current().unwrap(), false).await.unwrap();
        tx.put(b"k", b"v").await.unwrap();
        tx.rollback().await;
        tx.rollback().await;

        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert_eq!(store.call_count("RollbackTransaction"), 1);
        assert!(store.committed(b"k").is_none());
        assert!(matches!(tx.get(b"k").await, Err(ClientError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_rollback_failure_still_terminal() {
        let store = MemoryStore::new();
        let manager = connected(&store).await;

        let mut tx = Transaction::begin(manager.current().unwrap(), false).await.unwrap();
        store.fail_next("RollbackTransaction", ClientError::Connection("reset".to_string()));
        tx.rollback().await;
        assert_eq!(tx.state(), TransactionState::RolledBack);
    }

    #[tokio::test]
    async fn test_commit_failure_rolls_back() {
        let store = MemoryStore::new();
        let manager = connected(&store).await;

        let mut tx = Transaction::begin(manager.current().unwrap(), false).await.unwrap();
        tx.put(b"k", b"v").await.unwrap();
        store.fail_next("CommitTransaction", ClientError::remote("Internal", "disk full"));

        let err = tx.commit().await.unwrap_err();
        assert_eq!(err.code(), "REMOTE_ERROR");
        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert_eq!(store.call_count("RollbackTransaction"), 1);
        assert!(store.committed(b"k").is_none());
    }

    #[tokio::test]
    async fn test_conflicting_commit() {
        let store = MemoryStore::new();
        let manager = connected(&store).await;
        let connection = manager.current().unwrap();

        let mut first = Transaction::begin(connection.clone(), false).await.unwrap();
        let mut second = Transaction::begin(connection, false).await.unwrap();
        assert_ne!(first.id(), second.id());

        assert!(first.get(b"counter").await.unwrap().is_none());
        assert!(second.get(b"counter").await.unwrap().is_none());
        first.put(b"counter", b"1").await.unwrap();
        second.put(b"counter", b"1").await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(matches!(err, ClientError::CommitConflict(_)));
        assert!(err.is_retryable());
        assert_eq!(second.state(), TransactionState::RolledBack);
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_rolled_back() {
        let store = MemoryStore::new();
        let manager = connected(&store).await;

        {
            let tx = Transaction::begin(manager.current().unwrap(), false).await.unwrap();
            tx.put(b"k", b"v").await.unwrap();
        }

        for _ in 0..50 {
            if store.call_count("RollbackTransaction") == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(store.call_count("RollbackTransaction"), 1);
        assert_eq!(store.open_transactions(), 0);
    }

    #[tokio::test]
    async fn test_close_rolls_back_open_transactions() {
        let store = MemoryStore::new();
        let manager = connected(&store).await;

        let tx = Transaction::begin(manager.current().unwrap(), false).await.unwrap();
        tx.put(b"k", b"v").await.unwrap();
        manager.close().await.unwrap();

        assert_eq!(store.call_count("RollbackTransaction"), 1);
        assert_eq!(store.open_transactions(), 0);

        drop(tx);
        tokio::task::yield_now().await;
        assert_eq!(store.call_count("RollbackTransaction"), 1);
    }

    #[tokio::test]
    async fn test_closed_client_finishes_transaction() {
        let store = MemoryStore::new();
        let manager = connected(&store).await;

        let mut tx = Transaction::begin(manager.current().unwrap(), false).await.unwrap();
        tx.put(b"k", b"v").await.unwrap();
        manager.close().await.unwrap();
        let before = store.total_calls();

        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert!(!tx.is_active());
        assert!(matches!(tx.get(b"k").await, Err(ClientError::InvalidState(_))));
        assert!(matches!(tx.put(b"k", b"v").await, Err(ClientError::InvalidState(_))));
        assert!(matches!(tx.commit().await, Err(ClientError::InvalidState(_))));
        tx.rollback().await;
        assert_eq!(store.total_calls(), before);
    }

    #[tokio::test]
    async fn test_lost_commit_reply_is_unknown() {
        let store = MemoryStore::new();
        let options = ClientOptions::default()
            .with_request_timeout(Duration::from_millis(50))
            .with_sync_write_timeout(Duration::from_millis(100));
        let manager = ConnectionManager::new(options, Arc::new(store.clone()));
        manager.connect().await.unwrap();

        let mut tx = Transaction::begin(manager.current().unwrap(), false).await.unwrap();
        tx.put(b"k", b"v").await.unwrap();
        store.stall_next_commit(Duration::from_millis(300));

        let err = tx.commit().await.unwrap_err();
        assert!(matches!(err, ClientError::CommitOutcomeUnknown(_)));
        assert!(!err.is_retryable());
        assert_eq!(tx.state(), TransactionState::Unknown);
        // The server applied it before the deadline passed
        assert_eq!(store.committed(b"k").as_deref(), Some(&b"v"[..]));
        assert_eq!(store.call_count("RollbackTransaction"), 0);
        assert!(matches!(tx.commit().await, Err(ClientError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_commit_on_broken_connection_is_unknown() {
        let store = MemoryStore::new();
        let manager = connected(&store).await;

        let mut tx = Transaction::begin(manager.current().unwrap(), false).await.unwrap();
        tx.put(b"k", b"v").await.unwrap();
        store.fail_next("CommitTransaction", ClientError::Connection("reset by peer".to_string()));

        let err = tx.commit().await.unwrap_err();
        assert_eq!(err.code(), "COMMIT_OUTCOME_UNKNOWN");
        assert_eq!(tx.state(), TransactionState::Unknown);
    }
}
