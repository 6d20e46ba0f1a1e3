/// Connection lifecycle management for the Kevo client
///
/// Owns the transport for one client instance, probes liveness on connect,
/// and applies deadlines and the client's tracing observer to every call.

use crate::config::ClientOptions;
use crate::error::{ClientError, Result};
use crate::transport::{Connector, Transport};
use crate::types::NodeInfo;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::instrument::WithSubscriber;
use tracing::{debug, info, warn, Dispatch};

/// Whether a client currently holds a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Run `fut` with `dispatch` as its tracing subscriber, if one is set
pub(crate) async fn observed<F: Future>(dispatch: Option<&Dispatch>, fut: F) -> F::Output {
    match dispatch {
        Some(dispatch) => fut.with_subscriber(dispatch.clone()).await,
        None => fut.await,
    }
}

/// Turn a server success flag into a result
pub(crate) fn ensure_applied(call: &str, success: bool) -> Result<()> {
    if success {
        Ok(())
    } else {
        Err(ClientError::remote(
            "Unsuccessful",
            format!("server reported failure for {}", call),
        ))
    }
}

struct Shared {
    transport: Arc<dyn Transport>,
    request_timeout: Duration,
    sync_write_timeout: Duration,
    scan_page_size: Option<u32>,
    dispatch: Option<Dispatch>,
    /// Decided by the first GetNodeInfo answer on this connection
    topology_supported: OnceLock<bool>,
    node_info_cache: Mutex<Option<Option<NodeInfo>>>,
    /// Transactions begun on this connection and not yet finished
    open_transactions: Mutex<HashSet<String>>,
    /// Transactions rolled back by `close` on the caller's behalf
    abandoned: Mutex<HashSet<String>>,
}

/// A live transport plus the call policy of the client that opened it
#[derive(Clone)]
pub(crate) struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    fn new(transport: Arc<dyn Transport>, options: &ClientOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                request_timeout: options.request_timeout,
                sync_write_timeout: options.sync_write_timeout,
                scan_page_size: options.scan_page_size,
                dispatch: options.dispatch.clone(),
                topology_supported: OnceLock::new(),
                node_info_cache: Mutex::new(None),
                open_transactions: Mutex::new(HashSet::new()),
                abandoned: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.shared.transport.as_ref()
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        self.shared.request_timeout
    }

    pub(crate) fn write_timeout(&self, sync: bool) -> Duration {
        if sync {
            self.shared.sync_write_timeout
        } else {
            self.shared.request_timeout
        }
    }

    /// Deadline for commits, which always wait for durability
    pub(crate) fn commit_timeout(&self) -> Duration {
        self.shared.sync_write_timeout
    }

    pub(crate) fn scan_page_size(&self) -> Option<u32> {
        self.shared.scan_page_size
    }

    pub(crate) fn topology_supported(&self) -> Option<bool> {
        self.shared.topology_supported.get().copied()
    }

    pub(crate) fn set_topology_supported(&self, supported: bool) {
        let _ = self.shared.topology_supported.set(supported);
    }

    pub(crate) fn node_info_cache(&self) -> &Mutex<Option<Option<NodeInfo>>> {
        &self.shared.node_info_cache
    }

    pub(crate) fn track_transaction(&self, id: &str) {
        self.shared.open_transactions.lock().insert(id.to_string());
    }

    pub(crate) fn untrack_transaction(&self, id: &str) {
        self.shared.open_transactions.lock().remove(id);
    }

    pub(crate) fn is_tracked(&self, id: &str) -> bool {
        self.shared.open_transactions.lock().contains(id)
    }

    pub(crate) fn is_abandoned(&self, id: &str) -> bool {
        self.shared.abandoned.lock().contains(id)
    }

    /// Run `fut` under this client's tracing observer
    pub(crate) async fn observe<F: Future>(&self, fut: F) -> F::Output {
        observed(self.shared.dispatch.as_ref(), fut).await
    }

    /// Issue one RPC-backed operation, failing with `Timeout` past `deadline`
    pub(crate) async fn call<T, F>(&self, op: &'static str, deadline: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.observe(async move {
            let started = Instant::now();
            match tokio::time::timeout(deadline, fut).await {
                Ok(Ok(value)) => {
                    debug!(op, elapsed_us = started.elapsed().as_micros() as u64, "call completed");
                    Ok(value)
                }
                Ok(Err(e)) => {
                    debug!(op, error = %e, "call failed");
                    Err(e)
                }
                Err(_) => {
                    warn!(op, deadline_ms = deadline.as_millis() as u64, "call timed out");
                    Err(ClientError::Timeout(format!(
                        "{} did not complete within {:?}",
                        op, deadline
                    )))
                }
            }
        })
        .await
    }

    /// Notify the server that every open transaction is abandoned, bounded
    /// by the request timeout per notification
    async fn abandon_open_transactions(&self) {
        let ids: Vec<String> = self.shared.open_transactions.lock().drain().collect();
        if ids.is_empty() {
            return;
        }
        self.shared.abandoned.lock().extend(ids.iter().cloned());

        warn!(count = ids.len(), "closing with active transactions, rolling them back");
        let deadline = self.request_timeout();
        let rollbacks = ids.iter().map(|id| async move {
            let result = self
                .call(
                    "RollbackTransaction",
                    deadline,
                    self.transport().rollback_transaction(id),
                )
                .await;
            if let Err(e) = result {
                warn!(transaction_id = %id, error = %e, "best-effort rollback failed");
            }
        });
        join_all(rollbacks).await;
    }
}

/// Connection manager that owns the transport lifecycle of one client
pub struct ConnectionManager {
    options: ClientOptions,
    connector: Arc<dyn Connector>,
    active: RwLock<Option<Connection>>,
    /// Serializes connect/close so concurrent callers never open two transports
    lifecycle: tokio::sync::Mutex<()>,
}

impl ConnectionManager {
    /// Create a manager in the `Disconnected` state
    pub fn new(options: ClientOptions, connector: Arc<dyn Connector>) -> Self {
        Self {
            options,
            connector,
            active: RwLock::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn state(&self) -> ConnectionState {
        if self.active.read().is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Open the transport and probe it with a stats call.
    ///
    /// A no-op when already connected. If the probe fails the transport is
    /// released and the manager stays `Disconnected`.
    pub async fn connect(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        let options = &self.options;
        let transport = observed(options.dispatch.as_ref(), async {
            match tokio::time::timeout(options.connect_timeout, self.connector.connect(options)).await {
                Ok(result) => result,
                Err(_) => Err(ClientError::Timeout(format!(
                    "connecting to {} did not complete within {:?}",
                    options.endpoint, options.connect_timeout
                ))),
            }
        })
        .await?;

        let connection = Connection::new(transport, options);
        let probe = connection
            .call(
                "GetStats",
                connection.request_timeout(),
                connection.transport().get_stats(),
            )
            .await;

        match probe {
            Ok(stats) => {
                connection
                    .observe(async {
                        info!(endpoint = %options.endpoint, key_count = stats.key_count, "connected");
                    })
                    .await;
                *self.active.write() = Some(connection);
                Ok(())
            }
            Err(e) => {
                connection
                    .observe(async {
                        warn!(endpoint = %options.endpoint, error = %e, "liveness probe failed");
                    })
                    .await;
                let _ = connection.transport().close().await;
                Err(ClientError::Connection(format!(
                    "liveness probe to {} failed: {}",
                    options.endpoint, e
                )))
            }
        }
    }

    /// Release the transport. A no-op when already closed.
    ///
    /// Active transactions get a best-effort rollback notification first;
    /// each notification is bounded by the request timeout.
    pub async fn close(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        let Some(connection) = self.active.write().take() else {
            return Ok(());
        };

        connection.abandon_open_transactions().await;
        let result = connection
            .call(
                "Close",
                connection.request_timeout(),
                connection.transport().close(),
            )
            .await;

        connection
            .observe(async {
                info!(endpoint = %self.options.endpoint, "connection closed");
            })
            .await;
        result
    }

    /// The live connection, or a connection error when disconnected
    pub(crate) fn current(&self) -> Result<Connection> {
        self.active.read().clone().ok_or_else(ClientError::not_connected)
    }
}
