/// In-process Kevo store for testing and offline use
///
/// Serves the same RPC surface as a remote server from an ordered in-memory
/// keyspace. Transactions read from a snapshot taken at begin time and are
/// validated optimistically at commit: if anything they read or wrote was
/// committed by someone else in the meantime, the commit is aborted.
///
/// The store also records per-RPC call counts and supports one-shot fault
/// injection, artificial latency, delayed commit replies and an unreachable
/// mode.

use crate::config::ClientOptions;
use crate::error::{ClientError, Result};
use crate::transport::{Connector, ScanRequest, ScanStream, Transport};
use crate::types::{BatchOperation, KeyValue, NodeInfo, Stats};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tonic::Status;

/// A committed value; deletes leave a tombstone so conflicts on them are seen
#[derive(Debug, Clone)]
struct Versioned {
    value: Option<Bytes>,
    version: u64,
}

struct OpenTransaction {
    read_only: bool,
    /// Commit sequence at begin time
    snapshot_seq: u64,
    snapshot: BTreeMap<Bytes, Versioned>,
    staged: BTreeMap<Bytes, Option<Bytes>>,
    read_set: BTreeSet<Bytes>,
}

impl OpenTransaction {
    fn read(&mut self, key: &[u8]) -> Option<Bytes> {
        if let Some(staged) = self.staged.get(key) {
            return staged.clone();
        }
        self.read_set.insert(Bytes::copy_from_slice(key));
        self.snapshot.get(key).and_then(|v| v.value.clone())
    }

    /// Snapshot overlaid with this transaction's staged writes
    fn view(&self) -> BTreeMap<Bytes, Bytes> {
        let mut view = live_values(&self.snapshot);
        for (key, value) in &self.staged {
            match value {
                Some(value) => view.insert(key.clone(), value.clone()),
                None => view.remove(key),
            };
        }
        view
    }
}

#[derive(Default)]
struct StoreState {
    data: BTreeMap<Bytes, Versioned>,
    sequence: u64,
    transactions: HashMap<String, OpenTransaction>,
}

impl StoreState {
    /// Apply `writes` as one commit under a new sequence number
    fn apply<I>(&mut self, writes: I)
    where
        I: IntoIterator<Item = (Bytes, Option<Bytes>)>,
    {
        let version = self.sequence + 1;
        let mut applied = false;
        for (key, value) in writes {
            self.data.insert(key, Versioned { value, version });
            applied = true;
        }
        if applied {
            self.sequence = version;
        }
    }

    fn transaction(&mut self, id: &str) -> Result<&mut OpenTransaction> {
        self.transactions
            .get_mut(id)
            .ok_or_else(|| Status::not_found(format!("unknown transaction {}", id)).into())
    }

    fn writable_transaction(&mut self, id: &str) -> Result<&mut OpenTransaction> {
        let tx = self.transaction(id)?;
        if tx.read_only {
            return Err(Status::failed_precondition("transaction is read-only").into());
        }
        Ok(tx)
    }
}

fn live_values(data: &BTreeMap<Bytes, Versioned>) -> BTreeMap<Bytes, Bytes> {
    data.iter()
        .filter_map(|(k, v)| v.value.clone().map(|value| (k.clone(), value)))
        .collect()
}

/// Server-side evaluation of a scan request over `view`
fn select(view: &BTreeMap<Bytes, Bytes>, request: &ScanRequest) -> Vec<KeyValue> {
    let start = request.start_key.as_deref().filter(|k| !k.is_empty());
    let end = request.end_key.as_deref().filter(|k| !k.is_empty());
    if let (Some(start), Some(end)) = (start, end) {
        if start >= end {
            return Vec::new();
        }
    }

    let lower = start.map_or(Bound::Unbounded, Bound::Included);
    let upper = end.map_or(Bound::Unbounded, Bound::Excluded);
    let limit = request.limit.map_or(usize::MAX, |l| l as usize);

    view.range::<[u8], _>((lower, upper))
        .filter(|(key, _)| {
            request.prefix.as_ref().map_or(true, |p| key.starts_with(p))
                && request.suffix.as_ref().map_or(true, |s| key.ends_with(s))
        })
        .take(limit)
        .map(|(key, value)| KeyValue::new(key.clone(), value.clone()))
        .collect()
}

enum Topology {
    Standalone,
    Fixed(NodeInfo),
    Unsupported,
}

struct Inner {
    state: Mutex<StoreState>,
    calls: Mutex<HashMap<&'static str, usize>>,
    faults: Mutex<HashMap<&'static str, ClientError>>,
    scan_fault: Mutex<Option<(usize, ClientError)>>,
    latency: Mutex<Duration>,
    commit_stall: Mutex<Option<Duration>>,
    reachable: AtomicBool,
    topology: Mutex<Topology>,
    next_transaction: AtomicU64,
}

/// Shared in-memory store; clones refer to the same data
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create an empty, reachable, standalone store
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(StoreState::default()),
                calls: Mutex::new(HashMap::new()),
                faults: Mutex::new(HashMap::new()),
                scan_fault: Mutex::new(None),
                latency: Mutex::new(Duration::ZERO),
                commit_stall: Mutex::new(None),
                reachable: AtomicBool::new(true),
                topology: Mutex::new(Topology::Standalone),
                next_transaction: AtomicU64::new(1),
            }),
        }
    }

    /// Number of `op` RPCs served so far
    pub fn call_count(&self, op: &str) -> usize {
        self.inner.calls.lock().get(op).copied().unwrap_or(0)
    }

    /// Number of RPCs of any kind served so far
    pub fn total_calls(&self) -> usize {
        self.inner.calls.lock().values().sum()
    }

    /// Fail the next `op` RPC with `error`
    pub fn fail_next(&self, op: &'static str, error: ClientError) {
        self.inner.faults.lock().insert(op, error);
    }

    /// Make the next scan stream yield `after` entries, then `error`
    pub fn fail_scan_after(&self, after: usize, error: ClientError) {
        *self.inner.scan_fault.lock() = Some((after, error));
    }

    /// Delay every RPC by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.lock() = latency;
    }

    /// Apply the next commit, then hold its reply back for `delay`
    pub fn stall_next_commit(&self, delay: Duration) {
        *self.inner.commit_stall.lock() = Some(delay);
    }

    /// While unreachable, connects and RPCs fail with `Unavailable`
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Report `info` from GetNodeInfo
    pub fn set_node_info(&self, info: NodeInfo) {
        *self.inner.topology.lock() = Topology::Fixed(info);
    }

    /// Answer GetNodeInfo as a server without topology support
    pub fn disable_node_info(&self) {
        *self.inner.topology.lock() = Topology::Unsupported;
    }

    /// Committed value of `key`, bypassing the RPC surface
    pub fn committed(&self, key: &[u8]) -> Option<Bytes> {
        self.inner
            .state
            .lock()
            .data
            .get(key)
            .and_then(|v| v.value.clone())
    }

    /// Number of transactions neither committed nor rolled back
    pub fn open_transactions(&self) -> usize {
        self.inner.state.lock().transactions.len()
    }

    /// Current commit sequence number
    pub fn sequence(&self) -> u64 {
        self.inner.state.lock().sequence
    }

    fn take_fault(&self, op: &str) -> Option<ClientError> {
        self.inner.faults.lock().remove(op)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MemoryStore {
    async fn connect(&self, _options: &ClientOptions) -> Result<Arc<dyn Transport>> {
        if !self.inner.reachable.load(Ordering::SeqCst) {
            return Err(ClientError::Connection("connection refused".to_string()));
        }
        Ok(Arc::new(MemorySession {
            store: self.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// One connection to a [`MemoryStore`]
struct MemorySession {
    store: MemoryStore,
    closed: AtomicBool,
}

impl MemorySession {
    fn inner(&self) -> &Inner {
        &self.store.inner
    }

    /// Bookkeeping shared by every RPC: count, delay, then inject faults
    async fn enter(&self, op: &'static str) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::not_connected());
        }
        *self.inner().calls.lock().entry(op).or_insert(0) += 1;

        let latency = *self.inner().latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if !self.inner().reachable.load(Ordering::SeqCst) {
            return Err(Status::unavailable("endpoint unreachable").into());
        }
        match self.store.take_fault(op) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn commit_now(&self, transaction_id: &str) -> Result<bool> {
        let mut state = self.inner().state.lock();
        let tx = state
            .transactions
            .remove(transaction_id)
            .ok_or_else(|| Status::not_found(format!("unknown transaction {}", transaction_id)))?;

        if tx.read_only || tx.staged.is_empty() {
            return Ok(true);
        }

        let conflicted = tx
            .read_set
            .iter()
            .chain(tx.staged.keys())
            .find(|key| {
                state
                    .data
                    .get(*key)
                    .map_or(false, |v| v.version > tx.snapshot_seq)
            });
        if let Some(key) = conflicted {
            return Err(Status::aborted(format!(
                "transaction {} conflicts on key {}",
                transaction_id,
                String::from_utf8_lossy(key)
            ))
            .into());
        }

        state.apply(tx.staged);
        Ok(true)
    }

    fn scan_stream(&self, entries: Vec<KeyValue>) -> ScanStream {
        match self.inner().scan_fault.lock().take() {
            Some((after, error)) => futures::stream::iter(entries.into_iter().take(after).map(Ok))
                .chain(futures::stream::once(async move { Err(error) }))
                .boxed(),
            None => futures::stream::iter(entries.into_iter().map(Ok)).boxed(),
        }
    }
}

#[async_trait]
impl Transport for MemorySession {
    async fn get_stats(&self) -> Result<Stats> {
        self.enter("GetStats").await?;
        let state = self.inner().state.lock();

        let (key_count, storage_size) = state
            .data
            .iter()
            .filter_map(|(k, v)| v.value.as_ref().map(|value| k.len() + value.len()))
            .fold((0i64, 0i64), |(count, size), len| (count + 1, size + len as i64));

        Ok(Stats {
            key_count,
            storage_size_bytes: storage_size,
            memtable_count: 1,
            sstable_count: 0,
            write_amplification: 1.0,
            read_amplification: 1.0,
        })
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.enter("Get").await?;
        Ok(self.store.committed(key))
    }

    async fn put(&self, key: &[u8], value: &[u8], _sync: bool) -> Result<bool> {
        self.enter("Put").await?;
        self.inner().state.lock().apply([(
            Bytes::copy_from_slice(key),
            Some(Bytes::copy_from_slice(value)),
        )]);
        Ok(true)
    }

    async fn delete(&self, key: &[u8], _sync: bool) -> Result<bool> {
        self.enter("Delete").await?;
        self.inner()
            .state
            .lock()
            .apply([(Bytes::copy_from_slice(key), None)]);
        Ok(true)
    }

    async fn batch_write(&self, operations: &[BatchOperation], _sync: bool) -> Result<bool> {
        self.enter("BatchWrite").await?;
        let writes: Vec<_> = operations
            .iter()
            .map(|op| match op {
                BatchOperation::Put { key, value } => (key.clone(), Some(value.clone())),
                BatchOperation::Delete { key } => (key.clone(), None),
            })
            .collect();
        self.inner().state.lock().apply(writes);
        Ok(true)
    }

    async fn begin_transaction(&self, read_only: bool) -> Result<String> {
        self.enter("BeginTransaction").await?;
        let id = format!(
            "tx-{}",
            self.inner().next_transaction.fetch_add(1, Ordering::SeqCst)
        );

        let mut state = self.inner().state.lock();
        let tx = OpenTransaction {
            read_only,
            snapshot_seq: state.sequence,
            snapshot: state.data.clone(),
            staged: BTreeMap::new(),
            read_set: BTreeSet::new(),
        };
        state.transactions.insert(id.clone(), tx);
        Ok(id)
    }

    async fn tx_get(&self, transaction_id: &str, key: &[u8]) -> Result<Option<Bytes>> {
        self.enter("TxGet").await?;
        let mut state = self.inner().state.lock();
        Ok(state.transaction(transaction_id)?.read(key))
    }

    async fn tx_put(&self, transaction_id: &str, key: &[u8], value: &[u8]) -> Result<bool> {
        self.enter("TxPut").await?;
        let mut state = self.inner().state.lock();
        state.writable_transaction(transaction_id)?.staged.insert(
            Bytes::copy_from_slice(key),
            Some(Bytes::copy_from_slice(value)),
        );
        Ok(true)
    }

    async fn tx_delete(&self, transaction_id: &str, key: &[u8]) -> Result<bool> {
        self.enter("TxDelete").await?;
        let mut state = self.inner().state.lock();
        state
            .writable_transaction(transaction_id)?
            .staged
            .insert(Bytes::copy_from_slice(key), None);
        Ok(true)
    }

    async fn commit_transaction(&self, transaction_id: &str) -> Result<bool> {
        self.enter("CommitTransaction").await?;
        let result = self.commit_now(transaction_id);

        let stall = self.inner().commit_stall.lock().take();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn rollback_transaction(&self, transaction_id: &str) -> Result<bool> {
        self.enter("RollbackTransaction").await?;
        Ok(self
            .inner()
            .state
            .lock()
            .transactions
            .remove(transaction_id)
            .is_some())
    }

    async fn scan(&self, request: ScanRequest) -> Result<ScanStream> {
        let op = if request.transaction_id.is_some() { "TxScan" } else { "Scan" };
        self.enter(op).await?;

        let entries = {
            let mut state = self.inner().state.lock();
            match &request.transaction_id {
                Some(id) => {
                    let tx = state.transaction(id)?;
                    let entries = select(&tx.view(), &request);
                    tx.read_set
                        .extend(entries.iter().map(|entry| entry.key.clone()));
                    entries
                }
                None => select(&live_values(&state.data), &request),
            }
        };

        Ok(self.scan_stream(entries))
    }

    async fn get_node_info(&self) -> Result<Option<NodeInfo>> {
        self.enter("GetNodeInfo").await?;
        let info = match &*self.inner().topology.lock() {
            Topology::Standalone => Some(NodeInfo::standalone(self.store.sequence())),
            Topology::Fixed(info) => Some(info.clone()),
            Topology::Unsupported => None,
        };
        Ok(info)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
