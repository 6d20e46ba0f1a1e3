/// Test utilities and helpers for Kevo client testing
///
/// Wraps an in-process [`MemoryStore`] so integration tests can open any
/// number of independent clients against the same data.

use bytes::Bytes;
use kevo_client::{Client, ClientOptions, KeyValue, MemoryStore, Result, Transaction};
use std::io;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;

/// One in-memory server shared by every client a test opens
#[derive(Clone, Default)]
pub struct TestServer {
    pub store: MemoryStore,
}

impl TestServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options every test client starts from
    pub fn options(&self) -> ClientOptions {
        ClientOptions::new("memory:0")
    }

    /// A client that has not connected yet
    pub fn client_with(&self, options: ClientOptions) -> Client {
        Client::with_connector(options, Arc::new(self.store.clone()))
            .expect("Invalid test client options")
    }

    /// A connected client with default options
    pub async fn client(&self) -> Client {
        self.connected(self.options()).await
    }

    /// A connected client with custom options
    pub async fn connected(&self, options: ClientOptions) -> Client {
        let client = self.client_with(options);
        client.connect().await.expect("Failed to connect test client");
        client
    }
}

/// Write every pair with `sync = true`
pub async fn seed(client: &Client, pairs: &[(&str, &str)]) {
    for (key, value) in pairs {
        client
            .put(key.as_bytes(), value.as_bytes(), true)
            .await
            .expect("Failed to seed");
    }
}

/// Keys of scan results, as strings
pub fn keys_of(entries: &[KeyValue]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| String::from_utf8_lossy(&entry.key).into_owned())
        .collect()
}

/// Parse a decimal counter value; a missing key counts as zero
pub fn parse_counter(value: Option<Bytes>) -> u64 {
    value
        .and_then(|v| std::str::from_utf8(&v).ok()?.parse().ok())
        .unwrap_or(0)
}

/// Read-increment-write `key` inside `tx` without committing
pub async fn stage_increment(tx: &Transaction, key: &[u8]) -> Result<u64> {
    let next = parse_counter(tx.get(key).await?) + 1;
    tx.put(key, next.to_string().as_bytes()).await?;
    Ok(next)
}

/// Increment `key` in its own transaction
pub async fn increment(client: &Client, key: &[u8]) -> Result<u64> {
    let mut tx = client.begin_transaction(false).await?;
    let next = stage_increment(&tx, key).await?;
    tx.commit().await?;
    Ok(next)
}

/// Collects formatted tracing output for one client
#[derive(Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch writing every event at DEBUG and above into this capture
    pub fn dispatch(&self) -> Dispatch {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();
        Dispatch::new(subscriber)
    }

    pub fn contents(&self) -> String {
        let buf = self.buf.lock();
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
