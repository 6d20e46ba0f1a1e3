/// Scan options and the lazy cursor over scan results
use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::transport::{ScanRequest, ScanStream};
use crate::types::KeyValue;
use bytes::{BufMut, Bytes, BytesMut};
use futures::{Stream, StreamExt};

/// Scan filters.
///
/// The `start_key..end_key` range (start inclusive, end exclusive) bounds
/// the walk; `prefix` and `suffix` must both match when set; `limit` caps the
/// number of yielded entries after every other filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOptions {
    pub prefix: Option<Bytes>,
    pub suffix: Option<Bytes>,
    pub start_key: Option<Bytes>,
    pub end_key: Option<Bytes>,
    pub limit: Option<usize>,
}

impl ScanOptions {
    /// Scan the whole keyspace
    pub fn new() -> Self {
        Self::default()
    }

    /// Only keys starting with `prefix`
    pub fn prefix(mut self, prefix: impl AsRef<[u8]>) -> Self {
        self.prefix = Some(Bytes::copy_from_slice(prefix.as_ref()));
        self
    }

    /// Only keys ending with `suffix`.
    ///
    /// Without a prefix or range this still walks the full keyspace on the
    /// server.
    pub fn suffix(mut self, suffix: impl AsRef<[u8]>) -> Self {
        self.suffix = Some(Bytes::copy_from_slice(suffix.as_ref()));
        self
    }

    /// Keys in `[start, end)`
    pub fn range(self, start: impl AsRef<[u8]>, end: impl AsRef<[u8]>) -> Self {
        self.start_key(start).end_key(end)
    }

    /// Inclusive lower bound
    pub fn start_key(mut self, start: impl AsRef<[u8]>) -> Self {
        self.start_key = Some(Bytes::copy_from_slice(start.as_ref()));
        self
    }

    /// Exclusive upper bound
    pub fn end_key(mut self, end: impl AsRef<[u8]>) -> Self {
        self.end_key = Some(Bytes::copy_from_slice(end.as_ref()));
        self
    }

    /// Yield at most `limit` entries
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.limit == Some(0) {
            return Err(ClientError::InvalidArgument(
                "scan limit must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `key` passes the range, prefix and suffix filters
    pub fn matches(&self, key: &[u8]) -> bool {
        if let Some(start) = &self.start_key {
            if key < start.as_ref() {
                return false;
            }
        }
        if let Some(end) = &self.end_key {
            if key >= end.as_ref() {
                return false;
            }
        }
        if let Some(prefix) = &self.prefix {
            if !key.starts_with(prefix) {
                return false;
            }
        }
        if let Some(suffix) = &self.suffix {
            if !key.ends_with(suffix) {
                return false;
            }
        }
        true
    }

    fn past_end(&self, key: &[u8]) -> bool {
        self.end_key
            .as_ref()
            .map_or(false, |end| key >= end.as_ref())
    }
}

/// Smallest key strictly greater than `key` in byte order
fn successor(key: &[u8]) -> Bytes {
    let mut next = BytesMut::with_capacity(key.len() + 1);
    next.put_slice(key);
    next.put_u8(0);
    next.freeze()
}

/// Lazy, forward-only sequence of scan results.
///
/// No I/O happens until the first [`next`](ScanCursor::next). When the
/// client has a scan page size, each full page is followed by a request
/// that continues from the last key received, so pages join without
/// duplicates or gaps. A failed fetch ends the cursor; entries
/// already yielded stay valid. To scan again, create a new cursor.
pub struct ScanCursor {
    connection: Connection,
    options: ScanOptions,
    transaction_id: Option<String>,
    page_size: Option<u32>,
    stream: Option<ScanStream>,
    /// Limit sent with the open page, if any
    page_limit: Option<u32>,
    page_received: u32,
    /// Whether the open page moved the anchor forward
    page_advanced: bool,
    last_key: Option<Bytes>,
    yielded: usize,
    done: bool,
}

impl ScanCursor {
    pub(crate) fn new(
        connection: Connection,
        options: ScanOptions,
        transaction_id: Option<String>,
    ) -> Self {
        let page_size = connection.scan_page_size();
        Self {
            connection,
            options,
            transaction_id,
            page_size,
            stream: None,
            page_limit: None,
            page_received: 0,
            page_advanced: false,
            last_key: None,
            yielded: 0,
            done: false,
        }
    }

    /// Number of entries yielded so far
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    fn remaining(&self) -> Option<usize> {
        self.options.limit.map(|limit| limit.saturating_sub(self.yielded))
    }

    fn next_request(&self) -> ScanRequest {
        let remaining = self
            .remaining()
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX));
        let limit = match (self.page_size, remaining) {
            (Some(page), Some(remaining)) => Some(page.min(remaining)),
            (page, remaining) => page.or(remaining),
        };

        let start_key = match &self.last_key {
            Some(last) => Some(successor(last)),
            None => self.options.start_key.clone(),
        };

        ScanRequest {
            prefix: self.options.prefix.clone(),
            suffix: self.options.suffix.clone(),
            start_key,
            end_key: self.options.end_key.clone(),
            limit,
            transaction_id: self.transaction_id.clone(),
        }
    }

    fn finish(&mut self) {
        self.done = true;
        self.stream = None;
    }

    async fn open_page(&mut self) -> Result<()> {
        let request = self.next_request();
        let op = if request.transaction_id.is_some() { "TxScan" } else { "Scan" };
        self.page_limit = request.limit;
        self.page_received = 0;
        self.page_advanced = false;

        let stream = self
            .connection
            .call(op, self.connection.request_timeout(), self.connection.transport().scan(request))
            .await?;
        self.stream = Some(stream);
        Ok(())
    }

    /// Fetch the next entry, or `None` once the scan is exhausted
    pub async fn next(&mut self) -> Result<Option<KeyValue>> {
        loop {
            if self.done {
                return Ok(None);
            }
            if self.remaining() == Some(0) {
                self.finish();
                return Ok(None);
            }

            if self.stream.is_none() {
                if let Err(e) = self.open_page().await {
                    self.finish();
                    return Err(e);
                }
            }
            let Some(stream) = self.stream.as_mut() else {
                continue;
            };

            let item = self
                .connection
                .call(
                    "ScanNext",
                    self.connection.request_timeout(),
                    async { stream.next().await.transpose() },
                )
                .await;

            let entry = match item {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    self.stream = None;
                    let page_full = self
                        .page_limit
                        .map_or(false, |limit| self.page_received >= limit);
                    // A full page that never moved the anchor would repeat forever
                    if !page_full || !self.page_advanced {
                        self.finish();
                    }
                    continue;
                }
                Err(e) => {
                    self.finish();
                    return Err(e);
                }
            };

            if self.page_limit.is_some() {
                self.page_received += 1;
            }
            // Anything not past the anchor was already seen on an earlier page
            if let Some(last) = &self.last_key {
                if entry.key <= *last {
                    continue;
                }
            }
            self.last_key = Some(entry.key.clone());
            self.page_advanced = true;

            if self.options.past_end(&entry.key) {
                self.finish();
                return Ok(None);
            }
            if !self.options.matches(&entry.key) {
                continue;
            }

            self.yielded += 1;
            return Ok(Some(entry));
        }
    }

    /// Drain the cursor into a vector
    pub async fn collect(mut self) -> Result<Vec<KeyValue>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next().await? {
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Adapt the cursor into a `Stream`
    pub fn into_stream(self) -> impl Stream<Item = Result<KeyValue>> {
        futures::stream::try_unfold(self, |mut cursor| async move {
            Ok(cursor.next().await?.map(|entry| (entry, cursor)))
        })
    }
}
