/// Client configuration for endpoints, deadlines and retry limits
use crate::error::{ClientError, Result};
use std::fmt;
use std::time::Duration;

/// Default server address used by [`ClientOptions::default`]
pub const DEFAULT_ENDPOINT: &str = "localhost:50051";

/// Options fixed for the lifetime of a [`Client`](crate::Client).
#[derive(Clone)]
pub struct ClientOptions {
    /// Server address, with or without a scheme (e.g. "localhost:50051")
    pub endpoint: String,

    /// Deadline for establishing the channel
    pub connect_timeout: Duration,

    /// Deadline for every RPC-backed operation
    pub request_timeout: Duration,

    /// Deadline for durable writes (`sync = true`) and commits.
    /// Must not be shorter than `request_timeout`.
    pub sync_write_timeout: Duration,

    /// Upper bound on attempts made by [`Client::retry_policy`](crate::Client::retry_policy)
    pub max_retries: u32,

    /// Use TLS for the channel
    pub tls_enabled: bool,

    /// PEM encoded CA certificate used to verify the server (TLS only)
    pub ca_cert: Option<Vec<u8>>,

    /// Domain name to verify the server certificate against (TLS only)
    pub tls_domain: Option<String>,

    /// Page size for scans; `None` issues one streaming call per scan
    pub scan_page_size: Option<u32>,

    /// Observer that receives this client's tracing events instead of the
    /// global default subscriber
    pub dispatch: Option<tracing::Dispatch>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            sync_write_timeout: Duration::from_secs(30),
            max_retries: 3,
            tls_enabled: false,
            ca_cert: None,
            tls_domain: None,
            scan_page_size: None,
            dispatch: None,
        }
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("endpoint", &self.endpoint)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("sync_write_timeout", &self.sync_write_timeout)
            .field("max_retries", &self.max_retries)
            .field("tls_enabled", &self.tls_enabled)
            .field("ca_cert", &self.ca_cert.as_ref().map(|pem| pem.len()))
            .field("tls_domain", &self.tls_domain)
            .field("scan_page_size", &self.scan_page_size)
            .field("dispatch", &self.dispatch.is_some())
            .finish()
    }
}

impl ClientOptions {
    /// Create options for the given endpoint with default values
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Set the connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the timeout used for durable writes and commits
    pub fn with_sync_write_timeout(mut self, timeout: Duration) -> Self {
        self.sync_write_timeout = timeout;
        self
    }

    /// Set the maximum number of retries for the explicit retry helper
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Enable TLS
    pub fn with_tls(mut self) -> Self {
        self.tls_enabled = true;
        self
    }

    /// Enable TLS and verify the server with the given PEM CA certificate
    pub fn with_ca_cert(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.tls_enabled = true;
        self.ca_cert = Some(pem.into());
        self
    }

    /// Override the domain checked against the server certificate
    pub fn with_tls_domain(mut self, domain: impl Into<String>) -> Self {
        self.tls_domain = Some(domain.into());
        self
    }

    /// Paginate scans, fetching at most `size` entries per call
    pub fn with_scan_page_size(mut self, size: u32) -> Self {
        self.scan_page_size = Some(size);
        self
    }

    /// Route this client's tracing events to `dispatch`
    pub fn with_dispatch(mut self, dispatch: tracing::Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Deadline for a write, depending on its durability flag
    pub fn write_timeout(&self, sync: bool) -> Duration {
        if sync {
            self.sync_write_timeout
        } else {
            self.request_timeout
        }
    }

    /// Endpoint as a URI, adding a scheme when none was given
    pub fn endpoint_uri(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else if self.tls_enabled {
            format!("https://{}", self.endpoint)
        } else {
            format!("http://{}", self.endpoint)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(ClientError::InvalidArgument(
                "endpoint must not be empty".to_string(),
            ));
        }

        if self.connect_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(ClientError::InvalidArgument(
                "timeouts must be greater than 0".to_string(),
            ));
        }

        if self.sync_write_timeout < self.request_timeout {
            return Err(ClientError::InvalidArgument(
                "sync_write_timeout must not be shorter than request_timeout".to_string(),
            ));
        }

        if self.scan_page_size == Some(0) {
            return Err(ClientError::InvalidArgument(
                "scan_page_size must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }
}
