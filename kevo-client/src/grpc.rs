/// gRPC transport backed by a tonic channel
use crate::config::ClientOptions;
use crate::error::{ClientError, Result};
use crate::transport::{Connector, ScanRequest, ScanStream, Transport};
use crate::types::{BatchOperation, KeyValue, NodeInfo, NodeRole, ReplicaInfo, Stats};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use kevo_proto::{self as proto, kevo_service_client::KevoServiceClient};
use parking_lot::RwLock;
use std::sync::Arc;
use tonic::transport::{Certificate, ClientTlsConfig, Endpoint};
use tracing::debug;

/// Connects to a Kevo server over gRPC
#[derive(Debug, Clone, Copy, Default)]
pub struct GrpcConnector;

#[async_trait]
impl Connector for GrpcConnector {
    async fn connect(&self, options: &ClientOptions) -> Result<Arc<dyn Transport>> {
        let uri = options.endpoint_uri();
        // The session layer enforces the per-operation deadlines; the channel
        // only needs an outer bound that never cuts a durable write short.
        let mut endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|e| ClientError::Connection(format!("Invalid address: {}", e)))?
            .connect_timeout(options.connect_timeout)
            .timeout(options.sync_write_timeout);

        if options.tls_enabled {
            let mut tls = ClientTlsConfig::new();
            if let Some(pem) = &options.ca_cert {
                tls = tls.ca_certificate(Certificate::from_pem(pem));
            }
            if let Some(domain) = &options.tls_domain {
                tls = tls.domain_name(domain.clone());
            }
            endpoint = endpoint.tls_config(tls)?;
        }

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| ClientError::Connection(format!("Failed to connect to {}: {}", uri, e)))?;

        debug!(endpoint = %uri, tls = options.tls_enabled, "gRPC channel established");
        Ok(Arc::new(GrpcTransport::new(KevoServiceClient::new(channel))))
    }
}

/// Transport issuing one `kevo.KevoService` call per operation
pub struct GrpcTransport {
    inner: RwLock<Option<KevoServiceClient>>,
}

impl GrpcTransport {
    pub fn new(client: KevoServiceClient) -> Self {
        Self {
            inner: RwLock::new(Some(client)),
        }
    }

    /// Clone of the stub; clones share the channel
    fn client(&self) -> Result<KevoServiceClient> {
        self.inner.read().clone().ok_or_else(ClientError::not_connected)
    }
}

fn wire_limit(limit: Option<u32>) -> i32 {
    limit
        .map(|l| i32::try_from(l).unwrap_or(i32::MAX))
        .unwrap_or(0)
}

fn node_info_from_proto(response: proto::GetNodeInfoResponse) -> NodeInfo {
    let role = match response.node_role() {
        proto::NodeRole::Standalone => NodeRole::Standalone,
        proto::NodeRole::Primary => NodeRole::Primary,
        proto::NodeRole::Replica => NodeRole::Replica,
    };

    let replicas = response
        .replicas
        .into_iter()
        .map(|r| ReplicaInfo {
            address: r.address,
            available: r.available,
            last_sequence: r.last_sequence,
            region: Some(r.region).filter(|s| !s.is_empty()),
            meta: r.meta,
        })
        .collect();

    NodeInfo {
        role,
        replicas,
        primary_address: Some(response.primary_address).filter(|s| !s.is_empty()),
        last_sequence: response.last_sequence,
        read_only: response.read_only,
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn get_stats(&self) -> Result<Stats> {
        let response = self
            .client()?
            .get_stats(proto::GetStatsRequest {})
            .await?
            .into_inner();

        Ok(Stats {
            key_count: response.key_count,
            storage_size_bytes: response.storage_size,
            memtable_count: response.memtable_count,
            sstable_count: response.sstable_count,
            write_amplification: response.write_amplification,
            read_amplification: response.read_amplification,
        })
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let request = proto::GetRequest {
            key: Bytes::copy_from_slice(key),
        };

        let response = self.client()?.get(request).await?.into_inner();
        Ok(response.found.then_some(response.value))
    }

    async fn put(&self, key: &[u8], value: &[u8], sync: bool) -> Result<bool> {
        let request = proto::PutRequest {
            key: Bytes::copy_from_slice(key),
            value: Bytes::copy_from_slice(value),
            sync,
        };

        let response = self.client()?.put(request).await?.into_inner();
        Ok(response.success)
    }

    async fn delete(&self, key: &[u8], sync: bool) -> Result<bool> {
        let request = proto::DeleteRequest {
            key: Bytes::copy_from_slice(key),
            sync,
        };

        let response = self.client()?.delete(request).await?.into_inner();
        Ok(response.success)
    }

    async fn batch_write(&self, operations: &[BatchOperation], sync: bool) -> Result<bool> {
        let operations = operations
            .iter()
            .map(|op| match op {
                BatchOperation::Put { key, value } => proto::Operation {
                    r#type: proto::OperationType::Put as i32,
                    key: key.clone(),
                    value: value.clone(),
                },
                BatchOperation::Delete { key } => proto::Operation {
                    r#type: proto::OperationType::Delete as i32,
                    key: key.clone(),
                    value: Bytes::new(),
                },
            })
            .collect();

        let request = proto::BatchWriteRequest { operations, sync };
        let response = self.client()?.batch_write(request).await?.into_inner();
        Ok(response.success)
    }

    async fn begin_transaction(&self, read_only: bool) -> Result<String> {
        let response = self
            .client()?
            .begin_transaction(proto::BeginTransactionRequest { read_only })
            .await?
            .into_inner();

        if response.transaction_id.is_empty() {
            return Err(ClientError::remote(
                "InvalidResponse",
                "server returned an empty transaction id",
            ));
        }
        Ok(response.transaction_id)
    }

    async fn tx_get(&self, transaction_id: &str, key: &[u8]) -> Result<Option<Bytes>> {
        let request = proto::TxGetRequest {
            transaction_id: transaction_id.to_string(),
            key: Bytes::copy_from_slice(key),
        };

        let response = self.client()?.tx_get(request).await?.into_inner();
        Ok(response.found.then_some(response.value))
    }

    async fn tx_put(&self, transaction_id: &str, key: &[u8], value: &[u8]) -> Result<bool> {
        let request = proto::TxPutRequest {
            transaction_id: transaction_id.to_string(),
            key: Bytes::copy_from_slice(key),
            value: Bytes::copy_from_slice(value),
        };

        let response = self.client()?.tx_put(request).await?.into_inner();
        Ok(response.success)
    }

    async fn tx_delete(&self, transaction_id: &str, key: &[u8]) -> Result<bool> {
        let request = proto::TxDeleteRequest {
            transaction_id: transaction_id.to_string(),
            key: Bytes::copy_from_slice(key),
        };

        let response = self.client()?.tx_delete(request).await?.into_inner();
        Ok(response.success)
    }

    async fn commit_transaction(&self, transaction_id: &str) -> Result<bool> {
        let request = proto::CommitTransactionRequest {
            transaction_id: transaction_id.to_string(),
        };

        let response = self.client()?.commit_transaction(request).await?.into_inner();
        Ok(response.success)
    }

    async fn rollback_transaction(&self, transaction_id: &str) -> Result<bool> {
        let request = proto::RollbackTransactionRequest {
            transaction_id: transaction_id.to_string(),
        };

        let response = self
            .client()?
            .rollback_transaction(request)
            .await?
            .into_inner();
        Ok(response.success)
    }

    async fn scan(&self, request: ScanRequest) -> Result<ScanStream> {
        let mut client = self.client()?;
        let ScanRequest {
            prefix,
            suffix,
            start_key,
            end_key,
            limit,
            transaction_id,
        } = request;

        let stream = match transaction_id {
            Some(transaction_id) => {
                let request = proto::TxScanRequest {
                    transaction_id,
                    prefix: prefix.unwrap_or_default(),
                    suffix: suffix.unwrap_or_default(),
                    start_key: start_key.unwrap_or_default(),
                    end_key: end_key.unwrap_or_default(),
                    limit: wire_limit(limit),
                };
                client
                    .tx_scan(request)
                    .await?
                    .into_inner()
                    .map(|item| {
                        item.map(|r| KeyValue::new(r.key, r.value))
                            .map_err(ClientError::from)
                    })
                    .boxed()
            }
            None => {
                let request = proto::ScanRequest {
                    prefix: prefix.unwrap_or_default(),
                    suffix: suffix.unwrap_or_default(),
                    start_key: start_key.unwrap_or_default(),
                    end_key: end_key.unwrap_or_default(),
                    limit: wire_limit(limit),
                };
                client
                    .scan(request)
                    .await?
                    .into_inner()
                    .map(|item| {
                        item.map(|r| KeyValue::new(r.key, r.value))
                            .map_err(ClientError::from)
                    })
                    .boxed()
            }
        };

        Ok(stream)
    }

    async fn get_node_info(&self) -> Result<Option<NodeInfo>> {
        match self
            .client()?
            .get_node_info(proto::GetNodeInfoRequest {})
            .await
        {
            Ok(response) => Ok(Some(node_info_from_proto(response.into_inner()))),
            Err(status) if status.code() == tonic::Code::Unimplemented => Ok(None),
            Err(status) => Err(status.into()),
        }
    }

    async fn close(&self) -> Result<()> {
        // Dropping the last stub clone closes the channel.
        self.inner.write().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_wire_limit() {
        assert_eq!(wire_limit(None), 0);
        assert_eq!(wire_limit(Some(3)), 3);
        assert_eq!(wire_limit(Some(u32::MAX)), i32::MAX);
    }

    #[test]
    fn test_node_info_from_proto_replica() {
        let info = node_info_from_proto(proto::GetNodeInfoResponse {
            node_role: proto::NodeRole::Replica as i32,
            primary_address: "10.0.0.1:50051".to_string(),
            replicas: Vec::new(),
            last_sequence: 99,
            read_only: true,
        });

        assert_eq!(info.role, NodeRole::Replica);
        assert_eq!(info.primary_address.as_deref(), Some("10.0.0.1:50051"));
        assert!(info.read_only);
        assert_eq!(info.last_sequence, 99);
    }

    #[test]
    fn test_node_info_from_proto_primary_drops_empty_region() {
        let info = node_info_from_proto(proto::GetNodeInfoResponse {
            node_role: proto::NodeRole::Primary as i32,
            primary_address: String::new(),
            replicas: vec![proto::ReplicaInfo {
                address: "10.0.0.2:50051".to_string(),
                last_sequence: 10,
                available: true,
                region: String::new(),
                meta: HashMap::new(),
            }],
            last_sequence: 12,
            read_only: false,
        });

        assert_eq!(info.role, NodeRole::Primary);
        assert!(info.primary_address.is_none());
        assert_eq!(info.replicas.len(), 1);
        assert!(info.replicas[0].region.is_none());
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_address() {
        let options = ClientOptions::new("http://bad address with spaces");
        let err = GrpcConnector.connect(&options).await.err().unwrap();
        assert_eq!(err.code(), "CONNECTION_ERROR");
    }
}
