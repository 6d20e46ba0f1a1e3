//! Protocol Buffers definitions for the Kevo gRPC API.
//!
//! The message types mirror `kevo/service.proto` (package `kevo`) and are
//! declared with `prost` derive macros, so building this crate does not need
//! `protoc`. The [`kevo_service_client::KevoServiceClient`] stub issues calls
//! against the `kevo.KevoService` service over a tonic [`Channel`].
//!
//! [`Channel`]: tonic::transport::Channel

use bytes::Bytes;
use prost::{Enumeration, Message};
use std::collections::HashMap;

#[derive(Clone, PartialEq, Message)]
pub struct GetRequest {
    #[prost(bytes = "bytes", tag = "1")]
    pub key: Bytes,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetResponse {
    #[prost(bytes = "bytes", tag = "1")]
    pub value: Bytes,
    #[prost(bool, tag = "2")]
    pub found: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct PutRequest {
    #[prost(bytes = "bytes", tag = "1")]
    pub key: Bytes,
    #[prost(bytes = "bytes", tag = "2")]
    pub value: Bytes,
    #[prost(bool, tag = "3")]
    pub sync: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct PutResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeleteRequest {
    #[prost(bytes = "bytes", tag = "1")]
    pub key: Bytes,
    #[prost(bool, tag = "2")]
    pub sync: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeleteResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
}

/// Kind of a single batch operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum OperationType {
    Put = 0,
    Delete = 1,
}

/// One entry of a [`BatchWriteRequest`]; `value` is ignored for deletes.
#[derive(Clone, PartialEq, Message)]
pub struct Operation {
    #[prost(enumeration = "OperationType", tag = "1")]
    pub r#type: i32,
    #[prost(bytes = "bytes", tag = "2")]
    pub key: Bytes,
    #[prost(bytes = "bytes", tag = "3")]
    pub value: Bytes,
}

#[derive(Clone, PartialEq, Message)]
pub struct BatchWriteRequest {
    #[prost(message, repeated, tag = "1")]
    pub operations: Vec<Operation>,
    #[prost(bool, tag = "2")]
    pub sync: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct BatchWriteResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
}

/// Scan filters. Empty byte fields and a zero limit mean "not set".
#[derive(Clone, PartialEq, Message)]
pub struct ScanRequest {
    #[prost(bytes = "bytes", tag = "1")]
    pub prefix: Bytes,
    #[prost(bytes = "bytes", tag = "2")]
    pub suffix: Bytes,
    #[prost(bytes = "bytes", tag = "3")]
    pub start_key: Bytes,
    #[prost(bytes = "bytes", tag = "4")]
    pub end_key: Bytes,
    #[prost(int32, tag = "5")]
    pub limit: i32,
}

/// One streamed scan result.
#[derive(Clone, PartialEq, Message)]
pub struct ScanResponse {
    #[prost(bytes = "bytes", tag = "1")]
    pub key: Bytes,
    #[prost(bytes = "bytes", tag = "2")]
    pub value: Bytes,
}

#[derive(Clone, PartialEq, Message)]
pub struct BeginTransactionRequest {
    #[prost(bool, tag = "1")]
    pub read_only: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct BeginTransactionResponse {
    #[prost(string, tag = "1")]
    pub transaction_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct CommitTransactionRequest {
    #[prost(string, tag = "1")]
    pub transaction_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct CommitTransactionResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct RollbackTransactionRequest {
    #[prost(string, tag = "1")]
    pub transaction_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct RollbackTransactionResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct TxGetRequest {
    #[prost(string, tag = "1")]
    pub transaction_id: String,
    #[prost(bytes = "bytes", tag = "2")]
    pub key: Bytes,
}

#[derive(Clone, PartialEq, Message)]
pub struct TxGetResponse {
    #[prost(bytes = "bytes", tag = "1")]
    pub value: Bytes,
    #[prost(bool, tag = "2")]
    pub found: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct TxPutRequest {
    #[prost(string, tag = "1")]
    pub transaction_id: String,
    #[prost(bytes = "bytes", tag = "2")]
    pub key: Bytes,
    #[prost(bytes = "bytes", tag = "3")]
    pub value: Bytes,
}

#[derive(Clone, PartialEq, Message)]
pub struct TxPutResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct TxDeleteRequest {
    #[prost(string, tag = "1")]
    pub transaction_id: String,
    #[prost(bytes = "bytes", tag = "2")]
    pub key: Bytes,
}

#[derive(Clone, PartialEq, Message)]
pub struct TxDeleteResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
}

/// Transaction-scoped scan. Filter fields follow [`ScanRequest`].
#[derive(Clone, PartialEq, Message)]
pub struct TxScanRequest {
    #[prost(string, tag = "1")]
    pub transaction_id: String,
    #[prost(bytes = "bytes", tag = "2")]
    pub prefix: Bytes,
    #[prost(bytes = "bytes", tag = "3")]
    pub suffix: Bytes,
    #[prost(bytes = "bytes", tag = "4")]
    pub start_key: Bytes,
    #[prost(bytes = "bytes", tag = "5")]
    pub end_key: Bytes,
    #[prost(int32, tag = "6")]
    pub limit: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct TxScanResponse {
    #[prost(bytes = "bytes", tag = "1")]
    pub key: Bytes,
    #[prost(bytes = "bytes", tag = "2")]
    pub value: Bytes,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetStatsRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct GetStatsResponse {
    #[prost(int64, tag = "1")]
    pub key_count: i64,
    #[prost(int64, tag = "2")]
    pub storage_size: i64,
    #[prost(int32, tag = "3")]
    pub memtable_count: i32,
    #[prost(int32, tag = "4")]
    pub sstable_count: i32,
    #[prost(double, tag = "5")]
    pub write_amplification: f64,
    #[prost(double, tag = "6")]
    pub read_amplification: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum NodeRole {
    Standalone = 0,
    Primary = 1,
    Replica = 2,
}

#[derive(Clone, PartialEq, Message)]
pub struct ReplicaInfo {
    #[prost(string, tag = "1")]
    pub address: String,
    #[prost(uint64, tag = "2")]
    pub last_sequence: u64,
    #[prost(bool, tag = "3")]
    pub available: bool,
    #[prost(string, tag = "4")]
    pub region: String,
    #[prost(map = "string, string", tag = "5")]
    pub meta: HashMap<String, String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetNodeInfoRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct GetNodeInfoResponse {
    #[prost(enumeration = "NodeRole", tag = "1")]
    pub node_role: i32,
    #[prost(string, tag = "2")]
    pub primary_address: String,
    #[prost(message, repeated, tag = "3")]
    pub replicas: Vec<ReplicaInfo>,
    #[prost(uint64, tag = "4")]
    pub last_sequence: u64,
    #[prost(bool, tag = "5")]
    pub read_only: bool,
}

pub mod kevo_service_client {
    //! Client stub for `kevo.KevoService`.

    use super::*;
    use tonic::codec::{ProstCodec, Streaming};
    use tonic::codegen::http::uri::PathAndQuery;
    use tonic::transport::Channel;
    use tonic::{IntoRequest, Response, Status};

    const SERVICE: &str = "kevo.KevoService";

    macro_rules! unary {
        ($(#[$doc:meta])* $name:ident, $method:literal, $req:ty, $resp:ty) => {
            $(#[$doc])*
            pub async fn $name(
                &mut self,
                request: impl IntoRequest<$req>,
            ) -> Result<Response<$resp>, Status> {
                self.ready().await?;
                let path = PathAndQuery::from_static(concat!("/kevo.KevoService/", $method));
                self.inner
                    .unary(request.into_request(), path, ProstCodec::default())
                    .await
            }
        };
    }

    macro_rules! server_streaming {
        ($(#[$doc:meta])* $name:ident, $method:literal, $req:ty, $resp:ty) => {
            $(#[$doc])*
            pub async fn $name(
                &mut self,
                request: impl IntoRequest<$req>,
            ) -> Result<Response<Streaming<$resp>>, Status> {
                self.ready().await?;
                let path = PathAndQuery::from_static(concat!("/kevo.KevoService/", $method));
                self.inner
                    .server_streaming(request.into_request(), path, ProstCodec::default())
                    .await
            }
        };
    }

    /// Cheaply cloneable handle; clones share the underlying channel.
    #[derive(Debug, Clone)]
    pub struct KevoServiceClient {
        inner: tonic::client::Grpc<Channel>,
    }

    impl KevoServiceClient {
        pub fn new(channel: Channel) -> Self {
            Self {
                inner: tonic::client::Grpc::new(channel),
            }
        }

        async fn ready(&mut self) -> Result<(), Status> {
            self.inner.ready().await.map_err(|e| {
                Status::unavailable(format!("{} was not ready: {}", SERVICE, e))
            })
        }

        unary!(get, "Get", GetRequest, GetResponse);
        unary!(put, "Put", PutRequest, PutResponse);
        unary!(delete, "Delete", DeleteRequest, DeleteResponse);
        unary!(batch_write, "BatchWrite", BatchWriteRequest, BatchWriteResponse);
        server_streaming!(scan, "Scan", ScanRequest, ScanResponse);
        unary!(
            begin_transaction,
            "BeginTransaction",
            BeginTransactionRequest,
            BeginTransactionResponse
        );
        unary!(
            commit_transaction,
            "CommitTransaction",
            CommitTransactionRequest,
            CommitTransactionResponse
        );
        unary!(
            rollback_transaction,
            "RollbackTransaction",
            RollbackTransactionRequest,
            RollbackTransactionResponse
        );
        unary!(tx_get, "TxGet", TxGetRequest, TxGetResponse);
        unary!(tx_put, "TxPut", TxPutRequest, TxPutResponse);
        unary!(tx_delete, "TxDelete", TxDeleteRequest, TxDeleteResponse);
        server_streaming!(tx_scan, "TxScan", TxScanRequest, TxScanResponse);
        unary!(get_stats, "GetStats", GetStatsRequest, GetStatsResponse);
        unary!(get_node_info, "GetNodeInfo", GetNodeInfoRequest, GetNodeInfoResponse);
    }
}
