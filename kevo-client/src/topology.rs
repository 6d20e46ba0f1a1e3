/// Topology discovery and routing decisions
///
/// The router only surfaces what the connected node reports. Acting on a
/// [`Route`] (opening a client for another endpoint, failing over) is left
/// to the caller.

use crate::connection::Connection;
use crate::error::Result;
use crate::types::{NodeInfo, NodeRole, ReplicaInfo};
use tracing::debug;

/// Broad class of an operation for routing purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Read,
    Write,
}

/// Where an operation should be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Keep using the current endpoint
    Current,
    /// Send to the primary at this address
    Primary(String),
    /// Send to the replica at this address
    Replica(String),
}

impl NodeInfo {
    /// Routing decision for an operation issued against this node.
    ///
    /// Writes on a replica go to its primary. Reads on a primary go to the
    /// available replica with the highest sequence number, if any.
    pub fn route(&self, kind: OperationKind) -> Route {
        match (self.role, kind) {
            (NodeRole::Replica, OperationKind::Write) => match &self.primary_address {
                Some(primary) => Route::Primary(primary.clone()),
                None => Route::Current,
            },
            (NodeRole::Primary, OperationKind::Read) => match self.freshest_replica() {
                Some(replica) => Route::Replica(replica.address.clone()),
                None => Route::Current,
            },
            _ => Route::Current,
        }
    }

    /// Available replica with the least replication lag
    pub fn freshest_replica(&self) -> Option<&ReplicaInfo> {
        // max_by_key keeps the last maximum; reverse so ties go to the first listed
        self.available_replicas()
            .rev()
            .max_by_key(|r| r.last_sequence)
    }
}

/// Queries node role and replica set over the client's connection
pub struct TopologyRouter {
    connection: Connection,
}

impl TopologyRouter {
    pub(crate) fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Fetch fresh node info.
    ///
    /// Returns `None` when the server does not support topology queries.
    /// That answer is remembered for the life of the connection, so later
    /// calls return `None` without a round trip.
    pub async fn get_node_info(&self) -> Result<Option<NodeInfo>> {
        if self.connection.topology_supported() == Some(false) {
            return Ok(None);
        }

        let info = self
            .connection
            .call(
                "GetNodeInfo",
                self.connection.request_timeout(),
                self.connection.transport().get_node_info(),
            )
            .await?;

        self.connection.set_topology_supported(info.is_some());
        if info.is_none() {
            self.connection
                .observe(async {
                    debug!("server does not report topology, treating node as standalone");
                })
                .await;
        }
        Ok(info)
    }

    /// Node info fetched once and kept for the life of the connection
    pub async fn cached_node_info(&self) -> Result<Option<NodeInfo>> {
        let cached = self.connection.node_info_cache().lock().clone();
        if let Some(info) = cached {
            return Ok(info);
        }

        let info = self.get_node_info().await?;
        *self.connection.node_info_cache().lock() = Some(info.clone());
        Ok(info)
    }

    /// Role of the connected node; a server without topology support is standalone
    pub async fn role(&self) -> Result<NodeRole> {
        Ok(self
            .get_node_info()
            .await?
            .map(|info| info.role)
            .unwrap_or(NodeRole::Standalone))
    }

    /// Routing decision based on the cached node info
    pub async fn route(&self, kind: OperationKind) -> Result<Route> {
        Ok(self
            .cached_node_info()
            .await?
            .map(|info| info.route(kind))
            .unwrap_or(Route::Current))
    }
}
