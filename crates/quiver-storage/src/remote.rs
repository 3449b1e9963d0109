//! The cross-worker storage channel.
//!
//! Mutations that target another worker's records are not applied eagerly:
//! they are buffered on the owning worker's updates server and applied at
//! the updates-apply barrier. This module defines the deferred update
//! payloads and the [`RemoteGraph`] trait the accessor uses to reach other
//! workers; the cluster crate provides the real implementation, while
//! [`LocalOnlyRemote`] serves single-worker deployments.

use std::collections::BTreeMap;

use quiver_core::{Gid, GlobalAddress, LabelId, PropertyId, PropertyValue, TxId, WorkerId};
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};
use crate::records::{EdgeEntry, EdgeRecord, VertexRecord};

/// A buffered write destined for another worker, applied at the
/// updates-apply barrier. All element ids are local to the target worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeferredUpdate {
    /// Materialize a vertex created through `insert_vertex_into_remote`.
    CreateVertex {
        /// The pre-allocated gid.
        gid: Gid,
        /// Labels to set.
        labels: Vec<LabelId>,
        /// Properties to set.
        properties: BTreeMap<PropertyId, PropertyValue>,
    },
    /// Materialize an edge whose source vertex lives on the target worker.
    CreateEdge {
        /// The pre-allocated gid.
        gid: Gid,
        /// The full edge payload.
        record: EdgeRecord,
    },
    /// Append an incidence entry to a vertex's incoming list.
    AddInEdge {
        /// The target vertex.
        vertex: Gid,
        /// The entry to append.
        entry: EdgeEntry,
    },
    /// Append an incidence entry to a vertex's outgoing list.
    AddOutEdge {
        /// The target vertex.
        vertex: Gid,
        /// The entry to append.
        entry: EdgeEntry,
    },
    /// Remove an incidence entry from a vertex's incoming list.
    RemoveInEdge {
        /// The target vertex.
        vertex: Gid,
        /// The referenced edge.
        edge: GlobalAddress,
    },
    /// Remove an incidence entry from a vertex's outgoing list.
    RemoveOutEdge {
        /// The target vertex.
        vertex: Gid,
        /// The referenced edge.
        edge: GlobalAddress,
    },
    /// Set one vertex property.
    SetVertexProperty {
        /// The target vertex.
        vertex: Gid,
        /// The property key.
        key: PropertyId,
        /// The new value; `Null` erases.
        value: PropertyValue,
    },
    /// Set one edge property.
    SetEdgeProperty {
        /// The target edge.
        edge: Gid,
        /// The property key.
        key: PropertyId,
        /// The new value; `Null` erases.
        value: PropertyValue,
    },
    /// Clear every property of a vertex.
    ClearVertexProperties {
        /// The target vertex.
        vertex: Gid,
    },
    /// Add a label to a vertex.
    AddLabel {
        /// The target vertex.
        vertex: Gid,
        /// The label to add.
        label: LabelId,
    },
    /// Remove a label from a vertex.
    RemoveLabel {
        /// The target vertex.
        vertex: Gid,
        /// The label to remove.
        label: LabelId,
    },
    /// Delete a vertex.
    RemoveVertex {
        /// The target vertex.
        vertex: Gid,
    },
    /// Delete an edge.
    RemoveEdge {
        /// The target edge.
        edge: Gid,
    },
}

/// Reaches other workers' stores on behalf of a transaction.
///
/// Fetches are synchronous record reads that the caller is expected to
/// cache in the transaction's `DataManager`. Writes are buffered on the
/// owner and only become real at the updates-apply barrier.
pub trait RemoteGraph: Send + Sync {
    /// Fetches a vertex record from its owner.
    fn fetch_vertex(&self, tx: TxId, address: GlobalAddress) -> StorageResult<VertexRecord>;

    /// Fetches an edge record from its owner.
    fn fetch_edge(&self, tx: TxId, address: GlobalAddress) -> StorageResult<EdgeRecord>;

    /// Allocates a gid on `worker` and buffers the vertex creation there.
    fn allocate_vertex(
        &self,
        tx: TxId,
        worker: WorkerId,
        labels: Vec<LabelId>,
        properties: BTreeMap<PropertyId, PropertyValue>,
    ) -> StorageResult<GlobalAddress>;

    /// Allocates a gid on `worker` and buffers the edge creation there.
    fn allocate_edge(
        &self,
        tx: TxId,
        worker: WorkerId,
        record: EdgeRecord,
    ) -> StorageResult<GlobalAddress>;

    /// Buffers an arbitrary deferred update on `worker`.
    fn defer(&self, tx: TxId, worker: WorkerId, update: DeferredUpdate) -> StorageResult<()>;
}

/// The single-worker stand-in: every remote operation fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalOnlyRemote;

impl RemoteGraph for LocalOnlyRemote {
    fn fetch_vertex(&self, _tx: TxId, address: GlobalAddress) -> StorageResult<VertexRecord> {
        Err(StorageError::NoRemote(format!("cannot fetch vertex {address}")))
    }

    fn fetch_edge(&self, _tx: TxId, address: GlobalAddress) -> StorageResult<EdgeRecord> {
        Err(StorageError::NoRemote(format!("cannot fetch edge {address}")))
    }

    fn allocate_vertex(
        &self,
        _tx: TxId,
        worker: WorkerId,
        _labels: Vec<LabelId>,
        _properties: BTreeMap<PropertyId, PropertyValue>,
    ) -> StorageResult<GlobalAddress> {
        Err(StorageError::NoRemote(format!("cannot create vertex on {worker}")))
    }

    fn allocate_edge(
        &self,
        _tx: TxId,
        worker: WorkerId,
        _record: EdgeRecord,
    ) -> StorageResult<GlobalAddress> {
        Err(StorageError::NoRemote(format!("cannot create edge on {worker}")))
    }

    fn defer(&self, _tx: TxId, worker: WorkerId, _update: DeferredUpdate) -> StorageResult<()> {
        Err(StorageError::NoRemote(format!("cannot defer update to {worker}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_core::Gid;

    #[test]
    fn local_only_remote_rejects_everything() {
        let remote = LocalOnlyRemote;
        let addr = GlobalAddress::new(WorkerId::new(1), Gid::new(0));
        assert!(matches!(remote.fetch_vertex(TxId(1), addr), Err(StorageError::NoRemote(_))));
        assert!(matches!(
            remote.defer(TxId(1), WorkerId::new(1), DeferredUpdate::RemoveVertex { vertex: Gid::new(0) }),
            Err(StorageError::NoRemote(_))
        ));
    }

    #[test]
    fn deferred_update_serializes() {
        let update = DeferredUpdate::AddLabel { vertex: Gid::new(3), label: LabelId::new(1) };
        let json = serde_json::to_string(&update).unwrap();
        let back: DeferredUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, update);
    }
}
