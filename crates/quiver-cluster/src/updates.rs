//! The deferred-update server.
//!
//! Each worker buffers writes that other workers addressed at its records
//! and applies them, in arrival order, when the barrier (or commit path)
//! says so. Until then the writes exist only in the originating
//! transaction's DataManager snapshots.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use quiver_core::TxId;
use quiver_storage::{
    DeferredUpdate, GraphStore, StorageError, Transaction, TransactionEngine, VertexRecord,
};
use tracing::debug;

use crate::error::{ClusterError, ClusterResult};
use crate::rpc::UpdateResult;

/// One worker's buffer of deferred writes, keyed by transaction.
#[derive(Debug, Default)]
pub struct UpdatesServer {
    deferred: Mutex<HashMap<TxId, Vec<DeferredUpdate>>>,
}

impl UpdatesServer {
    /// Creates an empty server.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers one update.
    ///
    /// A dropped write is data loss, so a poisoned buffer propagates
    /// instead of degrading.
    pub fn defer(&self, tx: TxId, update: DeferredUpdate) -> ClusterResult<()> {
        let mut deferred = self
            .deferred
            .lock()
            .map_err(|_| ClusterError::LockPoisoned("deferred update buffer".into()))?;
        deferred.entry(tx).or_default().push(update);
        Ok(())
    }

    /// How many updates are buffered for a transaction.
    #[must_use]
    pub fn pending(&self, tx: TxId) -> usize {
        self.deferred.lock().map(|d| d.get(&tx).map_or(0, Vec::len)).unwrap_or(0)
    }

    /// Drops a transaction's buffer without applying. Abort-path cleanup,
    /// so a poisoned buffer degrades to a no-op.
    pub fn discard(&self, tx: TxId) {
        if let Ok(mut deferred) = self.deferred.lock() {
            deferred.remove(&tx);
        }
    }

    /// Applies every buffered write of `tx` against the local store.
    ///
    /// Updates apply in arrival order; the first failure classifies the
    /// whole application.
    pub fn apply(
        &self,
        store: &GraphStore,
        engine: &Arc<TransactionEngine>,
        tx: TxId,
    ) -> UpdateResult {
        // A poisoned buffer classifies as a retriable failure; the writes
        // cannot be proven applied.
        let Ok(mut deferred) = self.deferred.lock() else {
            return UpdateResult::Serialization;
        };
        let updates = match deferred.remove(&tx) {
            Some(updates) => updates,
            None => return UpdateResult::Done,
        };
        drop(deferred);
        let transaction = match engine.adopt(tx) {
            Ok(transaction) => transaction,
            Err(_) => return UpdateResult::Serialization,
        };
        debug!(tx = %tx, count = updates.len(), worker = %store.worker(), "applying deferred updates");

        for update in updates {
            if let Err(error) = Self::apply_one(store, &transaction, update) {
                return match error {
                    StorageError::Serialization(_) => UpdateResult::Serialization,
                    StorageError::LockTimeout(_) => UpdateResult::LockTimeout,
                    StorageError::RecordDeleted(_) | StorageError::NotFound(_) => {
                        UpdateResult::UpdateDeleted
                    }
                    _ => UpdateResult::Serialization,
                };
            }
        }
        UpdateResult::Done
    }

    fn apply_one(
        store: &GraphStore,
        tx: &Transaction,
        update: DeferredUpdate,
    ) -> Result<(), StorageError> {
        match update {
            DeferredUpdate::CreateVertex { gid, labels, properties } => {
                let record = VertexRecord { labels, properties, ..VertexRecord::new() };
                store.insert_vertex_record(tx, Some(gid), record)?;
                Ok(())
            }
            DeferredUpdate::CreateEdge { gid, record } => {
                store.insert_edge_record(tx, Some(gid), record)?;
                Ok(())
            }
            DeferredUpdate::AddInEdge { vertex, entry } => {
                store.update_vertex(tx, vertex, |record| record.in_edges.push(entry))
            }
            DeferredUpdate::AddOutEdge { vertex, entry } => {
                store.update_vertex(tx, vertex, |record| record.out_edges.push(entry))
            }
            DeferredUpdate::RemoveInEdge { vertex, edge } => {
                store.update_vertex(tx, vertex, |record| {
                    record.in_edges.retain(|entry| entry.edge != edge);
                })
            }
            DeferredUpdate::RemoveOutEdge { vertex, edge } => {
                store.update_vertex(tx, vertex, |record| {
                    record.out_edges.retain(|entry| entry.edge != edge);
                })
            }
            DeferredUpdate::SetVertexProperty { vertex, key, value } => {
                store.update_vertex(tx, vertex, |record| {
                    if value.is_null() {
                        record.properties.remove(&key);
                    } else {
                        record.properties.insert(key, value);
                    }
                })
            }
            DeferredUpdate::SetEdgeProperty { edge, key, value } => {
                store.update_edge(tx, edge, |record| {
                    if value.is_null() {
                        record.properties.remove(&key);
                    } else {
                        record.properties.insert(key, value);
                    }
                })
            }
            DeferredUpdate::ClearVertexProperties { vertex } => {
                store.update_vertex(tx, vertex, |record| record.properties.clear())
            }
            DeferredUpdate::AddLabel { vertex, label } => {
                store.update_vertex(tx, vertex, |record| record.labels.push(label))
            }
            DeferredUpdate::RemoveLabel { vertex, label } => {
                store.update_vertex(tx, vertex, |record| {
                    record.labels.retain(|&l| l != label);
                })
            }
            DeferredUpdate::RemoveVertex { vertex } => store.delete_vertex(tx, vertex),
            DeferredUpdate::RemoveEdge { edge } => store.delete_edge(tx, edge),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_core::{LabelId, WorkerId};
    use quiver_storage::View;

    #[test]
    fn buffered_creates_apply_at_the_barrier() {
        let engine = Arc::new(TransactionEngine::new());
        let store = GraphStore::new(WorkerId::new(1), Arc::clone(&engine));
        let server = UpdatesServer::new();
        let tx = engine.begin(None).unwrap();

        let gid = store.allocate_gid();
        server
            .defer(
                tx.id(),
                DeferredUpdate::CreateVertex {
                    gid,
                    labels: vec![LabelId::new(0)],
                    properties: Default::default(),
                },
            )
            .unwrap();
        assert_eq!(server.pending(tx.id()), 1);
        // Nothing exists before apply.
        assert!(store.visible_vertices(&tx, View::New).unwrap().is_empty());

        assert_eq!(server.apply(&store, &engine, tx.id()), UpdateResult::Done);
        assert_eq!(store.visible_vertices(&tx, View::New).unwrap().len(), 1);
        assert_eq!(server.pending(tx.id()), 0);
    }

    #[test]
    fn applying_to_a_deleted_record_reports_update_deleted() {
        let engine = Arc::new(TransactionEngine::new());
        let store = GraphStore::new(WorkerId::new(1), Arc::clone(&engine));
        let server = UpdatesServer::new();
        let tx = engine.begin(None).unwrap();

        let address = store.insert_vertex(&tx).unwrap();
        store.delete_vertex(&tx, address.gid()).unwrap();
        server
            .defer(
                tx.id(),
                DeferredUpdate::AddLabel { vertex: address.gid(), label: LabelId::new(0) },
            )
            .unwrap();
        assert_eq!(server.apply(&store, &engine, tx.id()), UpdateResult::UpdateDeleted);
    }

    #[test]
    fn discard_drops_the_buffer() {
        let engine = Arc::new(TransactionEngine::new());
        let store = GraphStore::new(WorkerId::new(1), Arc::clone(&engine));
        let server = UpdatesServer::new();
        let tx = engine.begin(None).unwrap();

        let gid = store.allocate_gid();
        server
            .defer(
                tx.id(),
                DeferredUpdate::CreateVertex { gid, labels: vec![], properties: Default::default() },
            )
            .unwrap();
        server.discard(tx.id());
        assert_eq!(server.apply(&store, &engine, tx.id()), UpdateResult::Done);
        assert!(store.visible_vertices(&tx, View::New).unwrap().is_empty());
    }
}
