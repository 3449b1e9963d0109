//! Per-transaction cache of remote graph records.
//!
//! Remote accessors resolve against this cache; the coordinator (scans,
//! expansions, pull responses) is responsible for populating it before an
//! accessor reaches an evaluator. The cache lives and dies with the
//! transaction that owns it; there is no inter-transaction sharing.
//!
//! Like any cache, inserts and membership probes degrade gracefully on a
//! poisoned lock (a dropped insert surfaces later as a `Reconstruction`
//! miss); reads and patches propagate, since their callers already
//! return results.

use std::collections::HashMap;
use std::sync::Mutex;

use quiver_core::GlobalAddress;

use crate::error::{StorageError, StorageResult};
use crate::records::{EdgeRecord, VertexRecord};

/// The per-transaction remote record cache.
#[derive(Debug, Default)]
pub struct DataManager {
    vertices: Mutex<HashMap<GlobalAddress, VertexRecord>>,
    edges: Mutex<HashMap<GlobalAddress, EdgeRecord>>,
}

impl DataManager {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caches a remote vertex record, replacing any prior snapshot.
    ///
    /// A poisoned lock drops the insert; the record is simply treated as
    /// never fetched.
    pub fn insert_vertex(&self, address: GlobalAddress, record: VertexRecord) {
        if let Ok(mut vertices) = self.vertices.lock() {
            vertices.insert(address, record);
        }
    }

    /// Caches a remote edge record, replacing any prior snapshot.
    pub fn insert_edge(&self, address: GlobalAddress, record: EdgeRecord) {
        if let Ok(mut edges) = self.edges.lock() {
            edges.insert(address, record);
        }
    }

    /// Returns `true` when the vertex is cached.
    #[must_use]
    pub fn contains_vertex(&self, address: GlobalAddress) -> bool {
        self.vertices.lock().map(|v| v.contains_key(&address)).unwrap_or(false)
    }

    /// Returns `true` when the edge is cached.
    #[must_use]
    pub fn contains_edge(&self, address: GlobalAddress) -> bool {
        self.edges.lock().map(|e| e.contains_key(&address)).unwrap_or(false)
    }

    /// Looks up a cached vertex record.
    ///
    /// A miss is a [`StorageError::Reconstruction`]: the invariant is that
    /// remote records are cached before their accessors are evaluated.
    pub fn vertex(&self, address: GlobalAddress) -> StorageResult<VertexRecord> {
        self.vertices
            .lock()
            .map_err(|_| StorageError::LockPoisoned("data manager".into()))?
            .get(&address)
            .cloned()
            .ok_or(StorageError::Reconstruction(address))
    }

    /// Looks up a cached edge record.
    pub fn edge(&self, address: GlobalAddress) -> StorageResult<EdgeRecord> {
        self.edges
            .lock()
            .map_err(|_| StorageError::LockPoisoned("data manager".into()))?
            .get(&address)
            .cloned()
            .ok_or(StorageError::Reconstruction(address))
    }

    /// Patches a cached vertex record in place.
    ///
    /// Used by mutation operators so that later NEW-view reads in the same
    /// query observe deferred remote writes.
    pub fn update_vertex(
        &self,
        address: GlobalAddress,
        f: impl FnOnce(&mut VertexRecord),
    ) -> StorageResult<()> {
        let mut vertices = self
            .vertices
            .lock()
            .map_err(|_| StorageError::LockPoisoned("data manager".into()))?;
        match vertices.get_mut(&address) {
            Some(record) => {
                f(record);
                Ok(())
            }
            None => Err(StorageError::Reconstruction(address)),
        }
    }

    /// Patches a cached edge record in place.
    pub fn update_edge(
        &self,
        address: GlobalAddress,
        f: impl FnOnce(&mut EdgeRecord),
    ) -> StorageResult<()> {
        let mut edges =
            self.edges.lock().map_err(|_| StorageError::LockPoisoned("data manager".into()))?;
        match edges.get_mut(&address) {
            Some(record) => {
                f(record);
                Ok(())
            }
            None => Err(StorageError::Reconstruction(address)),
        }
    }
}
