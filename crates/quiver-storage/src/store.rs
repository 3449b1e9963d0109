//! The per-worker graph store.
//!
//! The store keeps vertex and edge version chains keyed by gid, maintains
//! the label and label-property indexes, and enforces record-level locking.
//! It only ever touches records it owns; cross-worker orchestration (edge
//! endpoints on other workers, deferred updates) happens in the accessor
//! layer above.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use quiver_core::{Gid, GlobalAddress, LabelId, PropertyId, PropertyValue, TxId, WorkerId};

use crate::error::{StorageError, StorageResult};
use crate::index::{Bound, LabelIndex, LabelPropertyIndex};
use crate::mvcc::{VersionChain, VersionStamp, View};
use crate::records::{EdgeRecord, VertexRecord};
use crate::txn::{Transaction, TransactionEngine, TxStatus};

/// How long a writer polls for a record lock between retries.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(1);

fn map_poisoned() -> StorageError {
    StorageError::LockPoisoned("store record map".into())
}

fn chain_poisoned() -> StorageError {
    StorageError::LockPoisoned("record version chain".into())
}

/// Store tuning knobs, delivered at process init.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How long a writer waits for a record held by a concurrent
    /// transaction before failing with `LockTimeout`.
    pub lock_timeout: Duration,
}

impl StoreConfig {
    /// Creates the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self { lock_timeout: Duration::from_millis(100) }
    }

    /// Sets the record lock wait bound.
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

type ChainMap<T> = RwLock<BTreeMap<Gid, Arc<Mutex<VersionChain<T>>>>>;

/// One worker's share of the graph.
pub struct GraphStore {
    worker: WorkerId,
    config: StoreConfig,
    engine: Arc<TransactionEngine>,
    next_gid: AtomicU64,
    vertices: ChainMap<VertexRecord>,
    edges: ChainMap<EdgeRecord>,
    label_index: LabelIndex,
    property_index: LabelPropertyIndex,
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore").field("worker", &self.worker).finish_non_exhaustive()
    }
}

impl GraphStore {
    /// Creates an empty store for `worker`.
    #[must_use]
    pub fn new(worker: WorkerId, engine: Arc<TransactionEngine>) -> Self {
        Self::with_config(worker, engine, StoreConfig::default())
    }

    /// Creates an empty store with explicit configuration.
    #[must_use]
    pub fn with_config(
        worker: WorkerId,
        engine: Arc<TransactionEngine>,
        config: StoreConfig,
    ) -> Self {
        Self {
            worker,
            config,
            engine,
            next_gid: AtomicU64::new(0),
            vertices: RwLock::new(BTreeMap::new()),
            edges: RwLock::new(BTreeMap::new()),
            label_index: LabelIndex::default(),
            property_index: LabelPropertyIndex::default(),
        }
    }

    /// The worker this store belongs to.
    #[inline]
    #[must_use]
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// The global address of a local gid.
    #[inline]
    #[must_use]
    pub fn address(&self, gid: Gid) -> GlobalAddress {
        GlobalAddress::new(self.worker, gid)
    }

    /// Allocates a fresh gid.
    ///
    /// Exposed so the updates server can pre-allocate ids for deferred
    /// remote creations.
    #[must_use]
    pub fn allocate_gid(&self) -> Gid {
        Gid::new(self.next_gid.fetch_add(1, Ordering::SeqCst))
    }

    fn sees(tx: &Transaction) -> impl Fn(TxId) -> bool + '_ {
        move |id| tx.sees_committed(id)
    }

    // ------------------------------------------------------------------
    // Vertices
    // ------------------------------------------------------------------

    /// Inserts an empty vertex.
    pub fn insert_vertex(&self, tx: &Transaction) -> StorageResult<GlobalAddress> {
        self.insert_vertex_record(tx, None, VertexRecord::new())
    }

    /// Inserts a vertex with the given payload, optionally at a
    /// pre-allocated gid (deferred remote creations arrive that way).
    pub fn insert_vertex_record(
        &self,
        tx: &Transaction,
        gid: Option<Gid>,
        record: VertexRecord,
    ) -> StorageResult<GlobalAddress> {
        let gid = gid.unwrap_or_else(|| self.allocate_gid());
        let stamp = VersionStamp::new(tx.id(), tx.command());
        self.index_vertex(gid, &record)?;
        let chain = Arc::new(Mutex::new(VersionChain::create(stamp, record)));
        self.vertices.write().map_err(|_| map_poisoned())?.insert(gid, chain);
        Ok(self.address(gid))
    }

    /// Reads a vertex record under the given view.
    pub fn vertex_record(
        &self,
        tx: &Transaction,
        gid: Gid,
        view: View,
    ) -> StorageResult<VertexRecord> {
        self.with_vertex(tx, gid, view, Clone::clone)
    }

    /// Runs `f` on the visible version of a vertex.
    pub fn with_vertex<R>(
        &self,
        tx: &Transaction,
        gid: Gid,
        view: View,
        f: impl FnOnce(&VertexRecord) -> R,
    ) -> StorageResult<R> {
        let chain = self.vertex_chain(gid)?;
        let guard = chain.lock().map_err(|_| chain_poisoned())?;
        let sees = Self::sees(tx);
        match guard.visible(tx.id(), tx.command(), view, &sees) {
            Some(version) => Ok(f(&version.data)),
            None => Err(StorageError::NotFound(self.address(gid))),
        }
    }

    /// Mutates a vertex under MVCC and refreshes the indexes with the new
    /// record state.
    pub fn update_vertex<R>(
        &self,
        tx: &Transaction,
        gid: Gid,
        f: impl FnOnce(&mut VertexRecord) -> R,
    ) -> StorageResult<R> {
        let chain = self.vertex_chain(gid)?;
        let mut guard = self.lock_for_write(&chain, tx, self.address(gid))?;
        let sees = Self::sees(tx);
        let mut indexed: Option<VertexRecord> = None;
        let result = guard
            .update(tx.id(), tx.command(), &sees, |record| {
                let r = f(record);
                indexed = Some(record.clone());
                r
            })
            .ok_or(StorageError::RecordDeleted(self.address(gid)))?;
        drop(guard);
        if let Some(record) = indexed {
            self.index_vertex(gid, &record)?;
        }
        Ok(result)
    }

    /// Deletes a vertex version.
    ///
    /// Incident-edge checks belong to the accessor; this only flips the
    /// version boundary.
    pub fn delete_vertex(&self, tx: &Transaction, gid: Gid) -> StorageResult<()> {
        let chain = self.vertex_chain(gid)?;
        let mut guard = self.lock_for_write(&chain, tx, self.address(gid))?;
        let sees = Self::sees(tx);
        if guard.delete(tx.id(), tx.command(), &sees) {
            Ok(())
        } else {
            Err(StorageError::RecordDeleted(self.address(gid)))
        }
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    /// Inserts an edge record, optionally at a pre-allocated gid.
    ///
    /// Endpoint incidence lists are the accessor's responsibility.
    pub fn insert_edge_record(
        &self,
        tx: &Transaction,
        gid: Option<Gid>,
        record: EdgeRecord,
    ) -> StorageResult<GlobalAddress> {
        let gid = gid.unwrap_or_else(|| self.allocate_gid());
        let stamp = VersionStamp::new(tx.id(), tx.command());
        let chain = Arc::new(Mutex::new(VersionChain::create(stamp, record)));
        self.edges.write().map_err(|_| map_poisoned())?.insert(gid, chain);
        Ok(self.address(gid))
    }

    /// Reads an edge record under the given view.
    pub fn edge_record(&self, tx: &Transaction, gid: Gid, view: View) -> StorageResult<EdgeRecord> {
        let chain = self.edge_chain(gid)?;
        let guard = chain.lock().map_err(|_| chain_poisoned())?;
        let sees = Self::sees(tx);
        match guard.visible(tx.id(), tx.command(), view, &sees) {
            Some(version) => Ok(version.data.clone()),
            None => Err(StorageError::NotFound(self.address(gid))),
        }
    }

    /// Mutates an edge under MVCC.
    pub fn update_edge<R>(
        &self,
        tx: &Transaction,
        gid: Gid,
        f: impl FnOnce(&mut EdgeRecord) -> R,
    ) -> StorageResult<R> {
        let chain = self.edge_chain(gid)?;
        let mut guard = self.lock_for_write(&chain, tx, self.address(gid))?;
        let sees = Self::sees(tx);
        guard
            .update(tx.id(), tx.command(), &sees, f)
            .ok_or(StorageError::RecordDeleted(self.address(gid)))
    }

    /// Deletes an edge version.
    pub fn delete_edge(&self, tx: &Transaction, gid: Gid) -> StorageResult<()> {
        let chain = self.edge_chain(gid)?;
        let mut guard = self.lock_for_write(&chain, tx, self.address(gid))?;
        let sees = Self::sees(tx);
        if guard.delete(tx.id(), tx.command(), &sees) {
            Ok(())
        } else {
            Err(StorageError::RecordDeleted(self.address(gid)))
        }
    }

    // ------------------------------------------------------------------
    // Scans
    // ------------------------------------------------------------------

    /// Gids of all vertices visible under the view, in gid order.
    pub fn visible_vertices(&self, tx: &Transaction, view: View) -> StorageResult<Vec<Gid>> {
        let map = self.vertices.read().map_err(|_| map_poisoned())?;
        let sees = Self::sees(tx);
        let mut gids = Vec::new();
        for (gid, chain) in map.iter() {
            let guard = chain.lock().map_err(|_| chain_poisoned())?;
            if guard.visible(tx.id(), tx.command(), view, &sees).is_some() {
                gids.push(*gid);
            }
        }
        Ok(gids)
    }

    /// Gids of vertices carrying `label` under the view, in gid order.
    pub fn vertices_by_label(
        &self,
        tx: &Transaction,
        view: View,
        label: LabelId,
    ) -> StorageResult<Vec<Gid>> {
        Ok(self
            .label_index
            .lookup(label)?
            .into_iter()
            .filter(|gid| {
                self.with_vertex(tx, *gid, view, |record| record.has_label(label)).unwrap_or(false)
            })
            .collect())
    }

    /// Index lookup by exact property value.
    pub fn vertices_by_label_value(
        &self,
        tx: &Transaction,
        view: View,
        label: LabelId,
        property: PropertyId,
        value: &PropertyValue,
    ) -> StorageResult<Vec<Gid>> {
        let hits = self
            .property_index
            .lookup_value(label, property, value)?
            .ok_or_else(|| self.index_missing(label, property))?;
        Ok(hits
            .into_iter()
            .filter(|gid| {
                self.with_vertex(tx, *gid, view, |record| {
                    record.has_label(label) && record.properties.get(&property) == Some(value)
                })
                .unwrap_or(false)
            })
            .collect())
    }

    /// Index lookup by property range. At least one bound must be present.
    pub fn vertices_by_label_range(
        &self,
        tx: &Transaction,
        view: View,
        label: LabelId,
        property: PropertyId,
        lower: Option<&Bound>,
        upper: Option<&Bound>,
    ) -> StorageResult<Vec<Gid>> {
        debug_assert!(lower.is_some() || upper.is_some(), "at least one bound required");
        let hits = self
            .property_index
            .lookup_range(label, property, lower, upper)?
            .ok_or_else(|| self.index_missing(label, property))?;
        Ok(hits
            .into_iter()
            .filter(|gid| {
                self.with_vertex(tx, *gid, view, |record| {
                    record.has_label(label) && record.properties.contains_key(&property)
                })
                .unwrap_or(false)
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Indexes
    // ------------------------------------------------------------------

    /// Returns `true` when a `(label, property)` index has been built.
    pub fn index_exists(&self, label: LabelId, property: PropertyId) -> StorageResult<bool> {
        self.property_index.exists(label, property)
    }

    /// Builds a `(label, property)` index over the currently visible
    /// vertices. Returns `false` when the index already existed.
    pub fn build_index(
        &self,
        tx: &Transaction,
        label: LabelId,
        property: PropertyId,
    ) -> StorageResult<bool> {
        if !self.property_index.create(label, property)? {
            return Ok(false);
        }
        for gid in self.vertices_by_label(tx, View::New, label)? {
            let value = self.with_vertex(tx, gid, View::New, |record| record.property(property))?;
            if !value.is_null() {
                self.property_index.add(label, property, &value, gid)?;
            }
        }
        Ok(true)
    }

    fn index_vertex(&self, gid: Gid, record: &VertexRecord) -> StorageResult<()> {
        for &label in &record.labels {
            self.label_index.add(label, gid)?;
            for (&key, value) in &record.properties {
                self.property_index.add(label, key, value, gid)?;
            }
        }
        Ok(())
    }

    fn index_missing(&self, label: LabelId, property: PropertyId) -> StorageError {
        StorageError::IndexMissing { label: label.to_string(), property: property.to_string() }
    }

    // ------------------------------------------------------------------
    // Locking
    // ------------------------------------------------------------------

    fn vertex_chain(&self, gid: Gid) -> StorageResult<Arc<Mutex<VersionChain<VertexRecord>>>> {
        self.vertices
            .read()
            .map_err(|_| map_poisoned())?
            .get(&gid)
            .cloned()
            .ok_or(StorageError::NotFound(self.address(gid)))
    }

    fn edge_chain(&self, gid: Gid) -> StorageResult<Arc<Mutex<VersionChain<EdgeRecord>>>> {
        self.edges
            .read()
            .map_err(|_| map_poisoned())?
            .get(&gid)
            .cloned()
            .ok_or(StorageError::NotFound(self.address(gid)))
    }

    /// Acquires the record lock for `tx`, waiting out concurrent active
    /// holders up to the configured bound.
    ///
    /// After the lock is held, a newer version committed outside the
    /// transaction's snapshot means the record moved under us: that is a
    /// serialization conflict, not a wait.
    fn lock_for_write<'a, T: Clone>(
        &self,
        chain: &'a Mutex<VersionChain<T>>,
        tx: &Transaction,
        address: GlobalAddress,
    ) -> StorageResult<MutexGuard<'a, VersionChain<T>>> {
        let deadline = Instant::now() + self.config.lock_timeout;
        loop {
            let mut guard = chain.lock().map_err(|_| chain_poisoned())?;
            let holder = guard.lock_holder();
            let acquired = match holder {
                None => true,
                Some(h) if h == tx.id() => true,
                Some(h) => match self.engine.status(h)? {
                    TxStatus::Active => false,
                    TxStatus::Committed | TxStatus::Aborted => true,
                },
            };
            if acquired {
                guard.acquire_lock(tx.id());
                self.check_serialization(&guard, tx, address)?;
                return Ok(guard);
            }
            drop(guard);
            if Instant::now() >= deadline {
                return Err(StorageError::LockTimeout(format!(
                    "record {address} is held by a concurrent transaction"
                )));
            }
            std::thread::sleep(LOCK_RETRY_INTERVAL);
        }
    }

    fn check_serialization<T: Clone>(
        &self,
        chain: &VersionChain<T>,
        tx: &Transaction,
        address: GlobalAddress,
    ) -> StorageResult<()> {
        let conflicting = |stamp: VersionStamp| -> StorageResult<bool> {
            Ok(stamp.tx != tx.id()
                && self.engine.status(stamp.tx)? == TxStatus::Committed
                && !tx.sees_committed(stamp.tx))
        };
        if let Some((created, deleted)) = chain.newest_stamps() {
            let deleted_conflicts = match deleted {
                Some(stamp) => conflicting(stamp)?,
                None => false,
            };
            if conflicting(created)? || deleted_conflicts {
                return Err(StorageError::Serialization(format!(
                    "record {address} was modified by a concurrent transaction"
                )));
            }
        }
        Ok(())
    }

    /// Releases every record lock held by `tx`. Called on commit and
    /// abort; cleanup is best-effort, so a poisoned lock degrades to a
    /// no-op rather than failing the path that is already tearing down.
    pub fn release_locks(&self, tx: TxId) {
        if let Ok(map) = self.vertices.read() {
            for chain in map.values() {
                if let Ok(mut chain) = chain.lock() {
                    chain.release_lock(tx);
                }
            }
        }
        if let Ok(map) = self.edges.read() {
            for chain in map.values() {
                if let Ok(mut chain) = chain.lock() {
                    chain.release_lock(tx);
                }
            }
        }
    }
}
