//! Transactional accessors over the graph.
//!
//! [`DbAccessor`] is what a query holds: one per worker per transaction,
//! bundling the store, the transaction handle, the per-transaction
//! [`DataManager`] and the [`RemoteGraph`] channel. [`VertexAccessor`] and
//! [`EdgeAccessor`] are cheap handles that re-resolve their record on
//! demand under an explicit [`View`]; they compare and hash by address, so
//! they can key uniqueness sets and BFS bookkeeping.
//!
//! Mutations always apply to the NEW state at the current command. Local
//! targets go through the store's MVCC write path; remote targets patch the
//! transaction's cached snapshot and buffer a deferred update on the owner.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use quiver_core::{
    CommandId, EdgeTypeId, Gid, GlobalAddress, LabelId, NameRegistry, PropertyId, PropertyValue,
    TxId, WorkerId,
};

use crate::data_manager::DataManager;
use crate::error::{StorageError, StorageResult};
use crate::index::Bound;
use crate::mvcc::View;
use crate::records::{EdgeEntry, EdgeRecord, VertexRecord};
use crate::remote::{DeferredUpdate, RemoteGraph};
use crate::store::GraphStore;
use crate::txn::{Transaction, TransactionEngine};

struct AccessorInner {
    store: Arc<GraphStore>,
    engine: Arc<TransactionEngine>,
    tx: Transaction,
    data: DataManager,
    remote: Arc<dyn RemoteGraph>,
    registry: Arc<NameRegistry>,
}

/// The per-worker, per-transaction view into the graph.
#[derive(Clone)]
pub struct DbAccessor {
    inner: Arc<AccessorInner>,
}

impl std::fmt::Debug for DbAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbAccessor")
            .field("worker", &self.worker())
            .field("tx", &self.tx().id())
            .finish_non_exhaustive()
    }
}

impl DbAccessor {
    /// Creates an accessor for a transaction on a worker.
    #[must_use]
    pub fn new(
        store: Arc<GraphStore>,
        engine: Arc<TransactionEngine>,
        tx: Transaction,
        remote: Arc<dyn RemoteGraph>,
        registry: Arc<NameRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(AccessorInner {
                store,
                engine,
                tx,
                data: DataManager::new(),
                remote,
                registry,
            }),
        }
    }

    /// The worker this accessor executes on.
    #[inline]
    #[must_use]
    pub fn worker(&self) -> WorkerId {
        self.inner.store.worker()
    }

    /// The transaction handle.
    #[inline]
    #[must_use]
    pub fn tx(&self) -> &Transaction {
        &self.inner.tx
    }

    /// The transaction id.
    #[inline]
    #[must_use]
    pub fn tx_id(&self) -> TxId {
        self.inner.tx.id()
    }

    /// The name registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &NameRegistry {
        &self.inner.registry
    }

    /// The local store.
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<GraphStore> {
        &self.inner.store
    }

    /// The transaction engine.
    #[inline]
    #[must_use]
    pub fn engine(&self) -> &Arc<TransactionEngine> {
        &self.inner.engine
    }

    /// The per-transaction remote record cache.
    #[inline]
    #[must_use]
    pub fn data_manager(&self) -> &DataManager {
        &self.inner.data
    }

    /// The cross-worker storage channel.
    #[inline]
    #[must_use]
    pub fn remote(&self) -> &Arc<dyn RemoteGraph> {
        &self.inner.remote
    }

    /// Returns `true` when the transaction was asked to terminate.
    #[inline]
    #[must_use]
    pub fn should_abort(&self) -> bool {
        self.inner.tx.should_abort()
    }

    /// Installs the next command id.
    pub fn advance_command(&self) -> CommandId {
        self.inner.tx.advance_command()
    }

    // ------------------------------------------------------------------
    // Scans
    // ------------------------------------------------------------------

    /// All local vertices visible under the view, as accessors.
    ///
    /// The sequence is restartable: every call re-reads the store.
    pub fn vertices(&self, view: View) -> StorageResult<Vec<VertexAccessor>> {
        Ok(self
            .inner
            .store
            .visible_vertices(&self.inner.tx, view)?
            .into_iter()
            .map(|gid| self.vertex_accessor(self.inner.store.address(gid), view))
            .collect())
    }

    /// Local vertices carrying `label` under the view.
    pub fn vertices_by_label(
        &self,
        label: LabelId,
        view: View,
    ) -> StorageResult<Vec<VertexAccessor>> {
        Ok(self
            .inner
            .store
            .vertices_by_label(&self.inner.tx, view, label)?
            .into_iter()
            .map(|gid| self.vertex_accessor(self.inner.store.address(gid), view))
            .collect())
    }

    /// Index lookup by exact property value.
    pub fn vertices_by_label_value(
        &self,
        label: LabelId,
        property: PropertyId,
        value: &PropertyValue,
        view: View,
    ) -> StorageResult<Vec<VertexAccessor>> {
        Ok(self
            .inner
            .store
            .vertices_by_label_value(&self.inner.tx, view, label, property, value)?
            .into_iter()
            .map(|gid| self.vertex_accessor(self.inner.store.address(gid), view))
            .collect())
    }

    /// Index lookup by property range; at least one bound must be present.
    pub fn vertices_by_label_range(
        &self,
        label: LabelId,
        property: PropertyId,
        lower: Option<&Bound>,
        upper: Option<&Bound>,
        view: View,
    ) -> StorageResult<Vec<VertexAccessor>> {
        Ok(self
            .inner
            .store
            .vertices_by_label_range(&self.inner.tx, view, label, property, lower, upper)?
            .into_iter()
            .map(|gid| self.vertex_accessor(self.inner.store.address(gid), view))
            .collect())
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Inserts a vertex on this worker.
    pub fn insert_vertex(&self) -> StorageResult<VertexAccessor> {
        let address = self.inner.store.insert_vertex(&self.inner.tx)?;
        Ok(self.vertex_accessor(address, View::New))
    }

    /// Creates a vertex on another worker.
    ///
    /// The owner allocates the gid and buffers the creation; until the
    /// updates-apply barrier the record exists only in this transaction's
    /// `DataManager`.
    pub fn insert_vertex_into_remote(
        &self,
        worker: WorkerId,
        labels: Vec<LabelId>,
        properties: BTreeMap<PropertyId, PropertyValue>,
    ) -> StorageResult<VertexAccessor> {
        let address = self.inner.remote.allocate_vertex(
            self.tx_id(),
            worker,
            labels.clone(),
            properties.clone(),
        )?;
        let record = VertexRecord { labels, properties, ..VertexRecord::new() };
        self.inner.data.insert_vertex(address, record);
        Ok(self.vertex_accessor(address, View::New))
    }

    /// Inserts an edge between two vertices, updating incidence lists on
    /// both endpoints (directly when local, deferred when remote).
    pub fn insert_edge(
        &self,
        from: &VertexAccessor,
        to: &VertexAccessor,
        edge_type: EdgeTypeId,
    ) -> StorageResult<EdgeAccessor> {
        let tx = &self.inner.tx;
        let from_addr = from.address();
        let to_addr = to.address();
        let record = EdgeRecord::new(from_addr, to_addr, edge_type);

        let edge_addr = if self.is_local(from_addr) {
            self.inner.store.insert_edge_record(tx, None, record)?
        } else {
            let addr =
                self.inner.remote.allocate_edge(self.tx_id(), from_addr.worker(), record.clone())?;
            self.inner.data.insert_edge(addr, record);
            addr
        };

        let out_entry = EdgeEntry { peer: to_addr, edge: edge_addr, edge_type };
        self.push_incidence(from_addr, false, out_entry)?;
        let in_entry = EdgeEntry { peer: from_addr, edge: edge_addr, edge_type };
        self.push_incidence(to_addr, true, in_entry)?;

        Ok(self.edge_accessor(edge_addr, View::New))
    }

    fn push_incidence(
        &self,
        vertex: GlobalAddress,
        incoming: bool,
        entry: EdgeEntry,
    ) -> StorageResult<()> {
        let push = move |record: &mut VertexRecord| {
            if incoming {
                record.in_edges.push(entry);
            } else {
                record.out_edges.push(entry);
            }
        };
        if self.is_local(vertex) {
            self.inner.store.update_vertex(&self.inner.tx, vertex.gid(), push)?;
        } else {
            let update = if incoming {
                DeferredUpdate::AddInEdge { vertex: vertex.gid(), entry }
            } else {
                DeferredUpdate::AddOutEdge { vertex: vertex.gid(), entry }
            };
            self.inner.remote.defer(self.tx_id(), vertex.worker(), update)?;
            // The deferred update is authoritative; patching the cached
            // snapshot only matters when one exists.
            let _ = self.inner.data.update_vertex(vertex, push);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Deletes an edge and removes it from both incidence lists.
    pub fn remove_edge(&self, edge: &EdgeAccessor) -> StorageResult<()> {
        let record = edge.with_view(View::New).record()?;
        let edge_addr = edge.address();

        if self.is_local(edge_addr) {
            self.inner.store.delete_edge(&self.inner.tx, edge_addr.gid())?;
        } else {
            self.inner.remote.defer(
                self.tx_id(),
                edge_addr.worker(),
                DeferredUpdate::RemoveEdge { edge: edge_addr.gid() },
            )?;
        }

        self.drop_incidence(record.from, false, edge_addr)?;
        self.drop_incidence(record.to, true, edge_addr)?;
        Ok(())
    }

    fn drop_incidence(
        &self,
        vertex: GlobalAddress,
        incoming: bool,
        edge: GlobalAddress,
    ) -> StorageResult<()> {
        let drop_entry = move |record: &mut VertexRecord| {
            let list = if incoming { &mut record.in_edges } else { &mut record.out_edges };
            list.retain(|entry| entry.edge != edge);
        };
        if self.is_local(vertex) {
            // The endpoint may already be gone when a detach-delete removed
            // it earlier in this command; that is fine.
            match self.inner.store.update_vertex(&self.inner.tx, vertex.gid(), drop_entry) {
                Ok(()) | Err(StorageError::RecordDeleted(_)) => Ok(()),
                Err(other) => Err(other),
            }
        } else {
            let update = if incoming {
                DeferredUpdate::RemoveInEdge { vertex: vertex.gid(), edge }
            } else {
                DeferredUpdate::RemoveOutEdge { vertex: vertex.gid(), edge }
            };
            self.inner.remote.defer(self.tx_id(), vertex.worker(), update)?;
            let _ = self.inner.data.update_vertex(vertex, drop_entry);
            Ok(())
        }
    }

    /// Deletes a vertex; fails while incident edges remain.
    pub fn remove_vertex(&self, vertex: &VertexAccessor) -> StorageResult<()> {
        self.remove_vertex_impl(vertex, false)
    }

    /// Deletes a vertex together with all its incident edges.
    pub fn detach_remove_vertex(&self, vertex: &VertexAccessor) -> StorageResult<()> {
        self.remove_vertex_impl(vertex, true)
    }

    fn remove_vertex_impl(&self, vertex: &VertexAccessor, detach: bool) -> StorageResult<()> {
        let address = vertex.address();
        let record = vertex.with_view(View::New).record()?;

        if detach {
            let mut seen = BTreeSet::new();
            for entry in record.in_edges.iter().chain(record.out_edges.iter()) {
                if seen.insert(entry.edge) {
                    self.remove_edge(&self.edge_accessor(entry.edge, View::New))?;
                }
            }
        } else {
            // Re-read: edge deletions earlier in this command may have
            // already emptied the lists.
            let current = vertex.with_view(View::New).record()?;
            if !current.in_edges.is_empty() || !current.out_edges.is_empty() {
                return Err(StorageError::VertexHasEdges(address));
            }
        }

        if self.is_local(address) {
            self.inner.store.delete_vertex(&self.inner.tx, address.gid())
        } else {
            self.inner.remote.defer(
                self.tx_id(),
                address.worker(),
                DeferredUpdate::RemoveVertex { vertex: address.gid() },
            )
        }
    }

    // ------------------------------------------------------------------
    // Indexes
    // ------------------------------------------------------------------

    /// Builds a `(label, property)` index; `false` when it already existed.
    pub fn build_index(&self, label: LabelId, property: PropertyId) -> StorageResult<bool> {
        self.inner.store.build_index(&self.inner.tx, label, property)
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Whether an address is owned by this worker.
    #[inline]
    #[must_use]
    pub fn is_local(&self, address: GlobalAddress) -> bool {
        address.is_local(self.worker())
    }

    /// Wraps an address into a vertex accessor.
    #[must_use]
    pub fn vertex_accessor(&self, address: GlobalAddress, view: View) -> VertexAccessor {
        VertexAccessor { address, view, db: self.clone() }
    }

    /// Wraps an address into an edge accessor.
    #[must_use]
    pub fn edge_accessor(&self, address: GlobalAddress, view: View) -> EdgeAccessor {
        EdgeAccessor { address, view, db: self.clone() }
    }

    /// Makes sure a remote vertex record is cached, fetching it from the
    /// owner if necessary.
    pub fn ensure_remote_vertex(&self, address: GlobalAddress) -> StorageResult<()> {
        if self.is_local(address) || self.inner.data.contains_vertex(address) {
            return Ok(());
        }
        let record = self.inner.remote.fetch_vertex(self.tx_id(), address)?;
        self.inner.data.insert_vertex(address, record);
        Ok(())
    }

    fn resolve_vertex(&self, address: GlobalAddress, view: View) -> StorageResult<VertexRecord> {
        if self.is_local(address) {
            // An accessor switched to OLD observes the NEW version when
            // the record has no pre-command state yet (a record freshly
            // created in this command simply has no older self).
            match self.inner.store.vertex_record(&self.inner.tx, address.gid(), view) {
                Err(StorageError::NotFound(_)) if view == View::Old => {
                    self.inner.store.vertex_record(&self.inner.tx, address.gid(), View::New)
                }
                other => other,
            }
        } else {
            // Remote snapshots are fetched under the owner's NEW view; the
            // local OLD/NEW distinction does not apply to them.
            self.inner.data.vertex(address)
        }
    }

    fn resolve_edge(&self, address: GlobalAddress, view: View) -> StorageResult<EdgeRecord> {
        if self.is_local(address) {
            match self.inner.store.edge_record(&self.inner.tx, address.gid(), view) {
                Err(StorageError::NotFound(_)) if view == View::Old => {
                    self.inner.store.edge_record(&self.inner.tx, address.gid(), View::New)
                }
                other => other,
            }
        } else {
            self.inner.data.edge(address)
        }
    }

    fn mutate_vertex(
        &self,
        address: GlobalAddress,
        update: DeferredUpdate,
        patch: impl FnOnce(&mut VertexRecord),
    ) -> StorageResult<()> {
        if self.is_local(address) {
            self.inner.store.update_vertex(&self.inner.tx, address.gid(), patch)
        } else {
            self.inner.remote.defer(self.tx_id(), address.worker(), update)?;
            self.inner.data.update_vertex(address, patch)
        }
    }

    fn mutate_edge(
        &self,
        address: GlobalAddress,
        update: DeferredUpdate,
        patch: impl FnOnce(&mut EdgeRecord),
    ) -> StorageResult<()> {
        if self.is_local(address) {
            self.inner.store.update_edge(&self.inner.tx, address.gid(), patch)
        } else {
            self.inner.remote.defer(self.tx_id(), address.worker(), update)?;
            self.inner.data.update_edge(address, patch)
        }
    }
}

/// A handle on one vertex under an explicit view.
#[derive(Debug, Clone)]
pub struct VertexAccessor {
    address: GlobalAddress,
    view: View,
    db: DbAccessor,
}

impl PartialEq for VertexAccessor {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for VertexAccessor {}

impl Hash for VertexAccessor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl VertexAccessor {
    /// The vertex's global address.
    #[inline]
    #[must_use]
    pub fn address(&self) -> GlobalAddress {
        self.address
    }

    /// The gid half of the address.
    #[inline]
    #[must_use]
    pub fn gid(&self) -> Gid {
        self.address.gid()
    }

    /// Whether this vertex lives on the executing worker.
    #[inline]
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.db.is_local(self.address)
    }

    /// The view this accessor currently observes.
    #[inline]
    #[must_use]
    pub fn view(&self) -> View {
        self.view
    }

    /// Flips the accessor to the OLD view.
    pub fn switch_old(&mut self) {
        self.view = View::Old;
    }

    /// Flips the accessor to the NEW view.
    pub fn switch_new(&mut self) {
        self.view = View::New;
    }

    /// A copy of this accessor observing `view`.
    #[must_use]
    pub fn with_view(&self, view: View) -> Self {
        Self { address: self.address, view, db: self.db.clone() }
    }

    /// The owning accessor.
    #[inline]
    #[must_use]
    pub fn db(&self) -> &DbAccessor {
        &self.db
    }

    /// Resolves the record under the current view.
    pub fn record(&self) -> StorageResult<VertexRecord> {
        self.db.resolve_vertex(self.address, self.view)
    }

    /// The vertex's labels.
    pub fn labels(&self) -> StorageResult<Vec<LabelId>> {
        Ok(self.record()?.labels)
    }

    /// Whether the vertex carries `label`.
    pub fn has_label(&self, label: LabelId) -> StorageResult<bool> {
        Ok(self.record()?.has_label(label))
    }

    /// A property value, `Null` when absent.
    pub fn property(&self, key: PropertyId) -> StorageResult<PropertyValue> {
        Ok(self.record()?.property(key))
    }

    /// The full property map.
    pub fn properties(&self) -> StorageResult<BTreeMap<PropertyId, PropertyValue>> {
        Ok(self.record()?.properties)
    }

    /// Incidence entries in one direction, optionally type-filtered,
    /// under the current view.
    pub fn entries(
        &self,
        incoming: bool,
        edge_types: Option<&[EdgeTypeId]>,
    ) -> StorageResult<Vec<EdgeEntry>> {
        Ok(self.record()?.entries(incoming, edge_types))
    }

    /// Incidence entries restricted to a known peer vertex (the
    /// existing-node expansion path).
    pub fn entries_with_peer(
        &self,
        incoming: bool,
        peer: GlobalAddress,
        edge_types: Option<&[EdgeTypeId]>,
    ) -> StorageResult<Vec<EdgeEntry>> {
        Ok(self
            .entries(incoming, edge_types)?
            .into_iter()
            .filter(|entry| entry.peer == peer)
            .collect())
    }

    /// Adds a label.
    pub fn add_label(&self, label: LabelId) -> StorageResult<()> {
        self.db.mutate_vertex(
            self.address,
            DeferredUpdate::AddLabel { vertex: self.address.gid(), label },
            |record| record.labels.push(label),
        )
    }

    /// Removes every occurrence of a label.
    pub fn remove_label(&self, label: LabelId) -> StorageResult<()> {
        self.db.mutate_vertex(
            self.address,
            DeferredUpdate::RemoveLabel { vertex: self.address.gid(), label },
            |record| record.labels.retain(|&l| l != label),
        )
    }

    /// Sets a property; a `Null` value erases the key.
    pub fn set_property(&self, key: PropertyId, value: PropertyValue) -> StorageResult<()> {
        self.db.mutate_vertex(
            self.address,
            DeferredUpdate::SetVertexProperty {
                vertex: self.address.gid(),
                key,
                value: value.clone(),
            },
            move |record| {
                if value.is_null() {
                    record.properties.remove(&key);
                } else {
                    record.properties.insert(key, value);
                }
            },
        )
    }

    /// Removes a property.
    pub fn remove_property(&self, key: PropertyId) -> StorageResult<()> {
        self.set_property(key, PropertyValue::Null)
    }

    /// Clears the whole property map.
    pub fn clear_properties(&self) -> StorageResult<()> {
        self.db.mutate_vertex(
            self.address,
            DeferredUpdate::ClearVertexProperties { vertex: self.address.gid() },
            |record| record.properties.clear(),
        )
    }
}

/// A handle on one edge under an explicit view.
#[derive(Debug, Clone)]
pub struct EdgeAccessor {
    address: GlobalAddress,
    view: View,
    db: DbAccessor,
}

impl PartialEq for EdgeAccessor {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for EdgeAccessor {}

impl Hash for EdgeAccessor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl EdgeAccessor {
    /// The edge's global address.
    #[inline]
    #[must_use]
    pub fn address(&self) -> GlobalAddress {
        self.address
    }

    /// Whether this edge lives on the executing worker.
    #[inline]
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.db.is_local(self.address)
    }

    /// The view this accessor currently observes.
    #[inline]
    #[must_use]
    pub fn view(&self) -> View {
        self.view
    }

    /// Flips the accessor to the OLD view.
    pub fn switch_old(&mut self) {
        self.view = View::Old;
    }

    /// Flips the accessor to the NEW view.
    pub fn switch_new(&mut self) {
        self.view = View::New;
    }

    /// A copy of this accessor observing `view`.
    #[must_use]
    pub fn with_view(&self, view: View) -> Self {
        Self { address: self.address, view, db: self.db.clone() }
    }

    /// The owning accessor.
    #[inline]
    #[must_use]
    pub fn db(&self) -> &DbAccessor {
        &self.db
    }

    /// Resolves the record under the current view.
    pub fn record(&self) -> StorageResult<EdgeRecord> {
        self.db.resolve_edge(self.address, self.view)
    }

    /// The source vertex, observing the same view.
    pub fn from(&self) -> StorageResult<VertexAccessor> {
        Ok(self.db.vertex_accessor(self.record()?.from, self.view))
    }

    /// The destination vertex, observing the same view.
    pub fn to(&self) -> StorageResult<VertexAccessor> {
        Ok(self.db.vertex_accessor(self.record()?.to, self.view))
    }

    /// The edge's type.
    pub fn edge_type(&self) -> StorageResult<EdgeTypeId> {
        Ok(self.record()?.edge_type)
    }

    /// A property value, `Null` when absent.
    pub fn property(&self, key: PropertyId) -> StorageResult<PropertyValue> {
        Ok(self.record()?.property(key))
    }

    /// The full property map.
    pub fn properties(&self) -> StorageResult<BTreeMap<PropertyId, PropertyValue>> {
        Ok(self.record()?.properties)
    }

    /// Sets a property; a `Null` value erases the key.
    pub fn set_property(&self, key: PropertyId, value: PropertyValue) -> StorageResult<()> {
        self.db.mutate_edge(
            self.address,
            DeferredUpdate::SetEdgeProperty { edge: self.address.gid(), key, value: value.clone() },
            move |record| {
                if value.is_null() {
                    record.properties.remove(&key);
                } else {
                    record.properties.insert(key, value);
                }
            },
        )
    }

    /// Removes a property.
    pub fn remove_property(&self, key: PropertyId) -> StorageResult<()> {
        self.set_property(key, PropertyValue::Null)
    }

    /// Clears the whole property map.
    ///
    /// Only meaningful locally; remote edges are patched through the
    /// per-property path, which is what SET e = {...} compiles to.
    pub fn clear_properties(&self) -> StorageResult<()> {
        let record = self.record()?;
        for key in record.properties.keys().copied().collect::<Vec<_>>() {
            self.set_property(key, PropertyValue::Null)?;
        }
        Ok(())
    }
}
