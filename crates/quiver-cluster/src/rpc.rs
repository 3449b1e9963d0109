//! Message shapes and the wire value sum.
//!
//! These are the logical shapes of the binary RPC surface; framing and
//! transport are out of scope, so "sending" a message in this in-process
//! fabric is passing the struct. Everything derives serde so the shapes
//! stay serializable end to end (plan dispatch genuinely serializes its
//! sub-plan payloads).

use std::collections::BTreeMap;

use quiver_core::{Gid, GlobalAddress, PlanId, PropertyValue, TxId, WorkerId};
use quiver_query::exec::coordinator::PullState;
use quiver_query::{PlanNode, QueryError, QueryResult, Symbol, SymbolTable, TypedValue};
use quiver_storage::{DbAccessor, EdgeRecord, VertexRecord, View};
use serde::{Deserialize, Serialize};

/// A frame cell on the wire. Entities flatten to address + record; the
/// receiver rebinds them to its own transaction, caching remote records
/// in the DataManager before any evaluator can touch them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    /// Null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Double.
    Double(f64),
    /// String.
    String(String),
    /// List.
    List(Vec<WireValue>),
    /// Map.
    Map(BTreeMap<String, WireValue>),
    /// A vertex snapshot.
    Vertex {
        /// The vertex's address.
        address: GlobalAddress,
        /// Its record under the sender's NEW view.
        record: VertexRecord,
    },
    /// An edge snapshot.
    Edge {
        /// The edge's address.
        address: GlobalAddress,
        /// Its record under the sender's NEW view.
        record: EdgeRecord,
    },
    /// A path snapshot.
    Path {
        /// Vertex snapshots, in path order.
        vertices: Vec<(GlobalAddress, VertexRecord)>,
        /// Edge snapshots, in path order.
        edges: Vec<(GlobalAddress, EdgeRecord)>,
    },
}

impl WireValue {
    /// Flattens a runtime value for the wire, resolving entity records on
    /// the sender.
    pub fn from_typed(value: &TypedValue) -> QueryResult<Self> {
        Ok(match value {
            TypedValue::Null => Self::Null,
            TypedValue::Bool(b) => Self::Bool(*b),
            TypedValue::Int(i) => Self::Int(*i),
            TypedValue::Double(d) => Self::Double(*d),
            TypedValue::String(s) => Self::String(s.clone()),
            TypedValue::List(l) => {
                Self::List(l.iter().map(Self::from_typed).collect::<QueryResult<_>>()?)
            }
            TypedValue::Map(m) => Self::Map(
                m.iter()
                    .map(|(k, v)| Ok((k.clone(), Self::from_typed(v)?)))
                    .collect::<QueryResult<_>>()?,
            ),
            TypedValue::Vertex(v) => Self::Vertex {
                address: v.address(),
                record: v.with_view(View::New).record()?,
            },
            TypedValue::Edge(e) => {
                Self::Edge { address: e.address(), record: e.with_view(View::New).record()? }
            }
            TypedValue::Path(p) => Self::Path {
                vertices: p
                    .vertices()
                    .iter()
                    .map(|v| Ok((v.address(), v.with_view(View::New).record()?)))
                    .collect::<QueryResult<_>>()?,
                edges: p
                    .edges()
                    .iter()
                    .map(|e| Ok((e.address(), e.with_view(View::New).record()?)))
                    .collect::<QueryResult<_>>()?,
            },
        })
    }

    /// Rebinds a wire value to the receiver's transaction.
    #[must_use]
    pub fn into_typed(self, dba: &DbAccessor) -> TypedValue {
        let bind_vertex = |address: GlobalAddress, record: VertexRecord| {
            if !dba.is_local(address) {
                dba.data_manager().insert_vertex(address, record);
            }
            dba.vertex_accessor(address, View::New)
        };
        let bind_edge = |address: GlobalAddress, record: EdgeRecord| {
            if !dba.is_local(address) {
                dba.data_manager().insert_edge(address, record);
            }
            dba.edge_accessor(address, View::New)
        };
        match self {
            Self::Null => TypedValue::Null,
            Self::Bool(b) => TypedValue::Bool(b),
            Self::Int(i) => TypedValue::Int(i),
            Self::Double(d) => TypedValue::Double(d),
            Self::String(s) => TypedValue::String(s),
            Self::List(l) => TypedValue::List(l.into_iter().map(|v| v.into_typed(dba)).collect()),
            Self::Map(m) => {
                TypedValue::Map(m.into_iter().map(|(k, v)| (k, v.into_typed(dba))).collect())
            }
            Self::Vertex { address, record } => TypedValue::Vertex(bind_vertex(address, record)),
            Self::Edge { address, record } => TypedValue::Edge(bind_edge(address, record)),
            Self::Path { vertices, edges } => {
                let mut vertex_iter = vertices.into_iter();
                let Some((first_addr, first_record)) = vertex_iter.next() else {
                    return TypedValue::Null;
                };
                let mut path = quiver_query::Path::new(bind_vertex(first_addr, first_record));
                for ((edge_addr, edge_record), (vertex_addr, vertex_record)) in
                    edges.into_iter().zip(vertex_iter)
                {
                    path.expand(
                        bind_edge(edge_addr, edge_record),
                        bind_vertex(vertex_addr, vertex_record),
                    );
                }
                TypedValue::Path(path)
            }
        }
    }
}

/// Drive a dispatched sub-plan: master → worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePullReq {
    /// The driving transaction.
    pub tx: TxId,
    /// The requesting worker.
    pub origin: WorkerId,
    /// The dispatched plan to pull from.
    pub plan_id: PlanId,
    /// Parameter bindings by token position.
    pub params: Vec<(usize, PropertyValue)>,
    /// The symbols shipped per row.
    pub symbols: Vec<Symbol>,
    /// Exhaust and buffer instead of streaming a batch.
    pub accumulate: bool,
    /// Rows per response batch (ignored when accumulating).
    pub batch_size: usize,
}

/// The response to a [`RemotePullReq`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePullRes {
    /// The shipped rows.
    pub frames: Vec<Vec<WireValue>>,
    /// The outcome class.
    pub state: PullState,
}

/// Fetch a vertex by gid: any worker → owner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RemoteVertexReq {
    /// The reading transaction.
    pub tx: TxId,
    /// The owner-local id.
    pub gid: Gid,
}

/// The response to a [`RemoteVertexReq`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteVertexRes {
    /// The record under the owner's NEW view.
    pub record: VertexRecord,
    /// The owning worker.
    pub worker: WorkerId,
}

/// Fetch an edge by gid: any worker → owner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RemoteEdgeReq {
    /// The reading transaction.
    pub tx: TxId,
    /// The owner-local id.
    pub gid: Gid,
}

/// The response to a [`RemoteEdgeReq`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEdgeRes {
    /// The record under the owner's NEW view.
    pub record: EdgeRecord,
    /// The owning worker.
    pub worker: WorkerId,
}

/// Apply a transaction's deferred writes: master → worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpdateApplyReq {
    /// The worker driving the barrier.
    pub origin: WorkerId,
    /// The transaction whose buffered writes apply.
    pub tx: TxId,
}

/// The outcome of applying deferred updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateResult {
    /// Everything applied.
    Done,
    /// A write-write conflict.
    Serialization,
    /// A record lock wait bound was exceeded.
    LockTimeout,
    /// A buffered write targeted a deleted record.
    UpdateDeleted,
}

impl UpdateResult {
    /// Maps the failure outcomes to query errors (barrier phase five).
    #[must_use]
    pub fn to_error(self) -> Option<QueryError> {
        use quiver_storage::StorageError;
        match self {
            Self::Done => None,
            Self::Serialization => Some(QueryError::Storage(StorageError::Serialization(
                "failed to apply deferred updates".into(),
            ))),
            Self::LockTimeout => Some(QueryError::Storage(StorageError::LockTimeout(
                "failed to apply deferred updates".into(),
            ))),
            Self::UpdateDeleted => Some(QueryError::Runtime(
                "failed to apply deferred updates on a deleted record".into(),
            )),
        }
    }
}

/// Register a sub-plan: master → workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDispatchMsg {
    /// The plan's cluster-wide id.
    pub plan_id: PlanId,
    /// The worker-side operator tree.
    pub subplan: PlanNode,
    /// The frame layout the sub-plan runs under.
    pub symbol_table: SymbolTable,
}

/// Unregister a sub-plan: master → workers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlanRemoveMsg {
    /// The plan to remove.
    pub plan_id: PlanId,
}

/// Trigger a durable snapshot: master → workers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SnapshotReq {
    /// The transaction the snapshot observes.
    pub tx: TxId,
}

/// The response to a [`SnapshotReq`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SnapshotRes {
    /// Whether the snapshot was written.
    pub ok: bool,
}

/// Per-transaction two-phase-commit coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnMessage {
    /// Worker asks the master to commit.
    CommitRequest {
        /// The transaction.
        tx: TxId,
    },
    /// Worker asks the master to abort.
    AbortRequest {
        /// The transaction.
        tx: TxId,
    },
    /// Master directs every worker to commit. Idempotent.
    CommitDirective {
        /// The transaction.
        tx: TxId,
    },
    /// Master directs every worker to abort. Idempotent.
    AbortDirective {
        /// The transaction.
        tx: TxId,
    },
}
