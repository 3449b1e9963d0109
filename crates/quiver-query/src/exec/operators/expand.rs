//! Single-edge expansion.
//!
//! Local edges stream straight from the incidence lists. Remote edges are
//! never blocked on inline: the entry is handed to the coordinator as a
//! concurrent fetch together with a snapshot of the frame, and completed
//! fetches are joined back at the top of `pull` (restore the recorded
//! frame, place the edge, and after the consumer moves on, restore the
//! frame that was interrupted). When locals are exhausted and no fetch is
//! ready, the cursor sleeps one poll interval and re-checks.

use quiver_core::{EdgeTypeId, GlobalAddress};
use quiver_storage::{DbAccessor, EdgeEntry, View};

use crate::error::QueryResult;
use crate::exec::context::ExecutionContext;
use crate::exec::coordinator::PendingFetch;
use crate::exec::cursor::{check_abort, expect_vertex, BoxedCursor, Cursor};
use crate::expr::GraphView;
use crate::frame::Frame;
use crate::plan::ExpandDirection;
use crate::symbols::Symbol;
use crate::value::TypedValue;

/// The plan data an expand cursor needs.
#[derive(Debug, Clone)]
pub struct ExpandSpec {
    /// The origin vertex's symbol.
    pub input_symbol: Symbol,
    /// The reached vertex's symbol.
    pub node_symbol: Symbol,
    /// The traversed edge's symbol.
    pub edge_symbol: Symbol,
    /// Direction subset.
    pub direction: ExpandDirection,
    /// Edge-type filter; empty means any.
    pub edge_types: Vec<EdgeTypeId>,
    /// Whether `node_symbol` is already bound and must match.
    pub existing_node: bool,
    /// View the expansion observes.
    pub view: GraphView,
}

impl ExpandSpec {
    fn storage_view(&self) -> View {
        self.view.effective(View::Old)
    }

    fn type_filter(&self) -> Option<&[EdgeTypeId]> {
        if self.edge_types.is_empty() {
            None
        } else {
            Some(&self.edge_types)
        }
    }
}

/// One in-flight remote expansion: the pending fetch and the frame it
/// must be emitted under. The entry itself rides on the fetch handle.
struct FutureExpand {
    fetch: Box<dyn PendingFetch>,
    frame_elems: Vec<TypedValue>,
}

/// The expand cursor.
pub struct ExpandCursor {
    spec: ExpandSpec,
    input: BoxedCursor,
    dba: DbAccessor,
    in_entries: Option<std::vec::IntoIter<EdgeEntry>>,
    out_entries: Option<std::vec::IntoIter<EdgeEntry>>,
    current_vertex: Option<GlobalAddress>,
    future_expands: Vec<FutureExpand>,
    /// The interrupted frame to put back after a future edge was yielded.
    last_frame: Option<Vec<TypedValue>>,
}

impl ExpandCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(spec: ExpandSpec, input: BoxedCursor, dba: DbAccessor) -> Self {
        Self {
            spec,
            input,
            dba,
            in_entries: None,
            out_entries: None,
            current_vertex: None,
            future_expands: Vec::new(),
            last_frame: None,
        }
    }

    /// Whether every record behind the entry is resolvable right now.
    fn entry_is_ready(&self, entry: &EdgeEntry) -> bool {
        let edge_ready =
            self.dba.is_local(entry.edge) || self.dba.data_manager().contains_edge(entry.edge);
        let peer_ready = self.spec.existing_node
            || self.dba.is_local(entry.peer)
            || self.dba.data_manager().contains_vertex(entry.peer);
        edge_ready && peer_ready
    }

    /// Places the entry's edge (and node) on the frame.
    fn emit(&self, frame: &mut Frame, entry: &EdgeEntry) {
        let view = self.spec.storage_view();
        frame.set(&self.spec.edge_symbol, TypedValue::Edge(self.dba.edge_accessor(entry.edge, view)));
        if !self.spec.existing_node {
            frame
                .set(&self.spec.node_symbol, TypedValue::Vertex(self.dba.vertex_accessor(entry.peer, view)));
        }
    }

    /// Either emits the entry or schedules its remote fetch.
    ///
    /// Returns `true` when a row was emitted.
    fn emit_or_defer(
        &mut self,
        frame: &mut Frame,
        ctx: &ExecutionContext,
        entry: EdgeEntry,
    ) -> bool {
        if self.entry_is_ready(&entry) {
            self.emit(frame, &entry);
            true
        } else {
            let fetch = ctx.coordinator.fetch_entry(&self.dba, entry);
            self.future_expands.push(FutureExpand { fetch, frame_elems: frame.snapshot() });
            false
        }
    }

    /// Pulls the next usable input row and initializes the entry
    /// iterators from its vertex. Returns `false` on input exhaustion.
    fn init_edges(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        loop {
            if !self.input.pull(frame, ctx)? {
                return Ok(false);
            }
            let value = frame.get(&self.spec.input_symbol).clone();
            // A failed optional match leaves a Null input vertex.
            if value.is_null() {
                continue;
            }
            let vertex = expect_vertex(&value, &self.spec.input_symbol)?.clone();
            let vertex = vertex.with_view(self.spec.storage_view());
            frame.set(&self.spec.input_symbol, TypedValue::Vertex(vertex.clone()));
            self.current_vertex = Some(vertex.address());

            let types = self.spec.type_filter().map(<[EdgeTypeId]>::to_vec);
            let existing_peer = if self.spec.existing_node {
                let existing = frame.get(&self.spec.node_symbol).clone();
                if existing.is_null() {
                    // Null existing node: nothing can match this row.
                    self.in_entries = Some(Vec::new().into_iter());
                    self.out_entries = Some(Vec::new().into_iter());
                    return Ok(true);
                }
                Some(expect_vertex(&existing, &self.spec.node_symbol)?.address())
            } else {
                None
            };

            let fetch_entries = |incoming: bool| -> QueryResult<Vec<EdgeEntry>> {
                match existing_peer {
                    Some(peer) => Ok(vertex.entries_with_peer(incoming, peer, types.as_deref())?),
                    None => Ok(vertex.entries(incoming, types.as_deref())?),
                }
            };

            self.in_entries = match self.spec.direction {
                ExpandDirection::In | ExpandDirection::Both => {
                    Some(fetch_entries(true)?.into_iter())
                }
                ExpandDirection::Out => None,
            };
            self.out_entries = match self.spec.direction {
                ExpandDirection::Out | ExpandDirection::Both => {
                    Some(fetch_entries(false)?.into_iter())
                }
                ExpandDirection::In => None,
            };
            return Ok(true);
        }
    }
}

impl Cursor for ExpandCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        loop {
            check_abort(&self.dba)?;

            // Drain ready remote fetches first so they do not pile up
            // while local edges stream.
            if let Some(index) = self.future_expands.iter().position(|f| f.fetch.is_ready()) {
                let future = self.future_expands.swap_remove(index);
                if self.last_frame.is_none() {
                    self.last_frame = Some(frame.snapshot());
                }
                let entry = future.fetch.entry();
                future.fetch.take()?;
                frame.restore(future.frame_elems);
                self.emit(frame, &entry);
                return Ok(true);
            }

            // If the previous row came from a future, put the interrupted
            // frame back before continuing with local edges.
            if let Some(saved) = self.last_frame.take() {
                frame.restore(saved);
            }

            if let Some(iter) = &mut self.in_entries {
                if let Some(entry) = iter.next() {
                    if self.emit_or_defer(frame, ctx, entry) {
                        return Ok(true);
                    }
                    continue;
                }
            }

            if let Some(iter) = &mut self.out_entries {
                if let Some(entry) = iter.next() {
                    // In BOTH mode a cycle edge was already produced by the
                    // incoming side.
                    if self.spec.direction == ExpandDirection::Both
                        && Some(entry.peer) == self.current_vertex
                    {
                        continue;
                    }
                    if self.emit_or_defer(frame, ctx, entry) {
                        return Ok(true);
                    }
                    continue;
                }
            }

            if !self.init_edges(frame, ctx)? {
                if self.future_expands.is_empty() {
                    return Ok(false);
                }
                // Outstanding fetches but none ready: sleep one poll
                // interval, then re-check from the top.
                if !self.future_expands.iter().any(|f| f.fetch.is_ready()) {
                    std::thread::sleep(ctx.config.remote_pull_sleep);
                }
            }
        }
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()?;
        self.in_entries = None;
        self.out_entries = None;
        self.current_vertex = None;
        self.future_expands.clear();
        self.last_frame = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::cursor::make_cursor;
    use crate::expr::GraphView;
    use crate::plan::PlanNode;
    use crate::symbols::{SymbolTable, SymbolType};
    use quiver_core::{NameRegistry, WorkerId};
    use quiver_storage::{GraphStore, LocalOnlyRemote, TransactionEngine};
    use std::sync::Arc;

    fn dba() -> DbAccessor {
        let engine = Arc::new(TransactionEngine::new());
        let store = Arc::new(GraphStore::new(WorkerId::MASTER, Arc::clone(&engine)));
        let tx = engine.begin(None).unwrap();
        DbAccessor::new(store, engine, tx, Arc::new(LocalOnlyRemote), Arc::new(NameRegistry::new()))
    }

    fn expand_plan(
        table: &mut SymbolTable,
        direction: ExpandDirection,
    ) -> (PlanNode, Symbol, Symbol, Symbol) {
        let n = table.create("n", SymbolType::Vertex, true);
        let r = table.create("r", SymbolType::Edge, true);
        let m = table.create("m", SymbolType::Vertex, true);
        let plan = PlanNode::Expand {
            input: Box::new(PlanNode::ScanAll {
                input: Box::new(PlanNode::Once),
                output_symbol: n.clone(),
                view: GraphView::New,
            }),
            input_symbol: n.clone(),
            node_symbol: m.clone(),
            edge_symbol: r.clone(),
            direction,
            edge_types: Vec::new(),
            existing_node: false,
            view: GraphView::New,
        };
        (plan, n, r, m)
    }

    #[test]
    fn expands_outgoing_edges() {
        let dba = dba();
        let knows = dba.registry().edge_type("KNOWS").unwrap();
        let a = dba.insert_vertex().unwrap();
        let b = dba.insert_vertex().unwrap();
        let c = dba.insert_vertex().unwrap();
        dba.insert_edge(&a, &b, knows).unwrap();
        dba.insert_edge(&a, &c, knows).unwrap();

        let mut table = SymbolTable::new();
        let (plan, _, _, m) = expand_plan(&mut table, ExpandDirection::Out);
        let mut cursor = make_cursor(&plan, &dba).unwrap();

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        let mut reached = Vec::new();
        while cursor.pull(&mut frame, &mut ctx).unwrap() {
            reached.push(frame.get(&m).as_vertex().unwrap().address());
        }
        assert_eq!(reached.len(), 2);
        assert!(reached.contains(&b.address()));
        assert!(reached.contains(&c.address()));
    }

    #[test]
    fn both_direction_counts_each_edge_twice_across_endpoints() {
        // On a path a-b, expanding BOTH from every vertex yields one row
        // per (vertex, incident edge): two rows total per edge.
        let dba = dba();
        let t = dba.registry().edge_type("T").unwrap();
        let a = dba.insert_vertex().unwrap();
        let b = dba.insert_vertex().unwrap();
        dba.insert_edge(&a, &b, t).unwrap();

        let mut table = SymbolTable::new();
        let (plan, ..) = expand_plan(&mut table, ExpandDirection::Both);
        let mut cursor = make_cursor(&plan, &dba).unwrap();

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        let mut rows = 0;
        while cursor.pull(&mut frame, &mut ctx).unwrap() {
            rows += 1;
        }
        assert_eq!(rows, 2);
    }

    #[test]
    fn cycle_edge_yields_once_in_both_mode() {
        let dba = dba();
        let t = dba.registry().edge_type("SELF").unwrap();
        let a = dba.insert_vertex().unwrap();
        dba.insert_edge(&a, &a, t).unwrap();

        let mut table = SymbolTable::new();
        let (plan, ..) = expand_plan(&mut table, ExpandDirection::Both);
        let mut cursor = make_cursor(&plan, &dba).unwrap();

        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        let mut rows = 0;
        while cursor.pull(&mut frame, &mut ctx).unwrap() {
            rows += 1;
        }
        assert_eq!(rows, 1);
    }

    #[test]
    fn null_input_vertex_is_skipped() {
        let dba = dba();
        let mut table = SymbolTable::new();
        let n = table.create("n", SymbolType::Vertex, true);
        let r = table.create("r", SymbolType::Edge, true);
        let m = table.create("m", SymbolType::Vertex, true);

        let spec = ExpandSpec {
            input_symbol: n,
            node_symbol: m,
            edge_symbol: r,
            direction: ExpandDirection::Out,
            edge_types: Vec::new(),
            existing_node: false,
            view: GraphView::Old,
        };
        // Once yields one row with n = Null; expand must skip it and
        // exhaust cleanly.
        let mut cursor =
            ExpandCursor::new(spec, Box::new(super::super::once::OnceCursor::new()), dba);
        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        assert!(!cursor.pull(&mut frame, &mut ctx).unwrap());
    }
}
