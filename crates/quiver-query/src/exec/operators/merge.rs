//! The merge operator.

use crate::error::{QueryError, QueryResult};
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{BoxedCursor, Cursor};
use crate::frame::Frame;

/// MERGE: per input row, forward the match branch's rows; when the match
/// branch yields nothing for a fresh input row, run the create branch
/// exactly once.
///
/// This is the one operator that recovers from an empty branch instead of
/// surfacing it.
pub struct MergeCursor {
    input: BoxedCursor,
    merge_match: BoxedCursor,
    merge_create: BoxedCursor,
    /// Whether the next pull must draw a new input row.
    pull_input: bool,
}

impl MergeCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(input: BoxedCursor, merge_match: BoxedCursor, merge_create: BoxedCursor) -> Self {
        Self { input, merge_match, merge_create, pull_input: true }
    }
}

impl Cursor for MergeCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        loop {
            if self.pull_input {
                if self.input.pull(frame, ctx)? {
                    // Fresh input row: both branches restart (the match
                    // branch's expand iterators keep state, the create
                    // branch may start with a Once).
                    self.merge_match.reset()?;
                    self.merge_create.reset()?;
                } else {
                    return Ok(false);
                }
            }

            if self.merge_match.pull(frame, ctx)? {
                // Subsequent pulls continue draining the match branch.
                self.pull_input = false;
                return Ok(true);
            }

            if self.pull_input {
                // The match branch yielded nothing for a fresh row:
                // create. The create branch must produce.
                if !self.merge_create.pull(frame, ctx)? {
                    return Err(QueryError::Runtime(
                        "MERGE create branch failed to produce a row".into(),
                    ));
                }
                return Ok(true);
            }

            // The match branch is exhausted after one or more rows; move
            // on to the next input row.
            self.pull_input = true;
        }
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.input.reset()?;
        self.merge_match.reset()?;
        self.merge_create.reset()?;
        self.pull_input = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::cursor::make_cursor;
    use crate::expr::{Expression, GraphView};
    use crate::plan::{NodeCreationInfo, PlanNode};
    use crate::symbols::{SymbolTable, SymbolType};
    use quiver_core::{NameRegistry, WorkerId};
    use quiver_storage::{DbAccessor, GraphStore, LocalOnlyRemote, TransactionEngine, View};
    use std::sync::Arc;

    fn dba() -> DbAccessor {
        let engine = Arc::new(TransactionEngine::new());
        let store = Arc::new(GraphStore::new(WorkerId::MASTER, Arc::clone(&engine)));
        let tx = engine.begin(None).unwrap();
        DbAccessor::new(store, engine, tx, Arc::new(LocalOnlyRemote), Arc::new(NameRegistry::new()))
    }

    fn merge_label_plan(table: &mut SymbolTable, label: quiver_core::LabelId) -> PlanNode {
        let a = table.create("a", SymbolType::Vertex, true);
        PlanNode::Merge {
            input: Box::new(PlanNode::Once),
            merge_match: Box::new(PlanNode::ScanAllByLabel {
                input: Box::new(PlanNode::Once),
                output_symbol: a.clone(),
                label,
                view: GraphView::New,
            }),
            merge_create: Box::new(PlanNode::CreateNode {
                input: Box::new(PlanNode::Once),
                node: NodeCreationInfo {
                    symbol: a,
                    labels: vec![label],
                    properties: vec![],
                },
                on_random_worker: false,
            }),
        }
    }

    #[test]
    fn creates_when_match_is_empty_and_matches_after() {
        let dba = dba();
        let label = dba.registry().label("L").unwrap();

        let mut table = SymbolTable::new();
        let plan = merge_label_plan(&mut table, label);
        let mut ctx = ExecutionContext::new();
        let mut frame = Frame::new(table.len());

        // First run: nothing matches, create runs once.
        let mut cursor = make_cursor(&plan, &dba).unwrap();
        let mut rows = 0;
        while cursor.pull(&mut frame, &mut ctx).unwrap() {
            rows += 1;
        }
        assert_eq!(rows, 1);
        assert_eq!(dba.vertices(View::New).unwrap().len(), 1);

        // Second run in the same transaction: the match branch finds the
        // created vertex, no duplicate appears.
        let mut cursor = make_cursor(&plan, &dba).unwrap();
        let mut rows = 0;
        while cursor.pull(&mut frame, &mut ctx).unwrap() {
            rows += 1;
        }
        assert_eq!(rows, 1);
        assert_eq!(dba.vertices(View::New).unwrap().len(), 1);
    }

    #[test]
    fn failing_create_branch_is_an_error() {
        let dba = dba();
        let mut table = SymbolTable::new();
        let x = table.create("x", SymbolType::Any, true);

        // Match branch: UNWIND [] (always empty). Create branch: also
        // empty, which violates the contract.
        let empty_unwind = || PlanNode::Unwind {
            input: Box::new(PlanNode::Once),
            list_expression: Expression::ListLiteral(Vec::new()),
            output_symbol: x.clone(),
        };
        let plan = PlanNode::Merge {
            input: Box::new(PlanNode::Once),
            merge_match: Box::new(empty_unwind()),
            merge_create: Box::new(empty_unwind()),
        };
        let mut cursor = make_cursor(&plan, &dba).unwrap();
        let mut frame = Frame::new(table.len());
        let mut ctx = ExecutionContext::new();
        assert!(matches!(cursor.pull(&mut frame, &mut ctx), Err(QueryError::Runtime(_))));
    }
}
