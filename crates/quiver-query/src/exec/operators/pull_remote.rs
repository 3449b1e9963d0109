//! The distributed pull operator.
//!
//! On the first pull an asynchronous remote pull is issued to every peer
//! worker against the dispatched sub-plan. Afterwards each pull drains
//! completed responses into per-worker buffers, re-issues pulls for
//! workers whose cursor is still in progress, and yields buffered rows in
//! round-robin worker order, interleaving the local input when one is
//! present. When nothing is available the cursor sleeps one poll
//! interval.

use std::collections::HashMap;

use quiver_core::{PlanId, WorkerId};
use quiver_storage::DbAccessor;

use crate::error::{QueryError, QueryResult};
use crate::exec::context::ExecutionContext;
use crate::exec::coordinator::{PendingPull, PullState};
use crate::exec::cursor::{check_abort, BoxedCursor, Cursor};
use crate::frame::Frame;
use crate::symbols::Symbol;
use crate::value::TypedValue;

/// The pull-remote cursor. Not resettable.
pub struct PullRemoteCursor {
    plan_id: PlanId,
    symbols: Vec<Symbol>,
    input: Option<BoxedCursor>,
    dba: DbAccessor,
    worker_ids: Vec<WorkerId>,
    remote_pulls: HashMap<WorkerId, Box<dyn PendingPull>>,
    remote_results: HashMap<WorkerId, Vec<Vec<TypedValue>>>,
    last_pulled_index: usize,
    initialized: bool,
}

impl PullRemoteCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(
        plan_id: PlanId,
        symbols: Vec<Symbol>,
        input: Option<BoxedCursor>,
        dba: DbAccessor,
    ) -> Self {
        Self {
            plan_id,
            symbols,
            input,
            dba,
            worker_ids: Vec::new(),
            remote_pulls: HashMap::new(),
            remote_results: HashMap::new(),
            last_pulled_index: 0,
            initialized: false,
        }
    }

    fn issue_pull(&mut self, ctx: &ExecutionContext, worker: WorkerId) -> QueryResult<()> {
        let pull = ctx.coordinator.remote_pull(
            &self.dba,
            worker,
            self.plan_id,
            &ctx.parameters,
            &self.symbols,
            false,
            ctx.config.pull_batch_size,
        )?;
        self.remote_pulls.insert(worker, pull);
        Ok(())
    }

    /// Drains every completed response into the local buffers.
    fn harvest_ready(&mut self, ctx: &ExecutionContext) -> QueryResult<()> {
        let ready: Vec<WorkerId> = self
            .worker_ids
            .iter()
            .copied()
            .filter(|w| {
                self.remote_results.get(w).map_or(true, Vec::is_empty)
                    && self.remote_pulls.get(w).is_some_and(|p| p.is_ready())
            })
            .collect();
        for worker in ready {
            let pull = self.remote_pulls.remove(&worker).expect("readiness was just checked");
            let response = pull.take()?;
            if let Some(error) = response.state.to_error("PullRemote") {
                return Err(error);
            }
            self.remote_results.insert(worker, response.frames);
            if response.state == PullState::InProgress {
                self.issue_pull(ctx, worker)?;
            }
        }
        Ok(())
    }

    /// Picks the next worker with buffered rows, round-robin after the
    /// last one served.
    fn pick_worker(&mut self) -> Option<usize> {
        let n = self.worker_ids.len();
        for i in 0..n {
            let index = (self.last_pulled_index + i + 1) % n;
            let worker = self.worker_ids[index];
            if self.remote_results.get(&worker).is_some_and(|r| !r.is_empty()) {
                self.last_pulled_index = index;
                return Some(index);
            }
        }
        None
    }
}

impl Cursor for PullRemoteCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        if !self.initialized {
            self.worker_ids = ctx
                .coordinator
                .worker_ids()
                .into_iter()
                .filter(|w| *w != self.dba.worker())
                .collect();
            for worker in self.worker_ids.clone() {
                self.issue_pull(ctx, worker)?;
            }
            self.initialized = true;
        }

        let mut picked = None;
        while picked.is_none() && !self.worker_ids.is_empty() {
            check_abort(&self.dba)?;
            self.harvest_ready(ctx)?;
            picked = self.pick_worker();

            if picked.is_none() {
                if self.remote_pulls.is_empty() {
                    // Every worker exhausted and every buffer drained.
                    self.worker_ids.clear();
                    break;
                }
                // No remote rows available: serve local rows meanwhile.
                if let Some(input) = &mut self.input {
                    if input.pull(frame, ctx)? {
                        return Ok(true);
                    }
                }
                std::thread::sleep(ctx.config.remote_pull_sleep);
            }
        }

        let Some(index) = picked else {
            // Remote side is done; make sure local rows get exhausted.
            if let Some(input) = &mut self.input {
                if input.pull(frame, ctx)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        };

        let worker = self.worker_ids[index];
        let results = self.remote_results.get_mut(&worker).expect("picked worker has results");
        let row = results.pop().expect("picked worker has a row");
        for (symbol, value) in self.symbols.iter().zip(row) {
            frame.set(symbol, value);
        }

        // Drop the worker once its buffer is drained and no pull is
        // outstanding.
        if results.is_empty() && !self.remote_pulls.contains_key(&worker) {
            self.worker_ids.remove(index);
        }
        Ok(true)
    }

    fn reset(&mut self) -> QueryResult<()> {
        Err(QueryError::Unsupported("reset during PullRemote".into()))
    }
}
