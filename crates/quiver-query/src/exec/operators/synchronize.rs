//! The distributed barrier operator.
//!
//! The first pull runs the whole barrier protocol: ask every peer to
//! accumulate its sub-plan, drain the local input, await every
//! accumulation (anything but an exhausted cursor is fatal), optionally
//! advance the command and tell the peers, then apply deferred updates
//! everywhere. Only then do rows flow again: local rows first, the
//! remote pull afterwards.

use quiver_core::PlanId;
use quiver_storage::DbAccessor;
use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::exec::context::ExecutionContext;
use crate::exec::coordinator::PullState;
use crate::exec::cursor::{check_abort, BoxedCursor, Cursor};
use crate::frame::Frame;
use crate::symbols::Symbol;
use crate::value::TypedValue;

/// The synchronize cursor. Not resettable.
pub struct SynchronizeCursor {
    advance_command: bool,
    /// The child PullRemote's plan id and symbols, used for the
    /// accumulate requests.
    pull_plan: Option<(PlanId, Vec<Symbol>)>,
    input: BoxedCursor,
    pull_remote: Option<BoxedCursor>,
    dba: DbAccessor,
    local_frames: Vec<Vec<TypedValue>>,
    initial_pull_done: bool,
}

impl SynchronizeCursor {
    /// Creates the cursor.
    #[must_use]
    pub fn new(
        advance_command: bool,
        pull_plan: Option<(PlanId, Vec<Symbol>)>,
        input: BoxedCursor,
        pull_remote: Option<BoxedCursor>,
        dba: DbAccessor,
    ) -> Self {
        Self {
            advance_command,
            pull_plan,
            input,
            pull_remote,
            dba,
            local_frames: Vec::new(),
            initial_pull_done: false,
        }
    }

    fn initial_pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<()> {
        debug!(tx = %self.dba.tx_id(), "synchronize barrier starting");

        // 1. Tell all peer workers to accumulate, only when there is a
        // remote pull to synchronize with.
        let mut accumulations = Vec::new();
        if let Some((plan_id, symbols)) = &self.pull_plan {
            for worker in ctx.coordinator.worker_ids() {
                if worker == self.dba.worker() {
                    continue;
                }
                accumulations.push(ctx.coordinator.remote_pull(
                    &self.dba,
                    worker,
                    *plan_id,
                    &ctx.parameters,
                    symbols,
                    true,
                    ctx.config.pull_batch_size,
                )?);
            }
        }

        // 2. Accumulate local results.
        while self.input.pull(frame, ctx)? {
            check_abort(&self.dba)?;
            self.local_frames.push(frame.snapshot());
        }

        // 3. First sync point: every worker must report an exhausted
        // accumulation.
        for accumulation in accumulations {
            let response = accumulation.take()?;
            match response.state {
                PullState::Exhausted => {}
                PullState::InProgress => {
                    return Err(QueryError::Runtime(
                        "expected exhausted cursor after remote pull accumulate".into(),
                    ))
                }
                state => {
                    if let Some(error) = state.to_error("remote accumulate") {
                        return Err(error);
                    }
                }
            }
        }

        // 4. Advance the command so accumulated writes become OLD-visible.
        if self.advance_command {
            self.dba.advance_command();
        }

        // 5. Apply deferred updates locally and on every worker.
        ctx.coordinator.apply_deferred_updates(&self.dba)?;

        // 6. Let the workers know the command advanced.
        if self.advance_command {
            ctx.coordinator.notify_command_advanced(self.dba.tx_id())?;
        }

        debug!(tx = %self.dba.tx_id(), rows = self.local_frames.len(), "synchronize barrier done");
        Ok(())
    }
}

impl Cursor for SynchronizeCursor {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> QueryResult<bool> {
        if !self.initial_pull_done {
            self.initial_pull(frame, ctx)?;
            self.initial_pull_done = true;
        }

        // Yield local rows while available. Accessor values re-resolve on
        // demand, so after a command advance they observe the new state
        // without explicit reconstruction.
        if let Some(row) = self.local_frames.pop() {
            frame.restore(row);
            return Ok(true);
        }

        // Local rows are done; delegate to the remote pull if present.
        match &mut self.pull_remote {
            Some(pull_remote) => pull_remote.pull(frame, ctx),
            None => Ok(false),
        }
    }

    fn reset(&mut self) -> QueryResult<()> {
        Err(QueryError::Unsupported("reset during Synchronize".into()))
    }
}
