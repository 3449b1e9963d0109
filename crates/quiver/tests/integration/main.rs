//! End-to-end integration tests: plans built the way the planner would
//! build them, executed over real stores, single-worker and clustered.

mod distributed;
mod plans;
mod scenarios;
mod transactions;
