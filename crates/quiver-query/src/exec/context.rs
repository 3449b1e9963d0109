//! Execution context and configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::exec::admin::{AdminDelegate, NullAdminDelegate};
use crate::exec::coordinator::{Coordinator, LocalCoordinator};
use crate::value::Parameters;

/// Default interval between polls of pending remote futures.
///
/// Deliberately configuration rather than a process-wide flag.
pub const DEFAULT_REMOTE_PULL_SLEEP: Duration = Duration::from_millis(1);

/// Default number of frames per remote pull batch.
pub const DEFAULT_PULL_BATCH_SIZE: usize = 20;

/// Execution tuning knobs, delivered at init and never mutated at runtime.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// How long pollers sleep when no future is ready.
    pub remote_pull_sleep: Duration,
    /// How many frames one remote pull response carries.
    pub pull_batch_size: usize,
}

impl ExecutionConfig {
    /// Creates the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            remote_pull_sleep: DEFAULT_REMOTE_PULL_SLEEP,
            pull_batch_size: DEFAULT_PULL_BATCH_SIZE,
        }
    }

    /// Sets the future-poll sleep interval.
    #[must_use]
    pub const fn with_remote_pull_sleep(mut self, sleep: Duration) -> Self {
        self.remote_pull_sleep = sleep;
        self
    }

    /// Sets the remote pull batch size.
    #[must_use]
    pub const fn with_pull_batch_size(mut self, batch: usize) -> Self {
        self.pull_batch_size = batch;
        self
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a cursor needs besides the frame and the accessor.
pub struct ExecutionContext {
    /// Query parameters keyed by stripped-token position.
    pub parameters: Parameters,
    /// Tuning knobs.
    pub config: ExecutionConfig,
    /// The distributed coordinator (a no-op implementation outside a
    /// cluster).
    pub coordinator: Arc<dyn Coordinator>,
    /// The stream/auth admin boundary.
    pub admin: Arc<dyn AdminDelegate>,
    /// Whether the query runs inside an explicit multi-statement
    /// transaction (DDL and admin operators refuse to).
    pub in_explicit_transaction: bool,
    /// Set by `CreateIndex` so the interpreter can report it.
    pub is_index_created: bool,
}

impl ExecutionContext {
    /// Creates a context with defaults: no parameters, no cluster.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parameters: Parameters::new(),
            config: ExecutionConfig::default(),
            coordinator: Arc::new(LocalCoordinator),
            admin: Arc::new(NullAdminDelegate),
            in_explicit_transaction: false,
            is_index_created: false,
        }
    }

    /// Sets the parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the coordinator.
    #[must_use]
    pub fn with_coordinator(mut self, coordinator: Arc<dyn Coordinator>) -> Self {
        self.coordinator = coordinator;
        self
    }

    /// Sets the admin delegate.
    #[must_use]
    pub fn with_admin(mut self, admin: Arc<dyn AdminDelegate>) -> Self {
        self.admin = admin;
        self
    }

    /// Marks the context as part of an explicit transaction.
    #[must_use]
    pub fn in_explicit_transaction(mut self) -> Self {
        self.in_explicit_transaction = true;
        self
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("parameters", &self.parameters.len())
            .field("config", &self.config)
            .field("in_explicit_transaction", &self.in_explicit_transaction)
            .field("is_index_created", &self.is_index_created)
            .finish_non_exhaustive()
    }
}
