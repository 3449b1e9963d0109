//! Transaction engine, handles and the transaction killer.
//!
//! One engine serves the whole cluster: the master allocates transaction
//! ids and every worker resolves transaction state against the same
//! engine, the in-process form of a master engine with worker-side
//! caches.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use quiver_core::{CommandId, TxId};
use tracing::warn;

use crate::error::{StorageError, StorageResult};

fn engine_poisoned() -> StorageError {
    StorageError::LockPoisoned("transaction engine".into())
}

/// The lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// The transaction is running.
    Active,
    /// The transaction committed.
    Committed,
    /// The transaction aborted.
    Aborted,
}

/// Shared per-transaction state.
#[derive(Debug)]
struct TxShared {
    /// Transactions committed before this one started.
    snapshot: HashSet<TxId>,
    /// The transaction-local command clock.
    command: AtomicU64,
    /// Set when the killer or the client requests termination.
    abort_requested: AtomicBool,
    /// Wall-clock deadline enforced by the killer, if any.
    deadline: Option<Instant>,
}

/// A handle on a running transaction.
///
/// Handles are cheap to clone; all clones observe the same command clock
/// and abort flag.
#[derive(Debug, Clone)]
pub struct Transaction {
    id: TxId,
    shared: Arc<TxShared>,
}

impl Transaction {
    /// The transaction id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> TxId {
        self.id
    }

    /// The current command id.
    #[inline]
    #[must_use]
    pub fn command(&self) -> CommandId {
        CommandId(self.shared.command.load(Ordering::SeqCst))
    }

    /// Installs the next command id, making prior mutations of this
    /// transaction visible under the OLD view.
    pub fn advance_command(&self) -> CommandId {
        CommandId(self.shared.command.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Returns `true` when termination has been requested.
    #[inline]
    #[must_use]
    pub fn should_abort(&self) -> bool {
        self.shared.abort_requested.load(Ordering::SeqCst)
    }

    /// Requests termination of this transaction.
    pub fn request_abort(&self) {
        self.shared.abort_requested.store(true, Ordering::SeqCst);
    }

    /// Whether the given transaction was committed before this one started.
    #[inline]
    #[must_use]
    pub fn sees_committed(&self, tx: TxId) -> bool {
        self.shared.snapshot.contains(&tx)
    }
}

/// Allocates transaction ids and tracks transaction state.
#[derive(Debug, Default)]
pub struct TransactionEngine {
    next_tx: AtomicU64,
    inner: RwLock<EngineInner>,
}

#[derive(Debug, Default)]
struct EngineInner {
    active: HashMap<TxId, Arc<TxShared>>,
    committed: HashSet<TxId>,
    aborted: HashSet<TxId>,
}

impl TransactionEngine {
    /// Creates an engine with no transactions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins a transaction, optionally bounded by a deadline the
    /// transaction killer enforces.
    pub fn begin(&self, max_duration: Option<Duration>) -> StorageResult<Transaction> {
        let id = TxId(self.next_tx.fetch_add(1, Ordering::SeqCst) + 1);
        let mut inner = self.inner.write().map_err(|_| engine_poisoned())?;
        let shared = Arc::new(TxShared {
            snapshot: inner.committed.clone(),
            command: AtomicU64::new(CommandId::FIRST.0),
            abort_requested: AtomicBool::new(false),
            deadline: max_duration.map(|d| Instant::now() + d),
        });
        inner.active.insert(id, Arc::clone(&shared));
        Ok(Transaction { id, shared })
    }

    /// Obtains a handle for a transaction begun elsewhere in the cluster.
    ///
    /// Workers use this to serve dispatched sub-plans under the master's
    /// transaction.
    pub fn adopt(&self, id: TxId) -> StorageResult<Transaction> {
        let inner = self.inner.read().map_err(|_| engine_poisoned())?;
        let shared = inner
            .active
            .get(&id)
            .ok_or_else(|| StorageError::Serialization(format!("{id} is not active")))?;
        Ok(Transaction { id, shared: Arc::clone(shared) })
    }

    /// The status of a transaction.
    pub fn status(&self, id: TxId) -> StorageResult<TxStatus> {
        let inner = self.inner.read().map_err(|_| engine_poisoned())?;
        Ok(if inner.committed.contains(&id) {
            TxStatus::Committed
        } else if inner.active.contains_key(&id) {
            TxStatus::Active
        } else {
            TxStatus::Aborted
        })
    }

    /// Commits a transaction.
    ///
    /// Fails with `Serialization` when an abort was already requested (the
    /// conflict or kill wins over the commit).
    pub fn commit(&self, tx: &Transaction) -> StorageResult<()> {
        if tx.should_abort() {
            self.abort(tx);
            return Err(StorageError::Serialization(format!(
                "{} was aborted before commit",
                tx.id()
            )));
        }
        let mut inner = self.inner.write().map_err(|_| engine_poisoned())?;
        if inner.active.remove(&tx.id()).is_some() {
            inner.committed.insert(tx.id());
        }
        Ok(())
    }

    /// Aborts a transaction. Idempotent.
    ///
    /// The abort flag is raised even when the engine lock is poisoned;
    /// removing the bookkeeping entry is then skipped, which every reader
    /// of that state already tolerates.
    pub fn abort(&self, tx: &Transaction) {
        tx.request_abort();
        if let Ok(mut inner) = self.inner.write() {
            if inner.active.remove(&tx.id()).is_some() {
                inner.aborted.insert(tx.id());
            }
        }
    }

    /// Scans active transactions and requests an abort for every one whose
    /// deadline has passed. Returns how many were flagged.
    pub fn kill_expired(&self) -> usize {
        let now = Instant::now();
        let Ok(inner) = self.inner.read() else {
            return 0;
        };
        let mut killed = 0;
        for (id, shared) in &inner.active {
            if let Some(deadline) = shared.deadline {
                if now >= deadline && !shared.abort_requested.swap(true, Ordering::SeqCst) {
                    warn!(tx = %id, "transaction exceeded its deadline, requesting abort");
                    killed += 1;
                }
            }
        }
        killed
    }
}

/// Background scheduler that periodically flags expired transactions.
#[derive(Debug)]
pub struct TransactionKiller {
    shutdown: Arc<AtomicBool>,
    handle: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl TransactionKiller {
    /// Spawns the killer thread.
    #[must_use]
    pub fn spawn(engine: Arc<TransactionEngine>, scan_interval: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&shutdown);
        let handle = std::thread::Builder::new()
            .name("tx-killer".to_owned())
            .spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    engine.kill_expired();
                    std::thread::sleep(scan_interval);
                }
            })
            .expect("failed to spawn tx-killer thread");
        Self { shutdown, handle: Mutex::new(Some(handle)) }
    }

    /// Stops the killer and joins its thread. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Ok(mut handle) = self.handle.lock() {
            if let Some(handle) = handle.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for TransactionKiller {
    fn drop(&mut self) {
        self.shutdown();
    }
}
