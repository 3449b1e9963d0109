//! The AST and plan caches.
//!
//! Both caches are keyed by the stripped-query hash. Reads take a shared
//! lock; misses insert under the write lock. Cached plans are immutable
//! once inserted and carry a TTL: an expired entry is lazily removed on
//! the next lookup and replaced by a fresh plan.
//!
//! A poisoned cache lock degrades to a miss (lookups), a no-op (inserts)
//! or zero (sizes): the caches are accelerators, never sources of truth.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::plan::PlanNode;
use crate::symbols::SymbolTable;

/// Default time-to-live for cached plans.
pub const DEFAULT_PLAN_CACHE_TTL: Duration = Duration::from_secs(60);

/// An immutable planned query.
#[derive(Debug, Clone)]
pub struct PlannedQuery {
    /// The root of the logical plan.
    pub plan: Arc<PlanNode>,
    /// The planner's symbol table (the frame layout).
    pub symbol_table: SymbolTable,
    /// The planner's cost estimate.
    pub cost: f64,
    /// Keeps distributed sub-plans dispatched for as long as the plan is
    /// alive; dropping the last clone undispatches them.
    pub dispatch_guard: Option<Arc<dyn std::any::Any + Send + Sync>>,
}

/// A plan cache entry.
#[derive(Debug)]
struct CachedPlan {
    planned: PlannedQuery,
    cached_at: Instant,
}

impl CachedPlan {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() > ttl
    }
}

/// The TTL plan cache.
#[derive(Debug)]
pub struct PlanCache {
    entries: RwLock<HashMap<u64, Arc<CachedPlan>>>,
    ttl: Duration,
}

impl PlanCache {
    /// Creates a cache with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self { entries: RwLock::new(HashMap::new()), ttl }
    }

    /// Looks up a live plan, lazily dropping an expired entry.
    #[must_use]
    pub fn lookup(&self, hash: u64) -> Option<PlannedQuery> {
        {
            let entries = self.entries.read().ok()?;
            match entries.get(&hash) {
                Some(entry) if !entry.is_expired(self.ttl) => {
                    return Some(entry.planned.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: drop it under the write lock.
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&hash);
        }
        None
    }

    /// Inserts a plan.
    pub fn insert(&self, hash: u64, planned: PlannedQuery) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(hash, Arc::new(CachedPlan { planned, cached_at: Instant::now() }));
        }
    }

    /// The number of live entries (expired ones included until touched).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::new(DEFAULT_PLAN_CACHE_TTL)
    }
}

/// A cached parse result, opaque to the interpreter.
pub struct CachedAst {
    /// The parser's AST handle.
    pub ast: Arc<dyn std::any::Any + Send + Sync>,
}

/// The AST cache.
#[derive(Default)]
pub struct AstCache {
    entries: RwLock<HashMap<u64, Arc<CachedAst>>>,
}

impl AstCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a cached AST.
    #[must_use]
    pub fn lookup(&self, hash: u64) -> Option<Arc<CachedAst>> {
        self.entries.read().ok()?.get(&hash).cloned()
    }

    /// Inserts an AST.
    pub fn insert(&self, hash: u64, ast: Arc<CachedAst>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(hash, ast);
        }
    }
}
