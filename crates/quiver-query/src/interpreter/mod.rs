//! The interpreter entry: query string in, executing cursor out.
//!
//! The interpreter owns the caches and the stripping logic; parsing and
//! planning are external collaborators behind the [`QueryParser`] and
//! [`QueryPlanner`] traits (the real Cypher frontend and the cost-based
//! planner live outside this crate). The parser is not reentrant by
//! contract, so parsing happens under a dedicated lock.

pub mod cache;
pub mod stripped;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quiver_core::PropertyValue;
use quiver_storage::DbAccessor;
use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::exec::context::ExecutionContext;
use crate::exec::cursor::{make_cursor, BoxedCursor};
use crate::frame::Frame;
use crate::value::{Parameters, TypedValue};

pub use cache::{AstCache, CachedAst, PlanCache, PlannedQuery, DEFAULT_PLAN_CACHE_TTL};
pub use stripped::StrippedQuery;

/// A parse result: the AST (opaque here) plus what the interpreter needs
/// to know about it.
pub struct ParsedQuery {
    /// The parser's AST handle.
    pub ast: Arc<dyn std::any::Any + Send + Sync>,
    /// Whether the AST (and its plan) may be cached. Parameter-dependent
    /// DDL, for one, is not.
    pub is_cacheable: bool,
}

/// The Cypher frontend contract.
///
/// `parse` receives the *stripped* query; implementations are not
/// required to be reentrant, the interpreter serializes calls.
pub trait QueryParser: Send + Sync {
    /// Parses a stripped query and runs semantic checks.
    fn parse(&self, stripped_query: &str) -> QueryResult<ParsedQuery>;
}

/// The planner contract.
pub trait QueryPlanner: Send + Sync {
    /// Plans a parsed query. Distributed planners dispatch worker
    /// sub-plans here and tie their lifetime to the returned plan's
    /// `dispatch_guard`.
    fn plan(
        &self,
        ast: &Arc<dyn std::any::Any + Send + Sync>,
        parameters: &Parameters,
        dba: &DbAccessor,
    ) -> QueryResult<PlannedQuery>;
}

/// Interpreter configuration.
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Time-to-live of cached plans.
    pub plan_cache_ttl: Duration,
}

impl InterpreterConfig {
    /// Creates the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self { plan_cache_ttl: DEFAULT_PLAN_CACHE_TTL }
    }

    /// Sets the plan cache TTL.
    #[must_use]
    pub const fn with_plan_cache_ttl(mut self, ttl: Duration) -> Self {
        self.plan_cache_ttl = ttl;
        self
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A query ready to execute: plan, frame layout and bound parameters.
#[derive(Debug)]
pub struct PreparedQuery {
    planned: PlannedQuery,
    parameters: Parameters,
}

impl PreparedQuery {
    /// The planned query.
    #[must_use]
    pub fn planned(&self) -> &PlannedQuery {
        &self.planned
    }

    /// The bound parameters.
    #[must_use]
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// The user-facing output column names.
    #[must_use]
    pub fn output_names(&self) -> Vec<String> {
        self.planned.plan.output_symbols().iter().map(|s| s.name().to_owned()).collect()
    }

    /// Builds the root cursor and a result stream over it.
    pub fn stream(self, dba: &DbAccessor, mut ctx: ExecutionContext) -> QueryResult<QueryStream> {
        ctx.parameters = self.parameters;
        let cursor = make_cursor(&self.planned.plan, dba)?;
        let output_symbols = self.planned.plan.output_symbols();
        Ok(QueryStream {
            cursor,
            ctx,
            frame: Frame::new(self.planned.symbol_table.len()),
            output_symbols,
        })
    }
}

/// Streams rows out of an executing cursor, translating frames to the
/// client representation (one value per output symbol).
pub struct QueryStream {
    cursor: BoxedCursor,
    ctx: ExecutionContext,
    frame: Frame,
    output_symbols: Vec<crate::symbols::Symbol>,
}

impl QueryStream {
    /// Pulls the next row.
    pub fn next_row(&mut self) -> QueryResult<Option<Vec<TypedValue>>> {
        if self.cursor.pull(&mut self.frame, &mut self.ctx)? {
            Ok(Some(self.output_symbols.iter().map(|s| self.frame.get(s).clone()).collect()))
        } else {
            Ok(None)
        }
    }

    /// Drains every remaining row.
    pub fn collect_rows(mut self) -> QueryResult<Vec<Vec<TypedValue>>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// The execution context, e.g. to read the index-created flag after
    /// the stream is drained.
    #[must_use]
    pub fn ctx(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// The output column names.
    #[must_use]
    pub fn output_names(&self) -> Vec<String> {
        self.output_symbols.iter().map(|s| s.name().to_owned()).collect()
    }
}

/// Maps query strings to prepared queries through stripping, the AST
/// cache and the TTL plan cache.
pub struct Interpreter {
    parser: Arc<dyn QueryParser>,
    planner: Arc<dyn QueryPlanner>,
    ast_cache: AstCache,
    /// The parser is not reentrant; every parse happens under this lock.
    parse_lock: Mutex<()>,
    plan_cache: PlanCache,
}

impl Interpreter {
    /// Creates an interpreter over a frontend and a planner.
    #[must_use]
    pub fn new(parser: Arc<dyn QueryParser>, planner: Arc<dyn QueryPlanner>) -> Self {
        Self::with_config(parser, planner, InterpreterConfig::default())
    }

    /// Creates an interpreter with explicit configuration.
    #[must_use]
    pub fn with_config(
        parser: Arc<dyn QueryParser>,
        planner: Arc<dyn QueryPlanner>,
        config: InterpreterConfig,
    ) -> Self {
        Self {
            parser,
            planner,
            ast_cache: AstCache::new(),
            parse_lock: Mutex::new(()),
            plan_cache: PlanCache::new(config.plan_cache_ttl),
        }
    }

    /// Prepares a query: strip, parse (cached), plan (cached), bind
    /// parameters.
    pub fn prepare(
        &self,
        dba: &DbAccessor,
        query: &str,
        user_parameters: &HashMap<String, PropertyValue>,
    ) -> QueryResult<PreparedQuery> {
        // 1. Strip literals and hash the structure.
        let stripped = StrippedQuery::new(query)?;
        let hash = stripped.hash();

        // 2. Bind parameters: stripped literals first, then user
        // parameters by name. Every placeholder must be bound.
        let mut parameters = stripped.literals();
        for (&position, name) in stripped.parameters() {
            let value = user_parameters
                .get(name)
                .ok_or_else(|| QueryError::UnprovidedParameter(name.clone()))?;
            parameters.add(position, value.clone());
        }

        // 3. AST cache, parsing under the lock on miss.
        let (ast, is_cacheable) = match self.ast_cache.lookup(hash) {
            Some(cached) => (Arc::clone(&cached.ast), true),
            None => {
                let _guard = self
                    .parse_lock
                    .lock()
                    .map_err(|_| QueryError::LockPoisoned("parser lock".into()))?;
                // Another thread may have parsed while we waited.
                if let Some(cached) = self.ast_cache.lookup(hash) {
                    (Arc::clone(&cached.ast), true)
                } else {
                    let parsed = self.parser.parse(stripped.query())?;
                    if parsed.is_cacheable {
                        self.ast_cache.insert(hash, Arc::new(CachedAst { ast: Arc::clone(&parsed.ast) }));
                    } else {
                        debug!(hash, "query is not cacheable");
                    }
                    (parsed.ast, parsed.is_cacheable)
                }
            }
        };

        // 4. Plan cache with TTL.
        let planned = match self.plan_cache.lookup(hash) {
            Some(planned) => planned,
            None => {
                let planned = self.planner.plan(&ast, &parameters, dba)?;
                if is_cacheable {
                    self.plan_cache.insert(hash, planned.clone());
                }
                planned
            }
        };

        Ok(PreparedQuery { planned, parameters })
    }
}
