//! The stream/auth admin boundary.
//!
//! Streaming ingest and authentication are external collaborators; the
//! operator library only needs a delegate to hand their statements to.
//! Deployments without those subsystems run with [`NullAdminDelegate`].

use crate::error::{QueryError, QueryResult};
use crate::plan::StreamSpec;

/// One row of `SHOW STREAMS` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStatusRow {
    /// Stream name.
    pub name: String,
    /// Source URI.
    pub uri: String,
    /// Transform script URI.
    pub transform: String,
    /// Human-readable run state.
    pub status: String,
}

/// One dry-run record of `TEST STREAM` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTestRow {
    /// The query the transform produced.
    pub query: String,
    /// Its parameters, rendered.
    pub parameters: String,
}

/// The operator-boundary contract for stream and auth statements.
pub trait AdminDelegate: Send + Sync {
    /// Registers a stream.
    fn create_stream(&self, spec: &StreamSpec) -> QueryResult<()>;

    /// Drops a stream.
    fn drop_stream(&self, name: &str) -> QueryResult<()>;

    /// Lists streams with their status.
    fn show_streams(&self) -> QueryResult<Vec<StreamStatusRow>>;

    /// Starts consuming a stream, optionally bounded in batches.
    fn start_stream(&self, name: &str, limit_batches: Option<i64>) -> QueryResult<()>;

    /// Stops consuming a stream.
    fn stop_stream(&self, name: &str) -> QueryResult<()>;

    /// Dry-runs a stream's transform.
    fn test_stream(&self, name: &str, limit_batches: Option<i64>)
        -> QueryResult<Vec<StreamTestRow>>;

    /// Executes an auth statement, returning its result rows as strings.
    fn auth_query(&self, statement: &str) -> QueryResult<Vec<Vec<String>>>;
}

/// A delegate for deployments without streams or auth.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAdminDelegate;

impl NullAdminDelegate {
    fn unsupported(what: &str) -> QueryError {
        QueryError::Unsupported(format!("{what} requires a configured admin backend"))
    }
}

impl AdminDelegate for NullAdminDelegate {
    fn create_stream(&self, _spec: &StreamSpec) -> QueryResult<()> {
        Err(Self::unsupported("CREATE STREAM"))
    }

    fn drop_stream(&self, _name: &str) -> QueryResult<()> {
        Err(Self::unsupported("DROP STREAM"))
    }

    fn show_streams(&self) -> QueryResult<Vec<StreamStatusRow>> {
        Ok(Vec::new())
    }

    fn start_stream(&self, _name: &str, _limit_batches: Option<i64>) -> QueryResult<()> {
        Err(Self::unsupported("START STREAM"))
    }

    fn stop_stream(&self, _name: &str) -> QueryResult<()> {
        Err(Self::unsupported("STOP STREAM"))
    }

    fn test_stream(
        &self,
        _name: &str,
        _limit_batches: Option<i64>,
    ) -> QueryResult<Vec<StreamTestRow>> {
        Err(Self::unsupported("TEST STREAM"))
    }

    fn auth_query(&self, _statement: &str) -> QueryResult<Vec<Vec<String>>> {
        Err(Self::unsupported("auth queries"))
    }
}
