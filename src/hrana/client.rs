use std::sync::Arc;

use async_trait::async_trait;

use super::types::{RowResult, RowSet, Stmt, StmtResult};
use crate::error::CompatError;
use crate::locator::Target;

/// One ordered logical channel carrying all statement execution for a
/// connection. Implementations own the wire protocol; the adapter only
/// issues these four operations.
#[async_trait]
pub trait Stream: Send + Sync {
    /// Execute a statement for effect.
    async fn execute(&self, stmt: &Stmt) -> Result<StmtResult, CompatError>;

    /// Execute a statement and fetch at most one row.
    async fn query_row(&self, stmt: &Stmt) -> Result<RowResult, CompatError>;

    /// Execute a statement and fetch the full row set.
    async fn query(&self, stmt: &Stmt) -> Result<RowSet, CompatError>;

    /// Run a semicolon-separated sequence of statements. Collaborators
    /// reject this below protocol version 2.
    async fn sequence(&self, sql: &str) -> Result<(), CompatError>;
}

/// A logical connection to the SQL service.
pub trait Client: Send + Sync {
    /// Open the single ordered stream used for all statement execution.
    ///
    /// # Errors
    ///
    /// Returns `CompatError::Connection` when the stream cannot be opened.
    fn open_stream(&self) -> Result<Arc<dyn Stream>, CompatError>;

    /// The negotiated protocol version.
    fn protocol_version(&self) -> u32;

    /// Tear the connection down. Must be idempotent.
    fn close(&self);
}

/// How a concrete protocol client is injected into a handle. The crate ships
/// no remote wire implementation of its own.
pub trait Connector: Send + Sync {
    /// Establish a connection to the parsed target.
    ///
    /// # Errors
    ///
    /// Returns `CompatError::Connection` when the target is unreachable or
    /// the handshake fails.
    fn connect(&self, target: &Target) -> Result<Box<dyn Client>, CompatError>;
}
