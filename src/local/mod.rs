//! Local embedded engine.
//!
//! `file:` locators bypass the remote protocol entirely and are served by an
//! embedded `rusqlite` connection speaking the same client/stream boundary,
//! so the rest of the adapter cannot tell the difference.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags};
use tokio::sync::Mutex;
use tracing::debug;

use crate::consts;
use crate::error::CompatError;
use crate::hrana::{Client, RowResult, RowSet, Stmt, StmtResult, Stream, Value};

/// Embedded engine client for `file:` targets.
pub struct LocalClient {
    conn: Arc<Mutex<Connection>>,
    closed: Arc<AtomicBool>,
}

impl LocalClient {
    /// Open a database file (or `:memory:`) honoring the compatible subset
    /// of the open-mode flags.
    ///
    /// # Errors
    ///
    /// Returns `CompatError::Connection` when the file cannot be opened.
    pub fn open(path: &str, mode: i32) -> Result<Self, CompatError> {
        let flags = open_flags(mode);
        let conn = if path.is_empty() || path == ":memory:" {
            Connection::open_in_memory_with_flags(flags)
        } else {
            Connection::open_with_flags(path, flags)
        }
        .map_err(|e| {
            CompatError::Connection(format!("failed to open local database {path:?}: {e}"))
        })?;
        debug!(path, "local database opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl Client for LocalClient {
    fn open_stream(&self) -> Result<Arc<dyn Stream>, CompatError> {
        Ok(Arc::new(LocalStream {
            conn: Arc::clone(&self.conn),
            closed: Arc::clone(&self.closed),
        }))
    }

    fn protocol_version(&self) -> u32 {
        // The embedded engine can do everything the v3 protocol offers.
        3
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn open_flags(mode: i32) -> OpenFlags {
    let mut flags = OpenFlags::empty();
    if mode & consts::OPEN_READONLY != 0 {
        flags |= OpenFlags::SQLITE_OPEN_READ_ONLY;
    }
    if mode & consts::OPEN_READWRITE != 0 {
        flags |= OpenFlags::SQLITE_OPEN_READ_WRITE;
    }
    if mode & consts::OPEN_CREATE != 0 {
        flags |= OpenFlags::SQLITE_OPEN_CREATE;
    }
    if mode & consts::OPEN_URI != 0 {
        flags |= OpenFlags::SQLITE_OPEN_URI;
    }
    if mode & consts::OPEN_FULLMUTEX != 0 {
        flags |= OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    }
    if mode & consts::OPEN_SHAREDCACHE != 0 {
        flags |= OpenFlags::SQLITE_OPEN_SHARED_CACHE;
    }
    if mode & consts::OPEN_PRIVATECACHE != 0 {
        flags |= OpenFlags::SQLITE_OPEN_PRIVATE_CACHE;
    }
    flags
}

struct LocalStream {
    conn: Arc<Mutex<Connection>>,
    closed: Arc<AtomicBool>,
}

impl LocalStream {
    async fn conn(&self) -> Result<tokio::sync::MutexGuard<'_, Connection>, CompatError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CompatError::Connection(
                "the local connection is closed".to_owned(),
            ));
        }
        Ok(self.conn.lock().await)
    }
}

#[async_trait]
impl Stream for LocalStream {
    async fn execute(&self, stmt: &Stmt) -> Result<StmtResult, CompatError> {
        let conn = self.conn().await?;
        let mut prepared = prepare(&conn, stmt.sql())?;
        bind(&mut prepared, stmt)?;
        let affected = prepared
            .raw_execute()
            .map_err(|e| CompatError::Statement(format!("failed to execute statement: {e}")))?;
        Ok(StmtResult {
            affected_row_count: affected as u64,
            last_insert_rowid: Some(conn.last_insert_rowid()),
        })
    }

    async fn query_row(&self, stmt: &Stmt) -> Result<RowResult, CompatError> {
        let set = self.query(stmt).await?;
        Ok(RowResult {
            result: set.result,
            columns: set.columns,
            row: set.rows.into_iter().next(),
        })
    }

    async fn query(&self, stmt: &Stmt) -> Result<RowSet, CompatError> {
        let conn = self.conn().await?;
        let mut prepared = prepare(&conn, stmt.sql())?;
        bind(&mut prepared, stmt)?;

        let columns: Vec<String> = prepared
            .column_names()
            .into_iter()
            .map(ToOwned::to_owned)
            .collect();
        let column_count = columns.len();

        let mut rows = Vec::new();
        let mut raw = prepared.raw_query();
        loop {
            let row = raw
                .next()
                .map_err(|e| CompatError::Statement(format!("failed to fetch row: {e}")))?;
            let Some(row) = row else { break };
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value = row.get::<_, rusqlite::types::Value>(i).map_err(|e| {
                    CompatError::Statement(format!("failed to read column {i}: {e}"))
                })?;
                values.push(from_engine(value));
            }
            rows.push(values);
        }

        Ok(RowSet {
            result: StmtResult {
                affected_row_count: 0,
                last_insert_rowid: None,
            },
            columns,
            rows,
        })
    }

    async fn sequence(&self, sql: &str) -> Result<(), CompatError> {
        let conn = self.conn().await?;
        conn.execute_batch(sql)
            .map_err(|e| CompatError::Statement(format!("failed to execute sequence: {e}")))
    }
}

fn prepare<'c>(
    conn: &'c Connection,
    sql: &str,
) -> Result<rusqlite::Statement<'c>, CompatError> {
    conn.prepare(sql)
        .map_err(|e| CompatError::Statement(format!("failed to prepare statement: {e}")))
}

/// Bind the statement's sparse positional and named parameters through the
/// raw binding API; unbound slots stay NULL, matching the wire protocol.
fn bind(prepared: &mut rusqlite::Statement<'_>, stmt: &Stmt) -> Result<(), CompatError> {
    for (i, value) in stmt.positional().iter().enumerate() {
        if let Some(value) = value {
            prepared
                .raw_bind_parameter(i + 1, to_engine(value))
                .map_err(|e| {
                    CompatError::Statement(format!("failed to bind parameter {}: {e}", i + 1))
                })?;
        }
    }
    for (name, value) in stmt.named() {
        let index = named_index(prepared, name)?;
        prepared
            .raw_bind_parameter(index, to_engine(value))
            .map_err(|e| {
                CompatError::Statement(format!("failed to bind parameter {name:?}: {e}"))
            })?;
    }
    Ok(())
}

/// Resolve a bare parameter name against the statement, whichever sigil the
/// SQL text used.
fn named_index(
    prepared: &rusqlite::Statement<'_>,
    name: &str,
) -> Result<usize, CompatError> {
    for sigil in ['$', '@', ':'] {
        let candidate = format!("{sigil}{name}");
        let index = prepared
            .parameter_index(&candidate)
            .map_err(|e| CompatError::Statement(format!("failed to resolve {name:?}: {e}")))?;
        if let Some(index) = index {
            return Ok(index);
        }
    }
    Err(CompatError::Statement(format!(
        "unknown parameter name {name:?}"
    )))
}

fn to_engine(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Integer(i) => rusqlite::types::Value::Integer(*i),
        Value::Real(f) => rusqlite::types::Value::Real(*f),
        Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Blob(bytes) => rusqlite::types::Value::Blob(bytes.clone()),
    }
}

fn from_engine(value: rusqlite::types::Value) -> Value {
    match value {
        rusqlite::types::Value::Null => Value::Null,
        rusqlite::types::Value::Integer(i) => Value::Integer(i),
        rusqlite::types::Value::Real(f) => Value::Real(f),
        rusqlite::types::Value::Text(s) => Value::Text(s),
        rusqlite::types::Value::Blob(bytes) => Value::Blob(bytes),
    }
}
