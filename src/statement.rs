use std::sync::{Arc, Mutex, MutexGuard};

use crate::callback::{Completion, RowHandler, StatementCompletion};
use crate::database::DbCore;
use crate::error::CompatError;
use crate::hrana;
use crate::params::Params;
use crate::rows::{self, MappedValue, Row};
use crate::trace::{self, TracePoint};

/// A prepared statement: one SQL text plus its current bound-parameter set.
///
/// Every execution method binds its arguments, snapshots the statement, and
/// queues one unit of work on the owning handle; the completion runs after
/// the protocol call settles, never inside the registering call. Handles are
/// cheap to clone and all clones share the same statement state.
#[derive(Clone)]
pub struct Statement {
    core: Arc<DbCore>,
    inner: Arc<Mutex<StmtInner>>,
}

struct StmtInner {
    stmt: hrana::Stmt,
    last_id: Option<i64>,
    changes: u64,
}

impl Statement {
    pub(crate) fn new(core: Arc<DbCore>, sql: &str) -> Self {
        Self {
            core,
            inner: Arc::new(Mutex::new(StmtInner {
                stmt: hrana::Stmt::new(sql),
                last_id: None,
                changes: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StmtInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Rowid of the last row this statement inserted; `None` until a
    /// successful execution reports one.
    #[must_use]
    pub fn last_id(&self) -> Option<i64> {
        self.lock().last_id
    }

    /// Rows affected by the statement's most recent execution.
    #[must_use]
    pub fn changes(&self) -> u64 {
        self.lock().changes
    }

    #[must_use]
    pub fn sql(&self) -> String {
        self.lock().stmt.sql().to_owned()
    }

    fn record(&self, result: &hrana::StmtResult) {
        let mut inner = self.lock();
        inner.last_id = result.last_insert_rowid;
        inner.changes = result.affected_row_count;
    }

    /// Bind `params` (when present) and snapshot the statement for one
    /// queued execution. Snapshotting keeps an already-queued unit of work
    /// immune to later rebinds.
    fn snapshot_with<P: Into<Params>>(&self, params: P) -> Result<hrana::Stmt, CompatError> {
        let params = params.into();
        let mut inner = self.lock();
        params.apply_to(&mut inner.stmt)?;
        Ok(inner.stmt.clone())
    }

    fn capture(&self, method: &str, sql: &str) -> Option<TracePoint> {
        TracePoint::capture(self.core.verbose(), method, sql)
    }

    /// Execute for effect. The completion observes the updated
    /// `last_id`/`changes` through the statement it receives.
    ///
    /// # Errors
    ///
    /// Returns `CompatError::Argument` when the parameters are malformed;
    /// execution failures are delivered through the completion.
    pub fn run<P, C>(&self, params: P, completion: C) -> Result<&Self, CompatError>
    where
        P: Into<Params>,
        C: StatementCompletion<()>,
    {
        let stmt = self.snapshot_with(params)?;
        let point = self.capture("Statement::run", stmt.sql());
        let this = self.clone();
        self.core.enqueue_stream(move |stream| {
            Box::pin(async move {
                let result = match stream {
                    Ok(stream) => stream.execute(&stmt).await,
                    Err(e) => Err(e),
                };
                match trace::augment(result, point.as_ref()) {
                    Ok(res) => {
                        this.record(&res);
                        completion.complete(&this, Ok(()));
                    }
                    Err(e) => completion.complete(&this, Err(e)),
                }
            })
        });
        Ok(self)
    }

    /// Fetch at most one row; `Ok(None)` when the statement matches nothing.
    ///
    /// # Errors
    ///
    /// Returns `CompatError::Argument` when the parameters are malformed;
    /// execution failures are delivered through the completion.
    pub fn get<P, C>(&self, params: P, completion: C) -> Result<&Self, CompatError>
    where
        P: Into<Params>,
        C: StatementCompletion<Option<Row>>,
    {
        let stmt = self.snapshot_with(params)?;
        let point = self.capture("Statement::get", stmt.sql());
        let this = self.clone();
        self.core.enqueue_stream(move |stream| {
            Box::pin(async move {
                let result = match stream {
                    Ok(stream) => stream.query_row(&stmt).await,
                    Err(e) => Err(e),
                };
                match trace::augment(result, point.as_ref()) {
                    Ok(res) => {
                        this.record(&res.result);
                        completion.complete(&this, Ok(rows::single_row(res)));
                    }
                    Err(e) => completion.complete(&this, Err(e)),
                }
            })
        });
        Ok(self)
    }

    /// Fetch the full row set in result order.
    ///
    /// # Errors
    ///
    /// Returns `CompatError::Argument` when the parameters are malformed;
    /// execution failures are delivered through the completion.
    pub fn all<P, C>(&self, params: P, completion: C) -> Result<&Self, CompatError>
    where
        P: Into<Params>,
        C: StatementCompletion<Vec<Row>>,
    {
        let stmt = self.snapshot_with(params)?;
        let point = self.capture("Statement::all", stmt.sql());
        let this = self.clone();
        self.core.enqueue_stream(move |stream| {
            Box::pin(async move {
                let result = match stream {
                    Ok(stream) => stream.query(&stmt).await,
                    Err(e) => Err(e),
                };
                match trace::augment(result, point.as_ref()) {
                    Ok(set) => {
                        this.record(&set.result);
                        completion.complete(&this, Ok(rows::row_array(set)));
                    }
                    Err(e) => completion.complete(&this, Err(e)),
                }
            })
        });
        Ok(self)
    }

    /// Fetch the full row set shaped as a mapping keyed by each row's first
    /// column.
    ///
    /// # Errors
    ///
    /// Returns `CompatError::Argument` when the parameters are malformed;
    /// execution failures are delivered through the completion.
    pub fn map<P, C>(&self, params: P, completion: C) -> Result<&Self, CompatError>
    where
        P: Into<Params>,
        C: StatementCompletion<std::collections::HashMap<String, MappedValue>>,
    {
        let stmt = self.snapshot_with(params)?;
        let point = self.capture("Statement::map", stmt.sql());
        let this = self.clone();
        self.core.enqueue_stream(move |stream| {
            Box::pin(async move {
                let result = match stream {
                    Ok(stream) => stream.query(&stmt).await,
                    Err(e) => Err(e),
                };
                match trace::augment(result, point.as_ref()) {
                    Ok(set) => {
                        this.record(&set.result);
                        completion.complete(&this, Ok(rows::keyed_mapping(set)));
                    }
                    Err(e) => completion.complete(&this, Err(e)),
                }
            })
        });
        Ok(self)
    }

    /// Fetch the full row set and deliver it one row at a time, in order,
    /// followed by the completion with the row count. On failure the row
    /// handler fires exactly once with the error and the completion receives
    /// the same error.
    ///
    /// # Errors
    ///
    /// Returns `CompatError::Argument` when the parameters are malformed;
    /// execution failures are delivered through the callbacks.
    pub fn each<P, H, C>(&self, params: P, mut handler: H, completion: C) -> Result<&Self, CompatError>
    where
        P: Into<Params>,
        H: RowHandler,
        C: Completion<usize>,
    {
        let stmt = self.snapshot_with(params)?;
        let point = self.capture("Statement::each", stmt.sql());
        let this = self.clone();
        self.core.enqueue_stream(move |stream| {
            Box::pin(async move {
                let result = match stream {
                    Ok(stream) => stream.query(&stmt).await,
                    Err(e) => Err(e),
                };
                match trace::augment(result, point.as_ref()) {
                    Ok(set) => {
                        this.record(&set.result);
                        let shaped = rows::row_array(set);
                        let count = shaped.len();
                        for row in shaped {
                            handler.row(&this, Ok(row));
                        }
                        completion.complete(Ok(count));
                    }
                    Err(e) => {
                        handler.row(&this, Err(e.clone()));
                        completion.complete(Err(e));
                    }
                }
            })
        });
        Ok(self)
    }

    /// Replace the statement's bound parameters wholesale. Clears every
    /// existing binding even when no new parameters are supplied; the
    /// completion is queued behind previously submitted work.
    ///
    /// # Errors
    ///
    /// Returns `CompatError::Argument` when the parameters are malformed.
    pub fn bind<P, C>(&self, params: P, completion: C) -> Result<&Self, CompatError>
    where
        P: Into<Params>,
        C: StatementCompletion<()>,
    {
        {
            let mut inner = self.lock();
            inner.stmt.unbind_all();
            params.into().apply_to(&mut inner.stmt)?;
        }
        let this = self.clone();
        self.core
            .enqueue_noop(move || completion.complete(&this, Ok(())));
        Ok(self)
    }

    /// Rewind the statement. The remote protocol holds no cursor state, so
    /// this only queues the completion in order.
    pub fn reset<C>(&self, completion: C) -> &Self
    where
        C: StatementCompletion<()>,
    {
        let this = self.clone();
        self.core
            .enqueue_noop(move || completion.complete(&this, Ok(())));
        self
    }

    /// Release the statement. The remote protocol holds no per-statement
    /// resources, so this only queues the completion in order.
    pub fn finalize<C>(&self, completion: C) -> &Self
    where
        C: StatementCompletion<()>,
    {
        let this = self.clone();
        self.core
            .enqueue_noop(move || completion.complete(&this, Ok(())));
        self
    }
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Statement")
            .field("sql", &inner.stmt.sql())
            .field("last_id", &inner.last_id)
            .field("changes", &inner.changes)
            .finish()
    }
}
