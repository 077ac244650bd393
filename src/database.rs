use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::callback::{Completion, RowHandler, StatementCompletion};
use crate::consts::OPEN_DEFAULT;
use crate::error::CompatError;
use crate::hrana::{self, Client, Connector, Stream};
use crate::locator::Target;
use crate::params::Params;
use crate::queue::{JobFuture, JobQueue};
use crate::rows::{MappedValue, Row};
use crate::statement::Statement;
use crate::trace::{self, TracePoint};

/// Observer hooks for the handle's named events.
#[derive(Default)]
struct Hooks {
    open: Mutex<Vec<Arc<dyn Fn() + Send + Sync>>>,
    close: Mutex<Vec<Arc<dyn Fn() + Send + Sync>>>,
    error: Mutex<Vec<Arc<dyn Fn(&CompatError) + Send + Sync>>>,
}

impl Hooks {
    fn push<T: ?Sized>(slot: &Mutex<Vec<Arc<T>>>, hook: Arc<T>) {
        match slot.lock() {
            Ok(mut hooks) => hooks.push(hook),
            Err(poisoned) => poisoned.into_inner().push(hook),
        }
    }

    // Hooks are cloned out before invocation so a hook can register further
    // hooks without deadlocking.
    fn snapshot<T: ?Sized>(slot: &Mutex<Vec<Arc<T>>>) -> Vec<Arc<T>> {
        match slot.lock() {
            Ok(hooks) => hooks.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn emit_open(&self) {
        for hook in Self::snapshot(&self.open) {
            hook();
        }
    }

    fn emit_close(&self) {
        for hook in Self::snapshot(&self.close) {
            hook();
        }
    }

    fn emit_error(&self, err: &CompatError) {
        for hook in Self::snapshot(&self.error) {
            hook(err);
        }
    }
}

/// State shared between a handle, its statements and its queued work.
pub(crate) struct DbCore {
    queue: Arc<JobQueue>,
    stream: Option<Arc<dyn Stream>>,
    client: Mutex<Option<Box<dyn Client>>>,
    connect_error: Option<CompatError>,
    protocol_version: u32,
    serialized: AtomicBool,
    closed: AtomicBool,
    verbose: AtomicBool,
    hooks: Hooks,
}

impl DbCore {
    pub(crate) fn verbose(&self) -> bool {
        self.verbose.load(Ordering::SeqCst)
    }

    fn serialized(&self) -> bool {
        self.serialized.load(Ordering::SeqCst)
    }

    /// Resolve the shared stream at the moment a unit of work starts.
    fn stream_for_job(&self) -> Result<Arc<dyn Stream>, CompatError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CompatError::Connection("the database is closed".to_owned()));
        }
        match &self.stream {
            Some(stream) => Ok(Arc::clone(stream)),
            None => Err(self.connect_error.clone().unwrap_or_else(|| {
                CompatError::Connection("the database was not opened successfully".to_owned())
            })),
        }
    }

    /// Queue a stream-using unit of work, isolation-tagged with the handle's
    /// current mode.
    pub(crate) fn enqueue_stream<F>(self: &Arc<Self>, action: F)
    where
        F: FnOnce(Result<Arc<dyn Stream>, CompatError>) -> JobFuture + Send + 'static,
    {
        self.enqueue_stream_tagged(self.serialized(), action);
    }

    fn enqueue_stream_tagged<F>(self: &Arc<Self>, exclusive: bool, action: F)
    where
        F: FnOnce(Result<Arc<dyn Stream>, CompatError>) -> JobFuture + Send + 'static,
    {
        let core = Arc::clone(self);
        self.queue
            .enqueue(exclusive, move || action(core.stream_for_job()));
    }

    /// Queue a unit of work that only exists to fire its completion in
    /// submission order.
    pub(crate) fn enqueue_noop<F>(self: &Arc<Self>, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue
            .enqueue(self.serialized(), move || Box::pin(async move { f() }));
    }
}

/// Options for opening a database handle.
#[derive(Clone)]
pub struct OpenOptions {
    locator: String,
    mode: i32,
    connector: Option<Arc<dyn Connector>>,
    verbose: bool,
}

impl OpenOptions {
    fn new(locator: String) -> Self {
        Self {
            locator,
            mode: OPEN_DEFAULT,
            connector: None,
            verbose: false,
        }
    }

    /// Open-mode flag bitmask. Inspected for compatibility; only the local
    /// engine has native equivalents to enforce.
    #[must_use]
    pub fn mode(mut self, mode: i32) -> Self {
        self.mode = mode;
        self
    }

    /// Inject the protocol client used for remote targets.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Capture call sites and append them to errors delivered through
    /// completions.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn connect(&self, target: &Target) -> Result<Box<dyn Client>, CompatError> {
        match target {
            #[cfg(feature = "local")]
            Target::Local { path } => Ok(Box::new(crate::local::LocalClient::open(
                path, self.mode,
            )?)),
            #[cfg(not(feature = "local"))]
            Target::Local { .. } => Err(CompatError::Connection(
                "local targets require the `local` feature".to_owned(),
            )),
            Target::Remote { .. } => match &self.connector {
                Some(connector) => connector.connect(target),
                None => Err(CompatError::Connection(
                    "no protocol connector configured for a remote target".to_owned(),
                )),
            },
        }
    }

    /// Open the handle. Returns immediately; connectivity is confirmed by a
    /// reserved exclusive unit of work performing a trivial round trip, and
    /// its outcome reaches the completion (or the `error` hook when none was
    /// registered). A failed probe does not poison the handle.
    ///
    /// # Errors
    ///
    /// Returns `CompatError::Argument` for a malformed locator and
    /// `CompatError::Connection` when no tokio runtime is available;
    /// connection failures themselves are reported asynchronously.
    pub fn open<C>(self, completion: C) -> Result<Database, CompatError>
    where
        C: Completion<()>,
    {
        let target = Target::parse(&self.locator)?;
        let runtime = Handle::try_current().map_err(|_| {
            CompatError::Connection("a tokio runtime is required to open a database".to_owned())
        })?;

        let (client, stream, connect_error) = match self.connect(&target) {
            Ok(client) => match client.open_stream() {
                Ok(stream) => (Some(client), Some(stream), None),
                Err(e) => {
                    client.close();
                    (None, None, Some(e))
                }
            },
            Err(e) => (None, None, Some(e)),
        };
        let protocol_version = client.as_ref().map_or(0, |c| c.protocol_version());

        let core = Arc::new(DbCore {
            queue: Arc::new(JobQueue::new(runtime)),
            stream,
            client: Mutex::new(client),
            connect_error,
            protocol_version,
            serialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            verbose: AtomicBool::new(self.verbose),
            hooks: Hooks::default(),
        });

        // Reserved first unit of work: no user-submitted work starts before
        // the connection is confirmed usable.
        let probe_core = Arc::clone(&core);
        core.enqueue_stream_tagged(true, move |stream| {
            Box::pin(async move {
                let result = match stream {
                    Ok(stream) => stream
                        .query_row(&hrana::Stmt::new("SELECT 1"))
                        .await
                        .map(|_| ()),
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => {
                        debug!("connection confirmed");
                        completion.complete(Ok(()));
                        probe_core.hooks.emit_open();
                    }
                    Err(e) => {
                        warn!(error = %e, "connectivity probe failed");
                        if completion.provided() {
                            completion.complete(Err(e));
                        } else {
                            probe_core.hooks.emit_error(&e);
                        }
                    }
                }
            })
        });

        Ok(Database { core })
    }
}

/// Handle to one database connection.
///
/// Owns the protocol connection and the job queue; every method enqueues and
/// returns immediately. Cloning shares the connection and queue.
#[derive(Clone)]
pub struct Database {
    core: Arc<DbCore>,
}

impl Database {
    /// Start configuring a handle for the given locator.
    #[must_use]
    pub fn builder(locator: impl Into<String>) -> OpenOptions {
        OpenOptions::new(locator.into())
    }

    /// Open a handle with default options.
    ///
    /// # Errors
    ///
    /// See [`OpenOptions::open`].
    pub fn open<C>(locator: &str, completion: C) -> Result<Database, CompatError>
    where
        C: Completion<()>,
    {
        Self::builder(locator).open(completion)
    }

    fn statement(&self, sql: &str) -> Statement {
        Statement::new(Arc::clone(&self.core), sql)
    }

    /// Execute a statement for effect through a fresh prepared statement.
    ///
    /// # Errors
    ///
    /// Returns `CompatError::Argument` when the parameters are malformed;
    /// execution failures are delivered through the completion.
    pub fn run<P, C>(&self, sql: &str, params: P, completion: C) -> Result<&Self, CompatError>
    where
        P: Into<Params>,
        C: StatementCompletion<()>,
    {
        self.statement(sql).run(params, completion)?;
        Ok(self)
    }

    /// Fetch at most one row through a fresh prepared statement.
    ///
    /// # Errors
    ///
    /// Returns `CompatError::Argument` when the parameters are malformed;
    /// execution failures are delivered through the completion.
    pub fn get<P, C>(&self, sql: &str, params: P, completion: C) -> Result<&Self, CompatError>
    where
        P: Into<Params>,
        C: StatementCompletion<Option<Row>>,
    {
        self.statement(sql).get(params, completion)?;
        Ok(self)
    }

    /// Fetch the full row set through a fresh prepared statement.
    ///
    /// # Errors
    ///
    /// Returns `CompatError::Argument` when the parameters are malformed;
    /// execution failures are delivered through the completion.
    pub fn all<P, C>(&self, sql: &str, params: P, completion: C) -> Result<&Self, CompatError>
    where
        P: Into<Params>,
        C: StatementCompletion<Vec<Row>>,
    {
        self.statement(sql).all(params, completion)?;
        Ok(self)
    }

    /// Fetch a keyed mapping through a fresh prepared statement.
    ///
    /// # Errors
    ///
    /// Returns `CompatError::Argument` when the parameters are malformed;
    /// execution failures are delivered through the completion.
    pub fn map<P, C>(
        &self,
        sql: &str,
        params: P,
        completion: C,
    ) -> Result<&Self, CompatError>
    where
        P: Into<Params>,
        C: StatementCompletion<std::collections::HashMap<String, MappedValue>>,
    {
        self.statement(sql).map(params, completion)?;
        Ok(self)
    }

    /// Deliver a row set one row at a time through a fresh prepared
    /// statement.
    ///
    /// # Errors
    ///
    /// Returns `CompatError::Argument` when the parameters are malformed;
    /// execution failures are delivered through the callbacks.
    pub fn each<P, H, C>(
        &self,
        sql: &str,
        params: P,
        handler: H,
        completion: C,
    ) -> Result<&Self, CompatError>
    where
        P: Into<Params>,
        H: RowHandler,
        C: Completion<usize>,
    {
        self.statement(sql).each(params, handler, completion)?;
        Ok(self)
    }

    /// Prepare a statement and bind its parameters; the completion fires
    /// once the bind has been sequenced behind earlier work.
    ///
    /// # Errors
    ///
    /// Returns `CompatError::Argument` when the parameters are malformed.
    pub fn prepare<P, C>(&self, sql: &str, params: P, completion: C) -> Result<Statement, CompatError>
    where
        P: Into<Params>,
        C: StatementCompletion<()>,
    {
        let stmt = self.statement(sql);
        stmt.bind(params, completion)?;
        Ok(stmt)
    }

    /// Run a semicolon-separated sequence of statements. Requires protocol
    /// version 2; older collaborators fail through the completion.
    pub fn exec<C>(&self, sql: &str, completion: C) -> &Self
    where
        C: Completion<()>,
    {
        let sql = sql.to_owned();
        let version = self.core.protocol_version;
        let point = TracePoint::capture(self.core.verbose(), "Database::exec", &sql);
        self.core.enqueue_stream(move |stream| {
            Box::pin(async move {
                let result = match stream {
                    Ok(_) if version < 2 => Err(CompatError::Statement(format!(
                        "statement sequences require protocol version 2, negotiated {version}"
                    ))),
                    Ok(stream) => stream.sequence(&sql).await,
                    Err(e) => Err(e),
                };
                completion.complete(trace::augment(result, point.as_ref()));
            })
        });
        self
    }

    /// Fire the completion once everything queued before it has completed.
    pub fn wait<C>(&self, completion: C) -> &Self
    where
        C: Completion<()>,
    {
        self.core.queue.enqueue(true, move || {
            Box::pin(async move { completion.complete(Ok(())) })
        });
        self
    }

    /// Close the connection. Queued as an exclusive unit, so previously
    /// submitted work drains first; repeated closes succeed and their
    /// completions fire exactly once each, in submission order.
    pub fn close<C>(&self, completion: C) -> &Self
    where
        C: Completion<()>,
    {
        let core = Arc::clone(&self.core);
        self.core.queue.enqueue(true, move || {
            Box::pin(async move {
                let client = match core.client.lock() {
                    Ok(mut client) => client.take(),
                    Err(poisoned) => poisoned.into_inner().take(),
                };
                if let Some(client) = client {
                    client.close();
                }
                if !core.closed.swap(true, Ordering::SeqCst) {
                    debug!("database closed");
                    core.hooks.emit_close();
                }
                completion.complete(Ok(()));
            })
        });
        self
    }

    /// Serialize newly queued work: each unit completes before the next
    /// starts. Persistent until changed.
    pub fn serialize(&self) -> &Self {
        self.core.serialized.store(true, Ordering::SeqCst);
        self
    }

    /// Let newly queued work overlap on the wire. Persistent until changed.
    /// This is the mode a fresh handle starts in.
    pub fn parallelize(&self) -> &Self {
        self.core.serialized.store(false, Ordering::SeqCst);
        self
    }

    /// Run `f` with serialized mode pushed; the previous mode is restored on
    /// every exit path.
    pub fn serialized<R>(&self, f: impl FnOnce(&Database) -> R) -> R {
        self.with_mode(true, f)
    }

    /// Run `f` with parallel mode pushed; the previous mode is restored on
    /// every exit path.
    pub fn parallelized<R>(&self, f: impl FnOnce(&Database) -> R) -> R {
        self.with_mode(false, f)
    }

    fn with_mode<R>(&self, serialized: bool, f: impl FnOnce(&Database) -> R) -> R {
        let prev = self.core.serialized.swap(serialized, Ordering::SeqCst);
        let _restore = ModeGuard {
            core: &self.core,
            prev,
        };
        f(self)
    }

    /// Register a hook for the `open` event.
    pub fn on_open(&self, hook: impl Fn() + Send + Sync + 'static) -> &Self {
        Hooks::push(&self.core.hooks.open, Arc::new(hook));
        self
    }

    /// Register a hook for the `close` event.
    pub fn on_close(&self, hook: impl Fn() + Send + Sync + 'static) -> &Self {
        Hooks::push(&self.core.hooks.close, Arc::new(hook));
        self
    }

    /// Register a hook for the `error` event: connection-level failures with
    /// nowhere else to go.
    pub fn on_error(&self, hook: impl Fn(&CompatError) + Send + Sync + 'static) -> &Self {
        Hooks::push(&self.core.hooks.error, Arc::new(hook));
        self
    }

    /// Toggle call-site capture for errors delivered through completions.
    pub fn set_verbose(&self, verbose: bool) -> &Self {
        self.core.verbose.store(verbose, Ordering::SeqCst);
        self
    }

    /// Present for API compatibility; the remote service cannot load
    /// extensions.
    ///
    /// # Errors
    ///
    /// Always returns `CompatError::Unsupported`.
    pub fn load_extension(&self, path: &str) -> Result<(), CompatError> {
        Err(CompatError::Unsupported(format!(
            "cannot load extension {path:?} over a remote connection"
        )))
    }

    /// Present for API compatibility; busy handling lives in the remote
    /// service.
    ///
    /// # Errors
    ///
    /// Always returns `CompatError::Unsupported`.
    pub fn configure_busy_timeout(&self, _timeout_ms: u64) -> Result<(), CompatError> {
        Err(CompatError::Unsupported(
            "busy timeout has no remote equivalent".to_owned(),
        ))
    }

    /// Present for API compatibility; in-flight remote statements cannot be
    /// interrupted.
    ///
    /// # Errors
    ///
    /// Always returns `CompatError::Unsupported`.
    pub fn interrupt(&self) -> Result<(), CompatError> {
        Err(CompatError::Unsupported(
            "interrupt has no remote equivalent".to_owned(),
        ))
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("serialized", &self.core.serialized())
            .field("closed", &self.core.closed.load(Ordering::SeqCst))
            .finish()
    }
}

struct ModeGuard<'a> {
    core: &'a DbCore,
    prev: bool,
}

impl Drop for ModeGuard<'_> {
    fn drop(&mut self) {
        self.core.serialized.store(self.prev, Ordering::SeqCst);
    }
}
