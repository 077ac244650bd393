//! Completion callbacks.
//!
//! Every operation of the compatibility API reports its outcome through a
//! completion invoked asynchronously, never inside the call that registered
//! it. Completions are optional; [`NoCallback`] stands in for an omitted one
//! and absorbs the outcome, errors included.

use crate::error::CompatError;
use crate::statement::Statement;

/// Placeholder for an omitted completion callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCallback;

/// Completion for handle-level operations (open, close, wait, exec, and the
/// final callback of `each`).
pub trait Completion<T>: Send + 'static {
    fn complete(self, result: Result<T, CompatError>);

    /// Whether a caller actually registered this completion. Connection
    /// failures fall back to the `error` hook when they have nowhere else
    /// to go.
    fn provided(&self) -> bool {
        true
    }
}

impl<T> Completion<T> for NoCallback {
    fn complete(self, _result: Result<T, CompatError>) {}

    fn provided(&self) -> bool {
        false
    }
}

impl<T, F> Completion<T> for F
where
    F: FnOnce(Result<T, CompatError>) + Send + 'static,
{
    fn complete(self, result: Result<T, CompatError>) {
        self(result);
    }
}

/// Completion for statement-level operations; receives the owning statement
/// so `last_id`/`changes` can be read from inside the callback.
pub trait StatementCompletion<T>: Send + 'static {
    fn complete(self, stmt: &Statement, result: Result<T, CompatError>);
}

impl<T> StatementCompletion<T> for NoCallback {
    fn complete(self, _stmt: &Statement, _result: Result<T, CompatError>) {}
}

impl<T, F> StatementCompletion<T> for F
where
    F: FnOnce(&Statement, Result<T, CompatError>) + Send + 'static,
{
    fn complete(self, stmt: &Statement, result: Result<T, CompatError>) {
        self(stmt, result);
    }
}

/// Per-row callback for `each`. Invoked once per row in result order, or
/// exactly once with the error when the fetch fails.
pub trait RowHandler: Send + 'static {
    fn row(&mut self, stmt: &Statement, result: Result<crate::rows::Row, CompatError>);
}

impl RowHandler for NoCallback {
    fn row(&mut self, _stmt: &Statement, _result: Result<crate::rows::Row, CompatError>) {}
}

impl<F> RowHandler for F
where
    F: FnMut(&Statement, Result<crate::rows::Row, CompatError>) + Send + 'static,
{
    fn row(&mut self, stmt: &Statement, result: Result<crate::rows::Row, CompatError>) {
        self(stmt, result);
    }
}
