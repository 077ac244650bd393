//! Callback-style sqlite3 API adapter over a remote Hrana (libsql) SQL
//! stream.
//!
//! Application code written against the node-sqlite3 surface — enqueue a
//! statement, get called back with the outcome — runs against a remote SQL
//! service instead. Every method returns immediately; a job queue sequences
//! the submitted work against the single ordered stream, honoring the
//! handle's serialize/parallelize mode, and completions are invoked once the
//! protocol call settles.
//!
//! The wire protocol itself is an injected collaborator (see
//! [`hrana::Connector`]); `file:` locators delegate to an embedded engine
//! behind the same boundary.

pub mod callback;
pub mod consts;
pub mod database;
pub mod error;
pub mod hrana;
pub mod locator;
pub mod params;
pub mod rows;
pub mod statement;
pub mod types;

mod queue;
mod trace;

#[cfg(feature = "local")]
pub mod local;

pub mod prelude;

pub use callback::{Completion, NoCallback, RowHandler, StatementCompletion};
pub use consts::{
    OPEN_CREATE, OPEN_DEFAULT, OPEN_FULLMUTEX, OPEN_PRIVATECACHE, OPEN_READONLY, OPEN_READWRITE,
    OPEN_SHAREDCACHE, OPEN_URI,
};
pub use database::{Database, OpenOptions};
pub use error::CompatError;
pub use locator::Target;
pub use params::Params;
pub use rows::{MappedValue, Row};
pub use statement::Statement;
pub use types::Value;
