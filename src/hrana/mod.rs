//! Hrana protocol boundary.
//!
//! The wire protocol itself is owned by an injected collaborator; this module
//! only defines the seam the adapter consumes:
//! - `types`: wire value space, statements and result shapes
//! - `client`: the `Client`/`Stream`/`Connector` traits

pub mod client;
pub mod types;

pub use client::{Client, Connector, Stream};
pub use types::{RowResult, RowSet, Stmt, StmtResult, Value};
