//! Convenient imports for common functionality.

pub use crate::callback::{Completion, NoCallback, RowHandler, StatementCompletion};
pub use crate::consts::{
    OPEN_CREATE, OPEN_DEFAULT, OPEN_FULLMUTEX, OPEN_PRIVATECACHE, OPEN_READONLY, OPEN_READWRITE,
    OPEN_SHAREDCACHE, OPEN_URI,
};
pub use crate::database::{Database, OpenOptions};
pub use crate::error::CompatError;
pub use crate::hrana::{Client, Connector, Stream};
pub use crate::locator::Target;
pub use crate::params::Params;
pub use crate::rows::{MappedValue, Row};
pub use crate::statement::Statement;
pub use crate::types::Value;

#[cfg(feature = "local")]
pub use crate::local::LocalClient;
