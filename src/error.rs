use thiserror::Error;

/// Error type for the compatibility layer.
///
/// Argument errors are returned synchronously from the call that caused them;
/// everything else is delivered through completion callbacks so the
/// asynchronous contract of the API is preserved.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompatError {
    /// Malformed call arguments or locator. Never deferred.
    #[error("Argument error: {0}")]
    Argument(String),

    /// The remote connection could not be established or broke during use.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The service rejected or failed a statement.
    #[error("Statement error: {0}")]
    Statement(String),

    /// The method exists for API compatibility but has no remote equivalent.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl CompatError {
    /// The message payload carried by every variant.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            CompatError::Argument(msg)
            | CompatError::Connection(msg)
            | CompatError::Statement(msg)
            | CompatError::Unsupported(msg) => msg,
        }
    }

    pub(crate) fn map_message(self, f: impl FnOnce(String) -> String) -> Self {
        match self {
            CompatError::Argument(msg) => CompatError::Argument(f(msg)),
            CompatError::Connection(msg) => CompatError::Connection(f(msg)),
            CompatError::Statement(msg) => CompatError::Statement(f(msg)),
            CompatError::Unsupported(msg) => CompatError::Unsupported(f(msg)),
        }
    }
}
