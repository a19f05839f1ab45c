//! Error taxonomy shared across the crate.
//!
//! Three failure classes cover every fallible operation: malformed caller
//! input (`InvalidAddress`), persistence failures (`Storage`), and
//! cooperative pipeline shutdown (`Cancelled`). Storage failures are never
//! retried here; retry policy belongs to the caller.

use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all fallible operations in the crate.
#[derive(Debug)]
pub enum Error {
    /// The supplied text is not a well-formed dotted-quad IPv4 address.
    InvalidAddress(String),
    /// The underlying key-value store failed (I/O, transaction abort,
    /// corrupt value). The offending operation was rolled back.
    Storage(Box<dyn std::error::Error + Send + Sync>),
    /// The pipeline was stopped by a cancellation signal. Expected,
    /// clean termination rather than a correctness failure.
    Cancelled,
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Storage failure from a bare message (missing column family and the like)
    pub(crate) fn storage(message: impl Into<String>) -> Self {
        Error::Storage(message.into().into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidAddress(text) => write!(f, "invalid IPv4 address: {text:?}"),
            Error::Storage(err) => write!(f, "storage failure: {err}"),
            Error::Cancelled => write!(f, "pipeline cancelled"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Storage(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(Box::new(err))
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Storage(err)
    }
}
