//! craqDB errors. Errors are recovered at request boundaries, where handlers
//! reduce them to status responses; no error is fatal to a replica.

/// A craqDB error.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Invalid data, typically a protocol or invariant violation.
    InvalidData(String),
    /// Invalid user input, e.g. a malformed request or configuration.
    InvalidInput(String),
    /// An input/output error.
    IO(String),
}

/// A craqDB Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidData(msg) | Error::InvalidInput(msg) | Error::IO(msg) => {
                write!(f, "{msg}")
            }
        }
    }
}

/// Constructs an Error::InvalidData via format!().
#[macro_export]
macro_rules! errdata {
    ($($args:tt)*) => { $crate::error::Error::InvalidData(format!($($args)*)).into() };
}

/// Constructs an Error::InvalidInput via format!().
#[macro_export]
macro_rules! errinput {
    ($($args:tt)*) => { $crate::error::Error::InvalidInput(format!($($args)*)).into() };
}

impl<T> From<Error> for Result<T> {
    fn from(error: Error) -> Self {
        Err(error)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::InvalidInput(err.to_string())
    }
}

impl From<log::ParseLevelError> for Error {
    fn from(err: log::ParseLevelError) -> Self {
        Error::InvalidInput(err.to_string())
    }
}

impl From<log::SetLoggerError> for Error {
    fn from(err: log::SetLoggerError) -> Self {
        // Can only happen if the logger is initialized twice, which is a bug.
        panic!("{err}")
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidData(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        // This only happens when a different thread panics while holding a
        // mutex. This is itself a bug, so panic here too.
        panic!("{err}")
    }
}
