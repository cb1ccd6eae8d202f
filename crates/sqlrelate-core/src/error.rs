//! Error types for sqlrelate operations.
//!
//! Errors fall in two families. Usage errors ([`Error::Config`] and
//! [`Error::InvalidArgument`]) are programmer mistakes and should never be
//! retried. Storage errors ([`Error::Connection`], [`Error::Query`]) come from
//! the database and are passed through unchanged.

use std::fmt;

/// The primary error type for all sqlrelate operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (connect, disconnect)
    Connection(ConnectionError),
    /// Query execution errors
    Query(QueryError),
    /// Row decoding errors
    Type(TypeError),
    /// Relation configuration errors
    Config(ConfigError),
    /// Invalid input passed to a relation operation
    InvalidArgument(InvalidArgumentError),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Connection lost during operation
    Disconnected,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Deadlock detected
    Deadlock,
    /// Serialization failure (retry may succeed)
    Serialization,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

/// A relation definition that cannot be built.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    /// Builder call that caused the error, e.g. `pivot_collection`.
    pub call: Option<&'static str>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// A pivot model was combined with a pivot table name or timestamps.
    PivotModelConflict,
    /// A table, key or column name is not a plain SQL identifier.
    InvalidIdentifier,
    /// Stored relation settings could not be parsed.
    InvalidSettings,
}

/// Input rejected by a relation operation before any statement ran.
#[derive(Debug, Clone)]
pub struct InvalidArgumentError {
    /// Operation that rejected the input, e.g. `attach`.
    pub method: &'static str,
    /// Rendering of the offending value, when there is one.
    pub value: Option<String>,
    pub message: String,
}

impl Error {
    /// Shorthand for a configuration error caused by `call`.
    pub fn config(kind: ConfigErrorKind, call: &'static str, message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            kind,
            call: Some(call),
            message: message.into(),
        })
    }

    /// Shorthand for an invalid-argument error raised by `method`.
    pub fn invalid_argument(
        method: &'static str,
        value: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::InvalidArgument(InvalidArgumentError {
            method,
            value,
            message: message.into(),
        })
    }

    /// Is this a programmer error (bad configuration or bad input)?
    ///
    /// Usage errors are deterministic; retrying them cannot succeed.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Error::Config(_) | Error::InvalidArgument(_))
    }

    /// Did this error come from the database or the connection?
    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Query(_))
    }

    /// Is this a retryable error (deadlock, serialization failure, lost connection)?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Query(q) => matches!(
                q.kind,
                QueryErrorKind::Deadlock | QueryErrorKind::Serialization
            ),
            Error::Connection(c) => matches!(c.kind, ConnectionErrorKind::Disconnected),
            _ => false,
        }
    }

    /// Get SQLSTATE if available (e.g., "23505" for unique violation)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl QueryError {
    /// Is this a unique constraint violation?
    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23505")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {e}"),
            Error::Type(e) => write!(f, "Type error: {e}"),
            Error::Config(e) => write!(f, "Configuration error: {e}"),
            Error::InvalidArgument(e) => write!(f, "Invalid argument: {e}"),
            Error::Custom(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.call {
            Some(call) => write!(f, "{call}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for InvalidArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.method, self.message)?;
        if let Some(value) = &self.value {
            write!(f, " (got {value})")?;
        }
        Ok(())
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<InvalidArgumentError> for Error {
    fn from(err: InvalidArgumentError) -> Self {
        Error::InvalidArgument(err)
    }
}

/// Result type alias for sqlrelate operations.
pub type Result<T> = std::result::Result<T, Error>;
