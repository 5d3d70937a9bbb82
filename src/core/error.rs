use std::backtrace::Backtrace;
use std::fmt;
use thiserror::Error;

/// Stack captured where a driver error was raised.
///
/// Only printed when the `stacktrace` shell variable is on.
pub struct StackTrace(Backtrace);

impl StackTrace {
    #[must_use]
    pub fn capture() -> Self {
        Self(Backtrace::force_capture())
    }
}

impl fmt::Debug for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StackTrace")
    }
}

impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unified driver error. Every backend failure is translated into one of
/// these two categories at the point of the native call.
#[derive(Error, Debug)]
pub enum DbError {
    /// Recoverable: printed, execution continues.
    #[error("{message}")]
    Warning { message: String },
    /// Fatal to the current statement.
    #[error("{message}")]
    Error { message: String, trace: StackTrace },
}

impl DbError {
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning { message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            trace: StackTrace::capture(),
        }
    }

    #[must_use]
    pub const fn is_warning(&self) -> bool {
        matches!(self, Self::Warning { .. })
    }

    #[must_use]
    pub const fn trace(&self) -> Option<&StackTrace> {
        match self {
            Self::Warning { .. } => None,
            Self::Error { trace, .. } => Some(trace),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        Self::error(err.to_string())
    }
}

impl From<mysql::Error> for DbError {
    fn from(err: mysql::Error) -> Self {
        match err {
            mysql::Error::MySqlError(server) => {
                Self::error(format!("{} ({}): {}", server.code, server.state, server.message))
            }
            other => Self::error(other.to_string()),
        }
    }
}

impl From<postgres::Error> for DbError {
    fn from(err: postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db) if db.severity() == "WARNING" => Self::warning(db.message()),
            Some(db) => Self::error(format!("{}: {}", db.severity(), db.message())),
            None => Self::error(err.to_string()),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Driver '{0}' is already registered")]
    Duplicate(String),
    #[error("Unknown database driver: {0}")]
    Unknown(String),
    #[error("No driver factory named '{0}'")]
    UnknownFactory(String),
}

/// Interpreter-level error. Everything except I/O on the terminal itself is
/// reported at the dispatch boundary and the interpreter keeps going.
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("Not connected to a database.")]
    NotConnected,
    #[error("{0}")]
    BadCommand(String),
    #[error("{0}")]
    Configuration(String),
    #[error("No configuration item for database \"{0}\"")]
    UnknownAlias(String),
    #[error("{} databases match partial alias \"{alias}\": {}", .candidates.len(), .candidates.join(", "))]
    AmbiguousAlias {
        alias: String,
        candidates: Vec<String>,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Line editor error: {0}")]
    Editor(#[from] rustyline::error::ReadlineError),
}

impl ShellError {
    pub fn bad_command(message: impl Into<String>) -> Self {
        Self::BadCommand(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Errors that stop the interpreter instead of being reported.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Editor(_))
    }
}

pub type ShellResult<T> = Result<T, ShellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_alias_names_candidates() {
        let err = ShellError::AmbiguousAlias {
            alias: "db".to_string(),
            candidates: vec!["db1".to_string(), "db2".to_string()],
        };
        assert_eq!(err.to_string(), "2 databases match partial alias \"db\": db1, db2");
    }

    #[test]
    fn test_db_error_categories() {
        let warning = DbError::warning("careful");
        assert!(warning.is_warning());
        assert!(warning.trace().is_none());
        assert_eq!(warning.to_string(), "careful");

        let error = DbError::error("boom");
        assert!(!error.is_warning());
        assert!(error.trace().is_some());
    }

    #[test]
    fn test_sqlite_error_is_fatal_category() {
        let err: DbError = rusqlite::Error::InvalidQuery.into();
        assert!(!err.is_warning());
    }

    #[test]
    fn test_user_errors_are_not_fatal() {
        assert!(!ShellError::NotConnected.is_fatal());
        assert!(!ShellError::bad_command("nope").is_fatal());
        assert!(!ShellError::from(RegistryError::Unknown("x".into())).is_fatal());
    }
}
