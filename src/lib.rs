// sqlcmd - interactive SQL command interpreter
// One uniform driver layer over several database backends

// Clippy configuration
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

// Shared value, column and error types
pub mod core;

// Driver registry, connection/cursor wrappers, built-in backends
pub mod driver;

// Command history and line input
pub mod history;

// Command interpreter (input handling, commands, rendering, variables)
pub mod shell;

// Configuration file and environment
pub mod config;

// Command-line arguments
pub mod cli;

// Tracing subscriber setup
pub mod logging;

// Re-export commonly used types for convenience
pub use core::{ColumnDescription, DbError, ShellError, ShellResult, TypeTag, Value};
pub use driver::{Connection, Cursor, Driver, DriverRegistry};
pub use history::{Console, History};
pub use shell::{Flow, Shell};
pub use config::{Configuration, DatabaseConfig};
