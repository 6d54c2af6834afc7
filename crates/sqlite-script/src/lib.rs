//! Line-oriented SQL script execution for SQLite connections
//!
//! Scripts are split into statements by a configurable delimiter (either at
//! the end of a line or on a line of its own), `--` comments are logged and
//! dropped, blank and `//` lines are skipped, and every statement is run on
//! a [`ScriptConnection`] with explicit commit/rollback handling.

mod executor;
mod parser;
mod session;
pub mod testing;

pub use executor::{ScriptError, ScriptExecutor, ScriptSummary};
pub use parser::{DEFAULT_DELIMITER, ParsedLine, StatementParser};
pub use session::{ResultSet, ScriptConnection, Session};
