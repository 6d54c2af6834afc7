use async_trait::async_trait;
use sqlite_script::Session;
use std::fmt::Debug;

use crate::url::ConnectionUrl;

#[cfg(test)]
pub(crate) mod mock;
pub(crate) mod sqlite;

pub use sqlite::SqliteMemoryDriver;

/// Error code reported when a drop request completed successfully.
pub const SHUTDOWN_SENTINEL: i32 = 45000;

/// Error code reported when no database exists under the requested name.
pub const NOT_FOUND_CODE: i32 = 40000;

/// Error code reported for names that cannot form a connection URL.
pub const INVALID_NAME_CODE: i32 = 40001;

/// Error code reported for engine failures that carry no numeric code.
pub const ENGINE_FAILURE_CODE: i32 = 50000;

/// Connection factory for named in-memory databases.
///
/// The URL directive selects the operation: [`Directive::Create`]
/// provisions the database, [`Directive::Drop`] destroys it and always ends
/// in an error, [`DriverError::ShutdownComplete`] when the drop succeeded.
///
/// [`Directive::Create`]: crate::url::Directive::Create
/// [`Directive::Drop`]: crate::url::Directive::Drop
#[async_trait]
pub trait Driver: Send + Sync + Debug {
    /// Identifier of the driver implementation.
    fn name(&self) -> &str;

    /// Engine segment used in connection URLs.
    fn engine(&self) -> &str;

    /// Verifies that the engine can be used.
    async fn load(&self) -> Result<(), DriverError>;

    async fn connect(
        &self,
        url: &ConnectionUrl,
    ) -> Result<Session, DriverError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Database '{name}' shut down")]
    ShutdownComplete { name: String },

    #[error("Database '{name}' not found")]
    NotFound { name: String },

    #[error("Invalid database name '{name}'")]
    InvalidName { name: String },

    #[error("Engine error: {0}")]
    Engine(#[from] sqlx::Error),
}

impl DriverError {
    /// Numeric code of the failure, in the style of SQL error codes.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::ShutdownComplete { .. } => SHUTDOWN_SENTINEL,
            Self::NotFound { .. } => NOT_FOUND_CODE,
            Self::InvalidName { .. } => INVALID_NAME_CODE,
            Self::Engine(sqlx::Error::Database(err)) => err
                .code()
                .and_then(|code| code.parse().ok())
                .unwrap_or(ENGINE_FAILURE_CODE),
            Self::Engine(_) => ENGINE_FAILURE_CODE,
        }
    }
}

/// Result of a drop request with the sentinel collapsed into success.
#[derive(Debug)]
pub enum ShutdownOutcome {
    Ok,
    Error { code: i32, cause: DriverError },
}

impl From<Result<(), DriverError>> for ShutdownOutcome {
    fn from(result: Result<(), DriverError>) -> Self {
        match result {
            Ok(()) => Self::Ok,
            Err(cause) if cause.code() == SHUTDOWN_SENTINEL => Self::Ok,
            Err(cause) => Self::Error { code: cause.code(), cause },
        }
    }
}
