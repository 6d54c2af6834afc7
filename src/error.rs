use sqlite_script::ScriptError;

use crate::driver::DriverError;

/// Failures surfaced by database lifecycle and script loading operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Could not load database driver '{driver}': {source}")]
    DriverUnavailable {
        driver: String,
        #[source]
        source: DriverError,
    },

    #[error("Could not create database '{name}': {source}")]
    ProvisioningFailed {
        name: String,
        #[source]
        source: DriverError,
    },

    #[error("Could not connect to {url}: {source}")]
    ConnectionFailed {
        url: String,
        #[source]
        source: DriverError,
    },

    #[error("Shutdown of database '{name}' failed with code {code}: {source}")]
    ShutdownFailed {
        name: String,
        code: i32,
        #[source]
        source: DriverError,
    },

    #[error("Could not find SQL script {path}")]
    ScriptNotFound { path: String },

    #[error("Unsupported script encoding '{encoding}'")]
    EncodingUnsupported { encoding: String },

    #[error("Could not load SQL script: {0}")]
    ScriptExecutionFailed(#[from] ScriptError),

    #[error("Database '{name}' is not started")]
    DatabaseNotStarted { name: String },
}
