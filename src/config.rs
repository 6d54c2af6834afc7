use clap::Parser;
use sqlite_script::{DEFAULT_DELIMITER, ScriptExecutor};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::resource::DirectoryLoader;

/// Encoding assumed for scripts that do not name one.
pub const DEFAULT_ENCODING: &str = "UTF-8";

#[derive(Debug, Clone, Parser)]
#[command(name = "sql-fixture")]
#[command(about = "Ephemeral in-memory SQL databases seeded from scripts")]
pub struct Config {
    #[arg(
        long,
        env = "SQL_FIXTURE_DATABASE_NAME",
        default_value = "sql-fixture",
        help = "Name of the in-memory database"
    )]
    pub database_name: String,

    #[arg(
        long,
        env = "SQL_FIXTURE_SCRIPT_ROOT",
        default_value = ".",
        help = "Directory that script paths are resolved against"
    )]
    pub script_root: PathBuf,

    #[arg(
        long,
        env = "SQL_FIXTURE_LOG_LEVEL",
        value_enum,
        default_value_t = LogLevel::Info,
        help = "Log level used when RUST_LOG is not set"
    )]
    pub log_level: LogLevel,
}

impl Config {
    /// Reads the configuration from the environment only, ignoring the
    /// process arguments.
    pub fn from_env() -> Result<Self, clap::Error> {
        Self::try_parse_from(["sql-fixture"])
    }

    #[must_use]
    pub fn loader(&self) -> DirectoryLoader {
        DirectoryLoader::new(&self.script_root)
    }

    #[must_use]
    pub fn fixture_config(&self, script: Option<ScriptConfig>) -> FixtureConfig {
        FixtureConfig { name: self.database_name.clone(), script }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Installs a global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Does nothing when a global
/// subscriber is already installed.
pub fn setup_tracing(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Script to load into a freshly started database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptConfig {
    pub path: String,
    pub encoding: String,
    pub delimiter: String,
    pub full_line_delimiter: bool,
}

impl ScriptConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            encoding: DEFAULT_ENCODING.to_string(),
            delimiter: DEFAULT_DELIMITER.to_string(),
            full_line_delimiter: false,
        }
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    #[must_use]
    pub fn with_delimiter(
        mut self,
        delimiter: impl Into<String>,
        full_line_delimiter: bool,
    ) -> Self {
        self.delimiter = delimiter.into();
        self.full_line_delimiter = full_line_delimiter;
        self
    }

    pub(crate) fn executor(&self) -> ScriptExecutor {
        ScriptExecutor::new(true)
            .with_delimiter(self.delimiter.clone(), self.full_line_delimiter)
    }
}

/// Database name and optional seed script for a [`Fixture`].
///
/// [`Fixture`]: crate::Fixture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureConfig {
    pub name: String,
    pub script: Option<ScriptConfig>,
}

impl FixtureConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), script: None }
    }

    #[must_use]
    pub fn with_script(mut self, script: ScriptConfig) -> Self {
        self.script = Some(script);
        self
    }
}
