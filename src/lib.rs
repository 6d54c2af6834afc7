//! Throwaway in-memory SQL databases for tests
//!
//! A [`DatabaseInstance`] owns the lifecycle of one named in-memory
//! database and seeds it from SQL scripts resolved through a
//! [`ResourceLoader`]. [`Fixture`] wraps an instance with setup and
//! teardown around a single test body.
//!
//! ```no_run
//! use sql_fixture::{Fixture, FixtureConfig, ScriptConfig, StaticLoader};
//!
//! # type BoxError = Box<dyn std::error::Error + Send + Sync>;
//! # async fn example() -> Result<(), BoxError> {
//! let loader = StaticLoader::new().with(
//!     "/users.sql",
//!     "CREATE TABLE users (username VARCHAR(50));\n\
//!      INSERT INTO users VALUES ('tricia');\n",
//! );
//! let config =
//!     FixtureConfig::new("users").with_script(ScriptConfig::new("/users.sql"));
//!
//! let mut fixture = Fixture::new(config, loader);
//! let count = fixture
//!     .run(|fixture| {
//!         Box::pin(async move {
//!             let conn = fixture.connection().await?;
//!             let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
//!                 .fetch_one(&mut **conn)
//!                 .await?;
//!             Ok::<_, BoxError>(count)
//!         })
//!     })
//!     .await??;
//!
//! assert_eq!(count, 1);
//! # Ok(())
//! # }
//! ```

mod config;
pub mod driver;
mod error;
mod fixture;
mod instance;
mod resource;
mod url;

pub use config::{
    Config, DEFAULT_ENCODING, FixtureConfig, LogLevel, ScriptConfig,
    setup_tracing,
};
pub use driver::{Driver, DriverError, ShutdownOutcome, SqliteMemoryDriver};
pub use error::DatabaseError;
pub use fixture::Fixture;
pub use instance::DatabaseInstance;
pub use resource::{
    DirectoryLoader, ResourceError, ResourceLoader, StaticLoader,
};
pub use sqlite_script::{
    ResultSet, ScriptConnection, ScriptError, ScriptExecutor, ScriptSummary,
    Session,
};
pub use url::{ConnectionUrl, Directive};
