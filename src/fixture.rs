use futures::FutureExt;
use futures::future::BoxFuture;
use sqlite_script::Session;
use std::fmt::{self, Debug, Formatter};
use std::panic::{AssertUnwindSafe, resume_unwind};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{Config, FixtureConfig, ScriptConfig};
use crate::driver::Driver;
use crate::error::DatabaseError;
use crate::instance::DatabaseInstance;
use crate::resource::ResourceLoader;

/// Runs a test against a freshly provisioned database.
///
/// `setup` starts the database and loads the configured script,
/// `teardown` drops the database and closes the shared connection. [`run`]
/// wraps a test body with both and guarantees the teardown on every path.
///
/// [`run`]: Self::run
pub struct Fixture {
    config: FixtureConfig,
    loader: Arc<dyn ResourceLoader>,
    instance: DatabaseInstance,
    connection: Option<Session>,
}

impl Debug for Fixture {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fixture")
            .field("config", &self.config)
            .field("instance", &self.instance)
            .field("connected", &self.connection.is_some())
            .finish_non_exhaustive()
    }
}

impl Fixture {
    pub fn new(
        config: FixtureConfig,
        loader: impl ResourceLoader + 'static,
    ) -> Self {
        let instance = DatabaseInstance::new(config.name.clone());
        Self::from_parts(config, Arc::new(loader), instance)
    }

    pub fn with_driver(
        config: FixtureConfig,
        loader: impl ResourceLoader + 'static,
        driver: Arc<dyn Driver>,
    ) -> Self {
        let instance = DatabaseInstance::with_driver(config.name.clone(), driver);
        Self::from_parts(config, Arc::new(loader), instance)
    }

    /// Builds a fixture named after `config.database_name` that resolves
    /// scripts below `config.script_root`.
    #[must_use]
    pub fn from_config(config: &Config, script: Option<ScriptConfig>) -> Self {
        Self::new(config.fixture_config(script), config.loader())
    }

    fn from_parts(
        config: FixtureConfig,
        loader: Arc<dyn ResourceLoader>,
        instance: DatabaseInstance,
    ) -> Self {
        Self { config, loader, instance, connection: None }
    }

    #[must_use]
    pub const fn config(&self) -> &FixtureConfig {
        &self.config
    }

    #[must_use]
    pub const fn instance(&self) -> &DatabaseInstance {
        &self.instance
    }

    /// Starts the database and loads the configured script.
    ///
    /// A script failure shuts the database down again before the error is
    /// returned.
    pub async fn setup(&mut self) -> Result<(), DatabaseError> {
        self.instance.start().await?;

        let Some(script) = &self.config.script else {
            return Ok(());
        };

        let loaded =
            self.instance.execute_script(self.loader.as_ref(), script).await;

        if let Err(err) = loaded {
            if let Err(shutdown_err) = self.instance.shutdown().await {
                warn!(
                    name = %self.config.name,
                    error = %shutdown_err,
                    "Shutdown after failed setup failed"
                );
            }

            return Err(err);
        }

        Ok(())
    }

    /// Shared connection, opened on first use and closed by `teardown`.
    pub async fn connection(&mut self) -> Result<&mut Session, DatabaseError> {
        self.ensure_running()?;

        let session = match self.connection.take() {
            Some(session) => session,
            None => {
                debug!(name = %self.config.name, "Opening shared connection");
                self.instance.create_connection().await?
            }
        };

        Ok(self.connection.insert(session))
    }

    /// Opens a connection owned by the caller.
    pub async fn create_connection(&self) -> Result<Session, DatabaseError> {
        self.ensure_running()?;
        self.instance.create_connection().await
    }

    /// Shuts the database down, then closes the shared connection.
    pub async fn teardown(&mut self) -> Result<(), DatabaseError> {
        let result = self.instance.shutdown().await;

        if let Some(session) = self.connection.take() {
            if let Err(err) = session.close().await {
                warn!(error = %err, "Failed to close shared connection");
            }
        }

        result
    }

    /// Runs `test` between `setup` and `teardown`.
    ///
    /// The body is not run when setup fails. A panicking body is resumed
    /// once the teardown completed.
    pub async fn run<T, F>(&mut self, test: F) -> Result<T, DatabaseError>
    where
        F: for<'a> FnOnce(&'a mut Self) -> BoxFuture<'a, T>,
    {
        self.setup().await?;

        let body = AssertUnwindSafe(async { test(&mut *self).await });
        let outcome = body.catch_unwind().await;

        let teardown = self.teardown().await;

        match outcome {
            Ok(value) => teardown.map(|()| value),
            Err(panic) => {
                if let Err(err) = teardown {
                    warn!(error = %err, "Teardown after panicking test failed");
                }

                resume_unwind(panic)
            }
        }
    }

    fn ensure_running(&self) -> Result<(), DatabaseError> {
        if self.instance.is_running() {
            Ok(())
        } else {
            Err(DatabaseError::DatabaseNotStarted {
                name: self.config.name.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use sqlx::{query, query_scalar};
    use tempfile::tempdir;

    use super::*;
    use crate::config::LogLevel;
    use crate::driver::mock::MockDriver;
    use crate::resource::StaticLoader;

    const USERS_SCRIPT: &str = "CREATE TABLE users (username VARCHAR(50));\n\
                                INSERT INTO users VALUES ('tricia');\n";

    fn users_fixture(name: &str) -> Fixture {
        Fixture::new(
            FixtureConfig::new(name).with_script(ScriptConfig::new("/users.sql")),
            StaticLoader::new().with("users.sql", USERS_SCRIPT),
        )
    }

    async fn count_users(conn: &mut Session) -> i64 {
        query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&mut **conn)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_connection_before_setup_is_not_started() {
        let mut fixture = users_fixture("fixture-unstarted");

        let err = fixture.connection().await.unwrap_err();

        assert!(matches!(
            err,
            DatabaseError::DatabaseNotStarted { ref name } if name == "fixture-unstarted"
        ));
    }

    #[tokio::test]
    async fn test_create_connection_before_setup_is_not_started() {
        let fixture = users_fixture("fixture-unstarted-owned");

        let err = fixture.create_connection().await.unwrap_err();

        assert!(matches!(err, DatabaseError::DatabaseNotStarted { .. }));
    }

    #[tokio::test]
    async fn test_setup_loads_script() {
        let mut fixture = users_fixture("fixture-setup");

        fixture.setup().await.unwrap();

        let mut conn = fixture.create_connection().await.unwrap();
        assert_eq!(count_users(&mut conn).await, 1);
        assert!(fixture.instance().is_running());
    }

    #[tokio::test]
    async fn test_setup_without_script_starts_empty_database() {
        let mut fixture = Fixture::new(
            FixtureConfig::new("fixture-no-script"),
            StaticLoader::new(),
        );

        fixture.setup().await.unwrap();

        let tables: i64 = query_scalar("SELECT COUNT(*) FROM sqlite_master")
            .fetch_one(&mut **fixture.connection().await.unwrap())
            .await
            .unwrap();
        assert_eq!(tables, 0);
    }

    #[tokio::test]
    async fn test_shared_connection_is_reused() {
        let mut fixture = users_fixture("fixture-shared");
        fixture.setup().await.unwrap();

        query("CREATE TEMP TABLE marker (x INTEGER)")
            .execute(&mut **fixture.connection().await.unwrap())
            .await
            .unwrap();

        let markers: i64 = query_scalar(
            "SELECT COUNT(*) FROM sqlite_temp_master WHERE name = 'marker'",
        )
        .fetch_one(&mut **fixture.connection().await.unwrap())
        .await
        .unwrap();

        assert_eq!(markers, 1);
    }

    #[tokio::test]
    async fn test_teardown_stops_database_and_drops_connection() {
        let mut fixture = users_fixture("fixture-teardown");
        fixture.setup().await.unwrap();
        fixture.connection().await.unwrap();

        fixture.teardown().await.unwrap();

        assert!(!fixture.instance().is_running());
        assert!(matches!(
            fixture.connection().await.unwrap_err(),
            DatabaseError::DatabaseNotStarted { .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_script_shuts_database_down() {
        let mut fixture = Fixture::new(
            FixtureConfig::new("fixture-missing")
                .with_script(ScriptConfig::new("/missing.sql")),
            StaticLoader::new(),
        );

        let err = fixture.setup().await.unwrap_err();

        assert!(matches!(err, DatabaseError::ScriptNotFound { .. }));
        assert!(!fixture.instance().is_running());
    }

    #[tokio::test]
    async fn test_run_returns_body_result_and_tears_down() {
        let mut fixture = users_fixture("fixture-run");

        let count = fixture
            .run(|fixture| {
                Box::pin(async move {
                    count_users(fixture.connection().await.unwrap()).await
                })
            })
            .await
            .unwrap();

        assert_eq!(count, 1);
        assert!(!fixture.instance().is_running());
    }

    #[tokio::test]
    async fn test_run_tears_down_after_panic() {
        let mut fixture = users_fixture("fixture-panic");

        let run = fixture.run::<(), _>(|_| {
            Box::pin(async move {
                panic!("assertion failed in test body");
            })
        });
        let outcome = AssertUnwindSafe(run).catch_unwind().await;

        assert!(outcome.is_err());
        assert!(!fixture.instance().is_running());
    }

    #[tokio::test]
    async fn test_run_skips_body_when_setup_fails() {
        let driver = Arc::new(MockDriver::new_load_failure());
        let mut fixture = Fixture::with_driver(
            FixtureConfig::new("fixture-no-driver"),
            StaticLoader::new(),
            driver.clone(),
        );

        let result = fixture.run(|_| Box::pin(async move { true })).await;

        assert!(matches!(result, Err(DatabaseError::DriverUnavailable { .. })));
        assert!(driver.urls().is_empty());
    }

    #[tokio::test]
    async fn test_run_reports_teardown_failure() {
        let mut fixture = Fixture::with_driver(
            FixtureConfig::new("fixture-bad-drop"),
            StaticLoader::new(),
            Arc::new(MockDriver::new_drop_failure()),
        );

        let result = fixture.run(|_| Box::pin(async move {})).await;

        assert!(matches!(result, Err(DatabaseError::ShutdownFailed { .. })));
        assert!(!fixture.instance().is_running());
    }

    #[tokio::test]
    async fn test_from_config_resolves_scripts_below_root() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("users.sql"), USERS_SCRIPT).unwrap();
        let config = Config {
            database_name: "fixture-from-config".into(),
            script_root: dir.path().to_path_buf(),
            log_level: LogLevel::Info,
        };

        let mut fixture =
            Fixture::from_config(&config, Some(ScriptConfig::new("/users.sql")));
        fixture.setup().await.unwrap();

        assert_eq!(fixture.config().name, "fixture-from-config");
        assert_eq!(count_users(fixture.connection().await.unwrap()).await, 1);

        fixture.teardown().await.unwrap();
    }
}
