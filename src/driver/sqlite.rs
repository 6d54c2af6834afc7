use async_trait::async_trait;
use sqlite_script::Session;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{Connection, query_scalar};
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Driver, DriverError};
use crate::url::{ConnectionUrl, Directive};

const DRIVER_NAME: &str = "sqlx::sqlite::memory";
const ENGINE: &str = "sqlite";

static GENERATION: AtomicU64 = AtomicU64::new(0);

/// Keeps a provisioned database alive. SQLite frees an in-memory database
/// together with its last connection.
struct Anchor {
    generation: u64,
    connection: SqliteConnection,
}

/// Named in-memory SQLite databases with shared cache.
#[derive(Default)]
pub struct SqliteMemoryDriver {
    databases: Mutex<HashMap<String, Anchor>>,
}

impl Debug for SqliteMemoryDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteMemoryDriver").finish_non_exhaustive()
    }
}

impl SqliteMemoryDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn options(
        name: &str,
        generation: u64,
    ) -> Result<SqliteConnectOptions, DriverError> {
        let uri =
            format!("sqlite:file:{name}-{generation}?mode=memory&cache=shared");
        let options: SqliteConnectOptions = uri.parse()?;
        Ok(options.create_if_missing(true))
    }

    async fn provision(&self, name: &str) -> Result<Session, DriverError> {
        let mut databases = self.databases.lock().await;

        let generation = if let Some(anchor) = databases.get(name) {
            debug!(name, generation = anchor.generation, "Reusing database");
            anchor.generation
        } else {
            let generation = GENERATION.fetch_add(1, Ordering::Relaxed);
            let options = Self::options(name, generation)?;
            let connection = SqliteConnection::connect_with(&options).await?;

            databases
                .insert(name.to_string(), Anchor { generation, connection });

            info!(name, generation, "Provisioned in-memory database");
            generation
        };

        let options = Self::options(name, generation)?;
        Ok(Session::connect_with(&options).await?)
    }

    async fn open(&self, name: &str) -> Result<Session, DriverError> {
        let databases = self.databases.lock().await;

        let anchor = databases
            .get(name)
            .ok_or_else(|| DriverError::NotFound { name: name.to_string() })?;

        let options = Self::options(name, anchor.generation)?;
        let session = Session::connect_with(&options).await?;

        debug!(name, generation = anchor.generation, "Opened connection");
        Ok(session)
    }

    async fn drop_database(&self, name: &str) -> Result<Session, DriverError> {
        let anchor = self
            .databases
            .lock()
            .await
            .remove(name)
            .ok_or_else(|| DriverError::NotFound { name: name.to_string() })?;

        let generation = anchor.generation;
        anchor.connection.close().await?;

        info!(name, generation, "Dropped in-memory database");
        Err(DriverError::ShutdownComplete { name: name.to_string() })
    }
}

fn validate_name(name: &str) -> Result<(), DriverError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if valid {
        Ok(())
    } else {
        Err(DriverError::InvalidName { name: name.to_string() })
    }
}

#[async_trait]
impl Driver for SqliteMemoryDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn engine(&self) -> &str {
        ENGINE
    }

    async fn load(&self) -> Result<(), DriverError> {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await?;
        let version: String =
            query_scalar("SELECT sqlite_version()").fetch_one(&mut conn).await?;
        conn.close().await?;

        debug!(version, "SQLite engine available");
        Ok(())
    }

    async fn connect(
        &self,
        url: &ConnectionUrl,
    ) -> Result<Session, DriverError> {
        if url.engine() != ENGINE {
            return Err(DriverError::Engine(sqlx::Error::Configuration(
                format!("unsupported engine `{}` in {url}", url.engine())
                    .into(),
            )));
        }

        let name = url.name();
        validate_name(name)?;

        match url.directive() {
            Some(Directive::Create) => self.provision(name).await,
            Some(Directive::Drop) => self.drop_database(name).await,
            None => self.open(name).await,
        }
    }
}
