use encoding_rs::Encoding;
use sqlite_script::{ScriptError, ScriptExecutor, ScriptSummary, Session};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ScriptConfig;
use crate::driver::{Driver, DriverError, ShutdownOutcome, SqliteMemoryDriver};
use crate::error::DatabaseError;
use crate::resource::{ResourceError, ResourceLoader};
use crate::url::{ConnectionUrl, Directive};

/// A named, ephemeral in-memory database.
///
/// The instance owns only the database lifecycle. Connections handed out by
/// [`create_connection`](Self::create_connection) belong to the caller.
///
/// ```text
/// Stopped --start()--> Running --shutdown()--> Stopped
/// ```
#[derive(Debug)]
pub struct DatabaseInstance {
    name: String,
    driver: Arc<dyn Driver>,
    running: bool,
}

impl DatabaseInstance {
    /// Creates a stopped instance backed by [`SqliteMemoryDriver`].
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_driver(name, Arc::new(SqliteMemoryDriver::new()))
    }

    pub fn with_driver(name: impl Into<String>, driver: Arc<dyn Driver>) -> Self {
        Self { name: name.into(), driver, running: false }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the driver implementation.
    #[must_use]
    pub fn driver(&self) -> &str {
        self.driver.name()
    }

    /// Plain connection URL of the database.
    #[must_use]
    pub fn url(&self) -> ConnectionUrl {
        ConnectionUrl::memory(self.driver.engine(), &self.name)
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Loads the driver and provisions an empty database.
    pub async fn start(&mut self) -> Result<(), DatabaseError> {
        self.driver.load().await.map_err(|source| {
            DatabaseError::DriverUnavailable {
                driver: self.driver.name().to_string(),
                source,
            }
        })?;

        let provisioning_failed = |source| DatabaseError::ProvisioningFailed {
            name: self.name.clone(),
            source,
        };

        let url = self.url().with_directive(Directive::Create);
        let session =
            self.driver.connect(&url).await.map_err(provisioning_failed)?;
        session
            .close()
            .await
            .map_err(|err| provisioning_failed(DriverError::Engine(err)))?;

        self.running = true;
        info!(name = %self.name, url = %self.url(), "Database started");

        Ok(())
    }

    /// Drops the database.
    ///
    /// The instance reports itself stopped afterwards even when the drop
    /// fails.
    pub async fn shutdown(&mut self) -> Result<(), DatabaseError> {
        self.running = false;

        let url = self.url().with_directive(Directive::Drop);
        let result = match self.driver.connect(&url).await {
            Ok(session) => session.close().await.map_err(DriverError::from),
            Err(err) => Err(err),
        };

        match ShutdownOutcome::from(result) {
            ShutdownOutcome::Ok => {
                info!(name = %self.name, "Database shut down");
                Ok(())
            }
            ShutdownOutcome::Error { code, cause } => {
                Err(DatabaseError::ShutdownFailed {
                    name: self.name.clone(),
                    code,
                    source: cause,
                })
            }
        }
    }

    /// Opens a new caller-owned connection.
    ///
    /// The running flag is not consulted. On a stopped instance the driver
    /// reports the missing database, surfacing as
    /// [`DatabaseError::ConnectionFailed`].
    pub async fn create_connection(&self) -> Result<Session, DatabaseError> {
        let url = self.url();

        let session = self.driver.connect(&url).await.map_err(|source| {
            DatabaseError::ConnectionFailed { url: url.to_string(), source }
        })?;

        debug!(%url, "Created connection");
        Ok(session)
    }

    /// Runs the script at `path` with the default delimiter settings.
    ///
    /// `encoding` is a WHATWG encoding label such as `UTF-8` or
    /// `ISO-8859-1`. The script runs on a connection of its own, which is
    /// closed before returning.
    pub async fn execute<L>(
        &self,
        loader: &L,
        path: &str,
        encoding: &str,
    ) -> Result<ScriptSummary, DatabaseError>
    where
        L: ResourceLoader + ?Sized,
    {
        self.execute_with(loader, path, encoding, &ScriptExecutor::new(true))
            .await
    }

    /// Like [`execute`](Self::execute), honouring the delimiter settings of
    /// `script`.
    pub async fn execute_script<L>(
        &self,
        loader: &L,
        script: &ScriptConfig,
    ) -> Result<ScriptSummary, DatabaseError>
    where
        L: ResourceLoader + ?Sized,
    {
        self.execute_with(
            loader,
            &script.path,
            &script.encoding,
            &script.executor(),
        )
        .await
    }

    async fn execute_with<L>(
        &self,
        loader: &L,
        path: &str,
        encoding: &str,
        executor: &ScriptExecutor,
    ) -> Result<ScriptSummary, DatabaseError>
    where
        L: ResourceLoader + ?Sized,
    {
        let bytes = loader.resolve(path).await.map_err(|err| match err {
            ResourceError::NotFound { path } => {
                DatabaseError::ScriptNotFound { path }
            }
            ResourceError::Io { source, .. } => {
                DatabaseError::ScriptExecutionFailed(ScriptError::Read(source))
            }
        })?;

        let text = decode(&bytes, encoding, path)?;

        let mut session = self.create_connection().await?;
        let result = executor.run(&mut session, text.as_bytes()).await;

        if let Err(err) = session.close().await {
            warn!(path, error = %err, "Failed to close script connection");
        }

        let summary = result?;
        debug!(path, name = %self.name, "Loaded script");

        Ok(summary)
    }
}

fn decode(
    bytes: &[u8],
    label: &str,
    path: &str,
) -> Result<String, DatabaseError> {
    let encoding = Encoding::for_label(label.as_bytes()).ok_or_else(|| {
        DatabaseError::EncodingUnsupported { encoding: label.to_string() }
    })?;

    let (text, used, had_errors) = encoding.decode(bytes);

    if had_errors {
        warn!(
            path,
            encoding = used.name(),
            "Script contains malformed byte sequences, replaced"
        );
    }

    Ok(text.into_owned())
}
