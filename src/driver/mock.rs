use async_trait::async_trait;
use sqlite_script::Session;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Driver, DriverError, SqliteMemoryDriver};
use crate::url::{ConnectionUrl, Directive};

#[derive(Debug)]
enum MockBehavior {
    Success,
    LoadFailure,
    ProvisioningFailure,
    DropFailure,
}

/// Driver double backed by a real [`SqliteMemoryDriver`] with injectable
/// failures.
#[derive(Debug)]
pub(crate) struct MockDriver {
    behavior: MockBehavior,
    inner: SqliteMemoryDriver,
    load_count: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl MockDriver {
    fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            inner: SqliteMemoryDriver::new(),
            load_count: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn new_success() -> Self {
        Self::with_behavior(MockBehavior::Success)
    }

    pub(crate) fn new_load_failure() -> Self {
        Self::with_behavior(MockBehavior::LoadFailure)
    }

    pub(crate) fn new_provisioning_failure() -> Self {
        Self::with_behavior(MockBehavior::ProvisioningFailure)
    }

    /// Drops the database but reports a generic engine failure instead of
    /// the shutdown sentinel.
    pub(crate) fn new_drop_failure() -> Self {
        Self::with_behavior(MockBehavior::DropFailure)
    }

    pub(crate) fn load_count(&self) -> usize {
        self.load_count.load(Ordering::Relaxed)
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &str {
        "mock"
    }

    fn engine(&self) -> &str {
        self.inner.engine()
    }

    async fn load(&self) -> Result<(), DriverError> {
        self.load_count.fetch_add(1, Ordering::Relaxed);

        match self.behavior {
            MockBehavior::LoadFailure => Err(DriverError::Engine(
                sqlx::Error::Configuration("engine library missing".into()),
            )),
            _ => self.inner.load().await,
        }
    }

    async fn connect(
        &self,
        url: &ConnectionUrl,
    ) -> Result<Session, DriverError> {
        self.urls.lock().unwrap().push(url.to_string());

        match (&self.behavior, url.directive()) {
            (MockBehavior::ProvisioningFailure, Some(Directive::Create)) => {
                Err(DriverError::Engine(sqlx::Error::Protocol(
                    "out of memory".into(),
                )))
            }
            (MockBehavior::DropFailure, Some(Directive::Drop)) => {
                let _ = self.inner.connect(url).await;
                Err(DriverError::Engine(sqlx::Error::Protocol(
                    "disk I/O error".into(),
                )))
            }
            _ => self.inner.connect(url).await,
        }
    }
}
