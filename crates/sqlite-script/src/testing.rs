use async_trait::async_trait;
use sqlx::sqlite::SqliteConnectOptions;

use crate::session::{ResultSet, ScriptConnection, Session};

/// Opens a session on a private in-memory SQLite database
///
/// # Errors
///
/// Returns an error if the database connection fails
pub async fn open_test_session() -> Result<Session, sqlx::Error> {
    let options: SqliteConnectOptions = "sqlite::memory:".parse()?;
    Session::connect_with(&options).await
}

/// A call observed by [`RecordingConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SetAutoCommit(bool),
    Execute(String),
    CloseStatement,
    Commit,
    Rollback,
}

/// Connection double that records every call made by the executor.
///
/// Statements never produce rows. Failures can be injected per statement
/// (by substring), for statement-handle closing and for commits.
#[derive(Debug)]
pub struct RecordingConnection {
    auto_commit: bool,
    honour_auto_commit: bool,
    fail_on: Option<String>,
    fail_close: bool,
    fail_commit: bool,
    calls: Vec<Call>,
}

impl Default for RecordingConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingConnection {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            auto_commit: true,
            honour_auto_commit: true,
            fail_on: None,
            fail_close: false,
            fail_commit: false,
            calls: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    /// Records auto-commit changes without applying them.
    #[must_use]
    pub const fn ignoring_auto_commit_changes(mut self) -> Self {
        self.honour_auto_commit = false;
        self
    }

    /// Fails every statement containing `fragment`.
    #[must_use]
    pub fn failing_on(mut self, fragment: impl Into<String>) -> Self {
        self.fail_on = Some(fragment.into());
        self
    }

    #[must_use]
    pub const fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    #[must_use]
    pub const fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.calls.clone()
    }

    /// Statements passed to `execute`, in order, including failed ones.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Execute(statement) => Some(statement.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ScriptConnection for RecordingConnection {
    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    async fn set_auto_commit(
        &mut self,
        auto_commit: bool,
    ) -> Result<(), sqlx::Error> {
        self.calls.push(Call::SetAutoCommit(auto_commit));

        if self.honour_auto_commit {
            self.auto_commit = auto_commit;
        }

        Ok(())
    }

    async fn execute(
        &mut self,
        statement: &str,
    ) -> Result<Option<ResultSet>, sqlx::Error> {
        self.calls.push(Call::Execute(statement.to_string()));

        match &self.fail_on {
            Some(fragment) if statement.contains(fragment.as_str()) => {
                Err(sqlx::Error::Protocol(format!("rejected: {statement}")))
            }
            _ => Ok(None),
        }
    }

    async fn close_statement(&mut self) -> Result<(), sqlx::Error> {
        self.calls.push(Call::CloseStatement);

        if self.fail_close {
            return Err(sqlx::Error::Protocol("statement already closed".into()));
        }

        Ok(())
    }

    async fn commit(&mut self) -> Result<(), sqlx::Error> {
        self.calls.push(Call::Commit);

        if self.fail_commit {
            return Err(sqlx::Error::Protocol("commit rejected".into()));
        }

        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        self.calls.push(Call::Rollback);
        Ok(())
    }
}
