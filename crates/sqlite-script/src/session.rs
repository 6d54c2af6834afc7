use std::ops::{Deref, DerefMut};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Row};
use tracing::debug;

/// Connection surface a script is executed against.
///
/// The small part of a database connection the executor needs:
/// an auto-commit flag, statement execution, and explicit transaction
/// control. [`Session`] is the SQLite implementation; tests use
/// [`crate::testing::RecordingConnection`].
#[async_trait]
pub trait ScriptConnection: Send {
    /// Returns `true` when every statement is committed as it completes.
    fn auto_commit(&self) -> bool;

    /// Switches auto-commit mode.
    ///
    /// Turning auto-commit on while a transaction is open commits it.
    async fn set_auto_commit(
        &mut self,
        auto_commit: bool,
    ) -> Result<(), sqlx::Error>;

    /// Executes one statement.
    ///
    /// Returns the produced rows when the statement yielded any.
    async fn execute(
        &mut self,
        statement: &str,
    ) -> Result<Option<ResultSet>, sqlx::Error>;

    /// Releases the handle of the most recently executed statement.
    async fn close_statement(&mut self) -> Result<(), sqlx::Error> {
        Ok(())
    }

    /// Commits the open transaction, if any.
    async fn commit(&mut self) -> Result<(), sqlx::Error>;

    /// Rolls back the open transaction, if any.
    async fn rollback(&mut self) -> Result<(), sqlx::Error>;
}

/// Rows returned by a statement, rendered for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ResultSet {
    fn from_rows(rows: &[SqliteRow]) -> Option<Self> {
        let first = rows.first()?;

        let columns =
            first.columns().iter().map(|column| column.name().to_string());

        Some(Self {
            columns: columns.collect(),
            rows: rows.iter().map(render_row).collect(),
        })
    }
}

/// A caller-owned SQLite connection with an emulated auto-commit flag.
///
/// SQLite itself is always in auto-commit mode until a `BEGIN` is issued.
/// With auto-commit switched off, the session opens a transaction lazily
/// before every statement that finds the engine outside of one, and keeps
/// it open until [`commit`] or [`rollback`]. Statements may end or open
/// transactions on their own; the engine's answer to `BEGIN`, `COMMIT` and
/// `ROLLBACK` decides whether one is pending.
///
/// The session dereferences to [`SqliteConnection`], so ordinary `sqlx`
/// queries work against it:
///
/// ```ignore
/// let name: String = sqlx::query_scalar("SELECT username FROM users")
///     .fetch_one(&mut *session)
///     .await?;
/// ```
///
/// [`commit`]: ScriptConnection::commit
/// [`rollback`]: ScriptConnection::rollback
#[derive(Debug)]
pub struct Session {
    conn: SqliteConnection,
    auto_commit: bool,
    in_transaction: bool,
}

impl Session {
    #[must_use]
    pub const fn new(conn: SqliteConnection) -> Self {
        Self { conn, auto_commit: true, in_transaction: false }
    }

    /// Opens a new connection with the given options.
    pub async fn connect_with(
        options: &SqliteConnectOptions,
    ) -> Result<Self, sqlx::Error> {
        let conn = SqliteConnection::connect_with(options).await?;
        Ok(Self::new(conn))
    }

    /// Returns `true` while a transaction is known to be pending.
    ///
    /// Reflects the engine's state as of the last transaction control
    /// statement issued by the session.
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Closes the underlying connection.
    ///
    /// A pending transaction is discarded by the engine.
    pub async fn close(self) -> Result<(), sqlx::Error> {
        if self.in_transaction {
            debug!("Closing session with a pending transaction");
        }

        self.conn.close().await
    }

    async fn begin_if_needed(&mut self) -> Result<(), sqlx::Error> {
        if self.auto_commit {
            return Ok(());
        }

        match sqlx::query("BEGIN").execute(&mut self.conn).await {
            Ok(_) => {}
            Err(err) if is_nested_begin(&err) => {}
            Err(err) => return Err(err),
        }

        self.in_transaction = true;
        Ok(())
    }

    /// Runs `COMMIT` or `ROLLBACK`, treating an engine without an active
    /// transaction as already done.
    async fn end_transaction(
        &mut self,
        statement: &str,
    ) -> Result<(), sqlx::Error> {
        match sqlx::query(statement).execute(&mut self.conn).await {
            Ok(_) => Ok(()),
            Err(err) if is_no_transaction(&err) => {
                debug!(statement, "No transaction active");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

impl Deref for Session {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for Session {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

#[async_trait]
impl ScriptConnection for Session {
    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    async fn set_auto_commit(
        &mut self,
        auto_commit: bool,
    ) -> Result<(), sqlx::Error> {
        if auto_commit && !self.auto_commit {
            self.commit().await?;
        }

        self.auto_commit = auto_commit;
        Ok(())
    }

    async fn execute(
        &mut self,
        statement: &str,
    ) -> Result<Option<ResultSet>, sqlx::Error> {
        self.begin_if_needed().await?;

        let rows = sqlx::query(statement)
            .persistent(false)
            .fetch_all(&mut self.conn)
            .await?;

        Ok(ResultSet::from_rows(&rows))
    }

    async fn commit(&mut self) -> Result<(), sqlx::Error> {
        self.end_transaction("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        // A transaction whose rollback was attempted is never committed later.
        self.in_transaction = false;
        self.end_transaction("ROLLBACK").await
    }
}

fn engine_message(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db) => Some(db.message()),
        _ => None,
    }
}

/// `COMMIT` or `ROLLBACK` issued while SQLite is in auto-commit mode.
fn is_no_transaction(err: &sqlx::Error) -> bool {
    engine_message(err)
        .is_some_and(|message| message.contains("no transaction is active"))
}

/// `BEGIN` issued while a transaction is already open.
fn is_nested_begin(err: &sqlx::Error) -> bool {
    engine_message(err).is_some_and(|message| {
        message.contains("cannot start a transaction within a transaction")
    })
}

fn render_row(row: &SqliteRow) -> Vec<String> {
    (0..row.len()).map(|index| render_value(row, index)).collect()
}

fn render_value(row: &SqliteRow, index: usize) -> String {
    fn or_null<T: ToString>(value: Option<T>) -> String {
        value.map_or_else(|| "NULL".to_string(), |value| value.to_string())
    }

    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return or_null(value);
    }

    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return or_null(value);
    }

    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return or_null(value);
    }

    match row.try_get::<Option<Vec<u8>>, _>(index) {
        Ok(Some(bytes)) => format!("<{} bytes>", bytes.len()),
        Ok(None) => "NULL".to_string(),
        Err(_) => "?".to_string(),
    }
}
