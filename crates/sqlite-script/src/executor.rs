use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, trace, warn};

use crate::parser::{DEFAULT_DELIMITER, ParsedLine, StatementParser};
use crate::session::{ResultSet, ScriptConnection};

/// Errors that abort a script run
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// The script text could not be read
    #[error("Failed to read script: {0}")]
    Read(#[from] std::io::Error),

    /// A statement was rejected by the database
    #[error("Failed to execute statement `{statement}`: {source}")]
    Statement {
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    /// Switching auto-commit, committing or rolling back failed
    #[error("Transaction control failed: {0}")]
    Transaction(#[source] sqlx::Error),
}

/// Counts collected while running a script
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptSummary {
    pub statements: usize,
    pub comments: usize,
}

/// Splits a SQL script into statements and runs them on a connection.
///
/// The run is transactional in the following sense:
/// - the connection's auto-commit flag is switched to the configured value
///   for the duration of the run and restored afterwards, also on failure;
/// - with auto-commit configured on, every statement is committed as soon
///   as it completes;
/// - with auto-commit configured off, the whole script is committed once
///   the end of the stream is reached;
/// - a rollback is always issued before the run returns. Work committed
///   earlier is unaffected by it.
#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    delimiter: String,
    full_line_delimiter: bool,
    auto_commit: bool,
}

impl ScriptExecutor {
    #[must_use]
    pub fn new(auto_commit: bool) -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
            full_line_delimiter: false,
            auto_commit,
        }
    }

    /// Sets the statement delimiter.
    ///
    /// With `full_line_delimiter`, a statement ends on a line that consists
    /// of the delimiter alone instead of a line ending with it.
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

    #[must_use]
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    #[must_use]
    pub const fn full_line_delimiter(&self) -> bool {
        self.full_line_delimiter
    }

    #[must_use]
    pub const fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    /// Reads the script line by line and executes every statement in it.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError`] for the first failure encountered: reading
    /// the script, executing a statement, or controlling the transaction.
    /// Statements executed before the failure are not undone beyond the
    /// final rollback.
    pub async fn run<C, R>(
        &self,
        conn: &mut C,
        script: R,
    ) -> Result<ScriptSummary, ScriptError>
    where
        C: ScriptConnection + ?Sized,
        R: AsyncBufRead + Unpin + Send,
    {
        let original_auto_commit = conn.auto_commit();

        if original_auto_commit != self.auto_commit {
            conn.set_auto_commit(self.auto_commit)
                .await
                .map_err(ScriptError::Transaction)?;
        }

        let result = self.run_then_rollback(conn, script).await;
        let restored = conn.set_auto_commit(original_auto_commit).await;

        let summary = result?;
        restored.map_err(ScriptError::Transaction)?;

        info!(
            statements = summary.statements,
            comments = summary.comments,
            "Script executed"
        );

        Ok(summary)
    }

    async fn run_then_rollback<C, R>(
        &self,
        conn: &mut C,
        script: R,
    ) -> Result<ScriptSummary, ScriptError>
    where
        C: ScriptConnection + ?Sized,
        R: AsyncBufRead + Unpin + Send,
    {
        let result = self.execute_lines(conn, script).await;
        let rollback = conn.rollback().await;

        let summary = result?;
        rollback.map_err(ScriptError::Transaction)?;
        Ok(summary)
    }

    async fn execute_lines<C, R>(
        &self,
        conn: &mut C,
        script: R,
    ) -> Result<ScriptSummary, ScriptError>
    where
        C: ScriptConnection + ?Sized,
        R: AsyncBufRead + Unpin + Send,
    {
        let mut parser =
            StatementParser::new(self.delimiter.as_str(), self.full_line_delimiter);
        let mut summary = ScriptSummary::default();
        let mut lines = script.lines();

        while let Some(line) = lines.next_line().await? {
            match parser.push_line(&line) {
                ParsedLine::Comment(comment) => {
                    trace!("{comment}");
                    summary.comments += 1;
                }
                ParsedLine::Ignored | ParsedLine::Pending => {}
                ParsedLine::Statement(statement) => {
                    if statement.trim().is_empty() {
                        debug!("Skipping empty statement");
                        continue;
                    }

                    self.execute_statement(conn, &statement).await?;
                    summary.statements += 1;
                }
            }
        }

        if let Some(remainder) = parser.remainder() {
            warn!(
                remainder,
                delimiter = %self.delimiter,
                "Discarding unterminated statement at end of script"
            );
        }

        if !self.auto_commit {
            conn.commit().await.map_err(ScriptError::Transaction)?;
        }

        Ok(summary)
    }

    async fn execute_statement<C>(
        &self,
        conn: &mut C,
        statement: &str,
    ) -> Result<(), ScriptError>
    where
        C: ScriptConnection + ?Sized,
    {
        debug!(statement = statement.trim(), "Executing statement");

        let result_set = match conn.execute(statement).await {
            Ok(result_set) => result_set,
            Err(source) => {
                close_statement(conn).await;
                return Err(ScriptError::Statement {
                    statement: statement.trim().to_string(),
                    source,
                });
            }
        };

        if self.auto_commit && !conn.auto_commit() {
            if let Err(err) = conn.commit().await {
                close_statement(conn).await;
                return Err(ScriptError::Transaction(err));
            }
        }

        if let Some(result_set) = result_set {
            log_result_set(&result_set);
        }

        close_statement(conn).await;
        Ok(())
    }
}

async fn close_statement<C>(conn: &mut C)
where
    C: ScriptConnection + ?Sized,
{
    if let Err(err) = conn.close_statement().await {
        debug!(error = %err, "Ignoring failure to close statement");
    }
}

fn log_result_set(result_set: &ResultSet) {
    trace!("{}", result_set.columns.join("\t"));

    for row in &result_set.rows {
        trace!("{}", row.join("\t"));
    }
}
