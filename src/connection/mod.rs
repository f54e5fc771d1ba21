// Connection module - worker-thread ownership of engine connections.
//
// - channel: command enum crossing from async callers to the worker
// - worker: the thread owning the rusqlite connection + dispatcher
// - pragmas: pragma profiles applied on open
// - prepared: reusable prepared-statement handles

mod channel;
mod pragmas;
mod prepared;
mod worker;

pub use pragmas::PragmaProfile;
pub use prepared::PreparedStatement;

use std::fmt;
use std::sync::Arc;

use crate::codec::encode_params;
use crate::error::DbError;
use crate::results::ResultSet;
use crate::types::DbValue;

use channel::Command;
use worker::Worker;

/// Owned handle to a SQLite connection backed by a dedicated worker thread.
///
/// Cloning is cheap; all clones talk to the same worker. The connection
/// closes when the last clone drops (or explicitly via the pool/manager).
#[derive(Clone)]
pub struct DbConnection {
    worker: Arc<Worker>,
    path: Arc<String>,
}

impl DbConnection {
    /// Open a database file (or `:memory:`) and apply the pragma profile.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the worker thread cannot be spawned, the file
    /// cannot be opened, or a pragma fails to apply.
    pub async fn open(path: &str, profile: PragmaProfile) -> Result<Self, DbError> {
        let worker = Worker::spawn(path.to_owned(), profile).await?;
        Ok(Self {
            worker: Arc::new(worker),
            path: Arc::new(path.to_owned()),
        })
    }

    /// The path this connection was opened with.
    #[must_use]
    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    /// Execute a batch of SQL statements inside one transaction.
    ///
    /// # Errors
    ///
    /// Propagates any [`DbError`] from the worker.
    pub async fn execute_batch(&self, sql: impl Into<String>) -> Result<(), DbError> {
        let sql = sql.into();
        self.worker
            .request(
                |respond_to| Command::ExecuteBatch { sql, respond_to },
                "worker dropped while executing batch",
            )
            .await
    }

    /// Execute a query and return its result set.
    ///
    /// # Errors
    ///
    /// Propagates any [`DbError`] from the worker.
    pub async fn select(
        &self,
        sql: impl Into<String>,
        params: &[DbValue],
    ) -> Result<ResultSet, DbError> {
        self.select_prepared(Arc::new(sql.into()), params).await
    }

    /// Execute a DML statement and return the affected row count.
    ///
    /// # Errors
    ///
    /// Propagates any [`DbError`] from the worker.
    pub async fn execute(
        &self,
        sql: impl Into<String>,
        params: &[DbValue],
    ) -> Result<usize, DbError> {
        self.dml_prepared(Arc::new(sql.into()), params).await
    }

    /// Execute an INSERT and return the inserted row id.
    ///
    /// # Errors
    ///
    /// Propagates any [`DbError`] from the worker.
    pub async fn insert_returning_rowid(
        &self,
        sql: impl Into<String>,
        params: &[DbValue],
    ) -> Result<i64, DbError> {
        let sql = Arc::new(sql.into());
        let params = encode_params(params);
        self.worker
            .request(
                |respond_to| Command::ExecuteInsert {
                    sql,
                    params,
                    respond_to,
                },
                "worker dropped while executing insert",
            )
            .await
    }

    /// Prepare (and cache) a statement, returning a reusable handle.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the statement fails to compile.
    pub async fn prepare_statement(&self, sql: &str) -> Result<PreparedStatement, DbError> {
        let sql_arc = Arc::new(sql.to_owned());
        let warm = Arc::clone(&sql_arc);
        self.worker
            .request(
                |respond_to| Command::PrepareStatement {
                    sql: warm,
                    respond_to,
                },
                "worker dropped while preparing statement",
            )
            .await?;
        Ok(PreparedStatement::new(self.clone(), sql_arc))
    }

    /// Run synchronous `rusqlite` logic on the worker-owned connection.
    ///
    /// This is the escape hatch the lifecycle operations (backup, restore,
    /// merge) are built on.
    ///
    /// # Errors
    ///
    /// Propagates any [`DbError`] raised by the callback or the channel.
    pub async fn with_connection<F, R>(&self, func: F) -> Result<R, DbError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, DbError> + Send + 'static,
        R: Send + 'static,
    {
        self.worker.with_connection(func).await
    }

    pub(crate) async fn select_prepared(
        &self,
        sql: Arc<String>,
        params: &[DbValue],
    ) -> Result<ResultSet, DbError> {
        let params = encode_params(params);
        self.worker
            .request(
                |respond_to| Command::ExecuteSelect {
                    sql,
                    params,
                    respond_to,
                },
                "worker dropped while executing select",
            )
            .await
    }

    pub(crate) async fn dml_prepared(
        &self,
        sql: Arc<String>,
        params: &[DbValue],
    ) -> Result<usize, DbError> {
        let params = encode_params(params);
        self.worker
            .request(
                |respond_to| Command::ExecuteDml {
                    sql,
                    params,
                    respond_to,
                },
                "worker dropped while executing dml",
            )
            .await
    }
}

impl fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConnection")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
