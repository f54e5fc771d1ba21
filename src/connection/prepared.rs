use std::sync::Arc;

use crate::error::DbError;
use crate::results::ResultSet;
use crate::types::DbValue;

use super::DbConnection;

/// Handle to a prepared statement owned by a worker connection.
///
/// Instances can be cloned and reused across awaited calls; the worker keeps
/// the compiled plan alive through the engine's prepared-statement cache, so
/// repeated executions skip compilation.
#[derive(Clone, Debug)]
pub struct PreparedStatement {
    connection: DbConnection,
    sql: Arc<String>,
}

impl PreparedStatement {
    pub(crate) fn new(connection: DbConnection, sql: Arc<String>) -> Self {
        Self { connection, sql }
    }

    /// Execute as a query and materialize the rows.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the worker fails to execute the statement.
    pub async fn query(&self, params: &[DbValue]) -> Result<ResultSet, DbError> {
        self.connection
            .select_prepared(Arc::clone(&self.sql), params)
            .await
    }

    /// Execute as DML (INSERT/UPDATE/DELETE), returning rows affected.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the worker fails to execute the statement.
    pub async fn execute(&self, params: &[DbValue]) -> Result<usize, DbError> {
        self.connection
            .dml_prepared(Arc::clone(&self.sql), params)
            .await
    }

    /// The raw SQL text of the prepared statement.
    #[must_use]
    pub fn sql(&self) -> &str {
        self.sql.as_str()
    }
}
