use tracing::info;

use crate::codec::build_result_set;
use crate::error::DbError;
use crate::results::ResultSet;
use crate::schema::export::list_user_tables;
use crate::table::stats::{database_size, total_record_count};
use crate::types::QueryAndParams;

use super::DatabaseManager;

/// Transaction isolation for pooled transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    #[default]
    Deferred,
    Immediate,
    Exclusive,
}

impl IsolationLevel {
    #[must_use]
    fn begin_sql(self) -> &'static str {
        match self {
            IsolationLevel::Deferred => "BEGIN DEFERRED",
            IsolationLevel::Immediate => "BEGIN IMMEDIATE",
            IsolationLevel::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

/// Options for [`DatabaseManager::optimize`].
#[derive(Debug, Clone, Copy)]
pub struct OptimizeOptions {
    pub vacuum: bool,
    pub analyze: bool,
    pub reindex: bool,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            vacuum: true,
            analyze: true,
            reindex: false,
        }
    }
}

/// Per-table entry in the database statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRecordStats {
    pub name: String,
    pub records: u64,
    /// Approximate bytes: the database size apportioned by record share.
    pub size: u64,
}

/// Whole-database statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseStats {
    pub tables: usize,
    pub total_records: u64,
    pub database_size: u64,
    pub table_stats: Vec<TableRecordStats>,
    pub indexes: usize,
}

/// Outcome of an integrity check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl DatabaseManager {
    /// Run a list of SQL statements inside one transaction on the primary
    /// connection; any failure rolls the whole batch back.
    ///
    /// # Errors
    ///
    /// `DbError::NotConnected` after disconnect; the failing statement's
    /// engine error otherwise.
    pub async fn execute_transaction(&self, statements: &[String]) -> Result<(), DbError> {
        let statements = statements.to_vec();
        self.connection()?
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                for sql in &statements {
                    tx.execute_batch(sql)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
    }

    /// Run a list of operations atomically on a pooled connection under the
    /// given isolation level, returning each operation's result in order.
    ///
    /// On failure the transaction rolls back (rollback errors are ignored)
    /// and the original error surfaces.
    ///
    /// # Errors
    ///
    /// `DbError::InvalidArgument` when the pool is not enabled; acquire and
    /// engine errors otherwise.
    pub async fn execute_pooled_transaction(
        &self,
        operations: &[QueryAndParams],
        isolation: IsolationLevel,
    ) -> Result<Vec<ResultSet>, DbError> {
        let pool = self.pool()?;
        let operations = operations.to_vec();

        let guard = pool.acquire().await?;
        let result = guard
            .connection()
            .with_connection(move |conn| {
                conn.execute_batch(isolation.begin_sql())?;
                match run_operations(conn, &operations) {
                    Ok(results) => {
                        conn.execute_batch("COMMIT")?;
                        Ok(results)
                    }
                    Err(err) => {
                        let _ = conn.execute_batch("ROLLBACK");
                        Err(err)
                    }
                }
            })
            .await;
        pool.release(guard).await;
        result
    }

    /// Run `VACUUM`, `ANALYZE`, and `REINDEX` as enabled, in that order.
    ///
    /// # Errors
    ///
    /// `DbError::NotConnected` after disconnect; engine errors otherwise.
    pub async fn optimize(&self, options: OptimizeOptions) -> Result<(), DbError> {
        self.connection()?
            .with_connection(move |conn| {
                if options.vacuum {
                    conn.execute_batch("VACUUM")?;
                }
                if options.analyze {
                    conn.execute_batch("ANALYZE")?;
                }
                if options.reindex {
                    conn.execute_batch("REINDEX")?;
                }
                Ok(())
            })
            .await?;
        info!(path = %self.path(), "database optimized");
        Ok(())
    }

    /// Collect whole-database statistics.
    ///
    /// # Errors
    ///
    /// `DbError::NotConnected` after disconnect; engine errors otherwise.
    pub async fn database_stats(&self) -> Result<DatabaseStats, DbError> {
        self.connection()?
            .with_connection(|conn| {
                let tables = list_user_tables(conn)?;
                let size = database_size(conn)?;
                let total_records = total_record_count(conn)?;

                let mut table_stats = Vec::with_capacity(tables.len());
                for table in &tables {
                    let records: u64 = conn.query_row(
                        &format!("SELECT COUNT(*) FROM {table}"),
                        [],
                        |row| row.get(0),
                    )?;
                    let apportioned = if total_records == 0 {
                        0
                    } else {
                        size * records / total_records
                    };
                    table_stats.push(TableRecordStats {
                        name: table.clone(),
                        records,
                        size: apportioned,
                    });
                }

                let indexes: usize = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index'",
                    [],
                    |row| row.get::<_, i64>(0).map(|v| v.max(0) as usize),
                )?;

                Ok(DatabaseStats {
                    tables: tables.len(),
                    total_records,
                    database_size: size,
                    table_stats,
                    indexes,
                })
            })
            .await
    }

    /// Run `PRAGMA integrity_check`; the database is valid iff the first
    /// row is exactly `ok`.
    ///
    /// # Errors
    ///
    /// `DbError::NotConnected` after disconnect; engine errors otherwise.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, DbError> {
        self.connection()?
            .with_connection(|conn| {
                let mut stmt = conn.prepare("PRAGMA integrity_check")?;
                let findings: Vec<String> = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;

                let is_valid = findings.first().map(String::as_str) == Some("ok");
                Ok(IntegrityReport {
                    is_valid,
                    errors: if is_valid { Vec::new() } else { findings },
                })
            })
            .await
    }
}

fn run_operations(
    conn: &rusqlite::Connection,
    operations: &[QueryAndParams],
) -> Result<Vec<ResultSet>, DbError> {
    let mut results = Vec::with_capacity(operations.len());
    for op in operations {
        let params = crate::codec::encode_params(&op.params);
        let mut stmt = conn.prepare_cached(&op.sql)?;
        if stmt.column_count() > 0 {
            results.push(build_result_set(&mut stmt, &params)?);
        } else {
            let refs: Vec<&dyn rusqlite::ToSql> =
                params.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
            let affected = stmt.execute(&refs[..])?;
            let mut result = ResultSet::default();
            result.rows_affected = affected;
            results.push(result);
        }
    }
    Ok(results)
}
