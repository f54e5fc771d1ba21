// Table module - the per-table facade over one connection and one schema.
//
// - crud lives here (select/insert/update/delete/count and friends)
// - bulk: chunked bulk insert and upsert
// - query: distinct, aggregation, pagination, raw queries, index DDL
// - transfer: JSON export/import and table-to-table sync
// - stats: per-table statistics

mod bulk;
mod query;
pub(crate) mod stats;
mod transfer;

pub use bulk::DEFAULT_BATCH_SIZE;
pub use query::{AggregateFunction, OrderBy, Page, SortDirection};
pub use stats::{ColumnStat, TableStats};
pub use transfer::{ExportOptions, ImportOptions, ImportReport, SyncOptions, SyncReport, SyncStrategy};

use std::sync::Arc;

use crate::connection::DbConnection;
use crate::codec::{decode_result_set, encode_value};
use crate::error::DbError;
use crate::predicate::{CompiledPredicate, Predicate, require_predicate};
use crate::results::{ResultSet, Row};
use crate::retry::with_locked_retry;
use crate::schema::project::{validate_insert_row, validate_update_values};
use crate::schema::table::TableSchema;
use crate::types::DbValue;

/// Options for [`Table::select`].
#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    /// Row filter; `None` selects everything.
    pub filter: Option<Predicate>,
    /// Columns to return; empty means `*`.
    pub columns: Vec<String>,
    pub limit: Option<i64>,
    pub skip: Option<i64>,
}

impl SelectOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = Some(predicate);
        self
    }

    #[must_use]
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }
}

/// The per-table object exposing CRUD and higher-order operations.
///
/// A `Table` borrows the manager's connection and schema and owns no mutable
/// state; it is cheap to clone and safe to keep around.
#[derive(Clone)]
pub struct Table {
    pub(crate) schema: Arc<TableSchema>,
    pub(crate) conn: DbConnection,
}

impl Table {
    pub(crate) fn new(conn: DbConnection, schema: Arc<TableSchema>) -> Self {
        Self { schema, conn }
    }

    /// The table's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// The table's schema descriptor.
    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Select rows matching the options.
    ///
    /// An empty column list selects `*`; an empty `OR` disjunction in the
    /// filter short-circuits to no rows without touching the engine.
    ///
    /// # Errors
    ///
    /// `DbError::InvalidArgument` on a negative limit/skip or an unknown
    /// column; engine errors otherwise.
    pub async fn select(&self, options: SelectOptions) -> Result<Vec<Row>, DbError> {
        if let Some(limit) = options.limit
            && limit < 0
        {
            return Err(DbError::InvalidArgument("limit cannot be negative".into()));
        }
        if let Some(skip) = options.skip
            && skip < 0
        {
            return Err(DbError::InvalidArgument("skip cannot be negative".into()));
        }
        let Some(compiled) = self.compile_filter(options.filter.as_ref())? else {
            return Ok(Vec::new());
        };

        let mut sql = format!(
            "SELECT {} FROM {}{}",
            self.column_list(&options.columns)?,
            self.schema.name,
            compiled.where_clause
        );
        append_limits(&mut sql, options.limit, options.skip);

        let result = self.run_select(sql, compiled.params).await?;
        Ok(decode_result_set(&self.schema, result))
    }

    /// Insert rows under a single transaction, reusing one prepared
    /// statement per distinct column set.
    ///
    /// # Errors
    ///
    /// `DbError::InvalidArgument` when `rows` is empty or a row fails
    /// insert-shape validation; engine errors otherwise.
    pub async fn insert(&self, rows: &[Row]) -> Result<usize, DbError> {
        if rows.is_empty() {
            return Err(DbError::InvalidArgument("insert requires at least one row".into()));
        }
        for row in rows {
            validate_insert_row(&self.schema, row)?;
        }
        let statements: Vec<(String, Vec<rusqlite::types::Value>)> = rows
            .iter()
            .map(|row| self.insert_statement(row))
            .collect();

        self.run_in_worker(move || {
            let statements = statements.clone();
            move |conn: &mut rusqlite::Connection| {
                let tx = conn.transaction()?;
                for (sql, params) in &statements {
                    let mut stmt = tx.prepare_cached(sql)?;
                    let refs: Vec<&dyn rusqlite::ToSql> =
                        params.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
                    stmt.execute(&refs[..])?;
                }
                tx.commit()?;
                Ok(statements.len())
            }
        })
        .await
    }

    /// Update rows matching the predicate.
    ///
    /// # Errors
    ///
    /// `DbError::MissingPredicate` without a meaningful filter;
    /// `DbError::InvalidArgument` when `values` is empty or fails
    /// validation.
    pub async fn update(&self, filter: &Predicate, values: &Row) -> Result<usize, DbError> {
        require_predicate(filter)?;
        if values.is_empty() {
            return Err(DbError::InvalidArgument("update values are empty".into()));
        }
        validate_update_values(&self.schema, values)?;
        if filter.is_identity_false() {
            return Ok(0);
        }
        let compiled = filter.compile()?;

        let assignments: Vec<String> = values.keys().map(|name| format!("{name} = ?")).collect();
        let sql = format!(
            "UPDATE {} SET {}{}",
            self.schema.name,
            assignments.join(", "),
            compiled.where_clause
        );
        let mut params: Vec<DbValue> = values.values().cloned().collect();
        params.extend(compiled.params);

        self.run_execute(sql, params).await
    }

    /// Delete rows matching the predicate.
    ///
    /// # Errors
    ///
    /// `DbError::MissingPredicate` without a meaningful filter.
    pub async fn delete(&self, filter: &Predicate) -> Result<usize, DbError> {
        require_predicate(filter)?;
        if filter.is_identity_false() {
            return Ok(0);
        }
        let compiled = filter.compile()?;
        let sql = format!("DELETE FROM {}{}", self.schema.name, compiled.where_clause);
        self.run_execute(sql, compiled.params).await
    }

    /// Count rows matching the filter.
    ///
    /// # Errors
    ///
    /// Engine errors only.
    pub async fn count(&self, filter: Option<&Predicate>) -> Result<i64, DbError> {
        let Some(compiled) = self.compile_filter(filter)? else {
            return Ok(0);
        };
        let sql = format!(
            "SELECT COUNT(*) AS cnt FROM {}{}",
            self.schema.name, compiled.where_clause
        );
        let result = self.run_select(sql, compiled.params).await?;
        Ok(result
            .first()
            .and_then(|row| row.get("cnt"))
            .and_then(DbValue::as_int)
            .unwrap_or(0))
    }

    /// First row matching the options, if any.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Table::select`].
    pub async fn find_first(&self, options: SelectOptions) -> Result<Option<Row>, DbError> {
        let mut options = options;
        options.limit = Some(1);
        let mut rows = self.select(options).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// Whether any row matches the filter.
    ///
    /// # Errors
    ///
    /// Engine errors only.
    pub async fn exists(&self, filter: Option<&Predicate>) -> Result<bool, DbError> {
        let Some(compiled) = self.compile_filter(filter)? else {
            return Ok(false);
        };
        let sql = format!(
            "SELECT 1 FROM {}{} LIMIT 1",
            self.schema.name, compiled.where_clause
        );
        let result = self.run_select(sql, compiled.params).await?;
        Ok(!result.is_empty())
    }

    /// Compile an optional filter. `Ok(None)` signals the identity-false
    /// short-circuit: the operation must return its empty result without
    /// executing SQL.
    pub(crate) fn compile_filter(
        &self,
        filter: Option<&Predicate>,
    ) -> Result<Option<CompiledPredicate>, DbError> {
        match filter {
            None => Ok(Some(CompiledPredicate::empty())),
            Some(predicate) if predicate.is_identity_false() => Ok(None),
            Some(predicate) => Ok(Some(predicate.compile()?)),
        }
    }

    pub(crate) fn column_list(&self, columns: &[String]) -> Result<String, DbError> {
        if columns.is_empty() {
            return Ok("*".to_string());
        }
        for name in columns {
            if self.schema.find_column(name).is_none() {
                return Err(DbError::InvalidArgument(format!(
                    "table '{}' has no column '{name}'",
                    self.schema.name
                )));
            }
        }
        Ok(columns.join(", "))
    }

    /// Build one parameterized INSERT for a validated row.
    pub(crate) fn insert_statement(&self, row: &Row) -> (String, Vec<rusqlite::types::Value>) {
        let columns: Vec<&str> = row.keys().map(String::as_str).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.schema.name,
            columns.join(", "),
            placeholders
        );
        let params = row.values().map(encode_value).collect();
        (sql, params)
    }

    pub(crate) async fn run_select(
        &self,
        sql: String,
        params: Vec<DbValue>,
    ) -> Result<ResultSet, DbError> {
        let conn = self.conn.clone();
        let sql = Arc::new(sql);
        with_locked_retry(move || {
            let conn = conn.clone();
            let sql = Arc::clone(&sql);
            let params = params.clone();
            async move { conn.select_prepared(sql, &params).await }
        })
        .await
    }

    pub(crate) async fn run_execute(
        &self,
        sql: String,
        params: Vec<DbValue>,
    ) -> Result<usize, DbError> {
        let conn = self.conn.clone();
        let sql = Arc::new(sql);
        with_locked_retry(move || {
            let conn = conn.clone();
            let sql = Arc::clone(&sql);
            let params = params.clone();
            async move { conn.dml_prepared(sql, &params).await }
        })
        .await
    }

    /// Run a synchronous worker callback with locked-database retry; the
    /// factory rebuilds the callback for each attempt.
    pub(crate) async fn run_in_worker<T, F>(
        &self,
        build: impl Fn() -> F,
    ) -> Result<T, DbError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<T, DbError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        with_locked_retry(move || {
            let conn = conn.clone();
            let callback = build();
            async move { conn.with_connection(callback).await }
        })
        .await
    }
}

pub(crate) fn append_limits(sql: &mut String, limit: Option<i64>, skip: Option<i64>) {
    use std::fmt::Write;
    match (limit, skip) {
        (Some(limit), Some(skip)) => {
            let _ = write!(sql, " LIMIT {limit} OFFSET {skip}");
        }
        (Some(limit), None) => {
            let _ = write!(sql, " LIMIT {limit}");
        }
        // The engine requires LIMIT before OFFSET; -1 means unbounded.
        (None, Some(skip)) => {
            let _ = write!(sql, " LIMIT -1 OFFSET {skip}");
        }
        (None, None) => {}
    }
}
