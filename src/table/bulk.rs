use crate::error::DbError;
use crate::results::Row;
use crate::schema::project::validate_insert_row;

use super::Table;

/// Default chunk size for bulk inserts and imports.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

impl Table {
    /// Insert rows in chunked transactions, returning each row's inserted
    /// rowid in input order.
    ///
    /// # Errors
    ///
    /// `DbError::InvalidArgument` on an empty row list, a zero batch size,
    /// or a row failing insert-shape validation; engine errors otherwise.
    pub async fn bulk_insert(
        &self,
        rows: &[Row],
        batch_size: usize,
    ) -> Result<Vec<i64>, DbError> {
        if rows.is_empty() {
            return Err(DbError::InvalidArgument(
                "bulk insert requires at least one row".into(),
            ));
        }
        if batch_size == 0 {
            return Err(DbError::InvalidArgument("batch size must be positive".into()));
        }
        for row in rows {
            validate_insert_row(&self.schema, row)?;
        }

        let mut inserted_ids = Vec::with_capacity(rows.len());
        for chunk in rows.chunks(batch_size) {
            let statements: Vec<(String, Vec<rusqlite::types::Value>)> = chunk
                .iter()
                .map(|row| self.insert_statement(row))
                .collect();

            let chunk_ids = self
                .run_in_worker(move || {
                    let statements = statements.clone();
                    move |conn: &mut rusqlite::Connection| {
                        let tx = conn.transaction()?;
                        let mut ids = Vec::with_capacity(statements.len());
                        for (sql, params) in &statements {
                            let mut stmt = tx.prepare_cached(sql)?;
                            let refs: Vec<&dyn rusqlite::ToSql> =
                                params.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
                            stmt.execute(&refs[..])?;
                            ids.push(tx.last_insert_rowid());
                        }
                        tx.commit()?;
                        Ok(ids)
                    }
                })
                .await?;
            inserted_ids.extend(chunk_ids);
        }
        Ok(inserted_ids)
    }

    /// Insert-or-update rows keyed by `conflict_columns`.
    ///
    /// The update list is `update_columns` when given, otherwise every
    /// non-conflict column of each row; each updated column is set from
    /// `excluded.<col>`. An empty update list degrades to `DO NOTHING`.
    ///
    /// The conflict columns must be covered by a unique index; when they are
    /// not, the engine reports the failure as a constraint violation.
    ///
    /// # Errors
    ///
    /// `DbError::InvalidArgument` on empty rows or conflict columns, or a
    /// row failing validation; `DbError::ConstraintViolation` from the
    /// engine otherwise.
    pub async fn upsert(
        &self,
        rows: &[Row],
        conflict_columns: &[&str],
        update_columns: Option<&[&str]>,
    ) -> Result<usize, DbError> {
        if rows.is_empty() {
            return Err(DbError::InvalidArgument(
                "upsert requires at least one row".into(),
            ));
        }
        if conflict_columns.is_empty() {
            return Err(DbError::InvalidArgument(
                "upsert requires at least one conflict column".into(),
            ));
        }
        for column in conflict_columns {
            if self.schema.find_column(column).is_none() {
                return Err(DbError::InvalidArgument(format!(
                    "table '{}' has no column '{column}'",
                    self.schema.name
                )));
            }
        }
        for row in rows {
            validate_insert_row(&self.schema, row)?;
        }

        let statements: Vec<(String, Vec<rusqlite::types::Value>)> = rows
            .iter()
            .map(|row| self.upsert_statement(row, conflict_columns, update_columns))
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

    fn upsert_statement(
        &self,
        row: &Row,
        conflict_columns: &[&str],
        update_columns: Option<&[&str]>,
    ) -> (String, Vec<rusqlite::types::Value>) {
        let (insert_sql, params) = self.insert_statement(row);

        let updates: Vec<String> = match update_columns {
            Some(columns) => columns
                .iter()
                .map(|col| format!("{col} = excluded.{col}"))
                .collect(),
            None => row
                .keys()
                .filter(|col| !conflict_columns.contains(&col.as_str()))
                .map(|col| format!("{col} = excluded.{col}"))
                .collect(),
        };

        let action = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };
        let sql = format!(
            "{insert_sql} ON CONFLICT({}) {action}",
            conflict_columns.join(", ")
        );
        (sql, params)
    }
}
