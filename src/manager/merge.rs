use std::collections::HashSet;
use std::path::Path;

use tracing::warn;

use crate::codec::value_from_engine;
use crate::error::DbError;
use crate::results::Row;
use crate::schema::export::{introspect_columns, list_user_tables};
use crate::types::ConflictResolution;

use super::DatabaseManager;

/// Decision returned by a row-level merge conflict callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    /// Keep the target's row.
    KeepExisting,
    /// Replace it with the source's row.
    UseNew,
    /// Overlay the source's non-null fields onto the target's row.
    Merge,
}

/// Row-level conflict callback: `(table, existing, incoming) -> choice`.
pub type OnConflict = Box<dyn Fn(&str, &Row, &Row) -> ConflictChoice + Send>;

/// Options for [`DatabaseManager::merge_database`].
#[derive(Default)]
pub struct MergeOptions {
    pub conflict_resolution: ConflictResolution,
    /// Only merge the listed tables when set.
    pub tables_filter: Option<Vec<String>>,
    /// When set, conflicts are resolved row by row through this callback
    /// instead of the bulk `INSERT OR ...` strategy.
    pub on_conflict: Option<OnConflict>,
}

impl std::fmt::Debug for MergeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeOptions")
            .field("conflict_resolution", &self.conflict_resolution)
            .field("tables_filter", &self.tables_filter)
            .field("on_conflict", &self.on_conflict.is_some())
            .finish()
    }
}

/// Outcome of a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Tables copied or merged into the target.
    pub merged_tables: Vec<String>,
    /// Tables skipped after a non-fatal failure.
    pub skipped_tables: Vec<String>,
}

/// One compatible table in a merge-compatibility report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibleTable {
    pub name: String,
    pub compatible_columns: usize,
    pub total_columns: usize,
}

/// Outcome of [`DatabaseManager::analyze_merge_compatibility`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeCompatibility {
    pub compatible_tables: Vec<CompatibleTable>,
    pub incompatible_tables: Vec<String>,
}

impl DatabaseManager {
    /// Merge another database file into this one.
    ///
    /// The source is attached, its (filtered) tables are enumerated, and
    /// each is either created wholesale (`CREATE TABLE ... AS SELECT *`) or
    /// merged into the existing table with `INSERT OR REPLACE|IGNORE|ABORT`
    /// per the conflict policy. The source is always detached, even on
    /// failure.
    ///
    /// # Errors
    ///
    /// `DbError::BackupNotFound` for a missing source;
    /// `DbError::MergeConflict` under the `Fail` policy; engine errors
    /// otherwise. Non-fatal per-table failures under `Replace`/`Ignore` are
    /// logged and reported as skipped.
    pub async fn merge_database(
        &self,
        source_path: &str,
        options: MergeOptions,
    ) -> Result<MergeReport, DbError> {
        if !Path::new(source_path).exists() {
            return Err(DbError::BackupNotFound(source_path.to_string()));
        }

        let source = source_path.to_string();
        self.connection()?
            .with_connection(move |conn| {
                conn.execute("ATTACH DATABASE ?1 AS merge_src", [&source])?;
                let result = merge_attached(conn, &options);
                // Detach regardless of how the merge went.
                let _ = conn.execute_batch("DETACH DATABASE merge_src");
                result
            })
            .await
    }

    /// Compare this database's stored table SQL against another file's.
    ///
    /// Tables whose stored `CREATE TABLE` SQL matches are fully compatible;
    /// tables sharing only part of their columns report the shared count;
    /// tables sharing none are incompatible. Source-only tables are
    /// compatible (they merge as new tables).
    ///
    /// # Errors
    ///
    /// `DbError::BackupNotFound` for a missing source; engine errors
    /// otherwise.
    pub async fn analyze_merge_compatibility(
        &self,
        source_path: &str,
    ) -> Result<MergeCompatibility, DbError> {
        if !Path::new(source_path).exists() {
            return Err(DbError::BackupNotFound(source_path.to_string()));
        }

        let source = source_path.to_string();
        self.connection()?
            .with_connection(move |conn| {
                let other = rusqlite::Connection::open_with_flags(
                    &source,
                    rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
                )
                .map_err(|err| DbError::BackupCorrupt(format!("cannot open source: {err}")))?;

                let mut report = MergeCompatibility::default();
                for table in list_user_tables(&other)? {
                    let source_columns = introspect_columns(&other, &table)?;
                    if !table_exists(conn, &table)? {
                        report.compatible_tables.push(CompatibleTable {
                            name: table,
                            compatible_columns: source_columns.len(),
                            total_columns: source_columns.len(),
                        });
                        continue;
                    }

                    if stored_sql(conn, &table)? == stored_sql(&other, &table)? {
                        report.compatible_tables.push(CompatibleTable {
                            name: table,
                            compatible_columns: source_columns.len(),
                            total_columns: source_columns.len(),
                        });
                        continue;
                    }

                    let target_names: HashSet<String> = introspect_columns(conn, &table)?
                        .into_iter()
                        .map(|c| c.name)
                        .collect();
                    let shared = source_columns
                        .iter()
                        .filter(|c| target_names.contains(&c.name))
                        .count();
                    if shared > 0 {
                        report.compatible_tables.push(CompatibleTable {
                            name: table,
                            compatible_columns: shared,
                            total_columns: source_columns.len(),
                        });
                    } else {
                        report.incompatible_tables.push(table);
                    }
                }
                Ok(report)
            })
            .await
    }
}

fn merge_attached(
    conn: &mut rusqlite::Connection,
    options: &MergeOptions,
) -> Result<MergeReport, DbError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM merge_src.sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let mut tables: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);

    if let Some(filter) = &options.tables_filter {
        tables.retain(|table| filter.contains(table));
    }

    let mut report = MergeReport::default();
    for table in tables {
        let outcome = if table_exists(conn, &table)? {
            match &options.on_conflict {
                Some(callback) => merge_rows_with_callback(conn, &table, callback),
                None => merge_bulk(conn, &table, options.conflict_resolution),
            }
        } else {
            conn.execute_batch(&format!(
                "CREATE TABLE {table} AS SELECT * FROM merge_src.{table}"
            ))
            .map_err(DbError::from)
        };

        match outcome {
            Ok(()) => report.merged_tables.push(table),
            Err(err) => {
                if options.conflict_resolution == ConflictResolution::Fail {
                    return Err(match err {
                        DbError::ConstraintViolation(message) => DbError::MergeConflict {
                            table,
                            message,
                        },
                        other => other,
                    });
                }
                warn!(table = %table, error = %err, "merge: table skipped");
                report.skipped_tables.push(table);
            }
        }
    }
    Ok(report)
}

fn merge_bulk(
    conn: &rusqlite::Connection,
    table: &str,
    resolution: ConflictResolution,
) -> Result<(), DbError> {
    let verb = match resolution {
        ConflictResolution::Replace => "REPLACE",
        ConflictResolution::Ignore => "IGNORE",
        ConflictResolution::Fail => "ABORT",
    };
    conn.execute_batch(&format!(
        "INSERT OR {verb} INTO {table} SELECT * FROM merge_src.{table}"
    ))?;
    Ok(())
}

/// Row-by-row merge consulting the conflict callback: rows whose primary
/// key is absent from the target are inserted; conflicting rows follow the
/// callback's decision.
fn merge_rows_with_callback(
    conn: &mut rusqlite::Connection,
    table: &str,
    callback: &OnConflict,
) -> Result<(), DbError> {
    let columns = introspect_columns(conn, table)?;
    let mut key_columns: Vec<&str> = columns
        .iter()
        .filter(|c| c.pk > 0)
        .map(|c| c.name.as_str())
        .collect();
    if key_columns.is_empty() {
        // Without a key there is nothing to conflict on.
        return merge_bulk(conn, table, ConflictResolution::Replace);
    }
    key_columns.sort_unstable();

    let incoming_rows = read_all_rows(conn, &format!("SELECT * FROM merge_src.{table}"))?;

    let tx = conn.transaction()?;
    for incoming in incoming_rows {
        let key_filter: Vec<(&str, &crate::types::DbValue)> = key_columns
            .iter()
            .filter_map(|name| incoming.get(*name).map(|value| (*name, value)))
            .collect();
        if key_filter.len() != key_columns.len() {
            continue;
        }

        let existing = find_by_key(&tx, table, &key_filter)?;
        let resolved = match existing {
            None => Some(incoming.clone()),
            Some(existing_row) => match callback(table, &existing_row, &incoming) {
                ConflictChoice::KeepExisting => None,
                ConflictChoice::UseNew => Some(incoming.clone()),
                ConflictChoice::Merge => {
                    let mut merged = existing_row;
                    for (name, value) in &incoming {
                        if !value.is_null() {
                            merged.insert(name.clone(), value.clone());
                        }
                    }
                    Some(merged)
                }
            },
        };

        if let Some(row) = resolved {
            let names: Vec<&str> = row.keys().map(String::as_str).collect();
            let placeholders = vec!["?"; names.len()].join(", ");
            let sql = format!(
                "INSERT OR REPLACE INTO {table} ({}) VALUES ({placeholders})",
                names.join(", ")
            );
            let params: Vec<rusqlite::types::Value> =
                row.values().map(crate::codec::encode_value).collect();
            let refs: Vec<&dyn rusqlite::ToSql> =
                params.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
            tx.prepare_cached(&sql)?.execute(&refs[..])?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn table_exists(conn: &rusqlite::Connection, table: &str) -> Result<bool, DbError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn stored_sql(conn: &rusqlite::Connection, table: &str) -> Result<Option<String>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
    )?;
    let mut rows = stmt.query([table])?;
    match rows.next()? {
        Some(row) => Ok(row.get(0)?),
        None => Ok(None),
    }
}

fn read_all_rows(conn: &rusqlite::Connection, sql: &str) -> Result<Vec<Row>, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut map = Row::new();
        for (idx, name) in column_names.iter().enumerate() {
            map.insert(name.clone(), value_from_engine(row, idx)?);
        }
        out.push(map);
    }
    Ok(out)
}

fn find_by_key(
    conn: &rusqlite::Connection,
    table: &str,
    key_filter: &[(&str, &crate::types::DbValue)],
) -> Result<Option<Row>, DbError> {
    let clauses: Vec<String> = key_filter
        .iter()
        .map(|(name, _)| format!("{name} = ?"))
        .collect();
    let sql = format!(
        "SELECT * FROM {table} WHERE {} LIMIT 1",
        clauses.join(" AND ")
    );
    let params: Vec<rusqlite::types::Value> = key_filter
        .iter()
        .map(|(_, value)| crate::codec::encode_value(value))
        .collect();

    let mut stmt = conn.prepare_cached(&sql)?;
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let refs: Vec<&dyn rusqlite::ToSql> =
        params.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
    let mut rows = stmt.query(&refs[..])?;
    match rows.next()? {
        Some(row) => {
            let mut map = Row::new();
            for (idx, name) in column_names.iter().enumerate() {
                map.insert(name.clone(), value_from_engine(row, idx)?);
            }
            Ok(Some(map))
        }
        None => Ok(None),
    }
}
