use serde::{Deserialize, Serialize};

use crate::error::DbError;

/// One column as reported by the engine's `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub cid: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub notnull: i64,
    pub dflt_value: Option<String>,
    /// 1-based position within the primary key, 0 when not part of it.
    pub pk: i64,
}

/// One index with its original SQL, as stored in `sqlite_master`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub sql: String,
}

/// One exported table: engine introspection plus stored index SQL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableExport {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
}

/// The schema export document (`version`, ISO-8601 `created`, tables).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaExport {
    pub version: String,
    pub created: String,
    pub tables: Vec<TableExport>,
}

pub(crate) const SCHEMA_EXPORT_VERSION: &str = "1.0";

/// List user tables, skipping the engine's internal `sqlite_*` tables.
///
/// # Errors
///
/// Propagates engine errors from the catalog query.
pub fn list_user_tables(conn: &rusqlite::Connection) -> Result<Vec<String>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

pub(crate) fn introspect_columns(
    conn: &rusqlite::Connection,
    table: &str,
) -> Result<Vec<ColumnInfo>, DbError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| {
            Ok(ColumnInfo {
                cid: row.get(0)?,
                name: row.get(1)?,
                type_name: row.get(2)?,
                notnull: row.get(3)?,
                dflt_value: row.get(4)?,
                pk: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

fn introspect_indexes(
    conn: &rusqlite::Connection,
    table: &str,
) -> Result<Vec<IndexInfo>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT name, sql FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 AND sql IS NOT NULL ORDER BY name",
    )?;
    let indexes = stmt
        .query_map([table], |row| {
            Ok(IndexInfo {
                name: row.get(0)?,
                sql: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(indexes)
}

/// Export the live schema of a connection: every user table's introspected
/// columns and stored index SQL.
///
/// # Errors
///
/// Propagates engine errors from the catalog queries.
pub fn export_schema(conn: &rusqlite::Connection) -> Result<SchemaExport, DbError> {
    let mut tables = Vec::new();
    for name in list_user_tables(conn)? {
        let columns = introspect_columns(conn, &name)?;
        let indexes = introspect_indexes(conn, &name)?;
        tables.push(TableExport {
            name,
            columns,
            indexes,
        });
    }
    Ok(SchemaExport {
        version: SCHEMA_EXPORT_VERSION.to_string(),
        created: chrono::Utc::now().to_rfc3339(),
        tables,
    })
}

/// Rebuild `CREATE TABLE IF NOT EXISTS` from introspected columns.
///
/// Declared types, NOT NULL, defaults, and primary-key ordering all come
/// straight from the introspection rows.
#[must_use]
pub fn table_ddl_from_introspection(name: &str, columns: &[ColumnInfo]) -> String {
    let pk_count = columns.iter().filter(|c| c.pk > 0).count();

    let mut parts: Vec<String> = columns
        .iter()
        .map(|column| {
            let mut ddl = column.name.clone();
            if !column.type_name.is_empty() {
                ddl.push(' ');
                ddl.push_str(&column.type_name);
            }
            if column.pk > 0 && pk_count == 1 {
                ddl.push_str(" PRIMARY KEY");
            }
            if column.notnull != 0 && column.pk == 0 {
                ddl.push_str(" NOT NULL");
            }
            if let Some(dflt) = &column.dflt_value {
                ddl.push_str(" DEFAULT ");
                ddl.push_str(dflt);
            }
            ddl
        })
        .collect();

    if pk_count > 1 {
        let mut pk_columns: Vec<&ColumnInfo> = columns.iter().filter(|c| c.pk > 0).collect();
        pk_columns.sort_by_key(|c| c.pk);
        let names: Vec<&str> = pk_columns.iter().map(|c| c.name.as_str()).collect();
        parts.push(format!("PRIMARY KEY ({})", names.join(", ")));
    }

    format!("CREATE TABLE IF NOT EXISTS {name} ({})", parts.join(", "))
}

/// Make stored index SQL idempotent so imports can re-run it.
fn idempotent_index_sql(sql: &str) -> String {
    let trimmed = sql.trim();
    let upper = trimmed.to_uppercase();
    if upper.contains("IF NOT EXISTS") {
        return trimmed.to_string();
    }
    for prefix in ["CREATE UNIQUE INDEX", "CREATE INDEX"] {
        if upper.starts_with(prefix) {
            let (head, tail) = trimmed.split_at(prefix.len());
            return format!("{head} IF NOT EXISTS{tail}");
        }
    }
    trimmed.to_string()
}

/// Recreate the tables and indexes of a schema export on a connection.
///
/// # Errors
///
/// Propagates engine errors; tables are created with `IF NOT EXISTS`, so
/// importing over an existing identical schema is a no-op.
pub fn import_schema(
    conn: &rusqlite::Connection,
    export: &SchemaExport,
) -> Result<(), DbError> {
    for table in &export.tables {
        let ddl = table_ddl_from_introspection(&table.name, &table.columns);
        conn.execute_batch(&ddl)?;
        for index in &table.indexes {
            conn.execute_batch(&idempotent_index_sql(&index.sql))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(cid: i64, name: &str, type_name: &str, notnull: i64, pk: i64) -> ColumnInfo {
        ColumnInfo {
            cid,
            name: name.into(),
            type_name: type_name.into(),
            notnull,
            dflt_value: None,
            pk,
        }
    }

    #[test]
    fn ddl_from_introspection_single_pk() {
        let columns = vec![
            col(0, "id", "INTEGER", 0, 1),
            ColumnInfo {
                dflt_value: Some("'user'".into()),
                ..col(1, "role", "TEXT", 1, 0)
            },
        ];
        assert_eq!(
            table_ddl_from_introspection("users", &columns),
            "CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, role TEXT NOT NULL DEFAULT 'user')"
        );
    }

    #[test]
    fn ddl_from_introspection_composite_pk_ordered() {
        let columns = vec![
            col(0, "b", "INTEGER", 0, 2),
            col(1, "a", "INTEGER", 0, 1),
        ];
        let ddl = table_ddl_from_introspection("pairs", &columns);
        assert!(ddl.ends_with("PRIMARY KEY (a, b))"));
    }

    #[test]
    fn index_sql_made_idempotent() {
        assert_eq!(
            idempotent_index_sql("CREATE INDEX idx_a ON t (a)"),
            "CREATE INDEX IF NOT EXISTS idx_a ON t (a)"
        );
        assert_eq!(
            idempotent_index_sql("CREATE UNIQUE INDEX IF NOT EXISTS idx_a ON t (a)"),
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_a ON t (a)"
        );
    }

    #[test]
    fn export_round_trips_through_serde() {
        let export = SchemaExport {
            version: SCHEMA_EXPORT_VERSION.into(),
            created: "2026-01-01T00:00:00+00:00".into(),
            tables: vec![TableExport {
                name: "users".into(),
                columns: vec![col(0, "id", "INTEGER", 0, 1)],
                indexes: vec![IndexInfo {
                    name: "idx_users_email".into(),
                    sql: "CREATE UNIQUE INDEX idx_users_email ON users (email)".into(),
                }],
            }],
        };
        let text = serde_json::to_string(&export).unwrap();
        let parsed: SchemaExport = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, export);
    }
}
