use std::fmt::Write;

use crate::error::DbError;
use crate::schema::column::{ColumnDef, ColumnKind};
use crate::schema::table::TableSchema;

/// Escape a string literal for embedding in DDL.
fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Format a column's `DEFAULT` literal, if it carries one.
///
/// Strings and JSON are quoted; booleans become `1`/`0`; dates become their
/// millisecond epoch; numerics are emitted verbatim.
#[must_use]
pub fn default_literal(kind: &ColumnKind) -> Option<String> {
    match kind {
        ColumnKind::Int { default, .. } => default.map(|v| v.to_string()),
        ColumnKind::Real { default, .. } => default.map(|v| v.to_string()),
        ColumnKind::Text { default, .. } => default.as_deref().map(quote_literal),
        ColumnKind::Date { default } => {
            default.map(|dt| dt.and_utc().timestamp_millis().to_string())
        }
        ColumnKind::Bool { default } => default.map(|v| i64::from(v).to_string()),
        ColumnKind::Json { default, .. } => {
            default.as_ref().map(|v| quote_literal(&v.to_string()))
        }
    }
}

fn column_ddl(column: &ColumnDef, inline_primary: bool) -> String {
    let mut ddl = format!("{} {}", column.name, column.kind.storage_type().as_sql());
    if column.primary && inline_primary {
        ddl.push_str(" PRIMARY KEY");
        if column.is_auto_increment() {
            ddl.push_str(" AUTOINCREMENT");
        }
    }
    if !column.nullable && !column.primary {
        ddl.push_str(" NOT NULL");
    }
    if column.unique && !column.primary {
        ddl.push_str(" UNIQUE");
    }
    if let Some(literal) = default_literal(&column.kind) {
        let _ = write!(ddl, " DEFAULT {literal}");
    }
    ddl
}

/// Emit `CREATE TABLE IF NOT EXISTS` for a validated table descriptor.
///
/// A single primary column is declared inline (carrying `AUTOINCREMENT` when
/// requested); a composite key becomes a table-level constraint.
///
/// # Errors
///
/// Returns `DbError::InvalidSchema` if the descriptor fails validation.
pub fn create_table_sql(table: &TableSchema) -> Result<String, DbError> {
    table.validate()?;

    let primary: Vec<&ColumnDef> = table.primary_columns();
    let inline_primary = primary.len() == 1;

    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|column| column_ddl(column, inline_primary))
        .collect();
    if !inline_primary {
        let names: Vec<&str> = primary.iter().map(|c| c.name.as_str()).collect();
        parts.push(format!("PRIMARY KEY ({})", names.join(", ")));
    }

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table.name,
        parts.join(", ")
    ))
}

/// Specification for an index create.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub if_not_exists: bool,
}

impl IndexSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            unique: false,
            if_not_exists: true,
        }
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Emit `CREATE [UNIQUE] INDEX` for a table.
///
/// # Errors
///
/// Returns `DbError::InvalidArgument` when the column list is empty or names
/// a column the table does not have.
pub fn create_index_sql(table: &TableSchema, spec: &IndexSpec) -> Result<String, DbError> {
    if spec.columns.is_empty() {
        return Err(DbError::InvalidArgument(
            "index requires at least one column".into(),
        ));
    }
    for column in &spec.columns {
        if table.find_column(column).is_none() {
            return Err(DbError::InvalidArgument(format!(
                "index column '{column}' does not exist on table '{}'",
                table.name
            )));
        }
    }

    let unique = if spec.unique { "UNIQUE " } else { "" };
    let if_not_exists = if spec.if_not_exists {
        "IF NOT EXISTS "
    } else {
        ""
    };
    Ok(format!(
        "CREATE {unique}INDEX {if_not_exists}{} ON {} ({})",
        spec.name,
        table.name,
        spec.columns.join(", ")
    ))
}

/// Emit `DROP INDEX`.
#[must_use]
pub fn drop_index_sql(name: &str, if_exists: bool) -> String {
    if if_exists {
        format!("DROP INDEX IF EXISTS {name}")
    } else {
        format!("DROP INDEX {name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn users() -> TableSchema {
        TableSchema::new("users")
            .column(ColumnDef::int("id").primary().auto_increment())
            .column(ColumnDef::text("email").unique())
            .column(
                ColumnDef::text("role")
                    .text_union(vec!["admin", "user"])
                    .default_text("user"),
            )
            .column(ColumnDef::bool("is_active").default_bool(true))
            .column(ColumnDef::date("created_at"))
    }

    #[test]
    fn create_table_emits_constraints() {
        let sql = create_table_sql(&users()).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS users (\
             id INTEGER PRIMARY KEY AUTOINCREMENT, \
             email TEXT NOT NULL UNIQUE, \
             role TEXT NOT NULL DEFAULT 'user', \
             is_active INTEGER NOT NULL DEFAULT 1, \
             created_at INTEGER NOT NULL)"
        );
    }

    #[test]
    fn nullable_column_omits_not_null() {
        let table = TableSchema::new("t")
            .column(ColumnDef::int("id").primary())
            .column(ColumnDef::text("note").nullable());
        let sql = create_table_sql(&table).unwrap();
        assert!(sql.contains("note TEXT,") || sql.ends_with("note TEXT)"));
    }

    #[test]
    fn composite_primary_key_is_table_level() {
        let table = TableSchema::new("memberships")
            .column(ColumnDef::int("user_id").primary())
            .column(ColumnDef::int("group_id").primary())
            .column(ColumnDef::date("joined_at"));
        let sql = create_table_sql(&table).unwrap();
        assert!(sql.contains("PRIMARY KEY (user_id, group_id)"));
        assert!(!sql.contains("user_id INTEGER PRIMARY KEY"));
    }

    #[test]
    fn date_default_is_millisecond_epoch() {
        let dt = DateTime::from_timestamp_millis(1_700_000_000_123)
            .unwrap()
            .naive_utc();
        let table = TableSchema::new("t")
            .column(ColumnDef::int("id").primary())
            .column(ColumnDef::date("seen_at").default_date(dt));
        let sql = create_table_sql(&table).unwrap();
        assert!(sql.contains("seen_at INTEGER NOT NULL DEFAULT 1700000000123"));
    }

    #[test]
    fn text_default_escapes_quotes() {
        assert_eq!(
            default_literal(&ColumnKind::Text {
                union: None,
                default: Some("it's".into()),
            }),
            Some("'it''s'".to_string())
        );
    }

    #[test]
    fn index_ddl() {
        let table = users();
        let spec = IndexSpec::new("idx_users_email", vec!["email".into()]).unique();
        assert_eq!(
            create_index_sql(&table, &spec).unwrap(),
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users (email)"
        );
        assert_eq!(
            drop_index_sql("idx_users_email", true),
            "DROP INDEX IF EXISTS idx_users_email"
        );
    }

    #[test]
    fn invalid_index_column_rejected() {
        let spec = IndexSpec::new("idx_bad", vec!["missing".into()]);
        assert!(matches!(
            create_index_sql(&users(), &spec),
            Err(DbError::InvalidArgument(_))
        ));
    }
}
