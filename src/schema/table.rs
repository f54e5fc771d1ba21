use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::DbError;
use crate::schema::column::ColumnDef;

/// A table descriptor: name plus ordered column list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Append a column, builder style.
    #[must_use]
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Look up a column by name.
    #[must_use]
    pub fn find_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns marked primary, in definition order.
    #[must_use]
    pub fn primary_columns(&self) -> Vec<&ColumnDef> {
        self.columns.iter().filter(|c| c.primary).collect()
    }

    /// The first primary column, used as the upsert key for JSON import.
    #[must_use]
    pub fn primary_column(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary)
    }

    /// Check the table invariants.
    ///
    /// # Errors
    ///
    /// Returns `DbError::InvalidSchema` when the table name is empty, there
    /// are no columns, no primary column, duplicate column names, an
    /// auto-increment column that is not primary, a primary column marked
    /// nullable, or a composite primary key with auto-increment.
    pub fn validate(&self) -> Result<(), DbError> {
        if self.name.trim().is_empty() {
            return Err(DbError::InvalidSchema("table name is empty".into()));
        }
        if self.columns.is_empty() {
            return Err(DbError::InvalidSchema(format!(
                "table '{}' has no columns",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(DbError::InvalidSchema(format!(
                    "table '{}' has duplicate column '{}'",
                    self.name, column.name
                )));
            }
            if column.primary && column.nullable {
                return Err(DbError::InvalidSchema(format!(
                    "table '{}': primary column '{}' cannot be nullable",
                    self.name, column.name
                )));
            }
            if column.is_auto_increment() && !column.primary {
                return Err(DbError::InvalidSchema(format!(
                    "table '{}': auto-increment column '{}' must be primary",
                    self.name, column.name
                )));
            }
        }

        let primary_count = self.columns.iter().filter(|c| c.primary).count();
        if primary_count == 0 {
            return Err(DbError::InvalidSchema(format!(
                "table '{}' has no primary key column",
                self.name
            )));
        }
        if primary_count > 1 && self.columns.iter().any(ColumnDef::is_auto_increment) {
            return Err(DbError::InvalidSchema(format!(
                "table '{}': auto-increment requires a single-column primary key",
                self.name
            )));
        }

        Ok(())
    }
}

/// The full declarative schema handed to a database manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<TableSchema>,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a table, builder style.
    #[must_use]
    pub fn table(mut self, table: TableSchema) -> Self {
        self.tables.push(table);
        self
    }

    /// Look up a table by name.
    #[must_use]
    pub fn find_table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Validate every table, plus table-name uniqueness.
    ///
    /// # Errors
    ///
    /// Returns the first `DbError::InvalidSchema` encountered.
    pub fn validate(&self) -> Result<(), DbError> {
        let mut seen = HashSet::new();
        for table in &self.tables {
            table.validate()?;
            if !seen.insert(table.name.as_str()) {
                return Err(DbError::InvalidSchema(format!(
                    "duplicate table '{}'",
                    table.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableSchema {
        TableSchema::new("users")
            .column(ColumnDef::int("id").primary().auto_increment())
            .column(ColumnDef::text("email").unique())
    }

    #[test]
    fn valid_table_passes() {
        assert!(users().validate().is_ok());
    }

    #[test]
    fn empty_name_rejected() {
        let table = TableSchema {
            name: "  ".into(),
            ..users()
        };
        assert!(matches!(table.validate(), Err(DbError::InvalidSchema(_))));
    }

    #[test]
    fn no_columns_rejected() {
        let table = TableSchema::new("empty");
        assert!(matches!(table.validate(), Err(DbError::InvalidSchema(_))));
    }

    #[test]
    fn missing_primary_rejected() {
        let table = TableSchema::new("t").column(ColumnDef::text("name"));
        assert!(matches!(table.validate(), Err(DbError::InvalidSchema(_))));
    }

    #[test]
    fn duplicate_columns_rejected() {
        let table = TableSchema::new("t")
            .column(ColumnDef::int("id").primary())
            .column(ColumnDef::text("id"));
        assert!(matches!(table.validate(), Err(DbError::InvalidSchema(_))));
    }

    #[test]
    fn auto_increment_requires_primary() {
        let table = TableSchema::new("t")
            .column(ColumnDef::int("id").primary())
            .column(ColumnDef::int("counter").auto_increment());
        assert!(matches!(table.validate(), Err(DbError::InvalidSchema(_))));
    }

    #[test]
    fn nullable_primary_rejected() {
        let table = TableSchema::new("t").column(ColumnDef::int("id").primary().nullable());
        assert!(matches!(table.validate(), Err(DbError::InvalidSchema(_))));
    }

    #[test]
    fn schema_rejects_duplicate_tables() {
        let schema = Schema::new().table(users()).table(users());
        assert!(matches!(schema.validate(), Err(DbError::InvalidSchema(_))));
    }
}
