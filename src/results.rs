use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::DbValue;

/// A logical row keyed by column name, used for inserts and typed reads.
///
/// `BTreeMap` keeps column order deterministic, which keeps generated SQL
/// stable across rows of one batch and lets prepared statements be reused.
pub type Row = BTreeMap<String, DbValue>;

/// A single row from a query result.
///
/// Column names are shared across all rows of one result set; lookups go
/// through a shared name-to-index map instead of repeated string scans.
#[derive(Debug, Clone)]
pub struct DbRow {
    /// The column names for this row (shared across the result set)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row, in column order
    pub values: Vec<DbValue>,
    column_index: Arc<HashMap<String, usize>>,
}

impl DbRow {
    /// Create a row with its own index cache. Prefer building rows through
    /// [`ResultSet::add_row_values`], which shares one cache per result set.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<DbValue>) -> Self {
        let column_index = Arc::new(build_column_index(&column_names));
        Self {
            column_names,
            values,
            column_index,
        }
    }

    /// Get the index of a column by name
    #[must_use]
    pub fn column_index(&self, column_name: &str) -> Option<usize> {
        self.column_index.get(column_name).copied()
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&DbValue> {
        self.column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&DbValue> {
        self.values.get(index)
    }

    /// Convert the row into a name-keyed [`Row`] map.
    #[must_use]
    pub fn into_row(self) -> Row {
        self.column_names
            .iter()
            .cloned()
            .zip(self.values)
            .collect()
    }
}

fn build_column_index(column_names: &[String]) -> HashMap<String, usize> {
    column_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect()
}

/// A result set from a database query.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<DbRow>,
    /// The number of rows affected (for DML statements)
    pub rows_affected: usize,
    column_names: Option<Arc<Vec<String>>>,
    column_index: Option<Arc<HashMap<String, usize>>>,
}

impl ResultSet {
    /// Create a new result set with a known row capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            rows_affected: 0,
            column_names: None,
            column_index: None,
        }
    }

    /// Set the column names shared by all rows of this result set.
    pub fn set_column_names(&mut self, column_names: Arc<Vec<String>>) {
        self.column_index = Some(Arc::new(build_column_index(&column_names)));
        self.column_names = Some(column_names);
    }

    /// Get the column names for this result set
    #[must_use]
    pub fn column_names(&self) -> Option<&Arc<Vec<String>>> {
        self.column_names.as_ref()
    }

    /// Append a row of values, sharing the result set's column names and
    /// index cache. Rows added before `set_column_names` are dropped.
    pub fn add_row_values(&mut self, values: Vec<DbValue>) {
        let (Some(column_names), Some(column_index)) =
            (&self.column_names, &self.column_index)
        else {
            return;
        };
        self.results.push(DbRow {
            column_names: Arc::clone(column_names),
            values,
            column_index: Arc::clone(column_index),
        });
        self.rows_affected += 1;
    }

    /// First row of the result set, if any.
    #[must_use]
    pub fn first(&self) -> Option<&DbRow> {
        self.results.first()
    }

    /// Number of rows in the result set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Convert every row into a name-keyed [`Row`] map.
    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.results.into_iter().map(DbRow::into_row).collect()
    }
}
