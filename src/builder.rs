//! Fluent mirror of [`Table::select`]: chain filters, then finish with one
//! of the terminal calls. Semantics are identical to the facade methods; the
//! builder only rearranges the call sites.
//!
//! ```rust,no_run
//! # use sqlite_dal::prelude::*;
//! # async fn demo(users: &Table) -> Result<(), DbError> {
//! let admins = users
//!     .query()
//!     .where_eq("role", "admin")
//!     .where_like("email", "%@example.com")
//!     .limit(10)
//!     .execute()
//!     .await?;
//! # let _ = admins;
//! # Ok(()) }
//! ```

use crate::error::DbError;
use crate::predicate::Predicate;
use crate::results::Row;
use crate::table::{SelectOptions, Table};
use crate::types::DbValue;

/// Builder returned by [`Table::query`].
pub struct SelectBuilder<'t> {
    table: &'t Table,
    predicate: Predicate,
    columns: Vec<String>,
    limit: Option<i64>,
    skip: Option<i64>,
}

impl<'t> SelectBuilder<'t> {
    pub(crate) fn new(table: &'t Table) -> Self {
        Self {
            table,
            predicate: Predicate::new(),
            columns: Vec::new(),
            limit: None,
            skip: None,
        }
    }

    /// Add a field equality condition.
    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.predicate = self.predicate.eq(field, value);
        self
    }

    /// Add a `LIKE` condition.
    #[must_use]
    pub fn where_like(mut self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.predicate = self.predicate.like(field, pattern);
        self
    }

    #[must_use]
    pub fn where_gt(mut self, field: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.predicate = self.predicate.gt(field, value);
        self
    }

    #[must_use]
    pub fn where_lt(mut self, field: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.predicate = self.predicate.lt(field, value);
        self
    }

    #[must_use]
    pub fn where_gte(mut self, field: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.predicate = self.predicate.gte(field, value);
        self
    }

    #[must_use]
    pub fn where_lte(mut self, field: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.predicate = self.predicate.lte(field, value);
        self
    }

    #[must_use]
    pub fn where_ne(mut self, field: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.predicate = self.predicate.ne(field, value);
        self
    }

    /// Add a disjunction of sub-predicates.
    #[must_use]
    pub fn where_or(mut self, branches: Vec<Predicate>) -> Self {
        self.predicate = self.predicate.or(branches);
        self
    }

    /// Return only the listed columns.
    #[must_use]
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    /// Return every column (the default).
    #[must_use]
    pub fn select_all(mut self) -> Self {
        self.columns.clear();
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

    fn filter(&self) -> Option<Predicate> {
        if self.predicate.is_empty() {
            None
        } else {
            Some(self.predicate.clone())
        }
    }

    /// Run the select and return all matching rows.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Table::select`].
    pub async fn execute(self) -> Result<Vec<Row>, DbError> {
        self.table
            .select(SelectOptions {
                filter: self.filter(),
                columns: self.columns,
                limit: self.limit,
                skip: self.skip,
            })
            .await
    }

    /// Run the select limited to one row.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Table::select`].
    pub async fn first(self) -> Result<Option<Row>, DbError> {
        self.table
            .find_first(SelectOptions {
                filter: self.filter(),
                columns: self.columns,
                limit: None,
                skip: self.skip,
            })
            .await
    }

    /// Count matching rows.
    ///
    /// # Errors
    ///
    /// Engine errors only.
    pub async fn count(self) -> Result<i64, DbError> {
        self.table.count(self.filter().as_ref()).await
    }

    /// Whether any row matches.
    ///
    /// # Errors
    ///
    /// Engine errors only.
    pub async fn exists(self) -> Result<bool, DbError> {
        self.table.exists(self.filter().as_ref()).await
    }
}
