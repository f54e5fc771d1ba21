use std::collections::BTreeMap;

use crate::codec::{decode_column_value, decode_result_set};
use crate::error::DbError;
use crate::predicate::Predicate;
use crate::results::Row;
use crate::schema::ddl::{IndexSpec, create_index_sql, drop_index_sql};
use crate::types::DbValue;

use super::{Table, append_limits};

/// Aggregation functions accepted by [`Table::aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl AggregateFunction {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Count => "COUNT",
        }
    }
}

/// Sort direction for pagination ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    #[must_use]
    fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Ordering specification for [`Table::paginate`].
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

impl OrderBy {
    #[must_use]
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    #[must_use]
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// One page of results plus its pagination metadata.
#[derive(Debug, Clone)]
pub struct Page {
    pub data: Vec<Row>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl Table {
    /// Distinct values of one column, decoded to the column's logical kind.
    ///
    /// # Errors
    ///
    /// `DbError::InvalidArgument` on an unknown column; engine errors
    /// otherwise.
    pub async fn distinct(
        &self,
        column: &str,
        filter: Option<&Predicate>,
        limit: Option<i64>,
    ) -> Result<Vec<DbValue>, DbError> {
        let Some(column_def) = self.schema.find_column(column) else {
            return Err(DbError::InvalidArgument(format!(
                "table '{}' has no column '{column}'",
                self.schema.name
            )));
        };
        if let Some(limit) = limit
            && limit < 0
        {
            return Err(DbError::InvalidArgument("limit cannot be negative".into()));
        }
        let Some(compiled) = self.compile_filter(filter)? else {
            return Ok(Vec::new());
        };

        let mut sql = format!(
            "SELECT DISTINCT {column} FROM {}{}",
            self.schema.name, compiled.where_clause
        );
        append_limits(&mut sql, limit, None);

        let kind = column_def.kind.clone();
        let result = self.run_select(sql, compiled.params).await?;
        Ok(result
            .into_rows()
            .into_iter()
            .filter_map(|mut row| row.remove(column))
            .map(|raw| decode_column_value(&kind, raw))
            .collect())
    }

    /// Apply aggregation functions to one column.
    ///
    /// Returns a map keyed by the SQL function name. `COUNT` over no rows is
    /// `0`; the other functions come back as `None` when the engine yields
    /// NULL.
    ///
    /// # Errors
    ///
    /// `DbError::InvalidArgument` on an unknown column or empty function
    /// list; engine errors otherwise.
    pub async fn aggregate(
        &self,
        column: &str,
        functions: &[AggregateFunction],
        filter: Option<&Predicate>,
    ) -> Result<BTreeMap<String, Option<f64>>, DbError> {
        if self.schema.find_column(column).is_none() {
            return Err(DbError::InvalidArgument(format!(
                "table '{}' has no column '{column}'",
                self.schema.name
            )));
        }
        if functions.is_empty() {
            return Err(DbError::InvalidArgument(
                "aggregate requires at least one function".into(),
            ));
        }

        let Some(compiled) = self.compile_filter(filter)? else {
            return Ok(functions
                .iter()
                .map(|function| {
                    let value = match function {
                        AggregateFunction::Count => Some(0.0),
                        _ => None,
                    };
                    (function.as_sql().to_string(), value)
                })
                .collect());
        };

        let selections: Vec<String> = functions
            .iter()
            .enumerate()
            .map(|(idx, function)| format!("{}({column}) AS agg_{idx}", function.as_sql()))
            .collect();
        let sql = format!(
            "SELECT {} FROM {}{}",
            selections.join(", "),
            self.schema.name,
            compiled.where_clause
        );

        let result = self.run_select(sql, compiled.params).await?;
        let mut aggregates = BTreeMap::new();
        if let Some(row) = result.first() {
            for (idx, function) in functions.iter().enumerate() {
                let value = match row.get(&format!("agg_{idx}")) {
                    Some(DbValue::Int(v)) => {
                        #[allow(clippy::cast_precision_loss)]
                        let as_float = *v as f64;
                        Some(as_float)
                    }
                    Some(DbValue::Float(v)) => Some(*v),
                    _ => None,
                };
                aggregates.insert(function.as_sql().to_string(), value);
            }
        }
        Ok(aggregates)
    }

    /// Page through filtered, ordered results.
    ///
    /// `total_pages` is `ceil(total / page_size)`; out-of-range pages come
    /// back with empty `data` and unchanged metadata.
    ///
    /// # Errors
    ///
    /// `DbError::InvalidArgument` when `page` or `page_size` is not
    /// positive, or the order column is unknown.
    pub async fn paginate(
        &self,
        page: i64,
        page_size: i64,
        filter: Option<&Predicate>,
        columns: &[&str],
        order_by: Option<&OrderBy>,
    ) -> Result<Page, DbError> {
        if page < 1 {
            return Err(DbError::InvalidArgument("page starts at 1".into()));
        }
        if page_size < 1 {
            return Err(DbError::InvalidArgument("page size must be positive".into()));
        }
        if let Some(order) = order_by
            && self.schema.find_column(&order.column).is_none()
        {
            return Err(DbError::InvalidArgument(format!(
                "table '{}' has no column '{}'",
                self.schema.name, order.column
            )));
        }

        let Some(compiled) = self.compile_filter(filter)? else {
            return Ok(Page {
                data: Vec::new(),
                total: 0,
                page,
                page_size,
                total_pages: 0,
            });
        };

        let total = self.count(filter).await?;
        let total_pages = (total + page_size - 1) / page_size;

        let mut sql = format!(
            "SELECT {} FROM {}{}",
            self.column_list(
                &columns.iter().map(|c| (*c).to_string()).collect::<Vec<_>>()
            )?,
            self.schema.name,
            compiled.where_clause
        );
        if let Some(order) = order_by {
            use std::fmt::Write;
            let _ = write!(sql, " ORDER BY {} {}", order.column, order.direction.as_sql());
        }
        append_limits(&mut sql, Some(page_size), Some((page - 1) * page_size));

        let result = self.run_select(sql, compiled.params).await?;
        Ok(Page {
            data: decode_result_set(&self.schema, result),
            total,
            page,
            page_size,
            total_pages,
        })
    }

    /// Run a raw parameterized query on this table's connection.
    ///
    /// When the statement text mentions this table's name
    /// (case-insensitively), the rows are decoded against the table schema;
    /// otherwise they pass through as raw storage values.
    ///
    /// # Errors
    ///
    /// Engine errors from preparation or execution.
    pub async fn raw_query(&self, sql: &str, params: &[DbValue]) -> Result<Vec<Row>, DbError> {
        let result = self.run_select(sql.to_string(), params.to_vec()).await?;
        let mentions_table = sql
            .to_lowercase()
            .contains(&self.schema.name.to_lowercase());
        if mentions_table {
            Ok(decode_result_set(&self.schema, result))
        } else {
            Ok(result.into_rows())
        }
    }

    /// Create an index on this table.
    ///
    /// # Errors
    ///
    /// `DbError::InvalidArgument` for unknown columns; engine errors
    /// otherwise.
    pub async fn create_index(&self, spec: &IndexSpec) -> Result<(), DbError> {
        let sql = create_index_sql(&self.schema, spec)?;
        self.conn.execute_batch(sql).await
    }

    /// Drop an index by name.
    ///
    /// # Errors
    ///
    /// Engine errors, e.g. when the index does not exist and `if_exists` is
    /// false.
    pub async fn drop_index(&self, name: &str, if_exists: bool) -> Result<(), DbError> {
        self.conn
            .execute_batch(drop_index_sql(name, if_exists))
            .await
    }

    /// Select rows through the fluent builder; see [`SelectBuilder`].
    ///
    /// [`SelectBuilder`]: crate::builder::SelectBuilder
    #[must_use]
    pub fn query(&self) -> crate::builder::SelectBuilder<'_> {
        crate::builder::SelectBuilder::new(self)
    }
}
