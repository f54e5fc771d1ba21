//! Structured filter input compiled to a parameterized `WHERE` fragment.
//!
//! Clauses are AND-combined in a fixed order: implicit equality, `LIKE`,
//! ordered comparisons, then `OR` branches. Every value is bound through a
//! `?` placeholder; parameters are collected in clause-emission order.

use crate::error::DbError;
use crate::types::DbValue;

/// An ordered-comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    NotEqual,
}

impl CompareOp {
    #[must_use]
    fn as_sql(self) -> &'static str {
        match self {
            CompareOp::GreaterThan => ">",
            CompareOp::LessThan => "<",
            CompareOp::GreaterThanOrEqual => ">=",
            CompareOp::LessThanOrEqual => "<=",
            CompareOp::NotEqual => "!=",
        }
    }
}

/// A predicate tree over one table's columns.
///
/// ```rust
/// use sqlite_dal::prelude::*;
///
/// let predicate = Predicate::new()
///     .eq("is_active", true)
///     .like("email", "%@example.com")
///     .gt("age", 21i64);
/// # let _ = predicate;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Predicate {
    eq: Vec<(String, DbValue)>,
    like: Vec<(String, String)>,
    compare: Vec<(String, CompareOp, DbValue)>,
    /// `None` means no OR key; `Some(vec![])` is the identity-false
    /// disjunction that matches no rows.
    or: Option<Vec<Predicate>>,
}

impl Predicate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Field-level equality.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.eq.push((field.into(), value.into()));
        self
    }

    /// SQL `LIKE` against a pattern.
    #[must_use]
    pub fn like(mut self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.like.push((field.into(), pattern.into()));
        self
    }

    #[must_use]
    pub fn gt(mut self, field: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.compare
            .push((field.into(), CompareOp::GreaterThan, value.into()));
        self
    }

    #[must_use]
    pub fn lt(mut self, field: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.compare
            .push((field.into(), CompareOp::LessThan, value.into()));
        self
    }

    #[must_use]
    pub fn gte(mut self, field: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.compare
            .push((field.into(), CompareOp::GreaterThanOrEqual, value.into()));
        self
    }

    #[must_use]
    pub fn lte(mut self, field: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.compare
            .push((field.into(), CompareOp::LessThanOrEqual, value.into()));
        self
    }

    #[must_use]
    pub fn ne(mut self, field: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.compare
            .push((field.into(), CompareOp::NotEqual, value.into()));
        self
    }

    /// Disjunction of sub-predicates; each branch's clauses are ANDed.
    #[must_use]
    pub fn or(mut self, branches: Vec<Predicate>) -> Self {
        self.or = Some(branches);
        self
    }

    /// Whether the predicate carries no condition at all (no keys).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.eq.is_empty() && self.like.is_empty() && self.compare.is_empty() && self.or.is_none()
    }

    /// Whether the predicate contains an empty `OR` disjunction, which
    /// matches no rows and short-circuits without executing SQL.
    #[must_use]
    pub fn is_identity_false(&self) -> bool {
        matches!(&self.or, Some(branches) if branches.is_empty())
    }

    /// Compile into a `WHERE` fragment plus its parameter vector.
    ///
    /// # Errors
    ///
    /// Returns `DbError::InvalidArgument` when an empty `OR` disjunction is
    /// compiled directly; callers are expected to short-circuit it first via
    /// [`Predicate::is_identity_false`].
    pub fn compile(&self) -> Result<CompiledPredicate, DbError> {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<DbValue> = Vec::new();
        self.compile_into(&mut clauses, &mut params)?;

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        Ok(CompiledPredicate {
            where_clause,
            params,
        })
    }

    fn compile_into(
        &self,
        clauses: &mut Vec<String>,
        params: &mut Vec<DbValue>,
    ) -> Result<(), DbError> {
        for (field, value) in &self.eq {
            clauses.push(format!("{field} = ?"));
            params.push(value.clone());
        }
        for (field, pattern) in &self.like {
            clauses.push(format!("{field} LIKE ?"));
            params.push(DbValue::Text(pattern.clone()));
        }
        for (field, op, value) in &self.compare {
            clauses.push(format!("{field} {} ?", op.as_sql()));
            params.push(value.clone());
        }
        if let Some(branches) = &self.or {
            if branches.is_empty() {
                return Err(DbError::InvalidArgument(
                    "empty OR disjunction matches no rows".into(),
                ));
            }
            let mut parts = Vec::with_capacity(branches.len());
            for branch in branches {
                let mut branch_clauses = Vec::new();
                branch.compile_into(&mut branch_clauses, params)?;
                if branch_clauses.is_empty() {
                    // An empty branch matches everything, collapsing the OR.
                    parts.push("1 = 1".to_string());
                } else {
                    parts.push(format!("({})", branch_clauses.join(" AND ")));
                }
            }
            clauses.push(format!("({})", parts.join(" OR ")));
        }
        Ok(())
    }
}

/// A compiled predicate: the (possibly empty) `WHERE` fragment and its
/// placeholder-bound parameters, in emission order.
#[derive(Debug, Clone)]
pub struct CompiledPredicate {
    /// Either empty or `" WHERE ..."`, ready to append to a statement.
    pub where_clause: String,
    pub params: Vec<DbValue>,
}

impl CompiledPredicate {
    /// A compiled form of the always-true predicate.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            where_clause: String::new(),
            params: Vec::new(),
        }
    }
}

/// Gate for mutating operations: the predicate must carry at least one
/// condition.
///
/// # Errors
///
/// Returns `DbError::MissingPredicate` when the predicate is empty.
pub fn require_predicate(predicate: &Predicate) -> Result<(), DbError> {
    if predicate.is_empty() {
        Err(DbError::MissingPredicate)
    } else {
        Ok(())
    }
}
