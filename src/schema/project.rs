use crate::error::DbError;
use crate::results::Row;
use crate::schema::column::ColumnDef;
use crate::schema::table::TableSchema;

/// Whether a column must be supplied in a given row shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Optional,
}

/// Requirement of a column in the insert shape: optional when the engine can
/// supply the value (auto-increment or default) or NULL is acceptable.
#[must_use]
pub fn insert_requirement(column: &ColumnDef) -> Requirement {
    if column.is_auto_increment() || column.has_default() || column.nullable {
        Requirement::Optional
    } else {
        Requirement::Required
    }
}

/// Requirement of a column in the select shape: like insert, except
/// default-bearing columns come back populated by the engine.
#[must_use]
pub fn select_requirement(column: &ColumnDef) -> Requirement {
    if column.has_default() {
        Requirement::Required
    } else {
        insert_requirement(column)
    }
}

/// Validate a row against a table's insert shape.
///
/// Required columns must be present and non-null; provided values must match
/// their column's kind, union whitelist, and JSON shape. Unknown columns are
/// rejected.
///
/// # Errors
///
/// Returns `DbError::InvalidArgument` describing the first violation.
pub fn validate_insert_row(table: &TableSchema, row: &Row) -> Result<(), DbError> {
    for name in row.keys() {
        if table.find_column(name).is_none() {
            return Err(DbError::InvalidArgument(format!(
                "table '{}' has no column '{name}'",
                table.name
            )));
        }
    }

    for column in &table.columns {
        match row.get(&column.name) {
            Some(value) if value.is_null() => {
                if !column.nullable {
                    return Err(DbError::InvalidArgument(format!(
                        "column '{}' is not nullable",
                        column.name
                    )));
                }
            }
            Some(value) => column.check_value(value)?,
            None => {
                if insert_requirement(column) == Requirement::Required {
                    return Err(DbError::InvalidArgument(format!(
                        "missing required column '{}'",
                        column.name
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Validate a partial update payload: every provided value must match its
/// column; nothing is required.
///
/// # Errors
///
/// Returns `DbError::InvalidArgument` on an unknown column, a non-nullable
/// column set to NULL, a kind mismatch, or a union-whitelist miss.
pub fn validate_update_values(table: &TableSchema, values: &Row) -> Result<(), DbError> {
    for (name, value) in values {
        let Some(column) = table.find_column(name) else {
            return Err(DbError::InvalidArgument(format!(
                "table '{}' has no column '{name}'",
                table.name
            )));
        };
        if value.is_null() {
            if !column.nullable {
                return Err(DbError::InvalidArgument(format!(
                    "column '{}' is not nullable",
                    column.name
                )));
            }
        } else {
            column.check_value(value)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DbValue;

    fn users() -> TableSchema {
        TableSchema::new("users")
            .column(ColumnDef::int("id").primary().auto_increment())
            .column(ColumnDef::text("email").unique())
            .column(
                ColumnDef::text("role")
                    .text_union(vec!["admin", "user"])
                    .default_text("user"),
            )
            .column(ColumnDef::text("bio").nullable())
    }

    fn row(entries: &[(&str, DbValue)]) -> Row {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn optionality_follows_projection_rules() {
        let table = users();
        assert_eq!(
            insert_requirement(table.find_column("id").unwrap()),
            Requirement::Optional
        );
        assert_eq!(
            insert_requirement(table.find_column("email").unwrap()),
            Requirement::Required
        );
        assert_eq!(
            insert_requirement(table.find_column("role").unwrap()),
            Requirement::Optional
        );
        // Default-bearing columns are engine-populated in results.
        assert_eq!(
            select_requirement(table.find_column("role").unwrap()),
            Requirement::Required
        );
        assert_eq!(
            select_requirement(table.find_column("bio").unwrap()),
            Requirement::Optional
        );
    }

    #[test]
    fn missing_required_column_rejected() {
        let err = validate_insert_row(&users(), &row(&[("bio", DbValue::Text("hi".into()))]));
        assert!(matches!(err, Err(DbError::InvalidArgument(_))));
    }

    #[test]
    fn unknown_column_rejected() {
        let err = validate_insert_row(
            &users(),
            &row(&[
                ("email", DbValue::Text("a@x".into())),
                ("nickname", DbValue::Text("al".into())),
            ]),
        );
        assert!(matches!(err, Err(DbError::InvalidArgument(_))));
    }

    #[test]
    fn union_constraint_enforced() {
        let err = validate_insert_row(
            &users(),
            &row(&[
                ("email", DbValue::Text("a@x".into())),
                ("role", DbValue::Text("root".into())),
            ]),
        );
        assert!(matches!(err, Err(DbError::InvalidArgument(_))));

        assert!(
            validate_insert_row(
                &users(),
                &row(&[
                    ("email", DbValue::Text("a@x".into())),
                    ("role", DbValue::Text("admin".into())),
                ]),
            )
            .is_ok()
        );
    }

    #[test]
    fn null_only_on_nullable_columns() {
        assert!(
            validate_insert_row(
                &users(),
                &row(&[
                    ("email", DbValue::Text("a@x".into())),
                    ("bio", DbValue::Null),
                ]),
            )
            .is_ok()
        );
        let err = validate_update_values(&users(), &row(&[("email", DbValue::Null)]));
        assert!(matches!(err, Err(DbError::InvalidArgument(_))));
    }
}
