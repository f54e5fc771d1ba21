use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::DbError;
use crate::schema::json_shape::JsonShape;
use crate::types::DbValue;

/// Storage class a column maps onto in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Integer,
    Real,
    Text,
}

impl StorageType {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            StorageType::Integer => "INTEGER",
            StorageType::Real => "REAL",
            StorageType::Text => "TEXT",
        }
    }
}

/// The logical kind of a column, with kind-specific attributes.
///
/// Union attributes are whitelists of permitted literal values, enforced on
/// insert and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnKind {
    Int {
        auto_increment: bool,
        union: Option<Vec<i64>>,
        default: Option<i64>,
    },
    Real {
        union: Option<Vec<f64>>,
        default: Option<f64>,
    },
    Text {
        union: Option<Vec<String>>,
        default: Option<String>,
    },
    Date {
        default: Option<NaiveDateTime>,
    },
    Bool {
        default: Option<bool>,
    },
    Json {
        shape: JsonShape,
        default: Option<JsonValue>,
    },
}

impl ColumnKind {
    /// The storage class this kind maps onto.
    #[must_use]
    pub fn storage_type(&self) -> StorageType {
        match self {
            ColumnKind::Int { .. } | ColumnKind::Bool { .. } | ColumnKind::Date { .. } => {
                StorageType::Integer
            }
            ColumnKind::Real { .. } => StorageType::Real,
            ColumnKind::Text { .. } | ColumnKind::Json { .. } => StorageType::Text,
        }
    }

    #[must_use]
    pub fn has_default(&self) -> bool {
        match self {
            ColumnKind::Int { default, .. } => default.is_some(),
            ColumnKind::Real { default, .. } => default.is_some(),
            ColumnKind::Text { default, .. } => default.is_some(),
            ColumnKind::Date { default } => default.is_some(),
            ColumnKind::Bool { default } => default.is_some(),
            ColumnKind::Json { default, .. } => default.is_some(),
        }
    }

    #[must_use]
    pub fn is_auto_increment(&self) -> bool {
        matches!(
            self,
            ColumnKind::Int {
                auto_increment: true,
                ..
            }
        )
    }

    /// Short name used in validation messages and table stats.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ColumnKind::Int { .. } => "int",
            ColumnKind::Real { .. } => "real",
            ColumnKind::Text { .. } => "text",
            ColumnKind::Date { .. } => "date",
            ColumnKind::Bool { .. } => "bool",
            ColumnKind::Json { .. } => "json",
        }
    }
}

/// A column descriptor: name, logical kind, and constraint flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnKind,
    pub primary: bool,
    pub unique: bool,
    pub nullable: bool,
}

impl ColumnDef {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            primary: false,
            unique: false,
            nullable: false,
        }
    }

    /// Integer column.
    #[must_use]
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(
            name,
            ColumnKind::Int {
                auto_increment: false,
                union: None,
                default: None,
            },
        )
    }

    /// Real (floating point) column.
    #[must_use]
    pub fn real(name: impl Into<String>) -> Self {
        Self::new(
            name,
            ColumnKind::Real {
                union: None,
                default: None,
            },
        )
    }

    /// Text column.
    #[must_use]
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(
            name,
            ColumnKind::Text {
                union: None,
                default: None,
            },
        )
    }

    /// Date column, stored as millisecond epoch.
    #[must_use]
    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Date { default: None })
    }

    /// Boolean column, stored as 0/1.
    #[must_use]
    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Bool { default: None })
    }

    /// JSON column with the given shape, stored as text.
    #[must_use]
    pub fn json(name: impl Into<String>, shape: JsonShape) -> Self {
        Self::new(
            name,
            ColumnKind::Json {
                shape,
                default: None,
            },
        )
    }

    /// Mark this column as (part of) the primary key.
    #[must_use]
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Enable auto-increment. Only meaningful on `int` columns; validation
    /// rejects it elsewhere.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        if let ColumnKind::Int {
            ref mut auto_increment,
            ..
        } = self.kind
        {
            *auto_increment = true;
        }
        self
    }

    /// Restrict an int column to the listed values.
    #[must_use]
    pub fn int_union(mut self, values: Vec<i64>) -> Self {
        if let ColumnKind::Int { ref mut union, .. } = self.kind {
            *union = Some(values);
        }
        self
    }

    /// Restrict a real column to the listed values.
    #[must_use]
    pub fn real_union(mut self, values: Vec<f64>) -> Self {
        if let ColumnKind::Real { ref mut union, .. } = self.kind {
            *union = Some(values);
        }
        self
    }

    /// Restrict a text column to the listed values.
    #[must_use]
    pub fn text_union(mut self, values: Vec<impl Into<String>>) -> Self {
        if let ColumnKind::Text { ref mut union, .. } = self.kind {
            *union = Some(values.into_iter().map(Into::into).collect());
        }
        self
    }

    /// Attach a default value. The value must match the column kind;
    /// mismatches are rejected at table validation.
    #[must_use]
    pub fn default_int(mut self, value: i64) -> Self {
        if let ColumnKind::Int {
            ref mut default, ..
        } = self.kind
        {
            *default = Some(value);
        }
        self
    }

    #[must_use]
    pub fn default_real(mut self, value: f64) -> Self {
        if let ColumnKind::Real {
            ref mut default, ..
        } = self.kind
        {
            *default = Some(value);
        }
        self
    }

    #[must_use]
    pub fn default_text(mut self, value: impl Into<String>) -> Self {
        if let ColumnKind::Text {
            ref mut default, ..
        } = self.kind
        {
            *default = Some(value.into());
        }
        self
    }

    #[must_use]
    pub fn default_date(mut self, value: NaiveDateTime) -> Self {
        if let ColumnKind::Date { ref mut default } = self.kind {
            *default = Some(value);
        }
        self
    }

    #[must_use]
    pub fn default_bool(mut self, value: bool) -> Self {
        if let ColumnKind::Bool { ref mut default } = self.kind {
            *default = Some(value);
        }
        self
    }

    #[must_use]
    pub fn default_json(mut self, value: JsonValue) -> Self {
        if let ColumnKind::Json {
            ref mut default, ..
        } = self.kind
        {
            *default = Some(value);
        }
        self
    }

    #[must_use]
    pub fn has_default(&self) -> bool {
        self.kind.has_default()
    }

    #[must_use]
    pub fn is_auto_increment(&self) -> bool {
        self.kind.is_auto_increment()
    }

    /// Check a logical value against this column's kind and union whitelist.
    ///
    /// NULL passes here; whether NULL is permitted at all is decided by the
    /// projection rules, not the kind.
    ///
    /// # Errors
    ///
    /// Returns `DbError::InvalidArgument` naming the column on a kind
    /// mismatch, a union-whitelist miss, or a JSON shape violation.
    pub fn check_value(&self, value: &DbValue) -> Result<(), DbError> {
        if value.is_null() {
            return Ok(());
        }
        match (&self.kind, value) {
            (ColumnKind::Int { union, .. }, DbValue::Int(v)) => {
                if let Some(allowed) = union
                    && !allowed.contains(v)
                {
                    return Err(self.union_error(&v.to_string()));
                }
                Ok(())
            }
            (ColumnKind::Real { union, .. }, DbValue::Float(v)) => {
                if let Some(allowed) = union
                    && !allowed.contains(v)
                {
                    return Err(self.union_error(&v.to_string()));
                }
                Ok(())
            }
            // Integer literals are acceptable for real columns.
            (ColumnKind::Real { union, .. }, DbValue::Int(v)) => {
                #[allow(clippy::cast_precision_loss)]
                let as_real = *v as f64;
                if let Some(allowed) = union
                    && !allowed.contains(&as_real)
                {
                    return Err(self.union_error(&v.to_string()));
                }
                Ok(())
            }
            (ColumnKind::Text { union, .. }, DbValue::Text(v)) => {
                if let Some(allowed) = union
                    && !allowed.contains(v)
                {
                    return Err(self.union_error(v));
                }
                Ok(())
            }
            (ColumnKind::Date { .. }, DbValue::Timestamp(_) | DbValue::Int(_)) => Ok(()),
            (ColumnKind::Bool { .. }, DbValue::Bool(_)) => Ok(()),
            (ColumnKind::Json { shape, .. }, DbValue::Json(v)) => {
                shape.validate_value(v).map_err(|reason| {
                    DbError::InvalidArgument(format!(
                        "column '{}': json shape mismatch: {reason}",
                        self.name
                    ))
                })
            }
            (kind, other) => Err(DbError::InvalidArgument(format!(
                "column '{}' expects {}, got {other:?}",
                self.name,
                kind.name()
            ))),
        }
    }

    fn union_error(&self, got: &str) -> DbError {
        DbError::InvalidArgument(format!(
            "column '{}': value {got} is not in the permitted set",
            self.name
        ))
    }
}
