use thiserror::Error;

/// Errors surfaced by the data-access layer.
///
/// Callers are expected to match on the variant, not the message text.
#[derive(Debug, Error)]
pub enum DbError {
    /// Engine-level error that does not map to a more specific variant.
    #[error(transparent)]
    Sqlite(rusqlite::Error),

    /// Schema validation or DDL emission precondition violated.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Empty insert, negative limit/skip, empty update values, and similar.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Update or delete issued without a meaningful predicate.
    #[error("update/delete requires a predicate with at least one condition")]
    MissingPredicate,

    /// Operation issued before `connect` or after `disconnect`.
    #[error("not connected to a database")]
    NotConnected,

    /// Restore/merge source file does not exist.
    #[error("backup file not found: {0}")]
    BackupNotFound(String),

    /// Restore/merge source file exists but cannot be read as a backup.
    #[error("backup file is corrupt: {0}")]
    BackupCorrupt(String),

    /// Pool exhausted past the configured acquire timeout.
    #[error("timed out acquiring a pooled connection after {0}ms")]
    AcquireTimeout(u64),

    /// Waiter rejected because the pool is shutting down.
    #[error("connection pool is closing")]
    PoolClosing,

    /// The engine reported the database locked and the retry budget ran out.
    #[error("database is locked: {0}")]
    EngineLocked(String),

    /// Engine-reported unique/foreign-key/not-null violation.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Merge under the `fail` strategy hit a conflicting row.
    #[error("merge conflict in table {table}: {message}")]
    MergeConflict { table: String, message: String },

    /// Worker channel or connection setup failure.
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// SQL execution failure outside the engine error taxonomy.
    #[error("SQL execution error: {0}")]
    ExecutionError(String),
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, message) => match code.code {
                rusqlite::ErrorCode::ConstraintViolation => {
                    DbError::ConstraintViolation(message.clone().unwrap_or_else(|| code.to_string()))
                }
                _ => DbError::Sqlite(err),
            },
            _ => DbError::Sqlite(err),
        }
    }
}

impl DbError {
    /// Whether this error is the engine's "database is locked/busy" failure.
    ///
    /// Only these errors are eligible for the automatic retry window.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        match self {
            DbError::EngineLocked(_) => true,
            DbError::Sqlite(rusqlite::Error::SqliteFailure(code, _)) => matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
