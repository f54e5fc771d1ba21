use std::any::Any;
use std::sync::Arc;

use rusqlite::types::Value;
use tokio::sync::oneshot;

use crate::error::DbError;
use crate::results::ResultSet;

pub(super) type BoxedResponse = Result<Box<dyn Any + Send>, DbError>;
pub(super) type BoxedCallback =
    Box<dyn FnOnce(&mut rusqlite::Connection) -> BoxedResponse + Send>;

/// Commands shipped from async callers to the worker thread that owns the
/// engine connection.
pub(super) enum Command {
    ExecuteBatch {
        sql: String,
        respond_to: oneshot::Sender<Result<(), DbError>>,
    },
    ExecuteSelect {
        sql: Arc<String>,
        params: Vec<Value>,
        respond_to: oneshot::Sender<Result<ResultSet, DbError>>,
    },
    ExecuteDml {
        sql: Arc<String>,
        params: Vec<Value>,
        respond_to: oneshot::Sender<Result<usize, DbError>>,
    },
    ExecuteInsert {
        sql: Arc<String>,
        params: Vec<Value>,
        respond_to: oneshot::Sender<Result<i64, DbError>>,
    },
    PrepareStatement {
        sql: Arc<String>,
        respond_to: oneshot::Sender<Result<(), DbError>>,
    },
    WithConnection {
        callback: BoxedCallback,
        respond_to: oneshot::Sender<BoxedResponse>,
    },
    Shutdown,
}
