use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use rusqlite::ToSql;
use rusqlite::types::Value;
use tokio::sync::oneshot;

use crate::codec::build_result_set;
use crate::error::DbError;
use crate::results::ResultSet;

use super::channel::{BoxedCallback, BoxedResponse, Command};
use super::pragmas::{PragmaProfile, apply_pragmas};

/// The worker thread that owns one engine connection. The connection never
/// leaves the thread; commands and replies cross over channels.
pub(super) struct Worker {
    sender: Sender<Command>,
}

impl Worker {
    /// Spawn a worker, open the database inside it, and apply the pragma
    /// profile before the first command is accepted.
    pub(super) async fn spawn(path: String, profile: PragmaProfile) -> Result<Self, DbError> {
        let (sender, receiver) = mpsc::channel::<Command>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), DbError>>();

        thread::Builder::new()
            .name("sqlite-dal-worker".to_string())
            .spawn(move || {
                let mut conn = match open_connection(&path, profile) {
                    Ok(conn) => {
                        let _ = ready_tx.send(Ok(()));
                        conn
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                run_worker(&mut conn, &receiver);
            })
            .map_err(|err| {
                DbError::ConnectionError(format!("failed to spawn worker thread: {err}"))
            })?;

        ready_rx
            .await
            .map_err(|_| DbError::ConnectionError("worker exited before opening".into()))??;
        Ok(Self { sender })
    }

    pub(super) fn send_command(&self, command: Command) -> Result<(), DbError> {
        self.sender
            .send(command)
            .map_err(|_| DbError::ConnectionError("worker connection closed".into()))
    }

    pub(super) async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, DbError>>) -> Command,
        drop_message: &'static str,
    ) -> Result<T, DbError> {
        let (tx, rx) = oneshot::channel();
        self.send_command(build(tx))?;
        rx.await
            .map_err(|_| DbError::ConnectionError(drop_message.into()))?
    }

    pub(super) async fn with_connection<F, R>(&self, func: F) -> Result<R, DbError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, DbError> + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let callback: BoxedCallback = Box::new(move |conn| {
            func(conn).map(|value| Box::new(value) as Box<dyn std::any::Any + Send>)
        });
        self.send_command(Command::WithConnection {
            callback,
            respond_to: tx,
        })?;
        match rx.await {
            Ok(Ok(payload)) => payload
                .downcast::<R>()
                .map(|boxed| *boxed)
                .map_err(|_| DbError::ExecutionError("worker response downcast failure".into())),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(DbError::ConnectionError(
                "worker dropped while handling callback".into(),
            )),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
    }
}

fn open_connection(path: &str, profile: PragmaProfile) -> Result<rusqlite::Connection, DbError> {
    let conn = rusqlite::Connection::open(path)?;
    apply_pragmas(&conn, profile)?;
    Ok(conn)
}

fn run_worker(conn: &mut rusqlite::Connection, receiver: &Receiver<Command>) {
    while let Ok(command) = receiver.recv() {
        match command {
            Command::Shutdown => break,
            other => dispatch(conn, other),
        }
    }
}

fn dispatch(conn: &mut rusqlite::Connection, command: Command) {
    match command {
        Command::ExecuteBatch { sql, respond_to } => {
            let _ = respond_to.send(execute_batch(conn, &sql));
        }
        Command::ExecuteSelect {
            sql,
            params,
            respond_to,
        } => {
            let _ = respond_to.send(execute_select(conn, &sql, &params));
        }
        Command::ExecuteDml {
            sql,
            params,
            respond_to,
        } => {
            let _ = respond_to.send(execute_dml(conn, &sql, &params));
        }
        Command::ExecuteInsert {
            sql,
            params,
            respond_to,
        } => {
            let _ = respond_to.send(execute_insert(conn, &sql, &params));
        }
        Command::PrepareStatement { sql, respond_to } => {
            let _ = respond_to.send(prepare_statement(conn, &sql));
        }
        Command::WithConnection {
            callback,
            respond_to,
        } => {
            let _ = respond_to.send(run_callback(conn, callback));
        }
        Command::Shutdown => {}
    }
}

fn execute_batch(conn: &mut rusqlite::Connection, sql: &str) -> Result<(), DbError> {
    let tx = conn.transaction()?;
    tx.execute_batch(sql)?;
    tx.commit()?;
    Ok(())
}

fn execute_select(
    conn: &rusqlite::Connection,
    sql: &Arc<String>,
    params: &[Value],
) -> Result<ResultSet, DbError> {
    let mut stmt = conn.prepare_cached(sql.as_ref())?;
    build_result_set(&mut stmt, params)
}

fn execute_dml(
    conn: &rusqlite::Connection,
    sql: &Arc<String>,
    params: &[Value],
) -> Result<usize, DbError> {
    let mut stmt = conn.prepare_cached(sql.as_ref())?;
    let refs = params_as_tosql(params);
    Ok(stmt.execute(&refs[..])?)
}

fn execute_insert(
    conn: &rusqlite::Connection,
    sql: &Arc<String>,
    params: &[Value],
) -> Result<i64, DbError> {
    let mut stmt = conn.prepare_cached(sql.as_ref())?;
    let refs = params_as_tosql(params);
    stmt.execute(&refs[..])?;
    Ok(conn.last_insert_rowid())
}

fn prepare_statement(conn: &rusqlite::Connection, sql: &Arc<String>) -> Result<(), DbError> {
    let _ = conn.prepare_cached(sql.as_ref())?;
    Ok(())
}

fn run_callback(conn: &mut rusqlite::Connection, callback: BoxedCallback) -> BoxedResponse {
    callback(conn)
}

fn params_as_tosql(params: &[Value]) -> Vec<&dyn ToSql> {
    params.iter().map(|v| v as &dyn ToSql).collect()
}
