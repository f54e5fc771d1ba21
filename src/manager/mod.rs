// Manager module - database lifecycle around one primary connection and an
// optional pool.
//
// - backup: binary/JSON backups and restore
// - merge: cross-database merging and compatibility analysis
// - maintenance: transactions, optimize, stats, integrity

mod backup;
mod maintenance;
mod merge;

pub use backup::{BackupFormat, BackupOptions, RestoreOptions};
pub use maintenance::{
    DatabaseStats, IntegrityReport, IsolationLevel, OptimizeOptions, TableRecordStats,
};
pub use merge::{CompatibleTable, ConflictChoice, MergeCompatibility, MergeOptions, MergeReport};

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};

use tracing::info;

use crate::connection::{DbConnection, PragmaProfile};
use crate::error::DbError;
use crate::pool::{ConnectionPool, PoolConfig};
use crate::schema::ddl::create_table_sql;
use crate::schema::export::{SchemaExport, export_schema, import_schema};
use crate::schema::table::Schema;
use crate::table::Table;
use crate::types::DatabaseKind;

/// Options for [`DatabaseManager::connect`].
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub database_path: String,
    pub schema: Schema,
    pub kind: DatabaseKind,
    pub use_pool: bool,
    pub pool_config: Option<PoolConfig>,
}

impl ManagerOptions {
    #[must_use]
    pub fn new(database_path: impl Into<String>, schema: Schema) -> Self {
        Self {
            database_path: database_path.into(),
            schema,
            kind: DatabaseKind::Sqlite,
            use_pool: false,
            pool_config: None,
        }
    }

    /// Enable the connection pool with the given configuration.
    #[must_use]
    pub fn with_pool(mut self, config: PoolConfig) -> Self {
        self.use_pool = true;
        self.pool_config = Some(config);
        self
    }
}

/// Owner of the primary connection, the registered schema, and (optionally)
/// a connection pool; vends per-table facades.
///
/// Table DDL is materialized on demand: the first [`DatabaseManager::table`]
/// call for a name runs its `CREATE TABLE IF NOT EXISTS`.
pub struct DatabaseManager {
    path: String,
    schema: Arc<Schema>,
    primary: StdMutex<Option<DbConnection>>,
    pool: StdMutex<Option<ConnectionPool>>,
    created_tables: tokio::sync::Mutex<HashSet<String>>,
}

impl DatabaseManager {
    /// Validate the schema, open the primary connection (creating the file
    /// if needed), and optionally start the pool.
    ///
    /// # Errors
    ///
    /// `DbError::InvalidSchema` for a bad schema; connection and pool open
    /// failures otherwise.
    pub async fn connect(options: ManagerOptions) -> Result<Self, DbError> {
        options.schema.validate()?;

        let primary = DbConnection::open(&options.database_path, PragmaProfile::Primary).await?;
        let pool = if options.use_pool {
            let config = options.pool_config.unwrap_or_default();
            Some(ConnectionPool::new(&options.database_path, config).await?)
        } else {
            None
        };
        info!(path = %options.database_path, "database manager connected");

        Ok(Self {
            path: options.database_path,
            schema: Arc::new(options.schema),
            primary: StdMutex::new(Some(primary)),
            pool: StdMutex::new(pool),
            created_tables: tokio::sync::Mutex::new(HashSet::new()),
        })
    }

    /// The database path this manager serves.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The registered schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Close the primary connection and the pool. Idempotent.
    pub async fn disconnect(&self) {
        let primary = lock_std(&self.primary).take();
        drop(primary);
        let pool = lock_std(&self.pool).take();
        if let Some(pool) = pool {
            pool.close().await;
        }
        info!(path = %self.path, "database manager disconnected");
    }

    /// Whether the manager currently holds a live primary connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        lock_std(&self.primary).is_some()
    }

    /// The primary connection.
    ///
    /// # Errors
    ///
    /// `DbError::NotConnected` after [`DatabaseManager::disconnect`].
    pub fn connection(&self) -> Result<DbConnection, DbError> {
        lock_std(&self.primary).clone().ok_or(DbError::NotConnected)
    }

    /// The pool, when enabled.
    ///
    /// # Errors
    ///
    /// `DbError::InvalidArgument` when the manager was connected without a
    /// pool; `DbError::NotConnected` after disconnect.
    pub fn pool(&self) -> Result<ConnectionPool, DbError> {
        if !self.is_connected() {
            return Err(DbError::NotConnected);
        }
        lock_std(&self.pool)
            .clone()
            .ok_or_else(|| DbError::InvalidArgument("connection pool is not enabled".into()))
    }

    /// Get the facade for a schema table, creating the table on first use.
    ///
    /// # Errors
    ///
    /// `DbError::InvalidArgument` for a name the schema does not know;
    /// `DbError::NotConnected` after disconnect; DDL failures otherwise.
    pub async fn table(&self, name: &str) -> Result<Table, DbError> {
        let conn = self.connection()?;
        let table_schema = self
            .schema
            .find_table(name)
            .ok_or_else(|| {
                DbError::InvalidArgument(format!("schema has no table '{name}'"))
            })?
            .clone();

        let mut created = self.created_tables.lock().await;
        if !created.contains(name) {
            conn.execute_batch(create_table_sql(&table_schema)?).await?;
            created.insert(name.to_owned());
        }
        drop(created);

        Ok(Table::new(conn, Arc::new(table_schema)))
    }

    /// Run `CREATE TABLE IF NOT EXISTS` for every schema table.
    ///
    /// # Errors
    ///
    /// `DbError::NotConnected` after disconnect; DDL failures otherwise.
    pub async fn ensure_tables(&self) -> Result<(), DbError> {
        let conn = self.connection()?;
        let mut created = self.created_tables.lock().await;
        for table in &self.schema.tables {
            if !created.contains(&table.name) {
                conn.execute_batch(create_table_sql(table)?).await?;
                created.insert(table.name.clone());
            }
        }
        Ok(())
    }

    /// Export the live schema (engine introspection plus index SQL).
    ///
    /// # Errors
    ///
    /// `DbError::NotConnected` after disconnect; engine errors otherwise.
    pub async fn export_schema(&self) -> Result<SchemaExport, DbError> {
        self.connection()?
            .with_connection(|conn| export_schema(conn))
            .await
    }

    /// Recreate tables and indexes from a schema export.
    ///
    /// # Errors
    ///
    /// `DbError::NotConnected` after disconnect; engine errors otherwise.
    pub async fn import_schema(&self, export: &SchemaExport) -> Result<(), DbError> {
        let export = export.clone();
        self.connection()?
            .with_connection(move |conn| import_schema(conn, &export))
            .await
    }
}

pub(crate) fn lock_std<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
