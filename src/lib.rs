/*!
 * SQLite DAL - a typed, schema-driven data-access layer over SQLite
 *
 * This crate provides a declarative schema model that projects onto both SQL
 * DDL and a validated row model, a per-table CRUD facade with structured
 * predicates and pagination, a connection pool with FIFO waiters, idle
 * eviction, health probes and caching, and database lifecycle operations:
 * backup/restore, cross-database merging, and schema export/import.
 *
 * # Example
 *
 * ```rust,no_run
 * use sqlite_dal::prelude::*;
 *
 * async fn example() -> Result<(), DbError> {
 *     let schema = Schema::new().table(
 *         TableSchema::new("users")
 *             .column(ColumnDef::int("id").primary().auto_increment())
 *             .column(ColumnDef::text("email").unique())
 *             .column(
 *                 ColumnDef::text("role")
 *                     .text_union(vec!["admin", "user"])
 *                     .default_text("user"),
 *             )
 *             .column(ColumnDef::bool("is_active").default_bool(true))
 *             .column(ColumnDef::date("created_at")),
 *     );
 *
 *     let manager = DatabaseManager::connect(
 *         ManagerOptions::new("app.db", schema).with_pool(PoolConfig::default()),
 *     )
 *     .await?;
 *
 *     let users = manager.table("users").await?;
 *     let mut row = Row::new();
 *     row.insert("email".into(), DbValue::Text("a@example.com".into()));
 *     row.insert(
 *         "created_at".into(),
 *         DbValue::Timestamp(chrono::Utc::now().naive_utc()),
 *     );
 *     users.insert(&[row]).await?;
 *
 *     let admins = users
 *         .query()
 *         .where_eq("role", "admin")
 *         .limit(10)
 *         .execute()
 *         .await?;
 *     println!("{} admins", admins.len());
 *
 *     manager.disconnect().await;
 *     Ok(())
 * }
 * ```
 */

#![forbid(unsafe_code)]

// Core modules
pub mod builder;
pub mod codec;
pub mod connection;
pub mod error;
pub mod manager;
pub mod pool;
pub mod predicate;
pub mod results;
pub mod schema;
pub mod table;
pub mod types;

mod retry;

// Re-export everything that should be part of the public API
pub mod prelude {
    //! Convenient imports for common functionality.
    //!
    //! This module re-exports the most commonly used types to make it easier
    //! to get started with the library.

    pub use crate::builder::SelectBuilder;
    pub use crate::connection::{DbConnection, PragmaProfile, PreparedStatement};
    pub use crate::error::DbError;
    pub use crate::manager::{
        BackupFormat, BackupOptions, DatabaseManager, IsolationLevel, ManagerOptions,
        MergeOptions, OptimizeOptions, RestoreOptions,
    };
    pub use crate::pool::{
        CacheOptions, ConnectionPool, PoolConfig, PoolGuard, PoolStats, close_all_pools,
    };
    pub use crate::predicate::Predicate;
    pub use crate::results::{DbRow, ResultSet, Row};
    pub use crate::schema::{ColumnDef, ColumnKind, IndexSpec, JsonShape, Schema, TableSchema};
    pub use crate::table::{
        AggregateFunction, ExportOptions, ImportOptions, OrderBy, SelectOptions, SortDirection,
        SyncOptions, SyncStrategy, Table,
    };
    pub use crate::types::{ConflictResolution, DatabaseKind, DbValue, QueryAndParams};
}

// Direct exports of frequently used types for simplicity
pub use builder::SelectBuilder;
pub use connection::{DbConnection, PragmaProfile, PreparedStatement};
pub use error::DbError;
pub use manager::{DatabaseManager, ManagerOptions};
pub use pool::{CacheOptions, ConnectionPool, PoolConfig, PoolGuard, PoolStats, close_all_pools};
pub use predicate::{CompiledPredicate, Predicate};
pub use results::{DbRow, ResultSet, Row};
pub use schema::{ColumnDef, ColumnKind, JsonShape, Schema, TableSchema};
pub use table::Table;
pub use types::{ConflictResolution, DatabaseKind, DbValue, QueryAndParams};
