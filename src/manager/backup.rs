use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::info;

use crate::error::DbError;
use crate::schema::export::{
    SchemaExport, export_schema, import_schema, introspect_columns, list_user_tables,
    table_ddl_from_introspection,
};

use super::DatabaseManager;

/// On-disk layout of a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackupFormat {
    /// A full engine database file produced via `VACUUM INTO`.
    #[default]
    Binary,
    /// A schema-only JSON document (no row data).
    Json,
}

/// Options for [`DatabaseManager::backup`].
#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub compress: bool,
    pub include_data: bool,
    pub format: BackupFormat,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            compress: false,
            include_data: true,
            format: BackupFormat::Binary,
        }
    }
}

/// Options for [`DatabaseManager::restore`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    /// Drop every user table before restoring.
    pub drop_existing: bool,
}

impl DatabaseManager {
    /// Write a backup to `path` and return the final path (which gains a
    /// `.gz` suffix under compression).
    ///
    /// A binary backup with data is produced by `VACUUM INTO`, so it is a
    /// valid database file with the live file's layout. Schema-only backups
    /// (JSON format, or `include_data: false`) serialize the schema export.
    ///
    /// # Errors
    ///
    /// `DbError::NotConnected` after disconnect; engine and I/O failures
    /// otherwise.
    pub async fn backup(&self, path: &str, options: BackupOptions) -> Result<String, DbError> {
        let final_path = if options.compress && !path.ends_with(".gz") {
            format!("{path}.gz")
        } else {
            path.to_string()
        };

        if options.format == BackupFormat::Json || !options.include_data {
            let export = self
                .connection()?
                .with_connection(|conn| export_schema(conn))
                .await?;
            let serialized = serde_json::to_string_pretty(&export).map_err(|err| {
                DbError::ExecutionError(format!("schema serialization failed: {err}"))
            })?;
            write_maybe_compressed(&final_path, serialized.as_bytes(), options.compress)?;
            info!(path = %final_path, "schema backup written");
            return Ok(final_path);
        }

        let tmp_path = format!("{final_path}.tmp");
        if Path::new(&tmp_path).exists() {
            fs::remove_file(&tmp_path)
                .map_err(|err| DbError::ExecutionError(format!("cannot clear {tmp_path}: {err}")))?;
        }

        {
            let vacuum_target = tmp_path.clone();
            self.connection()?
                .with_connection(move |conn| {
                    conn.execute("VACUUM INTO ?1", [&vacuum_target])?;
                    Ok(())
                })
                .await?;
        }

        if options.compress {
            let bytes = fs::read(&tmp_path)
                .map_err(|err| DbError::ExecutionError(format!("cannot read {tmp_path}: {err}")))?;
            write_maybe_compressed(&final_path, &bytes, true)?;
            fs::remove_file(&tmp_path)
                .map_err(|err| DbError::ExecutionError(format!("cannot remove {tmp_path}: {err}")))?;
        } else {
            fs::rename(&tmp_path, &final_path).map_err(|err| {
                DbError::ExecutionError(format!("cannot move backup into place: {err}"))
            })?;
        }
        info!(path = %final_path, "database backup written");
        Ok(final_path)
    }

    /// Restore from a backup produced by [`DatabaseManager::backup`].
    ///
    /// Compressed backups are transparently decompressed; the inner format
    /// is derived from the filename with `.gz` stripped. JSON backups go
    /// through schema import; binary backups are opened read-only and
    /// copied table by table with `INSERT OR REPLACE`.
    ///
    /// # Errors
    ///
    /// `DbError::BackupNotFound` when `path` does not exist;
    /// `DbError::BackupCorrupt` when it cannot be read as a backup.
    pub async fn restore(&self, path: &str, options: RestoreOptions) -> Result<(), DbError> {
        if !Path::new(path).exists() {
            return Err(DbError::BackupNotFound(path.to_string()));
        }

        // Decompress next to the backup so the copy stays on one filesystem.
        let (working_path, temp_to_clean, inner_name) = if path.ends_with(".gz") {
            let inner = path.trim_end_matches(".gz").to_string();
            let temp = format!("{inner}.restoring");
            gunzip_file(path, &temp)?;
            (temp.clone(), Some(temp), inner)
        } else {
            (path.to_string(), None, path.to_string())
        };

        let result = self
            .restore_inner(&working_path, &inner_name, options)
            .await;

        if let Some(temp) = temp_to_clean {
            let _ = fs::remove_file(temp);
        }
        result
    }

    async fn restore_inner(
        &self,
        working_path: &str,
        inner_name: &str,
        options: RestoreOptions,
    ) -> Result<(), DbError> {
        if options.drop_existing {
            self.connection()?
                .with_connection(|conn| {
                    for table in list_user_tables(conn)? {
                        conn.execute_batch(&format!("DROP TABLE IF EXISTS {table}"))?;
                    }
                    Ok(())
                })
                .await?;
        }

        if inner_name.ends_with(".json") {
            let text = fs::read_to_string(working_path).map_err(|err| {
                DbError::BackupCorrupt(format!("cannot read schema backup: {err}"))
            })?;
            let export: SchemaExport = serde_json::from_str(&text).map_err(|err| {
                DbError::BackupCorrupt(format!("schema backup is not valid JSON: {err}"))
            })?;
            self.connection()?
                .with_connection(move |conn| import_schema(conn, &export))
                .await?;
            info!(path = %working_path, "schema restore complete");
            return Ok(());
        }

        let backup_path = working_path.to_string();
        self.connection()?
            .with_connection(move |conn| copy_tables_from_backup(conn, &backup_path))
            .await?;
        info!(path = %working_path, "database restore complete");
        Ok(())
    }
}

/// Open the backup read-only and copy every table into the live database,
/// recreating DDL from introspection and replacing on key conflicts.
fn copy_tables_from_backup(
    conn: &mut rusqlite::Connection,
    backup_path: &str,
) -> Result<(), DbError> {
    let backup = rusqlite::Connection::open_with_flags(
        backup_path,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
    )
    .map_err(|err| DbError::BackupCorrupt(format!("cannot open backup: {err}")))?;

    let tables = list_user_tables(&backup)
        .map_err(|err| DbError::BackupCorrupt(format!("cannot enumerate backup tables: {err}")))?;

    for table in tables {
        let columns = introspect_columns(&backup, &table)?;
        conn.execute_batch(&table_ddl_from_introspection(&table, &columns))?;

        let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let placeholders = vec!["?"; column_names.len()].join(", ");
        let insert_sql = format!(
            "INSERT OR REPLACE INTO {table} ({}) VALUES ({placeholders})",
            column_names.join(", ")
        );

        let mut read_stmt = backup.prepare(&format!("SELECT * FROM {table}"))?;
        let tx = conn.transaction()?;
        {
            let mut write_stmt = tx.prepare(&insert_sql)?;
            let mut rows = read_stmt.query([])?;
            while let Some(row) = rows.next()? {
                let mut values: Vec<rusqlite::types::Value> =
                    Vec::with_capacity(column_names.len());
                for idx in 0..column_names.len() {
                    values.push(row.get_ref(idx)?.into());
                }
                let refs: Vec<&dyn rusqlite::ToSql> =
                    values.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
                write_stmt.execute(&refs[..])?;
            }
        }
        tx.commit()?;
    }
    Ok(())
}

fn write_maybe_compressed(path: &str, bytes: &[u8], compress: bool) -> Result<(), DbError> {
    if compress {
        let file = fs::File::create(path)
            .map_err(|err| DbError::ExecutionError(format!("cannot create {path}: {err}")))?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder
            .write_all(bytes)
            .and_then(|()| encoder.finish().map(|_| ()))
            .map_err(|err| DbError::ExecutionError(format!("compression failed: {err}")))?;
    } else {
        fs::write(path, bytes)
            .map_err(|err| DbError::ExecutionError(format!("cannot write {path}: {err}")))?;
    }
    Ok(())
}

fn gunzip_file(source: &str, target: &str) -> Result<(), DbError> {
    let file = fs::File::open(source)
        .map_err(|err| DbError::BackupCorrupt(format!("cannot open {source}: {err}")))?;
    let mut decoder = GzDecoder::new(file);
    let mut bytes = Vec::new();
    decoder
        .read_to_end(&mut bytes)
        .map_err(|err| DbError::BackupCorrupt(format!("decompression failed: {err}")))?;
    fs::write(target, bytes)
        .map_err(|err| DbError::ExecutionError(format!("cannot write {target}: {err}")))?;
    Ok(())
}
