use serde_json::Value as JsonValue;
use serde_json::json;
use tracing::warn;

use crate::codec::{db_value_to_json, json_to_column_value};
use crate::error::DbError;
use crate::predicate::Predicate;
use crate::results::Row;
use crate::schema::project::validate_insert_row;
use crate::types::ConflictResolution;

use super::bulk::DEFAULT_BATCH_SIZE;
use super::{SelectOptions, Table};

/// Options for [`Table::export_to_json`].
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub filter: Option<Predicate>,
    pub columns: Vec<String>,
    /// When set, the document is written here instead of returned.
    pub file_path: Option<String>,
    /// Pretty-print the document (the default).
    pub pretty: Option<bool>,
}

/// Options for [`Table::import_from_json`].
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub conflict_resolution: ConflictResolution,
    pub batch_size: usize,
    pub validate_schema: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            conflict_resolution: ConflictResolution::Replace,
            batch_size: DEFAULT_BATCH_SIZE,
            validate_schema: true,
        }
    }
}

/// Outcome of a JSON import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Strategy applied by [`Table::sync_with`] when the target already has a
/// row for the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStrategy {
    /// Overwrite the full record.
    #[default]
    Replace,
    /// Overwrite only the non-null source fields, skipping the key.
    Update,
    /// Leave the target row unchanged.
    Ignore,
}

/// Options for [`Table::sync_with`].
pub struct SyncOptions {
    pub key_column: String,
    pub strategy: SyncStrategy,
    pub batch_size: usize,
    /// Called after each batch with (processed, total).
    pub on_progress: Option<Box<dyn Fn(usize, usize) + Send + Sync>>,
}

impl SyncOptions {
    #[must_use]
    pub fn keyed_on(key_column: impl Into<String>) -> Self {
        Self {
            key_column: key_column.into(),
            strategy: SyncStrategy::Replace,
            batch_size: DEFAULT_BATCH_SIZE,
            on_progress: None,
        }
    }

    #[must_use]
    pub fn strategy(mut self, strategy: SyncStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn on_progress(mut self, callback: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }
}

impl std::fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOptions")
            .field("key_column", &self.key_column)
            .field("strategy", &self.strategy)
            .field("batch_size", &self.batch_size)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Outcome of a table-to-table sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl Table {
    /// Export matching rows as a JSON document of the shape
    /// `{table, exported, count, data}`.
    ///
    /// Returns the serialized document, or `None` when `file_path` was set
    /// and the document was written there instead. Timestamps are exported
    /// as millisecond epochs; JSON columns stay nested values.
    ///
    /// # Errors
    ///
    /// Select failures, serialization failures, and file I/O errors.
    pub async fn export_to_json(
        &self,
        options: ExportOptions,
    ) -> Result<Option<String>, DbError> {
        let rows = self
            .select(SelectOptions {
                filter: options.filter.clone(),
                columns: options.columns.clone(),
                limit: None,
                skip: None,
            })
            .await?;

        let data: Vec<JsonValue> = rows
            .iter()
            .map(|row| {
                JsonValue::Object(
                    row.iter()
                        .map(|(name, value)| (name.clone(), db_value_to_json(value)))
                        .collect(),
                )
            })
            .collect();

        let document = json!({
            "table": self.schema.name,
            "exported": chrono::Utc::now().to_rfc3339(),
            "count": data.len(),
            "data": data,
        });

        let pretty = options.pretty.unwrap_or(true);
        let serialized = if pretty {
            serde_json::to_string_pretty(&document)
        } else {
            serde_json::to_string(&document)
        }
        .map_err(|err| DbError::ExecutionError(format!("export serialization failed: {err}")))?;

        match options.file_path {
            Some(path) => {
                std::fs::write(&path, serialized).map_err(|err| {
                    DbError::ExecutionError(format!("failed to write export to {path}: {err}"))
                })?;
                Ok(None)
            }
            None => Ok(Some(serialized)),
        }
    }

    /// Import rows from a JSON document produced by [`Table::export_to_json`]
    /// (or a bare row array).
    ///
    /// Rows are applied in chunked transactions. `Replace` upserts keyed by
    /// the primary column when the row carries it; `Ignore` records failed
    /// batches and keeps going; `Fail` surfaces the first error.
    ///
    /// # Errors
    ///
    /// `DbError::InvalidArgument` when the document cannot be parsed, or
    /// batch errors under the `Fail` strategy.
    pub async fn import_from_json(
        &self,
        document: &str,
        options: ImportOptions,
    ) -> Result<ImportReport, DbError> {
        let parsed: JsonValue = serde_json::from_str(document)
            .map_err(|err| DbError::InvalidArgument(format!("import is not valid JSON: {err}")))?;
        self.import_from_json_value(&parsed, options).await
    }

    /// Like [`Table::import_from_json`], from an already-parsed value.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Table::import_from_json`].
    pub async fn import_from_json_value(
        &self,
        document: &JsonValue,
        options: ImportOptions,
    ) -> Result<ImportReport, DbError> {
        if options.batch_size == 0 {
            return Err(DbError::InvalidArgument("batch size must be positive".into()));
        }
        let entries = match document {
            JsonValue::Array(entries) => entries.as_slice(),
            JsonValue::Object(map) => map
                .get("data")
                .and_then(JsonValue::as_array)
                .map(Vec::as_slice)
                .ok_or_else(|| {
                    DbError::InvalidArgument("import document has no 'data' array".into())
                })?,
            _ => {
                return Err(DbError::InvalidArgument(
                    "import document must be an object or array".into(),
                ));
            }
        };

        let mut report = ImportReport::default();
        let mut rows: Vec<Row> = Vec::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            match self.json_entry_to_row(entry) {
                Ok(row) => {
                    if options.validate_schema {
                        if let Err(err) = validate_insert_row(&self.schema, &row) {
                            if options.conflict_resolution == ConflictResolution::Fail {
                                return Err(err);
                            }
                            report.skipped += 1;
                            report.errors.push(format!("row {idx}: {err}"));
                            continue;
                        }
                    }
                    rows.push(row);
                }
                Err(reason) => {
                    if options.conflict_resolution == ConflictResolution::Fail {
                        return Err(DbError::InvalidArgument(format!("row {idx}: {reason}")));
                    }
                    report.skipped += 1;
                    report.errors.push(format!("row {idx}: {reason}"));
                }
            }
        }

        let primary = self.schema.primary_column().map(|c| c.name.clone());
        for batch in rows.chunks(options.batch_size) {
            let outcome = match options.conflict_resolution {
                ConflictResolution::Replace => self.import_batch_replace(batch, primary.as_deref()).await,
                ConflictResolution::Ignore | ConflictResolution::Fail => {
                    self.insert(batch).await.map(|_| batch.len())
                }
            };
            match outcome {
                Ok(count) => report.imported += count,
                Err(err) => {
                    if options.conflict_resolution == ConflictResolution::Fail {
                        return Err(err);
                    }
                    report.skipped += batch.len();
                    report.errors.push(format!("batch failed: {err}"));
                    warn!(table = %self.schema.name, error = %err, "import batch skipped");
                }
            }
        }
        Ok(report)
    }

    /// Synchronize this table from `source`, matching rows on `key_column`.
    ///
    /// Source rows absent from this table are inserted; present rows are
    /// resolved by the strategy. The progress callback fires after each
    /// batch with (processed, total).
    ///
    /// # Errors
    ///
    /// `DbError::InvalidArgument` for an unknown key column or zero batch
    /// size; engine errors otherwise.
    pub async fn sync_with(
        &self,
        source: &Table,
        options: SyncOptions,
    ) -> Result<SyncReport, DbError> {
        if self.schema.find_column(&options.key_column).is_none() {
            return Err(DbError::InvalidArgument(format!(
                "table '{}' has no column '{}'",
                self.schema.name, options.key_column
            )));
        }
        if options.batch_size == 0 {
            return Err(DbError::InvalidArgument("batch size must be positive".into()));
        }

        let total = usize::try_from(source.count(None).await?).unwrap_or(0);
        let mut report = SyncReport::default();
        let mut processed = 0usize;

        loop {
            let batch = source
                .select(SelectOptions {
                    filter: None,
                    columns: Vec::new(),
                    limit: Some(options.batch_size as i64),
                    skip: Some(processed as i64),
                })
                .await?;
            if batch.is_empty() {
                break;
            }

            for row in &batch {
                self.sync_row(row, &options, &mut report).await?;
            }

            processed += batch.len();
            if let Some(callback) = &options.on_progress {
                callback(processed, total);
            }
        }
        Ok(report)
    }

    async fn sync_row(
        &self,
        source_row: &Row,
        options: &SyncOptions,
        report: &mut SyncReport,
    ) -> Result<(), DbError> {
        let Some(key_value) = source_row.get(&options.key_column) else {
            report.skipped += 1;
            return Ok(());
        };
        let key_filter = Predicate::new().eq(options.key_column.clone(), key_value.clone());

        let existing = self
            .find_first(SelectOptions::new().filter(key_filter.clone()))
            .await?;
        match existing {
            None => {
                self.insert(std::slice::from_ref(source_row)).await?;
                report.inserted += 1;
            }
            Some(_) => match options.strategy {
                SyncStrategy::Ignore => {
                    report.skipped += 1;
                }
                SyncStrategy::Replace => {
                    let values: Row = source_row
                        .iter()
                        .filter(|(name, _)| *name != &options.key_column)
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect();
                    if values.is_empty() {
                        report.skipped += 1;
                    } else {
                        self.update(&key_filter, &values).await?;
                        report.updated += 1;
                    }
                }
                SyncStrategy::Update => {
                    let values: Row = source_row
                        .iter()
                        .filter(|(name, value)| {
                            *name != &options.key_column && !value.is_null()
                        })
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect();
                    if values.is_empty() {
                        report.skipped += 1;
                    } else {
                        self.update(&key_filter, &values).await?;
                        report.updated += 1;
                    }
                }
            },
        }
        Ok(())
    }

    async fn import_batch_replace(
        &self,
        batch: &[Row],
        primary: Option<&str>,
    ) -> Result<usize, DbError> {
        match primary {
            Some(key) if batch.iter().all(|row| row.contains_key(key)) => {
                self.upsert(batch, &[key], None).await
            }
            _ => self.insert(batch).await.map(|_| batch.len()),
        }
    }

    fn json_entry_to_row(&self, entry: &JsonValue) -> Result<Row, String> {
        let Some(map) = entry.as_object() else {
            return Err(format!("expected object row, got {entry}"));
        };
        let mut row = Row::new();
        for (name, value) in map {
            let Some(column) = self.schema.find_column(name) else {
                return Err(format!("unknown column '{name}'"));
            };
            let decoded = json_to_column_value(&column.kind, value)
                .map_err(|reason| format!("column '{name}': {reason}"))?;
            row.insert(name.clone(), decoded);
        }
        Ok(row)
    }
}

