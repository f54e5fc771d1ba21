use crate::error::DbError;
use crate::schema::export::list_user_tables;

use super::Table;

/// One column in a table-stats report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnStat {
    pub name: String,
    pub type_name: String,
    pub nullable: bool,
    pub primary: bool,
}

/// Per-table statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStats {
    pub name: String,
    pub record_count: u64,
    pub columns: Vec<ColumnStat>,
    pub indexes: Vec<String>,
    /// Human-readable size approximation: the database size apportioned to
    /// this table by its share of total records.
    pub estimated_size: String,
}

/// Format a byte count the way the stats surfaces expect.
#[must_use]
pub(crate) fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    #[allow(clippy::cast_precision_loss)]
    let bytes_f = bytes as f64;
    if bytes_f >= GB {
        format!("{:.2} GB", bytes_f / GB)
    } else if bytes_f >= MB {
        format!("{:.2} MB", bytes_f / MB)
    } else if bytes_f >= KB {
        format!("{:.2} KB", bytes_f / KB)
    } else {
        format!("{bytes} Bytes")
    }
}

impl Table {
    /// Collect statistics for this table: record count, column summary,
    /// index names, and an approximate size.
    ///
    /// # Errors
    ///
    /// Engine errors from the catalog queries.
    pub async fn stats(&self) -> Result<TableStats, DbError> {
        let name = self.schema.name.clone();
        let columns: Vec<ColumnStat> = self
            .schema
            .columns
            .iter()
            .map(|column| ColumnStat {
                name: column.name.clone(),
                type_name: column.kind.name().to_string(),
                nullable: column.nullable,
                primary: column.primary,
            })
            .collect();

        let table_name = name.clone();
        let (record_count, indexes, estimated_bytes) = self
            .conn
            .with_connection(move |conn| {
                let record_count: u64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM {table_name}"),
                    [],
                    |row| row.get(0),
                )?;

                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 ORDER BY name",
                )?;
                let indexes = stmt
                    .query_map([&table_name], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;

                let database_bytes = database_size(conn)?;
                let total_records = total_record_count(conn)?;
                let estimated = if total_records == 0 {
                    0
                } else {
                    database_bytes * record_count / total_records
                };
                Ok((record_count, indexes, estimated))
            })
            .await?;

        Ok(TableStats {
            name,
            record_count,
            columns,
            indexes,
            estimated_size: format_size(estimated_bytes),
        })
    }
}

pub(crate) fn database_size(conn: &rusqlite::Connection) -> Result<u64, DbError> {
    let page_count: u64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
    let page_size: u64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
    Ok(page_count * page_size)
}

pub(crate) fn total_record_count(conn: &rusqlite::Connection) -> Result<u64, DbError> {
    let mut total: u64 = 0;
    for table in list_user_tables(conn)? {
        let count: u64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        total += count;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_formatting_buckets() {
        assert_eq!(format_size(512), "512 Bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
        assert_eq!(format_size(5 * 1024 * 1024 * 1024), "5.00 GB");
    }
}
