use sqlite_dal::prelude::*;
use sqlite_dal::schema::{create_table_sql, drop_index_sql};

fn users_schema() -> Schema {
    Schema::new().table(
        TableSchema::new("users")
            .column(ColumnDef::int("id").primary().auto_increment())
            .column(ColumnDef::text("email").unique())
            .column(
                ColumnDef::text("role")
                    .text_union(vec!["admin", "user"])
                    .default_text("user"),
            )
            .column(ColumnDef::bool("is_active").default_bool(true))
            .column(ColumnDef::date("created_at")),
    )
}

#[test]
fn test01_invalid_schemas_are_rejected() {
    let no_primary = TableSchema::new("t").column(ColumnDef::text("name"));
    assert!(matches!(
        create_table_sql(&no_primary),
        Err(DbError::InvalidSchema(_))
    ));

    let empty_name = TableSchema::new("").column(ColumnDef::int("id").primary());
    assert!(matches!(
        create_table_sql(&empty_name),
        Err(DbError::InvalidSchema(_))
    ));

    let duplicate = TableSchema::new("t")
        .column(ColumnDef::int("id").primary())
        .column(ColumnDef::text("id"));
    assert!(matches!(
        create_table_sql(&duplicate),
        Err(DbError::InvalidSchema(_))
    ));
}

#[test]
fn test01_table_materialized_on_demand() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let manager =
            DatabaseManager::connect(ManagerOptions::new(":memory:", users_schema())).await?;

        // Unknown table names are rejected before touching the engine.
        assert!(matches!(
            manager.table("nope").await,
            Err(DbError::InvalidArgument(_))
        ));

        let users = manager.table("users").await?;
        assert_eq!(users.name(), "users");

        // The CREATE TABLE ran, so a raw count works.
        let rows = users.raw_query("SELECT COUNT(*) AS cnt FROM users", &[]).await?;
        assert_eq!(rows[0].get("cnt"), Some(&DbValue::Int(0)));

        manager.disconnect().await;
        assert!(matches!(manager.table("users").await, Err(DbError::NotConnected)));
        Ok::<(), DbError>(())
    })?;
    Ok(())
}

#[test]
fn test01_schema_export_import_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("roundtrip.db");
        let manager = DatabaseManager::connect(ManagerOptions::new(
            path.to_str().expect("utf-8 path"),
            users_schema(),
        ))
        .await?;
        let users = manager.table("users").await?;

        users
            .create_index(&IndexSpec::new("idx_users_email", vec!["email".into()]).unique())
            .await?;

        let before = manager.export_schema().await?;
        assert_eq!(before.version, "1.0");
        assert_eq!(before.tables.len(), 1);
        assert!(
            before.tables[0]
                .indexes
                .iter()
                .any(|idx| idx.name == "idx_users_email")
        );

        // Drop everything, then rebuild from the export.
        let conn = manager.connection()?;
        conn.execute_batch(drop_index_sql("idx_users_email", true))
            .await?;
        conn.execute_batch("DROP TABLE users").await?;

        manager.import_schema(&before).await?;
        let after = manager.export_schema().await?;

        // Same column and index sets (the created stamp differs).
        assert_eq!(before.tables, after.tables);

        manager.disconnect().await;
        Ok::<(), DbError>(())
    })?;
    Ok(())
}
