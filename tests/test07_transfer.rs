use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::DateTime;
use serde_json::json;
use sqlite_dal::prelude::*;

fn contacts_schema() -> Schema {
    let contacts = TableSchema::new("contacts")
        .column(ColumnDef::int("id").primary())
        .column(ColumnDef::text("email").unique())
        .column(ColumnDef::text("phone").nullable())
        .column(ColumnDef::date("added_at"));
    let contacts_backup = TableSchema::new("contacts_backup")
        .column(ColumnDef::int("id").primary())
        .column(ColumnDef::text("email").unique())
        .column(ColumnDef::text("phone").nullable())
        .column(ColumnDef::date("added_at"));
    Schema::new().table(contacts).table(contacts_backup)
}

fn row(entries: &[(&str, DbValue)]) -> Row {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

fn contact(id: i64, email: &str, phone: Option<&str>) -> Row {
    let t = DateTime::from_timestamp_millis(id * 1000)
        .expect("epoch")
        .naive_utc();
    row(&[
        ("id", DbValue::Int(id)),
        ("email", DbValue::Text(email.into())),
        (
            "phone",
            phone.map_or(DbValue::Null, |p| DbValue::Text(p.into())),
        ),
        ("added_at", DbValue::Timestamp(t)),
    ])
}

#[test]
fn test07_bulk_insert_preserves_order() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let manager =
            DatabaseManager::connect(ManagerOptions::new(":memory:", contacts_schema())).await?;
        let contacts = manager.table("contacts").await?;

        let rows: Vec<Row> = (1..=25)
            .map(|n| contact(n, &format!("u{n}@x"), None))
            .collect();
        let ids = contacts.bulk_insert(&rows, 10).await?;

        assert_eq!(ids.len(), 25);
        assert_eq!(ids, (1..=25).collect::<Vec<i64>>());
        assert_eq!(contacts.count(None).await?, 25);

        assert!(matches!(
            contacts.bulk_insert(&[], 10).await,
            Err(DbError::InvalidArgument(_))
        ));
        assert!(matches!(
            contacts.bulk_insert(&rows, 0).await,
            Err(DbError::InvalidArgument(_))
        ));

        manager.disconnect().await;
        Ok::<(), DbError>(())
    })?;
    Ok(())
}

#[test]
fn test07_upsert() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let manager =
            DatabaseManager::connect(ManagerOptions::new(":memory:", contacts_schema())).await?;
        let contacts = manager.table("contacts").await?;

        contacts.insert(&[contact(1, "old@x", None)]).await?;

        // Conflicting row updates in place, fresh row inserts.
        contacts
            .upsert(
                &[contact(1, "new@x", Some("555")), contact(2, "two@x", None)],
                &["id"],
                None,
            )
            .await?;
        assert_eq!(contacts.count(None).await?, 2);
        let updated = contacts
            .find_first(SelectOptions::new().filter(Predicate::new().eq("id", 1i64)))
            .await?
            .expect("row 1");
        assert_eq!(updated.get("email"), Some(&DbValue::Text("new@x".into())));
        assert_eq!(updated.get("phone"), Some(&DbValue::Text("555".into())));

        // Restricting the update list leaves other columns alone.
        contacts
            .upsert(
                &[contact(1, "third@x", Some("999"))],
                &["id"],
                Some(&["email"]),
            )
            .await?;
        let partial = contacts
            .find_first(SelectOptions::new().filter(Predicate::new().eq("id", 1i64)))
            .await?
            .expect("row 1");
        assert_eq!(partial.get("email"), Some(&DbValue::Text("third@x".into())));
        assert_eq!(partial.get("phone"), Some(&DbValue::Text("555".into())));

        assert!(matches!(
            contacts.upsert(&[contact(3, "c@x", None)], &[], None).await,
            Err(DbError::InvalidArgument(_))
        ));

        manager.disconnect().await;
        Ok::<(), DbError>(())
    })?;
    Ok(())
}

#[test]
fn test07_json_export_import_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let manager =
            DatabaseManager::connect(ManagerOptions::new(":memory:", contacts_schema())).await?;
        let contacts = manager.table("contacts").await?;
        let backup = manager.table("contacts_backup").await?;

        contacts
            .insert(&[
                contact(1, "a@x", Some("111")),
                contact(2, "b@x", None),
                contact(3, "c@x", Some("333")),
            ])
            .await?;

        let document = contacts
            .export_to_json(ExportOptions::default())
            .await?
            .expect("inline export");
        let parsed: serde_json::Value = serde_json::from_str(&document)?;
        assert_eq!(parsed["table"], "contacts");
        assert_eq!(parsed["count"], 3);
        // Dates are exported as millisecond epochs.
        assert_eq!(parsed["data"][0]["added_at"], json!(1000));

        let report = backup
            .import_from_json(&document, ImportOptions::default())
            .await?;
        assert_eq!(report.imported, 3);
        assert_eq!(report.skipped, 0);
        assert!(report.errors.is_empty());
        assert_eq!(backup.count(None).await?, 3);

        // Re-import replaces on the primary key instead of duplicating.
        let report = backup
            .import_from_json(&document, ImportOptions::default())
            .await?;
        assert_eq!(report.imported, 3);
        assert_eq!(backup.count(None).await?, 3);

        // Rows that fail validation are skipped and reported.
        let mangled = json!({
            "table": "contacts_backup",
            "count": 2,
            "data": [
                {"id": 10, "email": "ok@x", "added_at": 10_000},
                {"id": 11, "email": 42, "added_at": 11_000},
            ],
        });
        let report = backup
            .import_from_json_value(&mangled, ImportOptions::default())
            .await?;
        assert_eq!(report.imported, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.errors.len(), 1);

        // The fail strategy surfaces the first bad row instead.
        let err = backup
            .import_from_json_value(
                &mangled,
                ImportOptions {
                    conflict_resolution: ConflictResolution::Fail,
                    ..ImportOptions::default()
                },
            )
            .await;
        assert!(err.is_err());

        manager.disconnect().await;
        Ok::<(), Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}

#[test]
fn test07_export_to_file() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager =
            DatabaseManager::connect(ManagerOptions::new(":memory:", contacts_schema())).await?;
        let contacts = manager.table("contacts").await?;
        contacts.insert(&[contact(1, "a@x", None)]).await?;

        let out_path = dir.path().join("contacts.json");
        let inline = contacts
            .export_to_json(ExportOptions {
                file_path: Some(out_path.to_str().expect("utf-8 path").to_string()),
                pretty: Some(false),
                ..ExportOptions::default()
            })
            .await?;
        assert!(inline.is_none());

        let text = std::fs::read_to_string(&out_path)?;
        let parsed: serde_json::Value = serde_json::from_str(&text)?;
        assert_eq!(parsed["count"], 1);

        manager.disconnect().await;
        Ok::<(), Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}

#[test]
fn test07_sync_with_strategies() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let manager =
            DatabaseManager::connect(ManagerOptions::new(":memory:", contacts_schema())).await?;
        let source = manager.table("contacts").await?;
        let target = manager.table("contacts_backup").await?;

        source
            .insert(&[
                contact(1, "a@x", Some("111")),
                contact(2, "b@x", None),
                contact(3, "c@x", Some("333")),
            ])
            .await?;
        // Target already has id 1 with a phone the source lacks, and id 9
        // that the source does not know at all.
        target.insert(&[contact(1, "stale@x", Some("000"))]).await?;
        target.insert(&[contact(9, "only-here@x", None)]).await?;

        let progress_calls = Arc::new(AtomicUsize::new(0));
        let progress_in = Arc::clone(&progress_calls);
        let report = target
            .sync_with(
                &source,
                SyncOptions::keyed_on("id")
                    .strategy(SyncStrategy::Update)
                    .batch_size(2)
                    .on_progress(move |_processed, _total| {
                        progress_in.fetch_add(1, Ordering::SeqCst);
                    }),
            )
            .await?;

        assert_eq!(report.inserted, 2); // ids 2 and 3
        assert_eq!(report.updated, 1); // id 1
        assert_eq!(report.skipped, 0);
        assert!(progress_calls.load(Ordering::SeqCst) >= 2);

        // Update strategy overwrote non-null fields but kept the target's
        // phone, since the source phone for id 1 is non-null here.
        let synced = target
            .find_first(SelectOptions::new().filter(Predicate::new().eq("id", 1i64)))
            .await?
            .expect("row 1");
        assert_eq!(synced.get("email"), Some(&DbValue::Text("a@x".into())));
        assert_eq!(synced.get("phone"), Some(&DbValue::Text("111".into())));
        // The target-only row survived.
        assert_eq!(target.count(None).await?, 4);

        // Ignore strategy leaves conflicting rows untouched.
        source
            .update(
                &Predicate::new().eq("id", 1i64),
                &row(&[("email", DbValue::Text("changed@x".into()))]),
            )
            .await?;
        let report = target
            .sync_with(&source, SyncOptions::keyed_on("id").strategy(SyncStrategy::Ignore))
            .await?;
        assert_eq!(report.inserted, 0);
        assert_eq!(report.skipped, 3);
        let kept = target
            .find_first(SelectOptions::new().filter(Predicate::new().eq("id", 1i64)))
            .await?
            .expect("row 1");
        assert_eq!(kept.get("email"), Some(&DbValue::Text("a@x".into())));

        manager.disconnect().await;
        Ok::<(), DbError>(())
    })?;
    Ok(())
}
