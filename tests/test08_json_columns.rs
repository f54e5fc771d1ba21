use serde_json::json;
use sqlite_dal::prelude::*;

fn events_schema() -> Schema {
    Schema::new().table(
        TableSchema::new("events")
            .column(ColumnDef::int("id").primary().auto_increment())
            .column(ColumnDef::text("kind").text_union(vec!["click", "view"]))
            .column(ColumnDef::json(
                "payload",
                JsonShape::object([
                    ("target", JsonShape::Text),
                    ("count", JsonShape::Int),
                    ("note", JsonShape::Undef),
                ]),
            ))
            .column(ColumnDef::json("tags", JsonShape::array(JsonShape::Text)).nullable()),
    )
}

fn row(entries: &[(&str, DbValue)]) -> Row {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

#[test]
fn test08_json_round_trip_and_shape_validation() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let manager =
            DatabaseManager::connect(ManagerOptions::new(":memory:", events_schema())).await?;
        let events = manager.table("events").await?;

        let payload = json!({"target": "#buy", "count": 3});
        events
            .insert(&[row(&[
                ("kind", DbValue::Text("click".into())),
                ("payload", DbValue::Json(payload.clone())),
                ("tags", DbValue::Json(json!(["promo", "mobile"]))),
            ])])
            .await?;

        let stored = events.find_first(SelectOptions::new()).await?.expect("row");
        // JSON columns decode back to nested values, not strings.
        assert_eq!(stored.get("payload"), Some(&DbValue::Json(payload)));
        assert_eq!(
            stored.get("tags"),
            Some(&DbValue::Json(json!(["promo", "mobile"])))
        );

        // Shape violations are caught before the engine sees the row.
        let missing_field = events
            .insert(&[row(&[
                ("kind", DbValue::Text("view".into())),
                ("payload", DbValue::Json(json!({"target": "#buy"}))),
            ])])
            .await;
        assert!(matches!(missing_field, Err(DbError::InvalidArgument(_))));

        let wrong_element = events
            .insert(&[row(&[
                ("kind", DbValue::Text("view".into())),
                ("payload", DbValue::Json(json!({"target": "#x", "count": 1}))),
                ("tags", DbValue::Json(json!(["ok", 5]))),
            ])])
            .await;
        assert!(matches!(wrong_element, Err(DbError::InvalidArgument(_))));

        manager.disconnect().await;
        Ok::<(), DbError>(())
    })?;
    Ok(())
}

#[test]
fn test08_prepared_statement_reuse() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let manager =
            DatabaseManager::connect(ManagerOptions::new(":memory:", events_schema())).await?;
        manager.ensure_tables().await?;
        let conn = manager.connection()?;

        let insert = conn
            .prepare_statement("INSERT INTO events (kind, payload) VALUES (?1, ?2)")
            .await?;
        for n in 0..5 {
            let affected = insert
                .execute(&[
                    DbValue::Text("click".into()),
                    DbValue::Json(json!({"target": "#x", "count": n})),
                ])
                .await?;
            assert_eq!(affected, 1);
        }

        let select = conn
            .prepare_statement("SELECT COUNT(*) AS cnt FROM events WHERE kind = ?1")
            .await?;
        let result = select.query(&[DbValue::Text("click".into())]).await?;
        assert_eq!(result.results[0].get("cnt"), Some(&DbValue::Int(5)));
        assert_eq!(select.sql(), "SELECT COUNT(*) AS cnt FROM events WHERE kind = ?1");

        manager.disconnect().await;
        Ok::<(), DbError>(())
    })?;
    Ok(())
}
