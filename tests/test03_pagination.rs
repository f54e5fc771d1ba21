use chrono::DateTime;
use sqlite_dal::prelude::*;

fn products_schema() -> Schema {
    Schema::new().table(
        TableSchema::new("products")
            .column(ColumnDef::int("id").primary().auto_increment())
            .column(ColumnDef::text("name"))
            .column(ColumnDef::real("price"))
            .column(ColumnDef::bool("is_active").default_bool(true))
            .column(ColumnDef::date("created_at")),
    )
}

fn row(entries: &[(&str, DbValue)]) -> Row {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

async fn seeded_manager() -> Result<DatabaseManager, DbError> {
    let manager =
        DatabaseManager::connect(ManagerOptions::new(":memory:", products_schema())).await?;
    let products = manager.table("products").await?;
    // Ascending creation times, so id N is the Nth oldest.
    for n in 1..=20i64 {
        let t = DateTime::from_timestamp_millis(n * 60_000)
            .expect("epoch")
            .naive_utc();
        products
            .insert(&[row(&[
                ("name", DbValue::Text(format!("product-{n}"))),
                ("price", DbValue::Float(n as f64 * 2.5)),
                ("created_at", DbValue::Timestamp(t)),
            ])])
            .await?;
    }
    Ok(manager)
}

#[test]
fn test03_paginated_filtered_ordering() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let manager = seeded_manager().await?;
        let products = manager.table("products").await?;

        let page = products
            .paginate(
                2,
                5,
                Some(&Predicate::new().eq("is_active", true)),
                &[],
                Some(&OrderBy::desc("created_at")),
            )
            .await?;

        assert_eq!(page.total, 20);
        assert_eq!(page.total_pages, 4);
        assert_eq!(page.page, 2);
        assert_eq!(page.page_size, 5);
        // Page 2 of newest-first holds the 6th through 10th most recent.
        let ids: Vec<i64> = page
            .data
            .iter()
            .filter_map(|r| r.get("id").and_then(DbValue::as_int))
            .collect();
        assert_eq!(ids, vec![15, 14, 13, 12, 11]);

        // Out-of-range pages keep the metadata and return no rows.
        let past_end = products.paginate(9, 5, None, &[], None).await?;
        assert!(past_end.data.is_empty());
        assert_eq!(past_end.total, 20);
        assert_eq!(past_end.total_pages, 4);
        assert_eq!(past_end.page, 9);

        assert!(matches!(
            products.paginate(0, 5, None, &[], None).await,
            Err(DbError::InvalidArgument(_))
        ));

        manager.disconnect().await;
        Ok::<(), DbError>(())
    })?;
    Ok(())
}

#[test]
fn test03_pagination_covers_the_full_set() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let manager = seeded_manager().await?;
        let products = manager.table("products").await?;

        let mut seen = Vec::new();
        let page_size = 7i64;
        let mut page_no = 1i64;
        loop {
            let page = products
                .paginate(page_no, page_size, None, &[], Some(&OrderBy::asc("id")))
                .await?;
            if page.data.is_empty() {
                break;
            }
            seen.extend(
                page.data
                    .iter()
                    .filter_map(|r| r.get("id").and_then(DbValue::as_int)),
            );
            page_no += 1;
        }

        // Disjoint union over all pages is the full ordered set.
        assert_eq!(seen, (1..=20).collect::<Vec<i64>>());

        manager.disconnect().await;
        Ok::<(), DbError>(())
    })?;
    Ok(())
}

#[test]
fn test03_distinct_and_aggregate() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let manager = seeded_manager().await?;
        let products = manager.table("products").await?;

        let distinct_active = products.distinct("is_active", None, None).await?;
        assert_eq!(distinct_active, vec![DbValue::Bool(true)]);

        let aggregates = products
            .aggregate(
                "price",
                &[
                    AggregateFunction::Sum,
                    AggregateFunction::Avg,
                    AggregateFunction::Min,
                    AggregateFunction::Max,
                    AggregateFunction::Count,
                ],
                None,
            )
            .await?;
        // Prices are 2.5 * (1..=20).
        assert_eq!(aggregates["SUM"], Some(525.0));
        assert_eq!(aggregates["AVG"], Some(26.25));
        assert_eq!(aggregates["MIN"], Some(2.5));
        assert_eq!(aggregates["MAX"], Some(50.0));
        assert_eq!(aggregates["COUNT"], Some(20.0));

        // Aggregation over the identity-false filter executes no SQL.
        let none = products
            .aggregate(
                "price",
                &[AggregateFunction::Sum, AggregateFunction::Count],
                Some(&Predicate::new().or(vec![])),
            )
            .await?;
        assert_eq!(none["SUM"], None);
        assert_eq!(none["COUNT"], Some(0.0));

        assert!(matches!(
            products.distinct("missing", None, None).await,
            Err(DbError::InvalidArgument(_))
        ));

        manager.disconnect().await;
        Ok::<(), DbError>(())
    })?;
    Ok(())
}
