//! End-to-end scenarios over the full engine: filtering, sorting with nulls,
//! fuzzy matching, tier promotion, cursor pagination and export integrity.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use argus_cache::{CacheConfig, EvictionPolicy, TieredCache};
use argus_core::{ArgusConfig, ArgusDb};
use argus_export::ExportFormat;
use argus_query::{
    ExecutionContext, Pagination, QueryConfig, QueryExecutor, QueryExecutorDeps, QueryFilter,
    QueryOperator, SortField, StructuredQuery,
};
use argus_store::{RecordStore, StoreConfig};

fn write_db(dir: &std::path::Path, name: &str, rows: &Value) {
    std::fs::write(dir.join(name), serde_json::to_vec(rows).unwrap()).unwrap();
}

async fn engine(dir: &std::path::Path) -> ArgusDb {
    let mut config = ArgusConfig::default();
    config.store.data_dir = dir.join("json");
    config.export.export_dir = dir.join("exports");
    ArgusDb::new(config).await.unwrap()
}

#[tokio::test]
async fn exact_equality_filter() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("json")).unwrap();
    write_db(
        &dir.path().join("json"),
        "staff.json",
        &json!([
            {"id": 1, "dept": "Eng"},
            {"id": 2, "dept": "Sales"},
            {"id": 3, "dept": "Eng"}
        ]),
    );
    let db = engine(dir.path()).await;

    let mut query = StructuredQuery::for_database("staff");
    query.filters = vec![QueryFilter::new("dept", QueryOperator::Eq, json!("Eng"))];
    let result = db.execute_structured(&query).await.unwrap();

    assert_eq!(result.total_count, 2);
    let ids: Vec<i64> = result.data.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![1, 3]);
}

#[tokio::test]
async fn multi_key_sort_with_nulls() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("json")).unwrap();
    write_db(
        &dir.path().join("json"),
        "rows.json",
        &json!([
            {"id": 1, "a": 30, "n": "A"},
            {"id": 2, "a": null, "n": "D"},
            {"id": 3, "a": 30, "n": "B"},
            {"id": 4, "a": 35, "n": "C"}
        ]),
    );
    let db = engine(dir.path()).await;

    let mut query = StructuredQuery::for_database("rows");
    query.filters = vec![QueryFilter::new("id", QueryOperator::IsNotNull, json!(null))];
    query.sort_fields = vec![SortField::asc("a"), SortField::asc("n")];
    let result = db.execute_structured(&query).await.unwrap();

    let names: Vec<&str> = result.data.iter().map(|r| r["n"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["A", "B", "C", "D"]);
}

#[tokio::test]
async fn fuzzy_filter_matches_misspelled_name() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("json")).unwrap();
    write_db(
        &dir.path().join("json"),
        "contacts.json",
        &json!([
            {"id": 1, "name": "Alice Johnson"},
            {"id": 2, "name": "Bob"}
        ]),
    );
    let db = engine(dir.path()).await;

    let mut query = StructuredQuery::for_database("contacts");
    query.filters = vec![QueryFilter::new(
        "name",
        QueryOperator::Fuzzy,
        json!({"text": "Alise Jonson", "threshold": 0.7}),
    )];
    let result = db.execute_structured(&query).await.unwrap();

    assert_eq!(result.total_count, 1);
    assert_eq!(result.data[0]["id"], json!(1));
}

#[tokio::test]
async fn l3_hit_repopulates_l1() {
    let dir = tempfile::tempdir().unwrap();
    let store_dir = dir.path().join("json");
    std::fs::create_dir_all(&store_dir).unwrap();
    write_db(
        &store_dir,
        "staff.json",
        &json!([{"id": 1, "dept": "Eng"}, {"id": 2, "dept": "Sales"}]),
    );

    let store = Arc::new(RecordStore::new(StoreConfig {
        data_dir: store_dir,
        ..StoreConfig::default()
    }));
    let cache = Arc::new(
        TieredCache::new(&CacheConfig {
            memory_limit_mb: 1,
            policy: EvictionPolicy::Lru,
            l3_dir: Some(dir.path().join("query_cache")),
            ..CacheConfig::default()
        })
        .await,
    );
    let executor = QueryExecutor::new(
        QueryExecutorDeps {
            store,
            cache: Arc::clone(&cache),
        },
        QueryConfig::default(),
    );

    let mut query = StructuredQuery::for_database("staff");
    query.filters = vec![QueryFilter::new("dept", QueryOperator::Eq, json!("Eng"))];

    let original = executor
        .execute_structured(&query, &ExecutionContext::default())
        .await
        .unwrap();
    assert!(!original.from_cache);

    // Evict only the L1 copy; the disk tier still holds the result.
    let key = executor.cache_key(&query);
    cache.drop_from_memory(&key);
    assert!(!cache.l1_contains(&key));

    let rerun = executor
        .execute_structured(&query, &ExecutionContext::default())
        .await
        .unwrap();
    assert!(rerun.from_cache);
    assert_eq!(rerun.cache_tier.as_deref(), Some("l3"));
    assert_eq!(rerun.data, original.data);
    assert_eq!(rerun.total_count, original.total_count);

    // Promotion put the key back in memory.
    assert!(cache.l1_contains(&key));
}

#[tokio::test]
async fn cursor_pagination_covers_all_pages() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("json")).unwrap();
    let rows: Vec<Value> = (0..100)
        .map(|i| json!({"id": i, "name": format!("name-{i:03}")}))
        .collect();
    write_db(&dir.path().join("json"), "records.json", &Value::Array(rows));
    let db = engine(dir.path()).await;

    let mut query = StructuredQuery::for_database("records");
    query.filters = vec![QueryFilter::new("id", QueryOperator::IsNotNull, json!(null))];
    query.sort_fields = vec![SortField::asc("name")];
    query.pagination = Pagination {
        page: 1,
        size: 25,
        cursor: None,
    };

    let mut collected: Vec<String> = Vec::new();
    let mut pages = 0;
    let mut cursor: Option<String> = None;
    loop {
        let mut page_query = query.clone();
        page_query.pagination.cursor = cursor;
        let result = db.execute_structured(&page_query).await.unwrap();
        collected.extend(result.data.iter().map(|r| r["name"].as_str().unwrap().to_string()));
        pages += 1;
        match result.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(pages, 4);
    assert_eq!(collected.len(), 100);
    let mut expected: Vec<String> = (0..100).map(|i| format!("name-{i:03}")).collect();
    expected.sort();
    assert_eq!(collected, expected);
}

#[tokio::test]
async fn csv_export_integrity_over_ten_thousand_rows() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("json")).unwrap();
    let rows: Vec<Value> = (0..10_000)
        .map(|i| json!({"id": i, "label": format!("row {i}")}))
        .collect();
    write_db(&dir.path().join("json"), "big.json", &Value::Array(rows));
    let db = engine(dir.path()).await;
    db.start().await.unwrap();

    let mut query = StructuredQuery::for_database("big");
    query.filters = vec![QueryFilter::new("id", QueryOperator::IsNotNull, json!(null))];
    query.sort_fields = vec![SortField::asc("id")];
    query.pagination.size = 1000;

    let job_id = db.export_query(&query, ExportFormat::Csv, None).await.unwrap();

    let mut job = None;
    for _ in 0..600 {
        if let Some(current) = db.export_job(&job_id) {
            if current.status.is_terminal() {
                job = Some(current);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let job = job.expect("export job never finished");
    assert!(job.error_message.is_none(), "export failed: {:?}", job.error_message);
    assert_eq!(job.progress.rows_processed, 10_000);

    let text = std::fs::read_to_string(&job.output_path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 10_001);

    // Reparse and compare ids in order.
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let headers = reader.headers().unwrap().clone();
    let id_idx = headers.iter().position(|h| h == "id").unwrap();
    let ids: Vec<i64> = reader
        .records()
        .map(|r| r.unwrap()[id_idx].parse::<i64>().unwrap())
        .collect();
    assert_eq!(ids, (0..10_000).collect::<Vec<i64>>());

    db.stop().await.unwrap();
}
