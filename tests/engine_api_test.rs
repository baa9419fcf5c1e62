//! Engine-level API scenarios: natural-language queries, aggregations,
//! suggestions, cache invalidation and the non-CSV export formats.

use std::time::Duration;

use serde_json::{json, Value};

use argus_core::{ArgusConfig, ArgusDb};
use argus_export::ExportFormat;
use argus_query::{QueryBuilder, QueryOperator, StructuredQuery};

async fn engine_with(dbs: &[(&str, Value)]) -> (tempfile::TempDir, ArgusDb) {
    let dir = tempfile::tempdir().unwrap();
    let store_dir = dir.path().join("json");
    std::fs::create_dir_all(&store_dir).unwrap();
    for (name, rows) in dbs {
        std::fs::write(store_dir.join(name), serde_json::to_vec(rows).unwrap()).unwrap();
    }
    let mut config = ArgusConfig::default();
    config.store.data_dir = store_dir;
    config.export.export_dir = dir.path().join("exports");
    let db = ArgusDb::new(config).await.unwrap();
    (dir, db)
}

fn people_rows() -> Value {
    json!([
        {"id": "p1", "name": "Alice Johnson", "dept": "Eng", "age": 34},
        {"id": "p2", "name": "Bob Martin", "dept": "Sales", "age": 41},
        {"id": "p3", "name": "Carla Diaz", "dept": "Eng", "age": 29}
    ])
}

async fn wait_export(db: &ArgusDb, job_id: &str) -> argus_export::ExportJob {
    for _ in 0..300 {
        if let Some(job) = db.export_job(job_id) {
            if job.status.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("export job {job_id} never finished");
}

#[tokio::test]
async fn natural_language_pipeline_end_to_end() {
    let (_dir, db) = engine_with(&[("people_contacts.json", people_rows())]).await;

    let result = db.execute_natural("find all people").await.unwrap();
    assert_eq!(result.total_count, 3);

    // Count aggregation requested in plain language.
    let result = db.execute_natural("how many people are there").await.unwrap();
    let aggregations = result.aggregations.expect("aggregations missing");
    assert_eq!(aggregations["count"], json!(3));

    // Executed queries feed the suggester.
    let suggestions = db.suggest("find all", 5);
    assert!(suggestions.iter().any(|s| s.text.contains("people")));
}

#[tokio::test]
async fn builder_query_with_aggregations() {
    let (_dir, db) = engine_with(&[("staff.json", people_rows())]).await;

    let query = QueryBuilder::new("staff")
        .filter("age", QueryOperator::Gte, json!(29))
        .sort_asc("age")
        .aggregate("group_by", Some("dept"))
        .aggregate("max", Some("age"))
        .build();

    let result = db.execute_structured(&query).await.unwrap();
    assert_eq!(result.total_count, 3);
    assert_eq!(result.data[0]["id"], json!("p3"));

    let aggregations = result.aggregations.unwrap();
    assert_eq!(aggregations["group_by_dept"]["Eng"], json!(2));
    assert_eq!(aggregations["max_age"], json!(41.0));
}

#[tokio::test]
async fn tag_invalidation_forces_reexecution() {
    let (_dir, db) = engine_with(&[("staff.json", people_rows())]).await;

    let mut query = StructuredQuery::for_database("staff");
    query.filters = vec![argus_query::QueryFilter::new("dept", QueryOperator::Eq, json!("Eng"))];

    let first = db.execute_structured(&query).await.unwrap();
    assert!(!first.from_cache);
    let second = db.execute_structured(&query).await.unwrap();
    assert!(second.from_cache);

    // Results for this database are tagged with its name.
    db.cache().invalidate(None, &["staff".to_string()]).await;
    let third = db.execute_structured(&query).await.unwrap();
    assert!(!third.from_cache);
}

#[tokio::test]
async fn jsonl_and_parquet_exports() {
    let (_dir, db) = engine_with(&[("staff.json", people_rows())]).await;
    db.start().await.unwrap();

    let query = QueryBuilder::new("staff")
        .filter("id", QueryOperator::IsNotNull, json!(null))
        .sort_asc("id")
        .build();

    let jsonl_id = db.export_query(&query, ExportFormat::Jsonl, None).await.unwrap();
    let jsonl_job = wait_export(&db, &jsonl_id).await;
    assert_eq!(jsonl_job.progress.rows_processed, 3);
    let text = std::fs::read_to_string(&jsonl_job.output_path).unwrap();
    assert_eq!(text.lines().count(), 3);
    let first: Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
    assert_eq!(first["id"], json!("p1"));

    let parquet_id = db.export_query(&query, ExportFormat::Parquet, None).await.unwrap();
    let parquet_job = wait_export(&db, &parquet_id).await;
    assert!(parquet_job.error_message.is_none());
    assert!(parquet_job.output_path.exists());
    assert!(parquet_job.progress.bytes_written > 0);

    db.stop().await.unwrap();
}

#[tokio::test]
async fn statistics_expose_tier_breakdown() {
    let (_dir, db) = engine_with(&[("staff.json", people_rows())]).await;

    let query = QueryBuilder::new("staff")
        .filter("dept", QueryOperator::Eq, json!("Eng"))
        .build();
    db.execute_structured(&query).await.unwrap();
    db.execute_structured(&query).await.unwrap();

    let stats = db.statistics();
    assert_eq!(stats.total_queries, 2);
    assert!(stats.cache_hit_rate > 0.0);
    assert_eq!(stats.tiers.len(), 3);
    assert_eq!(stats.tiers[0].tier, "l1");
    assert!(stats.tiers[0].hits >= 1);
    assert_eq!(stats.popular_databases[0].0, "staff");
}
