//! End-to-end pipeline tests

use chrono::{DateTime, Duration, TimeZone, Utc};
use inventory_analytics::config::EtlConfig;
use inventory_analytics::extract::{FILE_WATERMARK, FileCheckpointStore, CheckpointStore};
use inventory_analytics::pipeline::{PipelineExecutor, RunStatus};
use inventory_analytics::sink::read_csv;
use tempfile::TempDir;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
}

fn csv_config(temp: &TempDir) -> EtlConfig {
    let movements = temp.path().join("movements.csv");
    std::fs::write(
        &movements,
        "product_id,quantity,movement_type,modified_date,from_site,to_site\n\
         1,10,out,2025-05-30T08:00:00,,\n\
         1,20,out,2025-05-31T08:00:00,,\n\
         2,5,in,2025-05-31T09:00:00,,\n",
    )
    .unwrap();

    let mut config = EtlConfig::default()
        .with_file_source(movements)
        .with_state_file(temp.path().join("state.json"))
        .with_out_dir(temp.path().join("out"));
    config.output.csv = true;
    config.output.parquet = false;
    config
}

#[test]
fn test_csv_run_then_idempotent_rerun() {
    let temp = TempDir::new().unwrap();
    let executor = PipelineExecutor::new(csv_config(&temp)).unwrap();

    let first = executor.run_at(now()).unwrap();
    assert_eq!(first.status, RunStatus::Completed);
    assert_eq!(first.movement_rows, 3);

    let summary = temp.path().join("out/movement_summary.csv");
    let (headers, rows) = read_csv(&summary).unwrap();
    assert_eq!(
        headers,
        vec!["product_id", "avg_daily", "peak_daily", "w1_qty", "w2_qty", "trend_pct"]
    );
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], "1");
    assert_eq!(rows[0][1], "15");
    assert_eq!(rows[0][2], "20");
    // no prior window: trend is an empty cell
    assert_eq!(rows[0][5], "");

    let store = FileCheckpointStore::new(temp.path().join("state.json"));
    assert_eq!(store.load().watermark(FILE_WATERMARK), Some(now()));

    std::fs::remove_file(&summary).unwrap();
    let second = executor.run_at(now() + Duration::hours(1)).unwrap();
    assert_eq!(second.movement_rows, 0);
    assert!(second.files_written().is_empty());
    assert!(!summary.exists());
}

#[test]
fn test_dry_run_leaves_state_untouched() {
    let temp = TempDir::new().unwrap();
    let report = PipelineExecutor::new(csv_config(&temp))
        .unwrap()
        .with_dry_run(true)
        .run_at(now())
        .unwrap();

    assert!(report.is_dry_run());
    assert!(!temp.path().join("state.json").exists());
    assert!(!temp.path().join("out").exists());
}

#[test]
fn test_config_from_yaml_runs() {
    let temp = TempDir::new().unwrap();
    let movements = temp.path().join("moves.jsonl");
    std::fs::write(
        &movements,
        "{\"product_id\": 3, \"quantity\": 4, \"movement_type\": \"sale\", \"modified_date\": \"2025-05-31T00:00:00\"}\n",
    )
    .unwrap();
    let yaml = format!(
        "sources:\n  file:\n    enabled: true\n    path: {}\nincremental:\n  state_file: {}\noutput:\n  out_dir: {}\n  csv: true\n  parquet: false\n",
        movements.display(),
        temp.path().join("state.json").display(),
        temp.path().join("out").display(),
    );

    let config = EtlConfig::from_yaml_str(&yaml).unwrap();
    let report = PipelineExecutor::new(config).unwrap().run_at(now()).unwrap();
    assert_eq!(report.movement_rows, 1);
    assert!(temp.path().join("out/movement_summary.csv").exists());
}

#[cfg(feature = "duckdb-backend")]
mod duckdb_tests {
    use super::*;
    use inventory_analytics::config::QueryBackendKind;

    fn seed(path: &std::path::Path) {
        let conn = duckdb::Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE inventory (
                 product_id INTEGER, site_id VARCHAR, quantity INTEGER,
                 unit_cost DOUBLE, last_updated TIMESTAMP);
             INSERT INTO inventory VALUES
                 (1, 'WH1', 100, 10.0, TIMESTAMP '2025-05-30 00:00:00'),
                 (2, 'WH1', 50, 2.0, TIMESTAMP '2025-05-30 00:00:00'),
                 (3, 'WH2', 10, 1.0, TIMESTAMP '2024-01-01 00:00:00');",
        )
        .unwrap();
    }

    #[test]
    fn test_full_run_with_both_sources() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("stock.duckdb");
        seed(&db);

        let mut config = csv_config(&temp).with_queryable_source("inventory");
        config.sources.queryable.backend = QueryBackendKind::Duckdb;
        config.sources.queryable.path = Some(db);

        let report = PipelineExecutor::new(config).unwrap().run_at(now()).unwrap();
        assert!(report.is_success());
        // product 3 is outside the cold-start lookback
        assert_eq!(report.inventory_rows, 2);

        let output = report.output.unwrap();
        let inventory = &output.inventory;
        assert_eq!(inventory.len(), 2);
        // 30 outbound over 100 on hand
        assert_eq!(inventory.cell(0, "turnover_ratio").and_then(|c| c.as_f64()), Some(0.3));

        let warehouse = &output.warehouse;
        assert_eq!(warehouse.len(), 1);
        assert_eq!(warehouse.cell(0, "quantity").and_then(|c| c.as_f64()), Some(150.0));

        for table in ["inventory_summary", "movement_summary", "warehouse_summary", "financial_summary"] {
            assert!(temp.path().join("out").join(format!("{table}.csv")).exists(), "{table}");
        }

        let store = FileCheckpointStore::new(temp.path().join("state.json"));
        let checkpoint = store.load();
        assert_eq!(checkpoint.iter().count(), 2);
    }
}

#[cfg(feature = "parquet-sink")]
mod parquet_tests {
    use super::*;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    #[test]
    fn test_parquet_output() {
        let temp = TempDir::new().unwrap();
        let mut config = csv_config(&temp);
        config.output.parquet = true;
        config.output.csv = false;

        let report = PipelineExecutor::new(config).unwrap().run_at(now()).unwrap();
        let files = report.files_written();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("movement_summary.parquet"));

        let file = std::fs::File::open(&files[0]).unwrap();
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        let metadata = builder.metadata().file_metadata().key_value_metadata().cloned().unwrap();
        assert!(metadata.iter().any(|kv| kv.key == "table"
            && kv.value.as_deref() == Some("movement_summary")));

        let rows: usize = builder.build().unwrap().map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(rows, 2);
    }
}
