//! Columnar (Parquet) sink

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use tracing::info;

use super::TableSink;
use super::error::SinkError;
use super::table::{Cell, ColumnType, MetricTable};

/// Writes `<out_dir>/<table>.parquet`, one row group per table
#[derive(Debug, Clone)]
pub struct ParquetSink {
    out_dir: PathBuf,
}

impl ParquetSink {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn path_for(&self, table: &MetricTable) -> PathBuf {
        self.out_dir.join(format!("{}.parquet", table.name()))
    }
}

fn data_type(column_type: ColumnType) -> DataType {
    match column_type {
        ColumnType::Text => DataType::Utf8,
        ColumnType::Float => DataType::Float64,
        ColumnType::Bool => DataType::Boolean,
        ColumnType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
    }
}

/// Arrow schema for a table; every field is nullable
pub fn table_schema(table: &MetricTable) -> Arc<Schema> {
    Arc::new(Schema::new(
        table
            .columns()
            .iter()
            .map(|c| Field::new(c.name.as_str(), data_type(c.column_type), true))
            .collect::<Vec<_>>(),
    ))
}

/// Build one Arrow column; cells of the wrong kind become null
fn column_array(table: &MetricTable, index: usize, column_type: ColumnType) -> ArrayRef {
    let cells = table.rows().iter().map(|row| row.get(index).unwrap_or(&Cell::Null));
    match column_type {
        ColumnType::Text => Arc::new(StringArray::from(
            cells
                .map(|cell| match cell {
                    Cell::Text(s) => Some(s.clone()),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnType::Float => Arc::new(Float64Array::from(
            cells.map(Cell::as_f64).collect::<Vec<_>>(),
        )),
        ColumnType::Bool => Arc::new(BooleanArray::from(
            cells
                .map(|cell| match cell {
                    Cell::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnType::Timestamp => Arc::new(
            TimestampMicrosecondArray::from(
                cells
                    .map(|cell| match cell {
                        Cell::Timestamp(ts) => Some(ts.timestamp_micros()),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            )
            .with_timezone("UTC"),
        ),
    }
}

/// Convert a metric table to a single record batch
pub fn to_record_batch(table: &MetricTable) -> Result<RecordBatch, SinkError> {
    let schema = table_schema(table);
    let arrays: Vec<ArrayRef> = table
        .columns()
        .iter()
        .enumerate()
        .map(|(i, c)| column_array(table, i, c.column_type))
        .collect();
    Ok(RecordBatch::try_new(schema, arrays)?)
}

fn writer_properties(table: &MetricTable) -> WriterProperties {
    let metadata = vec![
        KeyValue {
            key: "created_by".to_string(),
            value: Some(concat!("inventory-analytics ", env!("CARGO_PKG_VERSION")).to_string()),
        },
        KeyValue {
            key: "table".to_string(),
            value: Some(table.name().to_string()),
        },
    ];
    WriterProperties::builder()
        .set_key_value_metadata(Some(metadata))
        .build()
}

impl TableSink for ParquetSink {
    fn format(&self) -> &'static str {
        "parquet"
    }

    fn write(&self, table: &MetricTable) -> Result<PathBuf, SinkError> {
        std::fs::create_dir_all(&self.out_dir).map_err(|e| SinkError::io(&self.out_dir, e))?;
        let path = self.path_for(table);

        let batch = to_record_batch(table)?;
        let file = File::create(&path).map_err(|e| SinkError::io(&path, e))?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(writer_properties(table)))?;
        writer.write(&batch)?;
        writer.close()?;

        info!(table = table.name(), rows = table.len(), path = %path.display(), "Wrote Parquet");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::Column;
    use arrow::array::Array;
    use chrono::{TimeZone, Utc};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::TempDir;

    fn sample() -> MetricTable {
        let mut table = MetricTable::new(
            "financial_summary",
            vec![
                Column::text("product_id"),
                Column::float("inventory_value"),
                Column::bool("dead_stock"),
                Column::timestamp("last_updated"),
            ],
        );
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        table.push_row(vec!["1".into(), 10.0.into(), true.into(), ts.into()]);
        table.push_row(vec!["2".into(), Cell::Null, false.into(), Cell::Null]);
        table
    }

    #[test]
    fn test_record_batch_nulls() {
        let batch = to_record_batch(&sample()).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 4);
        assert!(batch.column(1).is_null(1));
        assert!(batch.column(3).is_null(1));
        assert!(!batch.column(3).is_null(0));
    }

    #[test]
    fn test_parquet_file_reads_back() {
        let dir = TempDir::new().unwrap();
        let sink = ParquetSink::new(dir.path());
        let path = sink.write(&sample()).unwrap();
        assert!(path.ends_with("financial_summary.parquet"));

        let file = File::open(&path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let rows: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(rows, 2);
    }
}
