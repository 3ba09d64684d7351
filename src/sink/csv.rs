//! Delimited-file sink

use std::path::{Path, PathBuf};

use tracing::info;

use super::error::SinkError;
use super::table::MetricTable;
use super::TableSink;

/// Writes `<out_dir>/<table>.csv` with a header row; nulls are empty cells
#[derive(Debug, Clone)]
pub struct CsvSink {
    out_dir: PathBuf,
}

impl CsvSink {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn path_for(&self, table: &MetricTable) -> PathBuf {
        self.out_dir.join(format!("{}.csv", table.name()))
    }
}

/// Serialize a table to any writer
pub fn write_csv<W: std::io::Write>(table: &MetricTable, out: W) -> Result<(), SinkError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(table.columns().iter().map(|c| c.name.as_str()))?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|cell| cell.render()))?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

impl TableSink for CsvSink {
    fn format(&self) -> &'static str {
        "csv"
    }

    fn write(&self, table: &MetricTable) -> Result<PathBuf, SinkError> {
        std::fs::create_dir_all(&self.out_dir).map_err(|e| SinkError::io(&self.out_dir, e))?;
        let path = self.path_for(table);
        let file = std::fs::File::create(&path).map_err(|e| SinkError::io(&path, e))?;
        write_csv(table, file)?;
        info!(table = table.name(), rows = table.len(), path = %path.display(), "Wrote CSV");
        Ok(path)
    }
}

/// Read a table written by [`CsvSink`] back as header + string rows
pub fn read_csv(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>), SinkError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok((headers, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{Cell, Column};
    use tempfile::TempDir;

    #[test]
    fn test_write_csv_renders_nulls_empty() {
        let mut table = MetricTable::new(
            "movement_summary",
            vec![Column::text("product_id"), Column::float("trend_pct")],
        );
        table.push_row(vec!["1".into(), Cell::Null]);
        table.push_row(vec!["2".into(), 0.25.into()]);

        let mut buf = Vec::new();
        write_csv(&table, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "product_id,trend_pct\n1,\n2,0.25\n");
    }

    #[test]
    fn test_sink_writes_named_file() {
        let dir = TempDir::new().unwrap();
        let sink = CsvSink::new(dir.path().join("out"));
        let mut table = MetricTable::new("inventory_summary", vec![Column::text("product_id")]);
        table.push_row(vec!["7".into()]);

        let path = sink.write(&table).unwrap();
        assert_eq!(path, dir.path().join("out").join("inventory_summary.csv"));

        let (headers, rows) = read_csv(&path).unwrap();
        assert_eq!(headers, vec!["product_id"]);
        assert_eq!(rows, vec![vec!["7".to_string()]]);
    }
}
