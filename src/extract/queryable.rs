//! Queryable-store source reader (inventory positions)
//!
//! The reader issues one filtered scan per run:
//! `SELECT * FROM <table> WHERE <column> >= <watermark>`. Which database
//! answers it is decided by a [`QueryBackend`]; DuckDB and PostgreSQL are
//! available behind the `duckdb-backend` and `postgres-backend` features.

use chrono::{DateTime, Duration, Utc};

use super::error::SourceError;
use super::file::SourceOutcome;
use crate::config::{QueryBackendKind, QueryableSourceConfig};
use crate::records::RawRecord;

/// A store that can return rows changed since a point in time
pub trait QueryBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Fetch every row of `table` whose `column` is at or after `since`
    ///
    /// `table` and `column` are validated identifiers and are interpolated
    /// into the query text; `since` is always bound as a parameter.
    fn fetch_since(
        &self,
        table: &str,
        column: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RawRecord>, SourceError>;
}

/// Timestamp literal both backends cast from
fn watermark_literal(since: &DateTime<Utc>) -> String {
    since.naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Reader over one table of a queryable store
pub struct QueryableSourceReader {
    backend: Box<dyn QueryBackend>,
    table: String,
    incremental_column: String,
    lookback_days: i64,
}

impl QueryableSourceReader {
    pub fn new(
        backend: Box<dyn QueryBackend>,
        table: impl Into<String>,
        incremental_column: impl Into<String>,
        lookback_days: i64,
    ) -> Self {
        Self {
            backend,
            table: table.into(),
            incremental_column: incremental_column.into(),
            lookback_days,
        }
    }

    /// Same table and window, different store
    pub fn with_backend(mut self, backend: Box<dyn QueryBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Bounded backfill used when no watermark exists yet
    ///
    /// A window reaching past the representable range starts at the
    /// earliest representable instant.
    pub fn cold_start_watermark(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        Duration::try_days(self.lookback_days)
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Read rows at or after `watermark`, or within the lookback window
    pub fn read(&self, watermark: Option<DateTime<Utc>>, now: DateTime<Utc>) -> SourceOutcome {
        let since = watermark.unwrap_or_else(|| self.cold_start_watermark(now));
        tracing::debug!(
            backend = self.backend_name(),
            table = %self.table,
            since = %since,
            "Querying source"
        );
        match self
            .backend
            .fetch_since(&self.table, &self.incremental_column, since)
        {
            Ok(rows) => SourceOutcome::Records(rows),
            Err(e) => SourceOutcome::Failed(e),
        }
    }
}

/// Stand-in for a backend that was not compiled into this build
#[derive(Debug, Clone)]
pub struct UnavailableBackend {
    kind: QueryBackendKind,
}

impl UnavailableBackend {
    pub fn new(kind: QueryBackendKind) -> Self {
        Self { kind }
    }
}

impl QueryBackend for UnavailableBackend {
    fn name(&self) -> &str {
        match self.kind {
            QueryBackendKind::Postgres => "postgres",
            QueryBackendKind::Duckdb => "duckdb",
        }
    }

    fn fetch_since(
        &self,
        _table: &str,
        _column: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<RawRecord>, SourceError> {
        Err(SourceError::BackendNotCompiled(self.kind.to_string()))
    }
}

/// Build the backend described by the configuration
///
/// Connection problems surface later as [`SourceError::Connection`] from
/// `fetch_since`, so this never fails.
pub fn backend_from_config(config: &QueryableSourceConfig) -> Box<dyn QueryBackend> {
    match config.backend {
        #[cfg(feature = "duckdb-backend")]
        QueryBackendKind::Duckdb => match &config.path {
            Some(path) => Box::new(duckdb_backend::DuckDbBackend::new(path.clone())),
            None => Box::new(UnavailableBackend::new(QueryBackendKind::Duckdb)),
        },
        #[cfg(feature = "postgres-backend")]
        QueryBackendKind::Postgres => Box::new(postgres_backend::PostgresBackend::new(config)),
        #[allow(unreachable_patterns)]
        kind => Box::new(UnavailableBackend::new(kind)),
    }
}

#[cfg(feature = "duckdb-backend")]
pub use duckdb_backend::DuckDbBackend;

#[cfg(feature = "duckdb-backend")]
mod duckdb_backend {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use chrono::{DateTime, NaiveDate, Utc};
    use duckdb::{AccessMode, Config, Connection};
    use duckdb::types::{TimeUnit, Value as DuckValue};
    use serde_json::Value;

    use super::{QueryBackend, watermark_literal};
    use crate::extract::error::SourceError;
    use crate::records::RawRecord;
    use crate::records::value::format_timestamp;

    enum Target {
        /// Opened read-only on every fetch; a missing file is never created
        Path(PathBuf),
        /// Caller-provided connection (in-memory databases)
        Connection(Mutex<Connection>),
    }

    /// Embedded DuckDB database
    pub struct DuckDbBackend {
        target: Target,
    }

    impl DuckDbBackend {
        /// Backend over a database file
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self {
                target: Target::Path(path.into()),
            }
        }

        /// Backend over an already-open connection
        pub fn from_connection(conn: Connection) -> Self {
            Self {
                target: Target::Connection(Mutex::new(conn)),
            }
        }

        fn query(conn: &Connection, sql: &str, since: &str) -> Result<Vec<RawRecord>, SourceError> {
            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.query(duckdb::params![since])?;

            let column_count = rows.as_ref().map(|r| r.column_count()).unwrap_or(0);
            let column_names: Vec<String> = (0..column_count)
                .map(|i| {
                    rows.as_ref()
                        .and_then(|r| r.column_name(i).ok())
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| format!("col{}", i))
                })
                .collect();

            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                let mut obj = RawRecord::new();
                for (i, name) in column_names.iter().enumerate() {
                    let value: DuckValue = row.get(i)?;
                    obj.insert(name.clone(), to_json(value));
                }
                results.push(obj);
            }
            Ok(results)
        }
    }

    fn micros(unit: TimeUnit, value: i64) -> i64 {
        match unit {
            TimeUnit::Second => value.saturating_mul(1_000_000),
            TimeUnit::Millisecond => value.saturating_mul(1_000),
            TimeUnit::Microsecond => value,
            TimeUnit::Nanosecond => value / 1_000,
        }
    }

    fn float(f: f64) -> Value {
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }

    fn to_json(value: DuckValue) -> Value {
        match value {
            DuckValue::Null => Value::Null,
            DuckValue::Boolean(b) => Value::Bool(b),
            DuckValue::TinyInt(n) => Value::Number(n.into()),
            DuckValue::SmallInt(n) => Value::Number(n.into()),
            DuckValue::Int(n) => Value::Number(n.into()),
            DuckValue::BigInt(n) => Value::Number(n.into()),
            DuckValue::UTinyInt(n) => Value::Number(n.into()),
            DuckValue::USmallInt(n) => Value::Number(n.into()),
            DuckValue::UInt(n) => Value::Number(n.into()),
            DuckValue::UBigInt(n) => Value::Number(n.into()),
            DuckValue::HugeInt(n) => float(n as f64),
            DuckValue::Float(f) => float(f as f64),
            DuckValue::Double(f) => float(f),
            DuckValue::Decimal(d) => Value::String(d.to_string()),
            DuckValue::Text(s) => Value::String(s),
            DuckValue::Timestamp(unit, v) => DateTime::<Utc>::from_timestamp_micros(micros(unit, v))
                .map(|ts| Value::String(format_timestamp(&ts)))
                .unwrap_or(Value::Null),
            DuckValue::Date32(days) => NaiveDate::from_num_days_from_ce_opt(days + 719_163)
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null),
            other => Value::String(format!("{:?}", other)),
        }
    }

    impl QueryBackend for DuckDbBackend {
        fn name(&self) -> &str {
            "duckdb"
        }

        fn fetch_since(
            &self,
            table: &str,
            column: &str,
            since: DateTime<Utc>,
        ) -> Result<Vec<RawRecord>, SourceError> {
            let sql = format!("SELECT * FROM {table} WHERE {column} >= CAST(? AS TIMESTAMP)");
            let since = watermark_literal(&since);

            match &self.target {
                Target::Path(path) => {
                    let connection_error = |e: duckdb::Error| SourceError::Connection {
                        backend: "duckdb".to_string(),
                        message: format!("{}: {}", path.display(), e),
                    };
                    let config = Config::default()
                        .access_mode(AccessMode::ReadOnly)
                        .map_err(connection_error)?;
                    let conn =
                        Connection::open_with_flags(path, config).map_err(connection_error)?;
                    Self::query(&conn, &sql, &since)
                }
                Target::Connection(conn) => {
                    let conn = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    Self::query(&conn, &sql, &since)
                }
            }
        }
    }
}

#[cfg(feature = "postgres-backend")]
pub use postgres_backend::PostgresBackend;

#[cfg(feature = "postgres-backend")]
mod postgres_backend {
    use chrono::{DateTime, Utc};
    use serde_json::Value;
    use tokio_postgres::NoTls;

    use super::{QueryBackend, watermark_literal};
    use crate::config::QueryableSourceConfig;
    use crate::extract::error::SourceError;
    use crate::records::RawRecord;

    fn connection_error(message: impl ToString) -> SourceError {
        SourceError::Connection {
            backend: "postgres".to_string(),
            message: message.to_string(),
        }
    }

    fn query_error(message: impl ToString) -> SourceError {
        SourceError::Query {
            backend: "postgres".to_string(),
            message: message.to_string(),
        }
    }

    /// PostgreSQL server, driven from a private current-thread runtime
    pub struct PostgresBackend {
        config: tokio_postgres::Config,
    }

    impl PostgresBackend {
        pub fn new(source: &QueryableSourceConfig) -> Self {
            let mut config = tokio_postgres::Config::new();
            config
                .host(&source.host)
                .port(source.port)
                .user(&source.user)
                .dbname(&source.database);
            let password = source.password();
            if !password.is_empty() {
                config.password(password);
            }
            Self { config }
        }

        async fn fetch(&self, sql: &str, since: &str) -> Result<Vec<RawRecord>, SourceError> {
            let (client, connection) = self
                .config
                .connect(NoTls)
                .await
                .map_err(connection_error)?;

            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "PostgreSQL connection error");
                }
            });

            let rows = client.query(sql, &[&since]).await.map_err(query_error)?;

            let mut results = Vec::with_capacity(rows.len());
            for row in rows {
                let text: String = row.try_get(0).map_err(query_error)?;
                match serde_json::from_str::<Value>(&text).map_err(query_error)? {
                    Value::Object(obj) => results.push(obj),
                    other => return Err(query_error(format!("expected a row object, got {other}"))),
                }
            }
            Ok(results)
        }
    }

    impl QueryBackend for PostgresBackend {
        fn name(&self) -> &str {
            "postgres"
        }

        fn fetch_since(
            &self,
            table: &str,
            column: &str,
            since: DateTime<Utc>,
        ) -> Result<Vec<RawRecord>, SourceError> {
            let sql = format!(
                "SELECT row_to_json(t)::text FROM (SELECT * FROM {table} WHERE {column} >= $1::text::timestamp) t"
            );
            let since = watermark_literal(&since);

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(connection_error)?;
            runtime.block_on(self.fetch(&sql, &since))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// Records the watermark each fetch was asked for
    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<DateTime<Utc>>>,
        fail: bool,
    }

    impl QueryBackend for RecordingBackend {
        fn name(&self) -> &str {
            "recording"
        }

        fn fetch_since(
            &self,
            _table: &str,
            _column: &str,
            since: DateTime<Utc>,
        ) -> Result<Vec<RawRecord>, SourceError> {
            self.calls.lock().unwrap().push(since);
            if self.fail {
                return Err(SourceError::Connection {
                    backend: "recording".to_string(),
                    message: "refused".to_string(),
                });
            }
            Ok(vec![RawRecord::new()])
        }
    }

    #[test]
    fn test_cold_start_uses_lookback() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let reader =
            QueryableSourceReader::new(Box::new(RecordingBackend::default()), "inv", "ts", 7);
        assert_eq!(
            reader.cold_start_watermark(now),
            Utc.with_ymd_and_hms(2025, 3, 3, 12, 0, 0).unwrap()
        );
        assert_eq!(reader.read(None, now).row_count(), 1);
    }

    #[test]
    fn test_oversized_lookback_saturates() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let backend = RecordingBackend::default();
        let reader = QueryableSourceReader::new(Box::new(backend), "inv", "ts", 1_000_000_000_000);

        assert_eq!(reader.cold_start_watermark(now), DateTime::<Utc>::MIN_UTC);
        assert_eq!(reader.read(None, now).row_count(), 1);
    }

    #[test]
    fn test_failure_degrades_to_outcome() {
        let now = Utc::now();
        let backend = RecordingBackend {
            fail: true,
            ..Default::default()
        };
        let reader = QueryableSourceReader::new(Box::new(backend), "inv", "ts", 7);
        let outcome = reader.read(Some(now), now);
        assert!(matches!(outcome, SourceOutcome::Failed(SourceError::Connection { .. })));
        assert!(outcome.into_records().is_empty());
    }

    #[test]
    fn test_unavailable_backend() {
        let backend = UnavailableBackend::new(QueryBackendKind::Postgres);
        let err = backend.fetch_since("inv", "ts", Utc::now()).unwrap_err();
        assert!(matches!(err, SourceError::BackendNotCompiled(_)));
    }

    #[test]
    fn test_watermark_literal() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(watermark_literal(&ts), "2025-01-02 03:04:05.000000");
    }

    #[cfg(feature = "duckdb-backend")]
    #[test]
    fn test_duckdb_missing_file_is_not_created() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("absent.duckdb");

        let backend = DuckDbBackend::new(&path);
        let err = backend
            .fetch_since("inventory", "last_updated", Utc::now())
            .unwrap_err();

        assert!(matches!(err, SourceError::Connection { .. }));
        assert!(!path.exists());
    }

    #[cfg(feature = "duckdb-backend")]
    #[test]
    fn test_duckdb_backend_filters_rows() {
        let conn = duckdb::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE inventory (product_id INTEGER, site_id VARCHAR, quantity DOUBLE, unit_cost DOUBLE, last_updated TIMESTAMP);
             INSERT INTO inventory VALUES
               (1, 'WH1', 100, 2.5, TIMESTAMP '2025-01-01 00:00:00'),
               (2, 'WH2', 50, NULL, TIMESTAMP '2025-02-01 00:00:00');",
        )
        .unwrap();

        let backend = DuckDbBackend::from_connection(conn);
        let since = Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap();
        let rows = backend.fetch_since("inventory", "last_updated", since).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["product_id"], serde_json::json!(2));
        assert_eq!(rows[0]["unit_cost"], serde_json::Value::Null);
        assert_eq!(
            rows[0]["last_updated"],
            serde_json::json!("2025-02-01T00:00:00.000000Z")
        );
    }
}
