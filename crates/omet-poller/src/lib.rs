//! Polling pipeline: normalization, change detection, batch dispatch.
//!
//! Two batches run on independent timers. The timeseries batch appends
//! evolution data at a low cadence; the realtime batch refreshes current
//! state tables and runs change detection over the overview families.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use omet_client::{ClientConfig, FetchError, TenantClient};
use omet_core::{FamilySpec, Row, Scalar, Snapshot, WriteDecision, MISSING_PLACEHOLDER};
use omet_sink::{
    column_union, BaselineStore, FileBaselineStore, MetricSink, MySqlSink, PersistError,
    SinkConfig,
};
use serde_json::Value;
use thiserror::Error;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "omet-poller";

/// Default monitoring window for current-state queries.
const DEFAULT_TIME_FRAME_MINUTES: u32 = 1440;
/// Process table looks back a full week.
const PROCESS_DETAILS_TIME_FRAME_MINUTES: u32 = 10080;

/// Timestamp format for the `date_queried` column.
const CAPTURE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Bookkeeping columns stripped from queue processing records before write.
const QUEUE_RECORD_DROPPED_COLUMNS: &[&str] =
    &["ReportType", "QueueDefinitionId", "TenantId", "Id"];

pub const TRANSACTIONS_OVERVIEW: FamilySpec = FamilySpec {
    table: "transactions_overview",
    baseline_key: "transactions_overview",
    comparison_keys: &[
        "countSuccessful",
        "countBusinessExceptions",
        "countApplicationExceptions",
    ],
};

pub const COMPLETED_JOBS_OVERVIEW: FamilySpec = FamilySpec {
    table: "completed_jobs_overview",
    baseline_key: "jobs_overview",
    comparison_keys: &["countSuccessful", "countErrors", "countStopped"],
};

#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("no records to normalize")]
    Empty,
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("field {0} missing or non-numeric")]
    MissingField(String),
    #[error("encoding composed records: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl PollError {
    pub fn kind(&self) -> &'static str {
        match self {
            PollError::Fetch(_) => "fetch",
            PollError::Shape(_) => "shape",
            PollError::Persist(_) => "persist",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub client: ClientConfig,
    pub sink: SinkConfig,
    pub baseline_dir: PathBuf,
    pub timeseries_interval: Duration,
    pub realtime_interval: Duration,
}

impl PollerConfig {
    pub fn from_env() -> Self {
        let organisation = std::env::var("ORGANISATION").unwrap_or_default();
        let database =
            std::env::var("SCHEMA_NAME").unwrap_or_else(|_| organisation.clone());
        Self {
            client: ClientConfig {
                organisation,
                tenant: std::env::var("TENANT").unwrap_or_default(),
                client_id: std::env::var("CLIENT_ID").unwrap_or_default(),
                refresh_token: std::env::var("REFRESH_TOKEN").unwrap_or_default(),
                timeout: Duration::from_secs(env_u64("OMET_HTTP_TIMEOUT_SECS", 20)),
            },
            sink: SinkConfig {
                host: std::env::var("DB_HOST").unwrap_or_default(),
                user: std::env::var("DB_USER").unwrap_or_default(),
                password: std::env::var("DB_PASSWORD").unwrap_or_default(),
                database,
            },
            baseline_dir: std::env::var("BASELINE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./baselines")),
            timeseries_interval: Duration::from_secs(env_u64("TIMESERIES_INTERVAL", 21600)),
            realtime_interval: Duration::from_secs(env_u64("REALTIME_INTERVAL", 600)),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Flattens one JSON record into a row. Nested objects join their keys with
/// a dot, arrays render as compact JSON text, nulls are dropped so the
/// union fill can place the placeholder instead.
pub fn flatten_record(value: &Value) -> Result<Row, ShapeError> {
    let Value::Object(map) = value else {
        return Err(ShapeError::NotAnObject(json_kind(value)));
    };
    let mut row = Row::new();
    flatten_into(&mut row, None, map);
    Ok(row)
}

fn flatten_into(row: &mut Row, prefix: Option<&str>, map: &serde_json::Map<String, Value>) {
    for (key, value) in map {
        let column = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Null => {}
            Value::Bool(v) => {
                row.insert(column, Scalar::Bool(*v));
            }
            Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    row.insert(column, Scalar::Int(v));
                } else if let Some(v) = n.as_f64() {
                    row.insert(column, Scalar::Float(v));
                }
            }
            Value::String(s) => {
                row.insert(column, Scalar::Text(s.clone()));
            }
            Value::Array(_) => {
                row.insert(column, Scalar::Text(value.to_string()));
            }
            Value::Object(nested) => flatten_into(row, Some(&column), nested),
        }
    }
}

/// Flattens a record batch and fills absent optional fields with the
/// placeholder over the union of columns, so every row in the batch
/// carries the same column set.
pub fn normalize_records(records: &[Value]) -> Result<Vec<Row>, ShapeError> {
    if records.is_empty() {
        return Err(ShapeError::Empty);
    }
    let mut rows = records
        .iter()
        .map(flatten_record)
        .collect::<Result<Vec<_>, _>>()?;
    let columns = column_union(&rows);
    for row in &mut rows {
        for column in &columns {
            row.entry(column.clone())
                .or_insert_with(|| Scalar::Text(MISSING_PLACEHOLDER.to_string()));
        }
    }
    Ok(rows)
}

pub fn normalize_record(record: &Value) -> Result<Row, ShapeError> {
    flatten_record(record)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn stamp_row(row: &mut Row, captured_at: DateTime<Utc>) {
    row.insert(
        "date_queried".to_string(),
        Scalar::Text(captured_at.format(CAPTURE_FORMAT).to_string()),
    );
}

fn strip_columns(rows: &mut [Row], columns: &[&str]) {
    for row in rows {
        for column in columns {
            row.remove(*column);
        }
    }
}

/// Pivots a `[{title, count}]` stats list into one wide row keyed by title.
fn pivot_job_stats(records: &[Value]) -> Result<Row, ShapeError> {
    if records.is_empty() {
        return Err(ShapeError::Empty);
    }
    let mut row = Row::new();
    for record in records {
        let title = record
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| ShapeError::MissingField("title".to_string()))?;
        let count = record
            .get("count")
            .and_then(Value::as_i64)
            .ok_or_else(|| ShapeError::MissingField("count".to_string()))?;
        row.insert(title.to_string(), Scalar::Int(count));
    }
    Ok(row)
}

fn to_values<T: serde::Serialize>(items: &[T]) -> Result<Vec<Value>, ShapeError> {
    items
        .iter()
        .map(|item| serde_json::to_value(item).map_err(ShapeError::from))
        .collect()
}

/// Change-detected writer for one overview family.
///
/// The comparison is intentionally coarse: only the sum of the family's
/// comparison keys is compared, so counts that redistribute between
/// categories at an equal total are treated as no new information and
/// skipped. Downstream reporting depends on this equality rule.
pub struct OverviewWriter<'a, S, B> {
    sink: &'a S,
    baselines: &'a B,
    family: FamilySpec,
}

impl<'a, S: MetricSink, B: BaselineStore> OverviewWriter<'a, S, B> {
    pub fn new(sink: &'a S, baselines: &'a B, family: FamilySpec) -> Self {
        Self {
            sink,
            baselines,
            family,
        }
    }

    /// Loads the baseline, compares totals, and persists when they differ.
    /// The sink is written first; the baseline only advances once the sink
    /// write is confirmed, so a crash between the two re-detects the same
    /// change on the next poll and rewrites identical rows.
    pub async fn evaluate_and_persist(
        &self,
        snapshot: Snapshot,
    ) -> Result<WriteDecision, PollError> {
        let baseline = match self.baselines.load(self.family.baseline_key).await {
            Ok(baseline) => baseline,
            Err(err) => {
                warn!(
                    family = self.family.baseline_key,
                    error = %err,
                    "baseline unreadable, treating as no history"
                );
                None
            }
        };

        let new_total = match snapshot.total_of(self.family.comparison_keys) {
            Some(total) => total,
            None => {
                let missing = first_missing_key(&snapshot, self.family.comparison_keys);
                return Err(ShapeError::MissingField(missing.to_string()).into());
            }
        };

        let (decision, rows) = match baseline {
            Some(old) => match old.total_of(self.family.comparison_keys) {
                Some(old_total) if old_total == new_total => {
                    debug!(
                        family = self.family.baseline_key,
                        total = new_total,
                        "totals unchanged, skipping write"
                    );
                    return Ok(WriteDecision::Skip);
                }
                Some(old_total) => {
                    info!(
                        family = self.family.baseline_key,
                        old_total, new_total, "totals changed, replacing"
                    );
                    (
                        WriteDecision::Replace,
                        vec![snapshot.values.clone(), old.values],
                    )
                }
                None => {
                    warn!(
                        family = self.family.baseline_key,
                        "baseline lacks comparison fields, treating as no history"
                    );
                    (WriteDecision::ReplaceInitial, vec![snapshot.values.clone()])
                }
            },
            None => (WriteDecision::ReplaceInitial, vec![snapshot.values.clone()]),
        };

        self.sink
            .ensure_table(self.family.table, &column_union(&rows))
            .await?;
        self.sink.truncate(self.family.table).await?;
        self.sink.append_rows(self.family.table, &rows).await?;

        if let Err(err) = self.baselines.store(self.family.baseline_key, &snapshot).await {
            warn!(
                family = self.family.baseline_key,
                error = %err,
                "sink updated but baseline store failed; next poll will rewrite"
            );
        }
        Ok(decision)
    }
}

fn first_missing_key(snapshot: &Snapshot, keys: &'static [&'static str]) -> &'static str {
    keys.iter()
        .find(|key| snapshot.values.get(**key).and_then(Scalar::as_f64).is_none())
        .copied()
        .unwrap_or("")
}

#[derive(Debug, Clone)]
pub struct FailedOp {
    pub operation: &'static str,
    pub kind: &'static str,
    pub message: String,
}

/// Typed outcome of one batch: which operations completed, which failed
/// and why. A failed operation never aborts the rest of its batch.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub batch: &'static str,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub completed: Vec<&'static str>,
    pub failed: Vec<FailedOp>,
}

impl BatchSummary {
    fn begin(batch: &'static str) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            batch,
            started_at: now,
            finished_at: now,
            completed: Vec::new(),
            failed: Vec::new(),
        }
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }
}

fn note(summary: &mut BatchSummary, operation: &'static str, result: Result<(), PollError>) {
    match result {
        Ok(()) => summary.completed.push(operation),
        Err(err) => {
            warn!(
                operation,
                kind = err.kind(),
                error = %err,
                "operation failed, batch continues"
            );
            summary.failed.push(FailedOp {
                operation,
                kind: err.kind(),
                message: err.to_string(),
            });
        }
    }
}

pub struct Poller<S, B> {
    client: TenantClient,
    sink: S,
    baselines: B,
    config: PollerConfig,
}

impl<S: MetricSink, B: BaselineStore> Poller<S, B> {
    pub fn new(client: TenantClient, sink: S, baselines: B, config: PollerConfig) -> Self {
        Self {
            client,
            sink,
            baselines,
            config,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Low-cadence batch appending evolution data.
    pub async fn run_timeseries(&self) -> BatchSummary {
        let mut summary = BatchSummary::begin("timeseries");
        note(
            &mut summary,
            "queue_processing_records",
            self.queue_processing_records().await,
        );
        note(
            &mut summary,
            "transactions_timeline",
            self.transactions_timeline().await,
        );
        note(
            &mut summary,
            "completed_jobs_timeline",
            self.completed_jobs_timeline().await,
        );
        note(
            &mut summary,
            "completed_jobs_timeframe",
            self.completed_jobs_timeframe().await,
        );
        summary.finish()
    }

    /// High-cadence batch refreshing current-state tables.
    pub async fn run_realtime(&self) -> BatchSummary {
        let mut summary = BatchSummary::begin("realtime");
        note(
            &mut summary,
            "transactions_overview",
            self.transactions_overview().await,
        );
        note(
            &mut summary,
            "completed_jobs_overview",
            self.completed_jobs_overview().await,
        );
        note(
            &mut summary,
            "unprocessed_items",
            self.unprocessed_items().await,
        );
        note(
            &mut summary,
            "triggered_job_states",
            self.triggered_job_states().await,
        );
        note(
            &mut summary,
            "process_details_table",
            self.process_details_table().await,
        );
        note(
            &mut summary,
            "queue_details_table",
            self.queue_details_table().await,
        );
        note(&mut summary, "queue_data", self.queue_data().await);
        note(
            &mut summary,
            "maintenance_mode_status",
            self.maintenance_mode_status().await,
        );
        note(
            &mut summary,
            "disabled_triggers",
            self.disabled_triggers().await,
        );
        note(&mut summary, "job_stats", self.job_stats().await);
        note(&mut summary, "faulted_jobs", self.faulted_jobs().await);
        summary.finish()
    }

    async fn append(&self, table: &str, rows: &[Row]) -> Result<(), PollError> {
        self.sink.ensure_table(table, &column_union(rows)).await?;
        self.sink.append_rows(table, rows).await?;
        Ok(())
    }

    async fn replace(&self, table: &str, rows: &[Row]) -> Result<(), PollError> {
        self.sink.ensure_table(table, &column_union(rows)).await?;
        self.sink.truncate(table).await?;
        self.sink.append_rows(table, rows).await?;
        Ok(())
    }

    async fn queue_processing_records(&self) -> Result<(), PollError> {
        let records = self.client.queue_processing_records(1).await?;
        let mut rows = normalize_records(&records)?;
        strip_columns(&mut rows, QUEUE_RECORD_DROPPED_COLUMNS);
        self.append("queue_processing_records", &rows).await
    }

    async fn transactions_timeline(&self) -> Result<(), PollError> {
        let records = self
            .client
            .transactions_timeline(DEFAULT_TIME_FRAME_MINUTES)
            .await?;
        let rows = normalize_records(&records)?;
        self.append("transactions_timeline", &rows).await
    }

    async fn completed_jobs_timeline(&self) -> Result<(), PollError> {
        let records = self
            .client
            .completed_jobs_timeline(DEFAULT_TIME_FRAME_MINUTES)
            .await?;
        let rows = normalize_records(&records)?;
        self.append("completed_jobs_timeline", &rows).await
    }

    async fn completed_jobs_timeframe(&self) -> Result<(), PollError> {
        let records = self
            .client
            .completed_jobs_timeframe(DEFAULT_TIME_FRAME_MINUTES)
            .await?;
        let rows = normalize_records(&records)?;
        self.append("completed_jobs_timeframe", &rows).await
    }

    async fn transactions_overview(&self) -> Result<(), PollError> {
        let record = self
            .client
            .transactions_overview(DEFAULT_TIME_FRAME_MINUTES)
            .await?;
        let mut row = normalize_record(&record)?;
        let captured_at = Utc::now();
        stamp_row(&mut row, captured_at);
        let writer = OverviewWriter::new(&self.sink, &self.baselines, TRANSACTIONS_OVERVIEW);
        writer
            .evaluate_and_persist(Snapshot::new(captured_at, row))
            .await?;
        Ok(())
    }

    async fn completed_jobs_overview(&self) -> Result<(), PollError> {
        let record = self
            .client
            .completed_jobs_overview(DEFAULT_TIME_FRAME_MINUTES)
            .await?;
        let mut row = normalize_record(&record)?;
        let captured_at = Utc::now();
        stamp_row(&mut row, captured_at);
        let writer = OverviewWriter::new(&self.sink, &self.baselines, COMPLETED_JOBS_OVERVIEW);
        writer
            .evaluate_and_persist(Snapshot::new(captured_at, row))
            .await?;
        Ok(())
    }

    async fn unprocessed_items(&self) -> Result<(), PollError> {
        let record = self
            .client
            .unprocessed_items(DEFAULT_TIME_FRAME_MINUTES)
            .await?;
        let mut row = normalize_record(&record)?;
        stamp_row(&mut row, Utc::now());
        self.replace("unprocessed_items", &[row]).await
    }

    async fn triggered_job_states(&self) -> Result<(), PollError> {
        let record = self
            .client
            .triggered_job_states(DEFAULT_TIME_FRAME_MINUTES)
            .await?;
        let mut row = normalize_record(&record)?;
        stamp_row(&mut row, Utc::now());
        self.replace("triggered_job_states", &[row]).await
    }

    async fn process_details_table(&self) -> Result<(), PollError> {
        let records = self
            .client
            .process_details_table(PROCESS_DETAILS_TIME_FRAME_MINUTES)
            .await?;
        let mut rows = normalize_records(&records)?;
        let captured_at = Utc::now();
        for row in &mut rows {
            stamp_row(row, captured_at);
        }
        self.replace("process_details_table", &rows).await
    }

    async fn queue_details_table(&self) -> Result<(), PollError> {
        let records = self
            .client
            .queue_details_table(DEFAULT_TIME_FRAME_MINUTES)
            .await?;
        let mut rows = normalize_records(&records)?;
        let captured_at = Utc::now();
        for row in &mut rows {
            stamp_row(row, captured_at);
        }
        self.replace("queue_details_table", &rows).await
    }

    async fn queue_data(&self) -> Result<(), PollError> {
        let rollups = self.client.queue_data().await?;
        let rows = normalize_records(&to_values(&rollups)?)?;
        self.replace("queue_data", &rows).await
    }

    async fn maintenance_mode_status(&self) -> Result<(), PollError> {
        let records = self.client.maintenance_mode_status().await?;
        let rows = normalize_records(&records)?;
        self.replace("maintenance_mode_states", &rows).await
    }

    async fn disabled_triggers(&self) -> Result<(), PollError> {
        let triggers = self.client.disabled_triggers().await?;
        let rows = normalize_records(&to_values(&triggers)?)?;
        self.replace("disabled_triggers", &rows).await
    }

    async fn job_stats(&self) -> Result<(), PollError> {
        let records = self.client.job_stats().await?;
        let mut row = pivot_job_stats(&records)?;
        stamp_row(&mut row, Utc::now());
        self.replace("job_stats", &[row]).await
    }

    async fn faulted_jobs(&self) -> Result<(), PollError> {
        let jobs = self.client.faulted_jobs().await?;
        let rows = normalize_records(&to_values(&jobs)?)?;
        self.append("faulted_jobs", &rows).await
    }
}

/// Builds the live poller from environment configuration.
pub async fn connect_from_env() -> Result<Poller<MySqlSink, FileBaselineStore>> {
    let config = PollerConfig::from_env();
    let client = TenantClient::new(config.client.clone()).context("building tenant client")?;
    let sink = MySqlSink::connect(&config.sink)
        .await
        .context("connecting metric sink")?;
    let baselines = FileBaselineStore::new(config.baseline_dir.clone());
    Ok(Poller::new(client, sink, baselines, config))
}

/// Schedules both batches on their configured intervals.
pub async fn build_scheduler(
    poller: Arc<Poller<MySqlSink, FileBaselineStore>>,
) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;

    let timeseries = poller.clone();
    let job = Job::new_repeated_async(poller.config().timeseries_interval, move |_id, _lock| {
        let poller = timeseries.clone();
        Box::pin(async move {
            let summary = poller.run_timeseries().await;
            info!(
                run_id = %summary.run_id,
                completed = summary.completed.len(),
                failed = summary.failed.len(),
                "timeseries batch finished"
            );
        })
    })
    .context("creating timeseries job")?;
    sched.add(job).await.context("adding timeseries job")?;

    let realtime = poller.clone();
    let job = Job::new_repeated_async(poller.config().realtime_interval, move |_id, _lock| {
        let poller = realtime.clone();
        Box::pin(async move {
            let summary = poller.run_realtime().await;
            info!(
                run_id = %summary.run_id,
                completed = summary.completed.len(),
                failed = summary.failed.len(),
                "realtime batch finished"
            );
        })
    })
    .context("creating realtime job")?;
    sched.add(job).await.context("adding realtime job")?;

    Ok(sched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use omet_sink::BaselineError;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySink {
        tables: Mutex<HashMap<String, Vec<Row>>>,
        writes: Mutex<usize>,
    }

    impl MemorySink {
        fn rows(&self, table: &str) -> Vec<Row> {
            self.tables
                .lock()
                .unwrap()
                .get(table)
                .cloned()
                .unwrap_or_default()
        }

        fn write_count(&self) -> usize {
            *self.writes.lock().unwrap()
        }
    }

    #[async_trait]
    impl MetricSink for MemorySink {
        async fn ensure_table(
            &self,
            table: &str,
            _columns: &[String],
        ) -> Result<(), PersistError> {
            self.tables
                .lock()
                .unwrap()
                .entry(table.to_string())
                .or_default();
            Ok(())
        }

        async fn truncate(&self, table: &str) -> Result<(), PersistError> {
            self.tables
                .lock()
                .unwrap()
                .insert(table.to_string(), Vec::new());
            Ok(())
        }

        async fn append_rows(&self, table: &str, rows: &[Row]) -> Result<(), PersistError> {
            *self.writes.lock().unwrap() += 1;
            self.tables
                .lock()
                .unwrap()
                .entry(table.to_string())
                .or_default()
                .extend(rows.iter().cloned());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl MetricSink for FailingSink {
        async fn ensure_table(
            &self,
            _table: &str,
            _columns: &[String],
        ) -> Result<(), PersistError> {
            Ok(())
        }

        async fn truncate(&self, _table: &str) -> Result<(), PersistError> {
            Ok(())
        }

        async fn append_rows(&self, _table: &str, _rows: &[Row]) -> Result<(), PersistError> {
            Err(PersistError::Database(sqlx::Error::PoolClosed))
        }
    }

    #[derive(Default)]
    struct MemoryBaselines {
        entries: Mutex<HashMap<String, Snapshot>>,
    }

    impl MemoryBaselines {
        fn get(&self, key: &str) -> Option<Snapshot> {
            self.entries.lock().unwrap().get(key).cloned()
        }
    }

    #[async_trait]
    impl BaselineStore for MemoryBaselines {
        async fn load(&self, key: &str) -> Result<Option<Snapshot>, BaselineError> {
            Ok(self.get(key))
        }

        async fn store(&self, key: &str, snapshot: &Snapshot) -> Result<(), BaselineError> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), snapshot.clone());
            Ok(())
        }
    }

    struct UnreadableBaselines;

    #[async_trait]
    impl BaselineStore for UnreadableBaselines {
        async fn load(&self, _key: &str) -> Result<Option<Snapshot>, BaselineError> {
            Err(BaselineError::Io {
                path: PathBuf::from("baselines/transactions_overview.json"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            })
        }

        async fn store(&self, _key: &str, _snapshot: &Snapshot) -> Result<(), BaselineError> {
            Ok(())
        }
    }

    fn overview_snapshot(successful: i64, business: i64, application: i64) -> Snapshot {
        let mut values = Row::new();
        values.insert("countSuccessful".to_string(), Scalar::Int(successful));
        values.insert("countBusinessExceptions".to_string(), Scalar::Int(business));
        values.insert(
            "countApplicationExceptions".to_string(),
            Scalar::Int(application),
        );
        values.insert(
            "date_queried".to_string(),
            Scalar::Text("2026-08-04T06:00:00Z".to_string()),
        );
        Snapshot::new(
            Utc.with_ymd_and_hms(2026, 8, 4, 6, 0, 0).single().unwrap(),
            values,
        )
    }

    async fn seed_baseline(baselines: &MemoryBaselines, snapshot: &Snapshot) {
        baselines
            .store(TRANSACTIONS_OVERVIEW.baseline_key, snapshot)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn first_run_writes_and_establishes_baseline() {
        let sink = MemorySink::default();
        let baselines = MemoryBaselines::default();
        let writer = OverviewWriter::new(&sink, &baselines, TRANSACTIONS_OVERVIEW);

        let snapshot = overview_snapshot(10, 2, 0);
        let decision = writer
            .evaluate_and_persist(snapshot.clone())
            .await
            .unwrap();

        assert_eq!(decision, WriteDecision::ReplaceInitial);
        assert_eq!(sink.rows("transactions_overview").len(), 1);
        assert_eq!(
            baselines.get(TRANSACTIONS_OVERVIEW.baseline_key),
            Some(snapshot)
        );
    }

    #[tokio::test]
    async fn equal_totals_skip_even_when_distribution_shifts() {
        let sink = MemorySink::default();
        let baselines = MemoryBaselines::default();
        let old = overview_snapshot(10, 2, 0);
        seed_baseline(&baselines, &old).await;

        let writer = OverviewWriter::new(&sink, &baselines, TRANSACTIONS_OVERVIEW);
        let decision = writer
            .evaluate_and_persist(overview_snapshot(9, 3, 0))
            .await
            .unwrap();

        assert_eq!(decision, WriteDecision::Skip);
        assert_eq!(sink.write_count(), 0);
        assert_eq!(baselines.get(TRANSACTIONS_OVERVIEW.baseline_key), Some(old));
    }

    #[tokio::test]
    async fn changed_total_replaces_and_retains_previous_row() {
        let sink = MemorySink::default();
        let baselines = MemoryBaselines::default();
        seed_baseline(&baselines, &overview_snapshot(10, 2, 0)).await;

        let writer = OverviewWriter::new(&sink, &baselines, TRANSACTIONS_OVERVIEW);
        let new = overview_snapshot(12, 3, 0);
        let decision = writer.evaluate_and_persist(new.clone()).await.unwrap();

        assert_eq!(decision, WriteDecision::Replace);
        let rows = sink.rows("transactions_overview");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("countSuccessful"), Some(&Scalar::Int(12)));
        assert_eq!(rows[1].get("countSuccessful"), Some(&Scalar::Int(10)));
        assert_eq!(
            baselines.get(TRANSACTIONS_OVERVIEW.baseline_key),
            Some(new)
        );
    }

    #[tokio::test]
    async fn failed_sink_write_leaves_baseline_untouched() {
        let sink = FailingSink;
        let baselines = MemoryBaselines::default();
        let old = overview_snapshot(10, 2, 0);
        seed_baseline(&baselines, &old).await;

        let writer = OverviewWriter::new(&sink, &baselines, TRANSACTIONS_OVERVIEW);
        let err = writer
            .evaluate_and_persist(overview_snapshot(12, 3, 0))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "persist");
        assert_eq!(baselines.get(TRANSACTIONS_OVERVIEW.baseline_key), Some(old));
    }

    #[tokio::test]
    async fn unreadable_baseline_is_treated_as_no_history() {
        let sink = MemorySink::default();
        let baselines = UnreadableBaselines;
        let writer = OverviewWriter::new(&sink, &baselines, TRANSACTIONS_OVERVIEW);

        let decision = writer
            .evaluate_and_persist(overview_snapshot(10, 2, 0))
            .await
            .unwrap();

        assert_eq!(decision, WriteDecision::ReplaceInitial);
        assert_eq!(sink.rows("transactions_overview").len(), 1);
    }

    #[tokio::test]
    async fn snapshot_without_comparison_keys_is_a_shape_error() {
        let sink = MemorySink::default();
        let baselines = MemoryBaselines::default();
        let writer = OverviewWriter::new(&sink, &baselines, TRANSACTIONS_OVERVIEW);

        let mut values = Row::new();
        values.insert("unrelated".to_string(), Scalar::Int(1));
        let snapshot = Snapshot::new(Utc::now(), values);

        let err = writer.evaluate_and_persist(snapshot).await.unwrap_err();
        assert_eq!(err.kind(), "shape");
        assert_eq!(sink.write_count(), 0);
    }

    #[test]
    fn normalization_fills_absent_fields_with_placeholder() {
        let records = vec![
            json!({"Name": "Nightly", "NextStart": "2026-08-05T01:00:00Z"}),
            json!({"Name": "Weekly"}),
        ];
        let rows = normalize_records(&records).unwrap();
        assert_eq!(
            rows[1].get("NextStart"),
            Some(&Scalar::Text("N/A".to_string()))
        );
        assert_eq!(rows[0].keys().collect::<Vec<_>>(), rows[1].keys().collect::<Vec<_>>());
    }

    #[test]
    fn nested_objects_flatten_to_dotted_columns() {
        let row = flatten_record(&json!({
            "queue": {"name": "Invoices", "depth": 4},
            "tags": ["a", "b"],
            "idle": null,
            "healthy": true,
        }))
        .unwrap();
        assert_eq!(
            row.get("queue.name"),
            Some(&Scalar::Text("Invoices".to_string()))
        );
        assert_eq!(row.get("queue.depth"), Some(&Scalar::Int(4)));
        assert_eq!(
            row.get("tags"),
            Some(&Scalar::Text("[\"a\",\"b\"]".to_string()))
        );
        assert_eq!(row.get("healthy"), Some(&Scalar::Bool(true)));
        assert!(!row.contains_key("idle"));
    }

    #[test]
    fn empty_and_non_object_input_are_shape_errors() {
        assert!(matches!(normalize_records(&[]), Err(ShapeError::Empty)));
        assert!(matches!(
            normalize_record(&json!([1, 2])),
            Err(ShapeError::NotAnObject("an array"))
        ));
    }

    #[test]
    fn job_stats_pivot_builds_one_wide_row() {
        let records = vec![
            json!({"title": "Successful", "count": 41}),
            json!({"title": "Faulted", "count": 3}),
        ];
        let row = pivot_job_stats(&records).unwrap();
        assert_eq!(row.get("Successful"), Some(&Scalar::Int(41)));
        assert_eq!(row.get("Faulted"), Some(&Scalar::Int(3)));

        let err = pivot_job_stats(&[json!({"title": "Successful"})]).unwrap_err();
        assert!(matches!(err, ShapeError::MissingField(field) if field == "count"));
    }

    #[test]
    fn bookkeeping_columns_are_stripped() {
        let records = vec![json!({
            "Id": 7,
            "TenantId": 1,
            "ReportType": "daily",
            "QueueDefinitionId": 12,
            "Name": "Invoices",
            "SuccessfulTransactionsNo": 9,
        })];
        let mut rows = normalize_records(&records).unwrap();
        strip_columns(&mut rows, QUEUE_RECORD_DROPPED_COLUMNS);
        assert!(!rows[0].contains_key("Id"));
        assert!(!rows[0].contains_key("TenantId"));
        assert!(rows[0].contains_key("Name"));
        assert!(rows[0].contains_key("SuccessfulTransactionsNo"));
    }

    #[test]
    fn failed_operations_are_recorded_and_do_not_stop_the_batch() {
        let mut summary = BatchSummary::begin("realtime");
        note(
            &mut summary,
            "transactions_overview",
            Err(ShapeError::Empty.into()),
        );
        note(&mut summary, "queue_data", Ok(()));
        let summary = summary.finish();

        assert_eq!(summary.completed, vec!["queue_data"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].operation, "transactions_overview");
        assert_eq!(summary.failed[0].kind, "shape");
    }

    #[test]
    fn capture_stamp_uses_second_precision_utc() {
        let mut row = Row::new();
        let at = Utc.with_ymd_and_hms(2026, 8, 4, 6, 0, 0).single().unwrap();
        stamp_row(&mut row, at);
        assert_eq!(
            row.get("date_queried"),
            Some(&Scalar::Text("2026-08-04T06:00:00Z".to_string()))
        );
    }

    #[test]
    fn intervals_default_when_unset() {
        let config = PollerConfig::from_env();
        assert_eq!(config.timeseries_interval, Duration::from_secs(21600));
        assert_eq!(config.realtime_interval, Duration::from_secs(600));
        assert_eq!(config.baseline_dir, PathBuf::from("./baselines"));
    }
}
