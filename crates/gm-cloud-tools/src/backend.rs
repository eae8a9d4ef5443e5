//! Backend abstraction: one trait per cloud domain.
//!
//! Backends perform the network round trips (including pagination) and hand
//! back rows in the backing service's own shape. Executors own filtering,
//! aggregation and normalization, so every backend (REST, mock) gets the
//! same semantics.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gm_protocol::{QueryResult, TimeWindow, VmResourcePath};

// ── Warehouse ─────────────────────────────────────────────────

/// Warehouse job type filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarehouseJobType {
    Query,
    Load,
}

impl WarehouseJobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "QUERY",
            Self::Load => "LOAD",
        }
    }
}

/// Parameters of a job-metadata scan.
#[derive(Debug, Clone)]
pub struct JobMetadataQuery {
    pub project_id: String,
    /// Warehouse location qualifier (e.g. "us").
    pub location: String,
    pub window: TimeWindow,
    pub job_type: WarehouseJobType,
    /// Restrict to jobs writing into this dataset.
    pub destination_dataset: Option<String>,
}

/// One warehouse job as reported by the job metadata view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarehouseJobRow {
    pub user_email: Option<String>,
    pub creation_time: Option<DateTime<Utc>>,
    pub state: Option<String>,
    pub job_type: Option<String>,
    pub total_bytes_processed: Option<u64>,
    pub destination_dataset: Option<String>,
}

/// Result of a job-metadata scan. `truncated` is set when the backend
/// stopped paging with rows still pending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobMetadata {
    pub rows: Vec<WarehouseJobRow>,
    pub truncated: bool,
}

/// A dataset entry from the warehouse listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRef {
    pub dataset_id: String,
    pub friendly_name: Option<String>,
}

#[async_trait]
pub trait WarehouseBackend: Send + Sync {
    async fn list_datasets(&self, project_id: &str) -> QueryResult<Vec<DatasetRef>>;

    async fn job_metadata(&self, query: &JobMetadataQuery) -> QueryResult<JobMetadata>;
}

// ── Batch jobs ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCondition {
    #[serde(rename = "type", default)]
    pub condition_type: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub last_transition_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawExecution {
    /// Full resource name; the execution id is its last segment.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default, alias = "endTime")]
    pub completion_time: Option<String>,
    #[serde(default)]
    pub conditions: Vec<RawCondition>,
}

#[async_trait]
pub trait BatchJobBackend: Send + Sync {
    /// Full resource names of the jobs in a region.
    async fn list_jobs(&self, project_number: &str, region: &str) -> QueryResult<Vec<String>>;

    /// Most recent executions, in backend order, at most `limit`.
    async fn list_executions(
        &self,
        project_number: &str,
        region: &str,
        job_name: &str,
        limit: usize,
    ) -> QueryResult<Vec<RawExecution>>;
}

// ── Logging ───────────────────────────────────────────────────

/// Parameters of an execution log lookup.
#[derive(Debug, Clone)]
pub struct LogQuery {
    pub project_number: String,
    /// Project id carried in the `resource.labels.project_id` log label.
    pub project_id: String,
    pub region: String,
    pub job_name: String,
    pub execution_id: String,
    pub window: TimeWindow,
    pub page_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLogEntry {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub text_payload: Option<String>,
    #[serde(default)]
    pub json_payload: Option<serde_json::Value>,
    #[serde(default)]
    pub proto_payload: Option<serde_json::Value>,
}

#[async_trait]
pub trait LogBackend: Send + Sync {
    /// One page of entries, newest first, at most `query.page_size`.
    async fn list_entries(&self, query: &LogQuery) -> QueryResult<Vec<RawLogEntry>>;
}

// ── Monitoring ────────────────────────────────────────────────

/// Parameters of a time-series lookup for one instance.
#[derive(Debug, Clone)]
pub struct TimeSeriesQuery {
    pub project: String,
    pub metric_type: String,
    pub instance_name: String,
    pub window: TimeWindow,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMetric {
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInterval {
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTypedValue {
    #[serde(default)]
    pub double_value: Option<f64>,
    /// int64 values travel as decimal strings.
    #[serde(default)]
    pub int64_value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    #[serde(default)]
    pub interval: RawInterval,
    #[serde(default)]
    pub value: RawTypedValue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTimeSeries {
    #[serde(default)]
    pub metric: RawMetric,
    #[serde(default)]
    pub points: Vec<RawPoint>,
}

#[async_trait]
pub trait MetricBackend: Send + Sync {
    async fn list_time_series(&self, query: &TimeSeriesQuery) -> QueryResult<Vec<RawTimeSeries>>;
}

// ── Compute ───────────────────────────────────────────────────

#[async_trait]
pub trait ComputeBackend: Send + Sync {
    /// Raw instance descriptors in a zone.
    async fn list_instances(&self, project: &str, zone: &str)
    -> QueryResult<Vec<serde_json::Value>>;

    /// Raw descriptor of one instance.
    async fn get_instance(&self, path: &VmResourcePath) -> QueryResult<serde_json::Value>;
}

// ── Identity ──────────────────────────────────────────────────

#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// E-mail identifiers of every service account in the project.
    async fn list_service_accounts(&self, project_number: &str) -> QueryResult<Vec<String>>;
}

// ── Combined ──────────────────────────────────────────────────

/// A backend serving every domain.
pub trait CloudBackend:
    WarehouseBackend + BatchJobBackend + LogBackend + MetricBackend + ComputeBackend + IdentityBackend
{
}

impl<T> CloudBackend for T where
    T: WarehouseBackend
        + BatchJobBackend
        + LogBackend
        + MetricBackend
        + ComputeBackend
        + IdentityBackend
{
}
