//! Normalized query records returned by the domain executors.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::resource::{ResourceIdentifier, ResourceKind};
use crate::window::TimeWindow;

/// Suffix identifying service-account subjects in warehouse job metadata.
pub const SERVICE_ACCOUNT_SUFFIX: &str = "gserviceaccount.com";

pub fn is_service_account(subject: &str) -> bool {
    subject.ends_with(SERVICE_ACCOUNT_SUFFIX)
}

// ── Warehouse usage ───────────────────────────────────────────

/// Aggregated query usage for one subject over a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// User e-mail or service account that ran the jobs.
    pub subject: String,
    pub is_service_account: bool,
    pub job_count: u64,
    pub bytes_processed: u64,
    pub window: TimeWindow,
    /// Set when a constituent job was missing its byte count, or the job
    /// listing was cut short by the page cap.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub incomplete: bool,
}

/// `UsageRecord` keyed additionally by calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsageRecord {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub usage: UsageRecord,
}

/// Bytes written into a dataset by load jobs on one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BytesLoadedRecord {
    pub date: NaiveDate,
    pub bytes_loaded: u64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub incomplete: bool,
}

// ── Metrics ───────────────────────────────────────────────────

/// One point of an instance's metric series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub instance: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

// ── Batch jobs ────────────────────────────────────────────────

/// Outcome derived from an execution's most recent condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failure,
    Unknown,
}

/// One execution of a scheduled batch job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    pub job_name: String,
    pub execution_id: String,
    pub uid: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    /// Type of the condition with the most recent transition (empty if none).
    pub latest_condition_type: String,
}

// ── Logs ──────────────────────────────────────────────────────

/// Timestamp placeholder for log entries the backend reports without one.
pub const UNKNOWN_TIMESTAMP: &str = "unknown";

/// A severity-annotated log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 timestamp or `"unknown"`.
    pub timestamp: String,
    pub severity: String,
    pub message: String,
}

// ── Compute ───────────────────────────────────────────────────

/// A VM instance as reported by the compute backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Zone name (last path segment of the backend's zone URL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Machine type name (last path segment of the backend's machine type URL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<String>,
    /// Full descriptor as returned by the backend.
    #[serde(default)]
    pub details: serde_json::Value,
}

impl VmDescriptor {
    /// Catalog entry for this instance, keyed by name.
    pub fn to_identifier(&self) -> ResourceIdentifier {
        let id = ResourceIdentifier::new(ResourceKind::VmInstance, self.name.clone());
        match &self.self_link {
            Some(link) => id.with_self_link(link.clone()),
            None => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_account_suffix_detection() {
        assert!(is_service_account("etl@acme.iam.gserviceaccount.com"));
        assert!(is_service_account("123-compute@developer.gserviceaccount.com"));
        assert!(!is_service_account("alice@acme.com"));
        assert!(!is_service_account("gserviceaccount.com.evil@acme.com"));
    }

    #[test]
    fn execution_status_serializes_snake_case() {
        let json = serde_json::to_string(&ExecutionStatus::Failure).unwrap();
        assert_eq!(json, "\"failure\"");
    }

    #[test]
    fn complete_usage_omits_incomplete_flag() {
        let window = crate::window::TimeWindow::last(
            Utc::now(),
            crate::window::WindowSpec::LastNDays(1),
        )
        .unwrap();
        let record = UsageRecord {
            subject: "alice@acme.com".into(),
            is_service_account: false,
            job_count: 3,
            bytes_processed: 1024,
            window,
            incomplete: false,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("incomplete").is_none());
        assert_eq!(json["bytes_processed"], 1024);
    }
}
