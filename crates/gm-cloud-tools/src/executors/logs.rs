//! Execution log retrieval.

use gm_protocol::{LogEntry, QueryResult, TimeWindow, UNKNOWN_TIMESTAMP, WindowSpec, validate_name};

use super::Executors;
use crate::backend::{LogQuery, RawLogEntry};

/// Fixed look-back for execution logs.
pub const LOG_LOOKBACK_DAYS: i64 = 30;

/// Page size cap; only one page is fetched.
pub const MAX_LOG_ENTRIES: usize = 200;

const DEFAULT_SEVERITY: &str = "DEFAULT";

fn payload_message(raw: &RawLogEntry) -> String {
    if let Some(text) = &raw.text_payload {
        return text.clone();
    }
    let structured = raw.json_payload.as_ref().or(raw.proto_payload.as_ref());
    match structured {
        Some(payload) => match payload.get("message").and_then(|m| m.as_str()) {
            Some(message) => message.to_string(),
            None => payload.to_string(),
        },
        None => String::new(),
    }
}

pub fn normalize_log_entry(raw: &RawLogEntry) -> LogEntry {
    LogEntry {
        timestamp: raw
            .timestamp
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNKNOWN_TIMESTAMP.to_string()),
        severity: raw
            .severity
            .clone()
            .unwrap_or_else(|| DEFAULT_SEVERITY.to_string()),
        message: payload_message(raw),
    }
}

impl Executors {
    /// Log lines of one execution over the trailing 30 days, newest first,
    /// at most 200. Narrow by execution id for complete coverage.
    pub async fn execution_logs(
        &self,
        project_number: &str,
        job_name: &str,
        execution_id: &str,
    ) -> QueryResult<Vec<LogEntry>> {
        validate_name("project number", project_number)?;
        validate_name("job name", job_name)?;
        validate_name("execution id", execution_id)?;
        let window = TimeWindow::last(self.now(), WindowSpec::LastNDays(LOG_LOOKBACK_DAYS))?;
        let query = LogQuery {
            project_number: project_number.to_string(),
            project_id: self.settings().project_id.clone(),
            region: self.settings().region.clone(),
            job_name: job_name.to_string(),
            execution_id: execution_id.to_string(),
            window,
            page_size: MAX_LOG_ENTRIES,
        };
        let raw = self.backend().list_entries(&query).await?;
        if raw.len() >= MAX_LOG_ENTRIES {
            tracing::info!(
                job = %job_name,
                execution = %execution_id,
                "log page full; older entries not returned"
            );
        }
        Ok(raw
            .iter()
            .take(MAX_LOG_ENTRIES)
            .map(normalize_log_entry)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::executors::test_support::executors;
    use crate::mock::MockCloudBackend;

    #[test]
    fn text_payload_wins() {
        let raw = RawLogEntry {
            timestamp: Some("2025-03-15T01:00:00Z".into()),
            severity: Some("ERROR".into()),
            text_payload: Some("boom".into()),
            json_payload: Some(json!({"message": "ignored"})),
            proto_payload: None,
        };
        let entry = normalize_log_entry(&raw);
        assert_eq!(entry.timestamp, "2025-03-15T01:00:00Z");
        assert_eq!(entry.severity, "ERROR");
        assert_eq!(entry.message, "boom");
    }

    #[test]
    fn json_payload_message_then_serialized() {
        let with_message = RawLogEntry {
            json_payload: Some(json!({"message": "rows written", "count": 3})),
            ..Default::default()
        };
        assert_eq!(normalize_log_entry(&with_message).message, "rows written");

        let without = RawLogEntry {
            json_payload: Some(json!({"count": 3})),
            ..Default::default()
        };
        assert_eq!(normalize_log_entry(&without).message, r#"{"count":3}"#);
    }

    #[test]
    fn missing_timestamp_becomes_unknown() {
        let entry = normalize_log_entry(&RawLogEntry::default());
        assert_eq!(entry.timestamp, "unknown");
        assert_eq!(entry.severity, "DEFAULT");
        assert_eq!(entry.message, "");
    }

    #[tokio::test]
    async fn logs_are_capped_at_page_size() {
        let raws: Vec<RawLogEntry> = (0..250)
            .map(|i| RawLogEntry {
                text_payload: Some(format!("line {i}")),
                ..Default::default()
            })
            .collect();
        let exec = executors(MockCloudBackend::new().with_logs("nightly-etl-abc12", raws));
        let logs = exec
            .execution_logs("123456789", "nightly-etl", "nightly-etl-abc12")
            .await
            .unwrap();
        assert_eq!(logs.len(), MAX_LOG_ENTRIES);
        assert_eq!(logs[0].message, "line 0");
    }

    #[tokio::test]
    async fn unknown_execution_has_no_logs() {
        let exec = executors(MockCloudBackend::with_sample_data());
        let logs = exec
            .execution_logs("123456789", "nightly-etl", "does-not-exist")
            .await
            .unwrap();
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn quoted_execution_id_is_rejected() {
        let exec = executors(MockCloudBackend::with_sample_data());
        let err = exec
            .execution_logs("123456789", "nightly-etl", "x\" OR severity>=DEFAULT")
            .await
            .unwrap_err();
        assert!(matches!(err, gm_protocol::QueryError::InvalidReference(_)));
    }
}
