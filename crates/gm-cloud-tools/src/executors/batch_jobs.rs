//! Batch-job listing and execution history.

use chrono::{DateTime, Utc};

use gm_protocol::{
    Domain, ExecutionStatus, JobExecution, QueryResult, ResourceIdentifier, ResourceKind,
    validate_name,
};

use super::{Executors, last_segment};
use crate::backend::{RawCondition, RawExecution};

/// Most executions returned for one job.
pub const MAX_EXECUTIONS: usize = 20;

/// Status implied by a condition state.
pub fn status_for_state(state: Option<&str>) -> ExecutionStatus {
    match state {
        Some("CONDITION_SUCCEEDED") => ExecutionStatus::Success,
        Some("CONDITION_FAILED") | Some("CONDITION_CANCELLED") => ExecutionStatus::Failure,
        _ => ExecutionStatus::Unknown,
    }
}

fn parse_instant(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            tracing::warn!(domain = %Domain::BatchJobs, value = raw, error = %e, "unparseable timestamp");
            None
        }
    }
}

/// Condition with the greatest transition instant. Earlier entries win ties;
/// conditions without a parseable instant rank below every dated one.
fn latest_condition(conditions: &[RawCondition]) -> Option<&RawCondition> {
    let mut best: Option<(&RawCondition, Option<DateTime<Utc>>)> = None;
    for condition in conditions {
        let at = parse_instant(condition.last_transition_time.as_deref());
        match best {
            Some((_, best_at)) if at <= best_at => {}
            _ => best = Some((condition, at)),
        }
    }
    best.map(|(c, _)| c)
}

/// Normalize one execution. Executions without a name are skipped.
pub fn normalize_execution(job_name: &str, raw: &RawExecution) -> Option<JobExecution> {
    let Some(name) = raw.name.as_deref() else {
        tracing::warn!(domain = %Domain::BatchJobs, job = %job_name, "skipping execution without name");
        return None;
    };
    let latest = latest_condition(&raw.conditions);
    Some(JobExecution {
        job_name: job_name.to_string(),
        execution_id: last_segment(name).to_string(),
        uid: raw.uid.clone().unwrap_or_default(),
        start_time: parse_instant(raw.start_time.as_deref()),
        end_time: parse_instant(raw.completion_time.as_deref()),
        status: status_for_state(latest.and_then(|c| c.state.as_deref())),
        latest_condition_type: latest
            .and_then(|c| c.condition_type.clone())
            .unwrap_or_default(),
    })
}

impl Executors {
    /// Job names in the configured region, in backend order.
    pub async fn list_batch_jobs(
        &self,
        project_number: &str,
    ) -> QueryResult<Vec<ResourceIdentifier>> {
        validate_name("project number", project_number)?;
        let region = &self.settings().region;
        let names = self.backend().list_jobs(project_number, region).await?;
        Ok(names
            .iter()
            .map(|full| {
                ResourceIdentifier::new(ResourceKind::BatchJob, last_segment(full))
                    .with_self_link(full.clone())
            })
            .collect())
    }

    /// Most recent executions of a job, in the order the backend reports them.
    pub async fn job_executions(
        &self,
        project_number: &str,
        job_name: &str,
    ) -> QueryResult<Vec<JobExecution>> {
        validate_name("project number", project_number)?;
        validate_name("job name", job_name)?;
        let region = &self.settings().region;
        let raw = self
            .backend()
            .list_executions(project_number, region, job_name, MAX_EXECUTIONS)
            .await?;
        let executions: Vec<JobExecution> = raw
            .iter()
            .take(MAX_EXECUTIONS)
            .filter_map(|e| normalize_execution(job_name, e))
            .collect();
        tracing::debug!(job = %job_name, count = executions.len(), "executions fetched");
        Ok(executions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::executors::test_support::executors;
    use crate::mock::MockCloudBackend;

    fn condition(kind: &str, state: &str, at: Option<&str>) -> RawCondition {
        RawCondition {
            condition_type: Some(kind.into()),
            state: Some(state.into()),
            last_transition_time: at.map(str::to_string),
        }
    }

    fn execution(name: &str, conditions: Vec<RawCondition>) -> RawExecution {
        RawExecution {
            name: Some(format!(
                "projects/123456789/locations/us-central1/jobs/nightly-etl/executions/{name}"
            )),
            uid: Some(format!("uid-{name}")),
            start_time: Some("2025-03-15T01:00:00Z".into()),
            completion_time: Some("2025-03-15T01:10:00.5Z".into()),
            conditions,
        }
    }

    #[test]
    fn status_mapping() {
        assert_eq!(status_for_state(Some("CONDITION_SUCCEEDED")), ExecutionStatus::Success);
        assert_eq!(status_for_state(Some("CONDITION_FAILED")), ExecutionStatus::Failure);
        assert_eq!(status_for_state(Some("CONDITION_CANCELLED")), ExecutionStatus::Failure);
        assert_eq!(status_for_state(Some("CONDITION_PENDING")), ExecutionStatus::Unknown);
        assert_eq!(status_for_state(Some("CONDITION_RECONCILING")), ExecutionStatus::Unknown);
        assert_eq!(status_for_state(None), ExecutionStatus::Unknown);
    }

    #[test]
    fn status_comes_from_most_recent_transition() {
        // Listed out of order on purpose: the later transition must win.
        let raw = execution(
            "nightly-etl-abc12",
            vec![
                condition("Completed", "CONDITION_FAILED", Some("2025-03-15T01:10:00Z")),
                condition("ResourcesAvailable", "CONDITION_SUCCEEDED", Some("2025-03-15T01:00:00Z")),
            ],
        );
        let exec = normalize_execution("nightly-etl", &raw).unwrap();
        assert_eq!(exec.latest_condition_type, "Completed");
        assert_eq!(exec.status, ExecutionStatus::Failure);

        let reversed = execution(
            "nightly-etl-abc12",
            vec![
                condition("ResourcesAvailable", "CONDITION_SUCCEEDED", Some("2025-03-15T01:00:00Z")),
                condition("Completed", "CONDITION_FAILED", Some("2025-03-15T01:10:00Z")),
            ],
        );
        let exec = normalize_execution("nightly-etl", &reversed).unwrap();
        assert_eq!(exec.latest_condition_type, "Completed");
    }

    #[test]
    fn transition_instants_compare_across_offsets() {
        let raw = execution(
            "e1",
            vec![
                condition("Started", "CONDITION_SUCCEEDED", Some("2025-03-15T01:30:00Z")),
                // 02:00 UTC written at +01:00.
                condition("Completed", "CONDITION_SUCCEEDED", Some("2025-03-15T03:00:00+01:00")),
            ],
        );
        let exec = normalize_execution("nightly-etl", &raw).unwrap();
        assert_eq!(exec.latest_condition_type, "Completed");
    }

    #[test]
    fn identity_fields_are_extracted() {
        let raw = execution("nightly-etl-abc12", vec![]);
        let exec = normalize_execution("nightly-etl", &raw).unwrap();
        assert_eq!(exec.execution_id, "nightly-etl-abc12");
        assert_eq!(exec.uid, "uid-nightly-etl-abc12");
        assert!(exec.start_time.is_some());
        assert!(exec.end_time.is_some());
        assert_eq!(exec.status, ExecutionStatus::Unknown);
        assert_eq!(exec.latest_condition_type, "");
    }

    #[test]
    fn unnamed_execution_is_skipped() {
        let raw = RawExecution::default();
        assert!(normalize_execution("nightly-etl", &raw).is_none());
    }

    #[test]
    fn tie_keeps_first_condition() {
        let raw = execution(
            "e1",
            vec![
                condition("A", "CONDITION_SUCCEEDED", Some("2025-03-15T01:00:00Z")),
                condition("B", "CONDITION_FAILED", Some("2025-03-15T01:00:00Z")),
            ],
        );
        assert_eq!(normalize_execution("j", &raw).unwrap().latest_condition_type, "A");
    }

    #[tokio::test]
    async fn list_jobs_strips_resource_prefix() {
        let exec = executors(MockCloudBackend::with_sample_data());
        let jobs = exec.list_batch_jobs("123456789").await.unwrap();
        let ids: Vec<_> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert!(ids.contains(&"nightly-etl"));
        assert!(ids.iter().all(|id| !id.contains('/')));
    }

    #[tokio::test]
    async fn executions_are_capped_and_keep_backend_order() {
        let raws: Vec<RawExecution> = (0..25)
            .map(|i| execution(&format!("e{i:02}"), vec![]))
            .collect();
        let exec = executors(MockCloudBackend::new().with_executions("nightly-etl", raws));
        let executions = exec.job_executions("123456789", "nightly-etl").await.unwrap();
        assert_eq!(executions.len(), MAX_EXECUTIONS);
        assert_eq!(executions[0].execution_id, "e00");
        assert_eq!(executions[19].execution_id, "e19");
    }

    #[tokio::test]
    async fn job_name_with_path_separator_is_rejected() {
        let exec = executors(MockCloudBackend::with_sample_data());
        let err = exec
            .job_executions("123456789", "nightly/../../etc")
            .await
            .unwrap_err();
        assert!(matches!(err, gm_protocol::QueryError::InvalidReference(_)));
    }
}
