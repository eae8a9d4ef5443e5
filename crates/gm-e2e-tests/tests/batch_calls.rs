//! E2E tests for concurrent batches and per-call deadlines.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use gm_agent::{BatchError, BatchMode, ToolCall, ToolOutput};
use gm_cloud_tools::MockCloudBackend;
use gm_protocol::{Domain, QueryError};
use helpers::TestHarness;

fn overview_calls() -> Vec<ToolCall> {
    vec![
        ToolCall::GetUsageByUser {
            project_id: None,
            last_n_days: 7,
        },
        ToolCall::GetJobExecutions {
            project_number: None,
            job_name: "nightly-etl".into(),
        },
        ToolCall::MonitorVm {
            self_link: "projects/acme-prod/zones/us-east1-b/instances/web-server".into(),
        },
    ]
}

#[tokio::test]
async fn e2e_batch_runs_independent_domains() {
    let h = TestHarness::with_sample_data();
    let runner = h.batch_runner(Duration::from_secs(5));

    let results = runner
        .run(&overview_calls(), BatchMode::FailClosed)
        .await
        .unwrap();

    assert!(matches!(results[0], Ok(ToolOutput::Usage(ref u)) if u.len() == 2));
    assert!(matches!(results[1], Ok(ToolOutput::Executions(ref e)) if e.len() == 2));
    let Ok(ToolOutput::Samples(samples)) = &results[2] else {
        panic!("expected samples, got {:?}", results[2]);
    };
    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    assert_eq!(values, vec![0.51, 0.37, 0.42]);
}

#[tokio::test]
async fn e2e_fail_closed_surfaces_monitoring_outage() {
    let h = TestHarness::with_mock(MockCloudBackend::with_sample_data().failing(Domain::Monitoring));
    let runner = h.batch_runner(Duration::from_secs(5));

    let err = runner
        .run(&overview_calls(), BatchMode::FailClosed)
        .await
        .unwrap_err();

    match err {
        BatchError::Failed { index, source } => {
            assert_eq!(index, 2);
            assert!(matches!(
                source,
                QueryError::BackendUnavailable {
                    domain: Domain::Monitoring,
                    ..
                }
            ));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn e2e_best_effort_returns_partial_results() {
    let h = TestHarness::with_mock(MockCloudBackend::with_sample_data().failing(Domain::Warehouse));
    let runner = h.batch_runner(Duration::from_secs(5));

    let results = runner
        .run(&overview_calls(), BatchMode::BestEffort)
        .await
        .unwrap();

    assert!(results[0].as_ref().is_err_and(QueryError::is_retryable));
    assert!(results[1].is_ok());
    assert!(results[2].is_ok());
}

#[tokio::test(start_paused = true)]
async fn e2e_registry_deadline_is_retryable_failure() {
    let backend = MockCloudBackend::with_sample_data().with_delay(Duration::from_secs(120));
    let h = TestHarness::build(Arc::new(backend), 0, Some(Duration::from_secs(30)));

    let outcome = h.invoke("list_vms", json!({})).await;

    assert!(!outcome.success);
    assert!(outcome.retryable);
    assert!(outcome.error.unwrap().contains("compute backend unavailable"));
}

#[tokio::test(start_paused = true)]
async fn e2e_cancelled_batch_reports_cancellation() {
    let backend = MockCloudBackend::with_sample_data().with_delay(Duration::from_secs(60));
    let h = TestHarness::with_mock(backend);
    let runner = h.batch_runner(Duration::from_secs(120));

    let err = runner
        .run_until(
            &overview_calls(),
            BatchMode::FailClosed,
            tokio::time::sleep(Duration::from_secs(5)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BatchError::Cancelled));
}
