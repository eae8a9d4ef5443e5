//! Concurrent execution of independent tool calls.
//!
//! Every call in a batch is issued at once and runs under its own deadline.
//! Results come back in call order regardless of completion order.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;

use gm_protocol::QueryError;

use crate::dispatch::{Dispatcher, ToolCall, ToolOutput};

/// How a batch reports per-call failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatchMode {
    /// Any failure fails the whole batch.
    #[default]
    FailClosed,
    /// Every call reports its own result.
    BestEffort,
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("call {index} failed: {source}")]
    Failed {
        index: usize,
        #[source]
        source: QueryError,
    },

    #[error("batch cancelled")]
    Cancelled,
}

pub type CallResult = Result<ToolOutput, QueryError>;

/// Issues batches of calls through a shared dispatcher.
#[derive(Clone)]
pub struct BatchRunner {
    dispatcher: Arc<Dispatcher>,
    per_call_timeout: Duration,
}

impl BatchRunner {
    pub fn new(dispatcher: Arc<Dispatcher>, per_call_timeout: Duration) -> Self {
        Self {
            dispatcher,
            per_call_timeout,
        }
    }

    /// Run `calls` concurrently.
    ///
    /// `FailClosed` returns the first failure in call order; `BestEffort`
    /// returns one result per call.
    pub async fn run(
        &self,
        calls: &[ToolCall],
        mode: BatchMode,
    ) -> Result<Vec<CallResult>, BatchError> {
        let results = join_all(calls.iter().map(|call| self.one(call))).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        tracing::info!(calls = calls.len(), failed, ?mode, "batch finished");

        if mode == BatchMode::FailClosed {
            if let Some((index, source)) = results
                .iter()
                .enumerate()
                .find_map(|(i, r)| r.as_ref().err().map(|e| (i, e.clone())))
            {
                return Err(BatchError::Failed { index, source });
            }
        }
        Ok(results)
    }

    /// Like `run`, but stops waiting once `cancel` resolves.
    ///
    /// Calls still in flight are dropped; no partial results are returned.
    pub async fn run_until(
        &self,
        calls: &[ToolCall],
        mode: BatchMode,
        cancel: impl Future<Output = ()>,
    ) -> Result<Vec<CallResult>, BatchError> {
        tokio::select! {
            result = self.run(calls, mode) => result,
            () = cancel => {
                tracing::warn!(calls = calls.len(), "batch cancelled before completion");
                Err(BatchError::Cancelled)
            }
        }
    }

    async fn one(&self, call: &ToolCall) -> CallResult {
        match tokio::time::timeout(self.per_call_timeout, self.dispatcher.dispatch(call)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(tool = call.name(), timeout = ?self.per_call_timeout, "batch call timed out");
                Err(QueryError::backend(
                    call.domain(),
                    format!("deadline of {}ms exceeded", self.per_call_timeout.as_millis()),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gm_cloud_tools::executors::{Clock, ExecutorSettings};
    use gm_cloud_tools::{Executors, MockCloudBackend};
    use gm_protocol::Domain;
    use gm_resolver::ResourceCatalog;

    fn runner(backend: MockCloudBackend, timeout: Duration) -> BatchRunner {
        let settings =
            ExecutorSettings::new("123456789", "acme-prod", "us-central1", "us-east1-b", "us", 0)
                .unwrap();
        let now = chrono::Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap();
        let executors = Executors::new(Arc::new(backend), settings).with_clock(Clock::Fixed(now));
        let dispatcher = Dispatcher::new(executors, Arc::new(ResourceCatalog::new()));
        BatchRunner::new(Arc::new(dispatcher), timeout)
    }

    fn mixed_calls() -> Vec<ToolCall> {
        vec![
            ToolCall::ListDatasets { project_id: None },
            ToolCall::ListServiceAccounts {
                project_number: None,
            },
            ToolCall::ListBatchJobs {
                project_number: None,
            },
        ]
    }

    #[tokio::test]
    async fn results_follow_call_order() {
        let runner = runner(MockCloudBackend::with_sample_data(), Duration::from_secs(5));
        let results = runner
            .run(&mixed_calls(), BatchMode::FailClosed)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        let ToolOutput::Identifiers(datasets) = results[0].as_ref().unwrap() else {
            panic!("expected datasets");
        };
        assert!(datasets.contains(&"sales_raw".to_string()));
        let ToolOutput::Identifiers(jobs) = results[2].as_ref().unwrap() else {
            panic!("expected jobs");
        };
        assert!(jobs.contains(&"nightly-etl".to_string()));
    }

    #[tokio::test]
    async fn fail_closed_reports_first_failure() {
        let runner = runner(
            MockCloudBackend::with_sample_data().failing(Domain::Identity),
            Duration::from_secs(5),
        );
        let err = runner
            .run(&mixed_calls(), BatchMode::FailClosed)
            .await
            .unwrap_err();
        let BatchError::Failed { index, source } = err else {
            panic!("expected failure, got {err:?}");
        };
        assert_eq!(index, 1);
        assert!(source.is_retryable());
    }

    #[tokio::test]
    async fn best_effort_keeps_successes() {
        let runner = runner(
            MockCloudBackend::with_sample_data().failing(Domain::Identity),
            Duration::from_secs(5),
        );
        let results = runner
            .run(&mixed_calls(), BatchMode::BestEffort)
            .await
            .unwrap();
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out_individually() {
        let runner = runner(
            MockCloudBackend::with_sample_data().with_delay(Duration::from_secs(10)),
            Duration::from_secs(2),
        );
        let results = runner
            .run(&mixed_calls(), BatchMode::BestEffort)
            .await
            .unwrap();
        for (result, domain) in results
            .iter()
            .zip([Domain::Warehouse, Domain::Identity, Domain::BatchJobs])
        {
            assert!(
                matches!(result, Err(QueryError::BackendUnavailable { domain: d, .. }) if *d == domain),
                "{result:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_waiting() {
        let runner = runner(
            MockCloudBackend::with_sample_data().with_delay(Duration::from_secs(10)),
            Duration::from_secs(30),
        );
        let err = runner
            .run_until(
                &mixed_calls(),
                BatchMode::BestEffort,
                tokio::time::sleep(Duration::from_secs(1)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::Cancelled));
    }

    #[tokio::test]
    async fn empty_batch_is_empty() {
        let runner = runner(MockCloudBackend::new(), Duration::from_secs(1));
        let results = runner.run(&[], BatchMode::FailClosed).await.unwrap();
        assert!(results.is_empty());
    }
}
