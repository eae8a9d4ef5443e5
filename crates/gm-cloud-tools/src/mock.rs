//! Scripted in-memory backend for tests and offline runs.
//!
//! Holds fixed rows per domain and answers every backend trait from them,
//! applying the same server-side filters the real services apply (job type,
//! destination dataset, time window, page size). Supports per-domain failure
//! injection, an artificial delay and a call counter.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};

use gm_protocol::{Domain, QueryError, QueryResult, VmResourcePath};

use crate::backend::{
    BatchJobBackend, ComputeBackend, DatasetRef, IdentityBackend, JobMetadata, JobMetadataQuery,
    LogBackend, LogQuery, MetricBackend, RawCondition, RawExecution, RawInterval, RawLogEntry,
    RawMetric, RawPoint, RawTimeSeries, RawTypedValue, TimeSeriesQuery, WarehouseBackend,
    WarehouseJobRow,
};

/// In-memory backend with scripted responses.
#[derive(Default)]
pub struct MockCloudBackend {
    datasets: Vec<DatasetRef>,
    job_rows: Vec<WarehouseJobRow>,
    truncate_job_metadata: bool,
    jobs: Vec<String>,
    executions: HashMap<String, Vec<RawExecution>>,
    logs: HashMap<String, Vec<RawLogEntry>>,
    series: HashMap<String, Vec<RawTimeSeries>>,
    instances: Vec<Value>,
    accounts: Vec<String>,
    failing: HashSet<Domain>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockCloudBackend {
    /// Empty backend: every listing returns nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// A small project: three datasets, a handful of query and load jobs
    /// around 2025-03-14, three batch jobs, two VMs, and a mix of custom and
    /// platform-managed service accounts.
    pub fn with_sample_data() -> Self {
        let at = |d: u32, h: u32| Utc.with_ymd_and_hms(2025, 3, d, h, 0, 0).single();
        let query = |user: &str, created, bytes| WarehouseJobRow {
            user_email: Some(user.to_string()),
            creation_time: created,
            state: Some("DONE".into()),
            job_type: Some("QUERY".into()),
            total_bytes_processed: Some(bytes),
            destination_dataset: None,
        };
        let load = |dataset: &str, created, bytes| WarehouseJobRow {
            user_email: Some("loader@acme-prod.iam.gserviceaccount.com".into()),
            creation_time: created,
            state: Some("DONE".into()),
            job_type: Some("LOAD".into()),
            total_bytes_processed: Some(bytes),
            destination_dataset: Some(dataset.to_string()),
        };

        let execution = |id: &str, state: &str, started: &str, finished: &str| RawExecution {
            name: Some(format!(
                "projects/123456789/locations/us-central1/jobs/nightly-etl/executions/{id}"
            )),
            uid: Some(format!("{id}-uid")),
            start_time: Some(started.to_string()),
            completion_time: Some(finished.to_string()),
            conditions: vec![
                RawCondition {
                    condition_type: Some("ResourcesAvailable".into()),
                    state: Some("CONDITION_SUCCEEDED".into()),
                    last_transition_time: Some(started.to_string()),
                },
                RawCondition {
                    condition_type: Some("Completed".into()),
                    state: Some(state.to_string()),
                    last_transition_time: Some(finished.to_string()),
                },
            ],
        };

        let cpu_point = |minute: u32, value: f64| RawPoint {
            interval: RawInterval {
                start_time: None,
                end_time: Some(format!("2025-03-15T11:5{minute}:00Z")),
            },
            value: RawTypedValue {
                double_value: Some(value),
                int64_value: None,
            },
        };

        let mut backend = Self::new()
            .with_dataset("sales_raw", Some("Sales (raw)"))
            .with_dataset("marketing", None)
            .with_dataset("finance_reports", None)
            .with_job_row(query("alice@acme.com", at(14, 9), 1_500))
            .with_job_row(query("alice@acme.com", at(15, 8), 500))
            .with_job_row(query("etl@acme-prod.iam.gserviceaccount.com", at(14, 3), 9_000))
            .with_job_row(load("sales_raw", at(13, 4), 4_096))
            .with_job_row(load("sales_raw", at(14, 4), 2_048))
            .with_executions(
                "nightly-etl",
                vec![
                    execution(
                        "nightly-etl-x2k9p",
                        "CONDITION_FAILED",
                        "2025-03-15T01:00:00Z",
                        "2025-03-15T01:12:00Z",
                    ),
                    execution(
                        "nightly-etl-q81zt",
                        "CONDITION_SUCCEEDED",
                        "2025-03-14T01:00:00Z",
                        "2025-03-14T01:09:00Z",
                    ),
                ],
            )
            .with_logs(
                "nightly-etl-x2k9p",
                vec![
                    RawLogEntry {
                        timestamp: Some("2025-03-15T01:11:58Z".into()),
                        severity: Some("ERROR".into()),
                        text_payload: Some("upload failed: quota exceeded".into()),
                        ..Default::default()
                    },
                    RawLogEntry {
                        timestamp: Some("2025-03-15T01:00:03Z".into()),
                        severity: Some("INFO".into()),
                        json_payload: Some(json!({"message": "starting export", "rows": 0})),
                        ..Default::default()
                    },
                ],
            )
            .with_series(
                "web-server",
                RawTimeSeries {
                    metric: RawMetric {
                        labels: HashMap::from([(
                            "instance_name".to_string(),
                            "web-server".to_string(),
                        )]),
                    },
                    points: vec![cpu_point(9, 0.42), cpu_point(8, 0.37), cpu_point(7, 0.51)],
                },
            );

        for job in ["nightly-etl", "invoice-export-job", "cleanup"] {
            backend = backend.with_job(format!(
                "projects/123456789/locations/us-central1/jobs/{job}"
            ));
        }
        for (name, id, machine) in [
            ("web-server", "4417219001", "e2-medium"),
            ("db-primary", "4417219002", "n2-standard-4"),
        ] {
            let base = "https://www.googleapis.com/compute/v1/projects/acme-prod/zones/us-east1-b";
            backend = backend.with_instance(json!({
                "name": name,
                "id": id,
                "status": "RUNNING",
                "zone": base,
                "machineType": format!("{base}/machineTypes/{machine}"),
                "selfLink": format!("{base}/instances/{name}"),
                "creationTimestamp": "2024-11-02T10:00:00.000-07:00",
            }));
        }
        for account in [
            "etl@acme-prod.iam.gserviceaccount.com",
            "client1@acme-prod.iam.gserviceaccount.com",
            "client1-reports@acme-prod.iam.gserviceaccount.com",
            "123456789-compute@developer.gserviceaccount.com",
            "123456789@cloudservices.gserviceaccount.com",
            "123456789@cloudbuild.gserviceaccount.com",
        ] {
            backend = backend.with_account(account);
        }
        backend
    }

    pub fn with_dataset(mut self, id: &str, friendly_name: Option<&str>) -> Self {
        self.datasets.push(DatasetRef {
            dataset_id: id.to_string(),
            friendly_name: friendly_name.map(str::to_string),
        });
        self
    }

    pub fn with_job_row(mut self, row: WarehouseJobRow) -> Self {
        self.job_rows.push(row);
        self
    }

    /// Report every job-metadata scan as cut short by the page cap.
    pub fn with_truncated_job_metadata(mut self) -> Self {
        self.truncate_job_metadata = true;
        self
    }

    /// Register a job by full resource name.
    pub fn with_job(mut self, full_name: impl Into<String>) -> Self {
        self.jobs.push(full_name.into());
        self
    }

    pub fn with_executions(mut self, job_name: &str, executions: Vec<RawExecution>) -> Self {
        self.executions.insert(job_name.to_string(), executions);
        self
    }

    /// Log entries keyed by execution id, newest first.
    pub fn with_logs(mut self, execution_id: &str, entries: Vec<RawLogEntry>) -> Self {
        self.logs.insert(execution_id.to_string(), entries);
        self
    }

    pub fn with_series(mut self, instance: &str, series: RawTimeSeries) -> Self {
        self.series
            .entry(instance.to_string())
            .or_default()
            .push(series);
        self
    }

    pub fn with_instance(mut self, instance: Value) -> Self {
        self.instances.push(instance);
        self
    }

    pub fn with_account(mut self, email: impl Into<String>) -> Self {
        self.accounts.push(email.into());
        self
    }

    /// Every call against `domain` fails with `BackendUnavailable`.
    pub fn failing(mut self, domain: Domain) -> Self {
        self.failing.insert(domain);
        self
    }

    /// Delay every call by `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared counter of backend calls made so far.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    async fn enter(&self, domain: Domain) -> QueryResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&domain) {
            return Err(QueryError::backend(domain, "503 Service Unavailable (injected)"));
        }
        Ok(())
    }
}

fn in_window(created: Option<DateTime<Utc>>, query: &JobMetadataQuery) -> bool {
    created.is_none_or(|t| query.window.contains(t))
}

#[async_trait]
impl WarehouseBackend for MockCloudBackend {
    async fn list_datasets(&self, _project_id: &str) -> QueryResult<Vec<DatasetRef>> {
        self.enter(Domain::Warehouse).await?;
        Ok(self.datasets.clone())
    }

    async fn job_metadata(&self, query: &JobMetadataQuery) -> QueryResult<JobMetadata> {
        self.enter(Domain::Warehouse).await?;
        let rows = self
            .job_rows
            .iter()
            .filter(|r| r.job_type.as_deref() == Some(query.job_type.as_str()))
            .filter(|r| match &query.destination_dataset {
                Some(ds) => r.destination_dataset.as_ref() == Some(ds),
                None => true,
            })
            .filter(|r| in_window(r.creation_time, query))
            .cloned()
            .collect();
        Ok(JobMetadata {
            rows,
            truncated: self.truncate_job_metadata,
        })
    }
}

#[async_trait]
impl BatchJobBackend for MockCloudBackend {
    async fn list_jobs(&self, _project_number: &str, _region: &str) -> QueryResult<Vec<String>> {
        self.enter(Domain::BatchJobs).await?;
        Ok(self.jobs.clone())
    }

    async fn list_executions(
        &self,
        _project_number: &str,
        _region: &str,
        job_name: &str,
        limit: usize,
    ) -> QueryResult<Vec<RawExecution>> {
        self.enter(Domain::BatchJobs).await?;
        Ok(self
            .executions
            .get(job_name)
            .map(|e| e.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl LogBackend for MockCloudBackend {
    async fn list_entries(&self, query: &LogQuery) -> QueryResult<Vec<RawLogEntry>> {
        self.enter(Domain::Logging).await?;
        Ok(self
            .logs
            .get(&query.execution_id)
            .map(|e| e.iter().take(query.page_size).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl MetricBackend for MockCloudBackend {
    async fn list_time_series(&self, query: &TimeSeriesQuery) -> QueryResult<Vec<RawTimeSeries>> {
        self.enter(Domain::Monitoring).await?;
        Ok(self
            .series
            .get(&query.instance_name)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ComputeBackend for MockCloudBackend {
    async fn list_instances(&self, _project: &str, _zone: &str) -> QueryResult<Vec<Value>> {
        self.enter(Domain::Compute).await?;
        Ok(self.instances.clone())
    }

    async fn get_instance(&self, path: &VmResourcePath) -> QueryResult<Value> {
        self.enter(Domain::Compute).await?;
        self.instances
            .iter()
            .find(|i| i.get("name").and_then(Value::as_str) == Some(path.instance.as_str()))
            .cloned()
            .ok_or_else(|| {
                QueryError::backend(
                    Domain::Compute,
                    format!("404 Not Found: instance {path}"),
                )
            })
    }
}

#[async_trait]
impl IdentityBackend for MockCloudBackend {
    async fn list_service_accounts(&self, _project_number: &str) -> QueryResult<Vec<String>> {
        self.enter(Domain::Identity).await?;
        Ok(self.accounts.clone())
    }
}
