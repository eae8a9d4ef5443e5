//! Google Cloud REST backend.
//!
//! One `reqwest::Client` shared by every domain, bearer-token auth from a
//! process-wide `Credentials`, per-API base URLs from `Endpoints` (so tests
//! can point everything at a local mock server). List endpoints are walked
//! with `pageToken` follow-ups, at most `MAX_PAGES` requests per call.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use gm_protocol::{Domain, QueryError, QueryResult, VmResourcePath, validate_name};

use crate::backend::{
    BatchJobBackend, ComputeBackend, DatasetRef, IdentityBackend, JobMetadata, JobMetadataQuery,
    LogBackend, LogQuery, MetricBackend, RawExecution, RawLogEntry, RawTimeSeries, TimeSeriesQuery,
    WarehouseBackend, WarehouseJobRow,
};

/// Upper bound on requests issued for one paginated call.
pub const MAX_PAGES: usize = 50;

/// Longest error body echoed into an error message.
const ERROR_BODY_LIMIT: usize = 512;

/// Base URLs per API. Defaults are the public Google endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub bigquery: String,
    pub run: String,
    pub logging: String,
    pub monitoring: String,
    pub compute: String,
    pub iam: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            bigquery: "https://bigquery.googleapis.com".into(),
            run: "https://run.googleapis.com".into(),
            logging: "https://logging.googleapis.com".into(),
            monitoring: "https://monitoring.googleapis.com".into(),
            compute: "https://compute.googleapis.com".into(),
            iam: "https://iam.googleapis.com".into(),
        }
    }
}

impl Endpoints {
    /// Every API served from one base URL.
    pub fn single(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            bigquery: base.clone(),
            run: base.clone(),
            logging: base.clone(),
            monitoring: base.clone(),
            compute: base.clone(),
            iam: base,
        }
    }
}

/// OAuth access token, created once per process and shared read-only.
#[derive(Clone)]
pub struct Credentials {
    access_token: String,
}

impl Credentials {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

// ── Wire shapes ───────────────────────────────────────────────

/// A list response carrying one page of items.
trait Page: DeserializeOwned {
    type Item;
    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

macro_rules! page {
    ($name:ident, $field:literal, $item:ty) => {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct $name {
            #[serde(rename = $field, default)]
            items: Vec<$item>,
            #[serde(default)]
            next_page_token: Option<String>,
        }

        impl Page for $name {
            type Item = $item;
            fn into_parts(self) -> (Vec<$item>, Option<String>) {
                (self.items, self.next_page_token)
            }
        }
    };
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetEntry {
    dataset_reference: DatasetReference,
    #[serde(default)]
    friendly_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference {
    dataset_id: String,
}

#[derive(Deserialize)]
struct NamedResource {
    name: String,
}

#[derive(Deserialize)]
struct AccountEntry {
    email: String,
}

page!(DatasetPage, "datasets", DatasetEntry);
page!(JobPage, "jobs", NamedResource);
page!(TimeSeriesPage, "timeSeries", RawTimeSeries);
page!(InstancePage, "items", Value);
page!(AccountPage, "accounts", AccountEntry);

#[derive(Deserialize)]
struct ExecutionList {
    #[serde(default)]
    executions: Vec<RawExecution>,
}

#[derive(Deserialize)]
struct EntryList {
    #[serde(default)]
    entries: Vec<RawLogEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    rows: Vec<TableRow>,
    #[serde(default)]
    page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

// ── Query builders ────────────────────────────────────────────

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Job metadata scan over the project's region-qualified jobs view.
/// Names are validated upstream; only `[A-Za-z0-9-_.:@]` reaches here.
pub fn job_metadata_sql(query: &JobMetadataQuery) -> String {
    let mut sql = format!(
        "SELECT user_email, creation_time, state, job_type, total_bytes_processed, \
         destination_table.dataset_id \
         FROM `{project}.region-{location}.INFORMATION_SCHEMA.JOBS_BY_PROJECT` \
         WHERE creation_time >= TIMESTAMP('{start}') AND creation_time < TIMESTAMP('{end}') \
         AND state = 'DONE' AND job_type = '{job_type}'",
        project = query.project_id,
        location = query.location,
        start = rfc3339(query.window.start()),
        end = rfc3339(query.window.end()),
        job_type = query.job_type.as_str(),
    );
    if let Some(dataset) = &query.destination_dataset {
        sql.push_str(&format!(" AND destination_table.dataset_id = '{dataset}'"));
    }
    sql
}

/// Logging filter selecting one execution of one job.
pub fn log_filter(query: &LogQuery) -> String {
    [
        format!("timestamp >= \"{}\"", rfc3339(query.window.start())),
        format!("timestamp <= \"{}\"", rfc3339(query.window.end())),
        "resource.type=\"cloud_run_job\"".to_string(),
        format!("resource.labels.project_id=\"{}\"", query.project_id),
        format!("resource.labels.location=\"{}\"", query.region),
        format!("resource.labels.job_name=\"{}\"", query.job_name),
        format!(
            "labels.\"run.googleapis.com/execution_name\"=\"{}\"",
            query.execution_id
        ),
    ]
    .join(" AND ")
}

pub fn time_series_filter(query: &TimeSeriesQuery) -> String {
    format!(
        "metric.type=\"{}\" AND metric.labels.instance_name=\"{}\"",
        query.metric_type, query.instance_name
    )
}

// ── Row decoding ──────────────────────────────────────────────

fn cell_str(row: &TableRow, idx: usize) -> Option<&str> {
    row.f.get(idx).and_then(|c| c.v.as_str())
}

/// TIMESTAMP cells arrive as float seconds since the epoch, e.g. "1.7100288E9".
fn cell_timestamp(row: &TableRow, idx: usize) -> Option<DateTime<Utc>> {
    let secs: f64 = cell_str(row, idx)?.parse().ok()?;
    DateTime::from_timestamp_micros((secs * 1_000_000.0).round() as i64)
}

fn cell_u64(row: &TableRow, idx: usize) -> Option<u64> {
    cell_str(row, idx)?.parse().ok()
}

fn decode_job_row(row: &TableRow) -> WarehouseJobRow {
    WarehouseJobRow {
        user_email: cell_str(row, 0).map(str::to_string),
        creation_time: cell_timestamp(row, 1),
        state: cell_str(row, 2).map(str::to_string),
        job_type: cell_str(row, 3).map(str::to_string),
        total_bytes_processed: cell_u64(row, 4),
        destination_dataset: cell_str(row, 5).map(str::to_string),
    }
}

fn truncated(body: &str) -> &str {
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

// ── Backend ───────────────────────────────────────────────────

/// REST backend for every domain.
#[derive(Clone)]
pub struct GcpHttpBackend {
    client: reqwest::Client,
    endpoints: Endpoints,
    credentials: Arc<Credentials>,
}

impl GcpHttpBackend {
    /// No client-level timeout: callers impose per-call deadlines.
    pub fn new(endpoints: Endpoints, credentials: Arc<Credentials>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoints, credentials)
    }

    pub fn with_client(
        client: reqwest::Client,
        endpoints: Endpoints,
        credentials: Arc<Credentials>,
    ) -> Self {
        Self {
            client,
            endpoints,
            credentials,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    async fn send<T: DeserializeOwned>(&self, domain: Domain, request: RequestBuilder) -> QueryResult<T> {
        let response = request
            .bearer_auth(&self.credentials.access_token)
            .send()
            .await
            .map_err(|e| QueryError::backend(domain, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(domain = %domain, status = %status, "backend returned error status");
            return Err(QueryError::backend(
                domain,
                format!("HTTP {status}: {}", truncated(body.trim())),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| QueryError::MalformedRecord {
                domain,
                message: format!("undecodable response body: {e}"),
            })
    }

    /// Walk a paginated list endpoint. `request` builds the request for a page token.
    async fn collect_pages<P, F>(&self, domain: Domain, request: F) -> QueryResult<Vec<P::Item>>
    where
        P: Page,
        F: Fn(Option<&str>) -> RequestBuilder,
    {
        let mut items = Vec::new();
        let mut token: Option<String> = None;
        for page in 1..=MAX_PAGES {
            let (batch, next) = self
                .send::<P>(domain, request(token.as_deref()))
                .await?
                .into_parts();
            items.extend(batch);
            match next.filter(|t| !t.is_empty()) {
                Some(next) if page == MAX_PAGES => {
                    tracing::warn!(domain = %domain, pages = MAX_PAGES, next = %next, "page cap reached; listing truncated");
                }
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(items)
    }
}

fn with_page_token(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(t) => request.query(&[("pageToken", t)]),
        None => request,
    }
}

#[async_trait]
impl WarehouseBackend for GcpHttpBackend {
    async fn list_datasets(&self, project_id: &str) -> QueryResult<Vec<DatasetRef>> {
        validate_name("project id", project_id)?;
        let url = format!(
            "{}/bigquery/v2/projects/{project_id}/datasets",
            self.endpoints.bigquery
        );
        let entries = self
            .collect_pages::<DatasetPage, _>(Domain::Warehouse, |token| {
                with_page_token(self.client.get(&url), token)
            })
            .await?;
        Ok(entries
            .into_iter()
            .map(|e| DatasetRef {
                dataset_id: e.dataset_reference.dataset_id,
                friendly_name: e.friendly_name,
            })
            .collect())
    }

    async fn job_metadata(&self, query: &JobMetadataQuery) -> QueryResult<JobMetadata> {
        validate_name("project id", &query.project_id)?;
        validate_name("warehouse location", &query.location)?;
        if let Some(dataset) = &query.destination_dataset {
            validate_name("dataset", dataset)?;
        }
        let base = format!(
            "{}/bigquery/v2/projects/{}/queries",
            self.endpoints.bigquery, query.project_id
        );
        let sql = job_metadata_sql(query);
        tracing::debug!(sql = %sql, "running job metadata query");

        let mut response: QueryResponse = self
            .send(
                Domain::Warehouse,
                self.client
                    .post(&base)
                    .json(&json!({ "query": sql, "useLegacySql": false })),
            )
            .await?;

        let mut rows = Vec::new();
        for _ in 1..MAX_PAGES {
            rows.extend(response.rows.iter().map(decode_job_row));
            let token = response.page_token.take().filter(|t| !t.is_empty());
            if response.job_complete && token.is_none() {
                return Ok(JobMetadata {
                    rows,
                    truncated: false,
                });
            }
            let Some(job) = &response.job_reference else {
                return Err(QueryError::MalformedRecord {
                    domain: Domain::Warehouse,
                    message: "incomplete query response without job reference".into(),
                });
            };
            let mut follow_up = self.client.get(format!("{base}/{}", job.job_id));
            if let Some(location) = &job.location {
                follow_up = follow_up.query(&[("location", location)]);
            }
            response = self
                .send(Domain::Warehouse, with_page_token(follow_up, token.as_deref()))
                .await?;
        }
        rows.extend(response.rows.iter().map(decode_job_row));
        if !response.job_complete {
            return Err(QueryError::backend(
                Domain::Warehouse,
                format!("query still running after {MAX_PAGES} polls"),
            ));
        }
        let truncated = response.page_token.is_some_and(|t| !t.is_empty());
        if truncated {
            tracing::warn!(pages = MAX_PAGES, "page cap reached; job metadata truncated");
        }
        Ok(JobMetadata { rows, truncated })
    }
}

#[async_trait]
impl BatchJobBackend for GcpHttpBackend {
    async fn list_jobs(&self, project_number: &str, region: &str) -> QueryResult<Vec<String>> {
        validate_name("project number", project_number)?;
        validate_name("region", region)?;
        let url = format!(
            "{}/v2/projects/{project_number}/locations/{region}/jobs",
            self.endpoints.run
        );
        let jobs = self
            .collect_pages::<JobPage, _>(Domain::BatchJobs, |token| {
                with_page_token(self.client.get(&url), token)
            })
            .await?;
        Ok(jobs.into_iter().map(|j| j.name).collect())
    }

    async fn list_executions(
        &self,
        project_number: &str,
        region: &str,
        job_name: &str,
        limit: usize,
    ) -> QueryResult<Vec<RawExecution>> {
        validate_name("project number", project_number)?;
        validate_name("region", region)?;
        validate_name("job name", job_name)?;
        let url = format!(
            "{}/v2/projects/{project_number}/locations/{region}/jobs/{job_name}/executions",
            self.endpoints.run
        );
        let list: ExecutionList = self
            .send(
                Domain::BatchJobs,
                self.client.get(&url).query(&[("pageSize", limit)]),
            )
            .await?;
        Ok(list.executions)
    }
}

#[async_trait]
impl LogBackend for GcpHttpBackend {
    async fn list_entries(&self, query: &LogQuery) -> QueryResult<Vec<RawLogEntry>> {
        validate_name("project number", &query.project_number)?;
        let url = format!("{}/v2/entries:list", self.endpoints.logging);
        let body = json!({
            "resourceNames": [format!("projects/{}", query.project_number)],
            "filter": log_filter(query),
            "orderBy": "timestamp desc",
            "pageSize": query.page_size,
        });
        let list: EntryList = self
            .send(Domain::Logging, self.client.post(&url).json(&body))
            .await?;
        Ok(list.entries)
    }
}

#[async_trait]
impl MetricBackend for GcpHttpBackend {
    async fn list_time_series(&self, query: &TimeSeriesQuery) -> QueryResult<Vec<RawTimeSeries>> {
        validate_name("project", &query.project)?;
        validate_name("instance", &query.instance_name)?;
        let url = format!(
            "{}/v3/projects/{}/timeSeries",
            self.endpoints.monitoring, query.project
        );
        let params = [
            ("filter", time_series_filter(query)),
            ("interval.startTime", rfc3339(query.window.start())),
            ("interval.endTime", rfc3339(query.window.end())),
            ("view", "FULL".to_string()),
        ];
        self.collect_pages::<TimeSeriesPage, _>(Domain::Monitoring, |token| {
            with_page_token(self.client.get(&url).query(&params), token)
        })
        .await
    }
}

#[async_trait]
impl ComputeBackend for GcpHttpBackend {
    async fn list_instances(&self, project: &str, zone: &str) -> QueryResult<Vec<Value>> {
        validate_name("project", project)?;
        validate_name("zone", zone)?;
        let url = format!(
            "{}/compute/v1/projects/{project}/zones/{zone}/instances",
            self.endpoints.compute
        );
        self.collect_pages::<InstancePage, _>(Domain::Compute, |token| {
            with_page_token(self.client.get(&url), token)
        })
        .await
    }

    async fn get_instance(&self, path: &VmResourcePath) -> QueryResult<Value> {
        let url = format!(
            "{}/compute/v1/projects/{}/zones/{}/instances/{}",
            self.endpoints.compute, path.project, path.zone, path.instance
        );
        self.send(Domain::Compute, self.client.get(&url)).await
    }
}

#[async_trait]
impl IdentityBackend for GcpHttpBackend {
    async fn list_service_accounts(&self, project_number: &str) -> QueryResult<Vec<String>> {
        validate_name("project number", project_number)?;
        let url = format!(
            "{}/v1/projects/{project_number}/serviceAccounts",
            self.endpoints.iam
        );
        let accounts = self
            .collect_pages::<AccountPage, _>(Domain::Identity, |token| {
                with_page_token(self.client.get(&url), token)
            })
            .await?;
        Ok(accounts.into_iter().map(|a| a.email).collect())
    }
}
