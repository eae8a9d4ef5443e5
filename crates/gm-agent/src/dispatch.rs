//! Typed tool calls and their dispatch to the domain executors.
//!
//! `ToolCall` is the closed set of operations the agent may invoke. The
//! `Dispatcher` routes each variant to one executor, resolving free-text
//! job and dataset references through the resource catalog first, and
//! feeds listing results back into the catalog.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gm_cloud_tools::{Executors, ScopedCatalogSource};
use gm_protocol::{
    BytesLoadedRecord, DailyUsageRecord, Domain, JobExecution, LogEntry, MatchResult,
    MetricSample, QueryError, QueryResult, ResourceIdentifier, ResourceKind, UsageRecord,
    VmDescriptor, VmResourcePath,
};
use gm_resolver::{CatalogWrite, ResourceCatalog};

/// One agent-facing operation with its arguments.
///
/// Project arguments are optional and default to the configured scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum ToolCall {
    ListDatasets {
        #[serde(default)]
        project_id: Option<String>,
    },
    GetUsageByUser {
        #[serde(default)]
        project_id: Option<String>,
        last_n_days: i64,
    },
    GetUsageByDayUser {
        #[serde(default)]
        project_id: Option<String>,
        last_n_days: i64,
    },
    GetBytesLoaded {
        #[serde(default)]
        project_id: Option<String>,
        /// Dataset id or free-text reference.
        dataset_name: String,
        last_n_days: i64,
    },
    ListBatchJobs {
        #[serde(default)]
        project_number: Option<String>,
    },
    GetJobExecutions {
        #[serde(default)]
        project_number: Option<String>,
        /// Job name or free-text reference.
        job_name: String,
    },
    GetExecutionLogs {
        #[serde(default)]
        project_number: Option<String>,
        /// Job name or free-text reference.
        job_name: String,
        execution_id: String,
    },
    ListServiceAccounts {
        #[serde(default)]
        project_number: Option<String>,
    },
    ListVms {
        /// Project id or number.
        #[serde(default)]
        project: Option<String>,
        #[serde(default)]
        zone: Option<String>,
    },
    DescribeVm {
        self_link: String,
    },
    MonitorVm {
        self_link: String,
    },
    ResolveResource {
        kind: ResourceKind,
        reference: String,
    },
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ListDatasets { .. } => "list_datasets",
            Self::GetUsageByUser { .. } => "get_usage_by_user",
            Self::GetUsageByDayUser { .. } => "get_usage_by_day_user",
            Self::GetBytesLoaded { .. } => "get_bytes_loaded",
            Self::ListBatchJobs { .. } => "list_batch_jobs",
            Self::GetJobExecutions { .. } => "get_job_executions",
            Self::GetExecutionLogs { .. } => "get_execution_logs",
            Self::ListServiceAccounts { .. } => "list_service_accounts",
            Self::ListVms { .. } => "list_vms",
            Self::DescribeVm { .. } => "describe_vm",
            Self::MonitorVm { .. } => "monitor_vm",
            Self::ResolveResource { .. } => "resolve_resource",
        }
    }

    /// Domain a deadline expiry is attributed to.
    pub fn domain(&self) -> Domain {
        match self {
            Self::ListDatasets { .. }
            | Self::GetUsageByUser { .. }
            | Self::GetUsageByDayUser { .. }
            | Self::GetBytesLoaded { .. } => Domain::Warehouse,
            Self::ListBatchJobs { .. } | Self::GetJobExecutions { .. } => Domain::BatchJobs,
            Self::GetExecutionLogs { .. } => Domain::Logging,
            Self::ListServiceAccounts { .. } => Domain::Identity,
            Self::ListVms { .. } | Self::DescribeVm { .. } => Domain::Compute,
            Self::MonitorVm { .. } => Domain::Monitoring,
            Self::ResolveResource { kind, .. } => kind_domain(*kind),
        }
    }
}

fn kind_domain(kind: ResourceKind) -> Domain {
    match kind {
        ResourceKind::Dataset => Domain::Warehouse,
        ResourceKind::ServiceAccount => Domain::Identity,
        ResourceKind::BatchJob => Domain::BatchJobs,
        ResourceKind::VmInstance => Domain::Compute,
    }
}

/// Result of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum ToolOutput {
    /// Dataset ids, job names or account e-mails.
    Identifiers(Vec<String>),
    Usage(Vec<UsageRecord>),
    DailyUsage(Vec<DailyUsageRecord>),
    BytesLoaded(Vec<BytesLoadedRecord>),
    Executions(Vec<JobExecution>),
    Logs(Vec<LogEntry>),
    Vms(Vec<VmDescriptor>),
    Vm(Box<VmDescriptor>),
    Samples(Vec<MetricSample>),
    Resolved(ResourceIdentifier),
    /// A free-text reference did not resolve to exactly one resource.
    Unresolved(MatchResult),
}

impl ToolOutput {
    /// One-line description handed back alongside the data.
    pub fn summary(&self) -> String {
        match self {
            Self::Identifiers(ids) => format!("{} identifiers", ids.len()),
            Self::Usage(r) => format!("usage for {} subjects", r.len()),
            Self::DailyUsage(r) => format!("{} daily usage rows", r.len()),
            Self::BytesLoaded(r) => {
                let total: u64 = r.iter().map(|d| d.bytes_loaded).sum();
                format!("{total} bytes loaded over {} days", r.len())
            }
            Self::Executions(e) => {
                let failed = e
                    .iter()
                    .filter(|x| x.status == gm_protocol::ExecutionStatus::Failure)
                    .count();
                format!("{} executions, {failed} failed", e.len())
            }
            Self::Logs(l) => format!("{} log entries", l.len()),
            Self::Vms(v) => format!("{} instances", v.len()),
            Self::Vm(vm) => format!(
                "instance {} ({})",
                vm.name,
                vm.status.as_deref().unwrap_or("status unknown")
            ),
            Self::Samples(s) => format!("{} samples", s.len()),
            Self::Resolved(r) => format!("resolved to {} {}", r.kind, r.id),
            Self::Unresolved(MatchResult::Ambiguous(c)) => {
                format!("ambiguous reference, {} candidates", c.len())
            }
            Self::Unresolved(_) => "no matching resource".to_string(),
        }
    }
}

fn ids(list: &[ResourceIdentifier]) -> Vec<String> {
    list.iter().map(|r| r.id.clone()).collect()
}

/// Routes tool calls to executors through the shared resource catalog.
pub struct Dispatcher {
    executors: Executors,
    catalog: Arc<ResourceCatalog>,
    source: ScopedCatalogSource,
    call_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(executors: Executors, catalog: Arc<ResourceCatalog>) -> Self {
        Self {
            source: ScopedCatalogSource::new(executors.clone()),
            executors,
            catalog,
            call_timeout: None,
        }
    }

    /// Impose a deadline on every dispatched call.
    pub fn with_call_timeout(mut self, limit: Duration) -> Self {
        self.call_timeout = Some(limit);
        self
    }

    pub fn catalog(&self) -> &ResourceCatalog {
        &self.catalog
    }

    pub fn executors(&self) -> &Executors {
        &self.executors
    }

    /// Execute one call. Deadline expiry is a `BackendUnavailable` of the call's domain.
    pub async fn dispatch(&self, call: &ToolCall) -> QueryResult<ToolOutput> {
        let Some(limit) = self.call_timeout else {
            return self.execute(call).await;
        };
        match tokio::time::timeout(limit, self.execute(call)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(tool = call.name(), ?limit, "tool call deadline exceeded");
                Err(QueryError::backend(
                    call.domain(),
                    format!("deadline of {}ms exceeded", limit.as_millis()),
                ))
            }
        }
    }

    async fn execute(&self, call: &ToolCall) -> QueryResult<ToolOutput> {
        let settings = self.executors.settings();
        let exec = &self.executors;
        match call {
            ToolCall::ListDatasets { project_id } => {
                let project = project_id.as_deref().unwrap_or(&settings.project_id);
                let ticket = self.catalog.issue(ResourceKind::Dataset);
                let datasets = exec.list_datasets(project).await?;
                self.remember(ticket, project == settings.project_id, &datasets)
                    .await;
                Ok(ToolOutput::Identifiers(ids(&datasets)))
            }
            ToolCall::GetUsageByUser {
                project_id,
                last_n_days,
            } => {
                let project = project_id.as_deref().unwrap_or(&settings.project_id);
                Ok(ToolOutput::Usage(exec.usage_by_user(project, *last_n_days).await?))
            }
            ToolCall::GetUsageByDayUser {
                project_id,
                last_n_days,
            } => {
                let project = project_id.as_deref().unwrap_or(&settings.project_id);
                Ok(ToolOutput::DailyUsage(
                    exec.usage_by_day_user(project, *last_n_days).await?,
                ))
            }
            ToolCall::GetBytesLoaded {
                project_id,
                dataset_name,
                last_n_days,
            } => {
                let project = project_id.as_deref().unwrap_or(&settings.project_id);
                let dataset = match self
                    .reference(ResourceKind::Dataset, dataset_name, project == settings.project_id)
                    .await?
                {
                    Ok(id) => id,
                    Err(unresolved) => return Ok(unresolved),
                };
                Ok(ToolOutput::BytesLoaded(
                    exec.bytes_loaded(project, &dataset, *last_n_days).await?,
                ))
            }
            ToolCall::ListBatchJobs { project_number } => {
                let project = project_number.as_deref().unwrap_or(&settings.project_number);
                let ticket = self.catalog.issue(ResourceKind::BatchJob);
                let jobs = exec.list_batch_jobs(project).await?;
                self.remember(ticket, project == settings.project_number, &jobs)
                    .await;
                Ok(ToolOutput::Identifiers(ids(&jobs)))
            }
            ToolCall::GetJobExecutions {
                project_number,
                job_name,
            } => {
                let project = project_number.as_deref().unwrap_or(&settings.project_number);
                let job = match self
                    .reference(ResourceKind::BatchJob, job_name, project == settings.project_number)
                    .await?
                {
                    Ok(id) => id,
                    Err(unresolved) => return Ok(unresolved),
                };
                Ok(ToolOutput::Executions(exec.job_executions(project, &job).await?))
            }
            ToolCall::GetExecutionLogs {
                project_number,
                job_name,
                execution_id,
            } => {
                let project = project_number.as_deref().unwrap_or(&settings.project_number);
                let job = match self
                    .reference(ResourceKind::BatchJob, job_name, project == settings.project_number)
                    .await?
                {
                    Ok(id) => id,
                    Err(unresolved) => return Ok(unresolved),
                };
                Ok(ToolOutput::Logs(
                    exec.execution_logs(project, &job, execution_id.trim()).await?,
                ))
            }
            ToolCall::ListServiceAccounts { project_number } => {
                let project = project_number.as_deref().unwrap_or(&settings.project_number);
                let ticket = self.catalog.issue(ResourceKind::ServiceAccount);
                let accounts = exec.list_service_accounts(project).await?;
                self.remember(ticket, project == settings.project_number, &accounts)
                    .await;
                Ok(ToolOutput::Identifiers(ids(&accounts)))
            }
            ToolCall::ListVms { project, zone } => {
                let project = project.as_deref().unwrap_or(&settings.project_id);
                let zone = zone.as_deref().unwrap_or(&settings.zone);
                let ticket = self.catalog.issue(ResourceKind::VmInstance);
                let vms = exec.list_vms(project, zone).await?;
                let in_scope = project == settings.project_id && zone == settings.zone;
                let listing: Vec<_> = vms.iter().map(|vm| vm.to_identifier()).collect();
                self.remember(ticket, in_scope, &listing).await;
                Ok(ToolOutput::Vms(vms))
            }
            ToolCall::DescribeVm { self_link } => {
                let path = VmResourcePath::parse(self_link)?;
                Ok(ToolOutput::Vm(Box::new(exec.describe_vm(&path).await?)))
            }
            ToolCall::MonitorVm { self_link } => {
                let path = VmResourcePath::parse(self_link)?;
                Ok(ToolOutput::Samples(exec.monitor_vm(&path).await?))
            }
            ToolCall::ResolveResource { kind, reference } => {
                match self.resolve(*kind, reference).await? {
                    MatchResult::Definite(id) => Ok(ToolOutput::Resolved(id)),
                    other => Ok(ToolOutput::Unresolved(other)),
                }
            }
        }
    }

    /// Replace the catalog snapshot with a listing of the configured scope.
    /// `ticket` was taken before the listing request went out.
    async fn remember(
        &self,
        ticket: CatalogWrite,
        in_scope: bool,
        listing: &[ResourceIdentifier],
    ) {
        if in_scope {
            self.catalog.install(ticket, listing.to_vec()).await;
        }
    }

    /// Resolve free text against the catalog for `kind`.
    ///
    /// An empty snapshot is refreshed first. A miss against a snapshot that
    /// was not just fetched triggers one refresh and a second attempt.
    pub async fn resolve(&self, kind: ResourceKind, reference: &str) -> QueryResult<MatchResult> {
        let reference = reference.trim();
        let mut fresh = false;
        if self.catalog.is_empty(kind) {
            self.catalog.refresh(kind, &self.source).await?;
            fresh = true;
        }
        if let Some(exact) = self.catalog.lookup(kind, reference) {
            return Ok(MatchResult::Definite(exact));
        }
        let result = self.catalog.resolve(kind, reference);
        if result != MatchResult::NoMatch || fresh {
            return Ok(result);
        }
        tracing::debug!(kind = %kind, reference, "no match in cached snapshot; refreshing");
        self.catalog.refresh(kind, &self.source).await?;
        if let Some(exact) = self.catalog.lookup(kind, reference) {
            return Ok(MatchResult::Definite(exact));
        }
        Ok(self.catalog.resolve(kind, reference))
    }

    /// Concrete identifier for a job or dataset argument, or the
    /// `Unresolved` output to return instead.
    ///
    /// Outside the configured scope the catalog does not apply and the
    /// argument is used verbatim.
    async fn reference(
        &self,
        kind: ResourceKind,
        text: &str,
        in_scope: bool,
    ) -> QueryResult<Result<String, ToolOutput>> {
        if !in_scope {
            return Ok(Ok(text.trim().to_string()));
        }
        match self.resolve(kind, text).await? {
            MatchResult::Definite(id) => {
                if id.id != text.trim() {
                    tracing::info!(kind = %kind, reference = %text, resolved = %id.id, "reference resolved");
                }
                Ok(Ok(id.id))
            }
            other => Ok(Err(ToolOutput::Unresolved(other))),
        }
    }
}
