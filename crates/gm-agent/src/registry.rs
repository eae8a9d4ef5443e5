//! Name-keyed tool registry at the agent boundary.
//!
//! The agent sees tools as a name, a description and a JSON schema. This
//! module maps a `ToolInvocation` onto a typed `ToolCall`, dispatches it and
//! wraps the result in a `ToolOutcome`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{Value, json};

use gm_protocol::{Domain, QueryError, QueryResult, ToolInvocation, ToolOutcome};

use crate::dispatch::{Dispatcher, ToolCall};

/// Metadata about a registered tool (used by tool listing).
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    /// Backing domain; `None` when it depends on the arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<Domain>,
    pub schema: Value,
}

fn tool(name: &str, description: &str, domain: Option<Domain>, schema: Value) -> ToolInfo {
    ToolInfo {
        name: name.to_string(),
        description: description.to_string(),
        domain,
        schema,
    }
}

fn string_prop(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

fn days_prop() -> Value {
    json!({ "type": "integer", "minimum": 1, "description": "Look-back window in days" })
}

fn tool_table() -> Vec<ToolInfo> {
    let project_id = string_prop("Project id; defaults to the configured project");
    let project_number = string_prop("Project number; defaults to the configured project");
    vec![
        tool(
            "list_datasets",
            "List warehouse datasets in a project",
            Some(Domain::Warehouse),
            json!({
                "type": "object",
                "properties": { "project_id": project_id },
            }),
        ),
        tool(
            "get_usage_by_user",
            "Bytes processed by completed query jobs per user over the last N days",
            Some(Domain::Warehouse),
            json!({
                "type": "object",
                "properties": { "project_id": project_id, "last_n_days": days_prop() },
                "required": ["last_n_days"],
            }),
        ),
        tool(
            "get_usage_by_day_user",
            "Bytes processed by completed query jobs per calendar day and user",
            Some(Domain::Warehouse),
            json!({
                "type": "object",
                "properties": { "project_id": project_id, "last_n_days": days_prop() },
                "required": ["last_n_days"],
            }),
        ),
        tool(
            "get_bytes_loaded",
            "Bytes loaded into a dataset per calendar day",
            Some(Domain::Warehouse),
            json!({
                "type": "object",
                "properties": {
                    "project_id": project_id,
                    "dataset_name": string_prop("Dataset id or a free-text reference to one"),
                    "last_n_days": days_prop(),
                },
                "required": ["dataset_name", "last_n_days"],
            }),
        ),
        tool(
            "list_batch_jobs",
            "List scheduled batch jobs in the configured region",
            Some(Domain::BatchJobs),
            json!({
                "type": "object",
                "properties": { "project_number": project_number },
            }),
        ),
        tool(
            "get_job_executions",
            "Recent executions of a batch job with their outcome",
            Some(Domain::BatchJobs),
            json!({
                "type": "object",
                "properties": {
                    "project_number": project_number,
                    "job_name": string_prop("Job name or a free-text reference to one"),
                },
                "required": ["job_name"],
            }),
        ),
        tool(
            "get_execution_logs",
            "Log entries written by one batch job execution",
            Some(Domain::Logging),
            json!({
                "type": "object",
                "properties": {
                    "project_number": project_number,
                    "job_name": string_prop("Job name or a free-text reference to one"),
                    "execution_id": string_prop("Execution id, e.g. nightly-etl-x2k9p"),
                },
                "required": ["job_name", "execution_id"],
            }),
        ),
        tool(
            "list_service_accounts",
            "List user-managed service accounts",
            Some(Domain::Identity),
            json!({
                "type": "object",
                "properties": { "project_number": project_number },
            }),
        ),
        tool(
            "list_vms",
            "List VM instances in a zone",
            Some(Domain::Compute),
            json!({
                "type": "object",
                "properties": {
                    "project": string_prop("Project id or number; defaults to the configured project"),
                    "zone": string_prop("Zone; defaults to the configured zone"),
                },
            }),
        ),
        tool(
            "describe_vm",
            "Describe one VM instance",
            Some(Domain::Compute),
            json!({
                "type": "object",
                "properties": {
                    "self_link": string_prop("projects/{project}/zones/{zone}/instances/{name}"),
                },
                "required": ["self_link"],
            }),
        ),
        tool(
            "monitor_vm",
            "CPU utilization samples of a VM over the last few minutes",
            Some(Domain::Monitoring),
            json!({
                "type": "object",
                "properties": {
                    "self_link": string_prop("projects/{project}/zones/{zone}/instances/{name}"),
                },
                "required": ["self_link"],
            }),
        ),
        tool(
            "resolve_resource",
            "Resolve a free-text reference to a known resource identifier",
            None,
            json!({
                "type": "object",
                "properties": {
                    "kind": {
                        "type": "string",
                        "enum": ["dataset", "service_account", "batch_job", "vm_instance"],
                    },
                    "reference": string_prop("Free-text reference"),
                },
                "required": ["kind", "reference"],
            }),
        ),
    ]
}

/// Tool registry for the agent, indexed by name.
pub struct ToolRegistry {
    dispatcher: Arc<Dispatcher>,
    tools: Vec<ToolInfo>,
    /// Map from tool name → index into `tools`.
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        let tools = tool_table();
        let index = tools
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        Self {
            dispatcher,
            tools,
            index,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn list_tools(&self) -> &[ToolInfo] {
        &self.tools
    }

    pub fn lookup(&self, name: &str) -> Option<&ToolInfo> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Map an invocation onto a typed call. Missing args count as `{}`.
    pub fn parse(&self, invocation: &ToolInvocation) -> QueryResult<ToolCall> {
        let name = invocation.tool_name.as_str();
        if self.lookup(name).is_none() {
            return Err(QueryError::UnknownTool(name.to_string()));
        }
        let args = match &invocation.args {
            Value::Null => json!({}),
            other => other.clone(),
        };
        serde_json::from_value(json!({ "tool": name, "args": args })).map_err(|e| {
            QueryError::InvalidArguments {
                tool: name.to_string(),
                message: e.to_string(),
            }
        })
    }

    /// Run one invocation end to end. Never fails; errors land in the outcome.
    pub async fn invoke(&self, invocation: &ToolInvocation) -> ToolOutcome {
        let start = Instant::now();
        let result = match self.parse(invocation) {
            Ok(call) => self.dispatcher.dispatch(&call).await,
            Err(e) => Err(e),
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(output) => match serde_json::to_value(&output) {
                Ok(data) => {
                    let summary = output.summary();
                    tracing::info!(
                        tool = %invocation.tool_name,
                        invocation_id = %invocation.id,
                        latency_ms,
                        summary = %summary,
                        "tool invocation completed"
                    );
                    ToolOutcome::success(invocation, data, summary, latency_ms)
                }
                Err(e) => ToolOutcome::failure(
                    invocation,
                    format!("failed to encode result: {e}"),
                    false,
                    latency_ms,
                ),
            },
            Err(e) => {
                tracing::warn!(
                    tool = %invocation.tool_name,
                    invocation_id = %invocation.id,
                    latency_ms,
                    error = %e,
                    "tool invocation failed"
                );
                ToolOutcome::failure(invocation, e.to_string(), e.is_retryable(), latency_ms)
            }
        }
    }
}
