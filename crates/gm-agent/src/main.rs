//! GcpMon agent: one-shot tool invoker for the cloud monitoring tools.
//!
//! `gm-agent` with no arguments prints the tool table as JSON.
//! `gm-agent <tool> [json-args]` invokes one tool and prints its outcome.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use gm_agent::{AgentConfig, BackendKind, Dispatcher, ToolRegistry};
use gm_cloud_tools::{CloudBackend, Executors, GcpHttpBackend, MockCloudBackend};
use gm_protocol::ToolInvocation;
use gm_resolver::ResourceCatalog;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gm-agent starting");

    // ── Load config ─────────────────────────────────────────────
    let config = match std::env::var("GM_CONFIG") {
        Ok(path) => AgentConfig::from_file(&path)?,
        Err(_) => AgentConfig::from_env()?,
    };
    tracing::info!(
        project_id = %config.project_id,
        region = %config.region,
        backend = ?config.backend,
        "config loaded"
    );

    // ── Backend ─────────────────────────────────────────────────
    let backend: Arc<dyn CloudBackend> = match config.backend {
        BackendKind::Gcp => Arc::new(GcpHttpBackend::new(
            config.endpoints.clone(),
            config.credentials(),
        )),
        BackendKind::Mock => {
            tracing::info!("using built-in sample backend");
            Arc::new(MockCloudBackend::with_sample_data())
        }
    };

    // ── Tool registry ───────────────────────────────────────────
    let executors = Executors::new(backend, config.executor_settings()?);
    let dispatcher = Dispatcher::new(executors, Arc::new(ResourceCatalog::new()))
        .with_call_timeout(config.call_timeout());
    let registry = ToolRegistry::new(Arc::new(dispatcher));
    tracing::info!(tool_count = registry.len(), "tool registry initialized");

    let mut args = std::env::args().skip(1);
    let Some(tool_name) = args.next() else {
        println!("{}", serde_json::to_string_pretty(registry.list_tools())?);
        return Ok(());
    };
    let tool_args = match args.next() {
        Some(raw) => serde_json::from_str(&raw).context("tool arguments must be a JSON object")?,
        None => serde_json::Value::Null,
    };

    let invocation = ToolInvocation::new(tool_name, tool_args);
    let outcome = registry.invoke(&invocation).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}
