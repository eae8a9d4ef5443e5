//! Shared test harness for E2E integration tests.
//!
//! Wires a backend, executors, catalog, dispatcher and registry exactly the
//! way the `gm-agent` binary does, with the clock pinned to 2025-03-15 12:00 UTC.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use gm_agent::{BatchRunner, Dispatcher, ToolRegistry};
use gm_cloud_tools::{
    Clock, CloudBackend, Credentials, Endpoints, ExecutorSettings, Executors, GcpHttpBackend,
    MockCloudBackend,
};
use gm_protocol::{ToolInvocation, ToolOutcome};
use gm_resolver::ResourceCatalog;

pub const PROJECT_NUMBER: &str = "123456789";
pub const PROJECT_ID: &str = "acme-prod";
pub const REGION: &str = "us-central1";
pub const ZONE: &str = "us-east1-b";

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap()
}

/// End-to-end harness around one `ToolRegistry`.
pub struct TestHarness {
    pub registry: ToolRegistry,
    /// Backend calls made so far; only tracked for mock backends.
    pub calls: Option<Arc<AtomicUsize>>,
}

impl TestHarness {
    /// Harness over the sample project (datasets, jobs, executions, VMs, accounts).
    pub fn with_sample_data() -> Self {
        Self::with_mock(MockCloudBackend::with_sample_data())
    }

    /// Harness over a backend with no resources and no job history.
    pub fn empty() -> Self {
        Self::with_mock(MockCloudBackend::new())
    }

    pub fn with_mock(backend: MockCloudBackend) -> Self {
        let calls = backend.call_counter();
        let mut harness = Self::build(Arc::new(backend), 0, None);
        harness.calls = Some(calls);
        harness
    }

    /// Harness over the REST backend with every API pointed at `base_url`.
    pub fn with_http(base_url: &str) -> Self {
        let backend = GcpHttpBackend::new(
            Endpoints::single(base_url),
            Arc::new(Credentials::bearer("e2e-token")),
        );
        Self::build(Arc::new(backend), 0, None)
    }

    /// Full control over the reporting offset and per-call deadline.
    pub fn build(
        backend: Arc<dyn CloudBackend>,
        offset_minutes: i32,
        call_timeout: Option<Duration>,
    ) -> Self {
        let settings =
            ExecutorSettings::new(PROJECT_NUMBER, PROJECT_ID, REGION, ZONE, "us", offset_minutes)
                .unwrap();
        let executors = Executors::new(backend, settings).with_clock(Clock::Fixed(fixed_now()));
        let mut dispatcher = Dispatcher::new(executors, Arc::new(ResourceCatalog::new()));
        if let Some(limit) = call_timeout {
            dispatcher = dispatcher.with_call_timeout(limit);
        }
        Self {
            registry: ToolRegistry::new(Arc::new(dispatcher)),
            calls: None,
        }
    }

    /// Invoke a tool by name, as the agent would.
    pub async fn invoke(&self, tool: &str, args: Value) -> ToolOutcome {
        self.registry
            .invoke(&ToolInvocation::new(tool, args))
            .await
    }

    /// Invoke a tool and return its `result` payload, failing the test on error.
    pub async fn invoke_ok(&self, tool: &str, args: Value) -> Value {
        let outcome = self.invoke(tool, args).await;
        assert!(
            outcome.success,
            "{tool} failed: {}",
            outcome.error.unwrap_or_default()
        );
        let data = outcome.data.unwrap();
        data["result"].clone()
    }

    pub fn batch_runner(&self, per_call_timeout: Duration) -> BatchRunner {
        BatchRunner::new(Arc::clone(self.registry.dispatcher()), per_call_timeout)
    }

    pub fn backend_calls(&self) -> usize {
        self.calls
            .as_ref()
            .map_or(0, |c| c.load(Ordering::SeqCst))
    }
}
