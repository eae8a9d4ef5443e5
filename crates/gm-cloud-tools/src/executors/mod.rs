//! Domain query executors.
//!
//! `Executors` is the single entry point: it owns the shared backend, the
//! deployment settings and a clock, and exposes one async method per query.
//! Every method validates its input before touching the backend, performs
//! the backend round trip and hands the raw rows to a pure normalizer that
//! lives next to it in the domain module.

mod batch_jobs;
mod compute;
mod identity;
mod logs;
mod metrics;
mod warehouse;

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};

use gm_protocol::{QueryError, QueryResult};

use crate::backend::CloudBackend;

pub use batch_jobs::{MAX_EXECUTIONS, normalize_execution, status_for_state};
pub use compute::vm_descriptor;
pub use identity::is_custom_service_account;
pub use logs::{LOG_LOOKBACK_DAYS, MAX_LOG_ENTRIES, normalize_log_entry};
pub use metrics::{CPU_UTILIZATION_METRIC, METRIC_LOOKBACK_MINUTES, normalize_series};
pub use warehouse::{bytes_loaded, usage_by_day_user, usage_by_user};

/// Source of "now" for window construction.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    /// Frozen instant, for reproducible windows.
    Fixed(DateTime<Utc>),
}

impl Clock {
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Self::System => Utc::now(),
            Self::Fixed(instant) => *instant,
        }
    }
}

/// Deployment scope shared by every executor call.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Default project number for batch-job, identity and compute listings.
    pub project_number: String,
    /// Default project id for warehouse queries.
    pub project_id: String,
    /// Region hosting batch jobs.
    pub region: String,
    /// Default zone for VM listings.
    pub zone: String,
    /// Location qualifier of the warehouse job metadata view.
    pub warehouse_location: String,
    /// Offset used to bucket instants into calendar dates.
    pub reporting_offset: FixedOffset,
}

impl ExecutorSettings {
    /// Build settings from a UTC offset expressed in minutes.
    pub fn new(
        project_number: impl Into<String>,
        project_id: impl Into<String>,
        region: impl Into<String>,
        zone: impl Into<String>,
        warehouse_location: impl Into<String>,
        reporting_utc_offset_minutes: i32,
    ) -> QueryResult<Self> {
        let reporting_offset = reporting_utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                QueryError::InvalidWindow(format!(
                    "reporting offset out of range: {reporting_utc_offset_minutes} minutes"
                ))
            })?;
        Ok(Self {
            project_number: project_number.into(),
            project_id: project_id.into(),
            region: region.into(),
            zone: zone.into(),
            warehouse_location: warehouse_location.into(),
            reporting_offset,
        })
    }
}

/// Query executors over a shared backend.
#[derive(Clone)]
pub struct Executors {
    backend: Arc<dyn CloudBackend>,
    settings: Arc<ExecutorSettings>,
    clock: Clock,
}

impl Executors {
    pub fn new(backend: Arc<dyn CloudBackend>, settings: ExecutorSettings) -> Self {
        Self {
            backend,
            settings: Arc::new(settings),
            clock: Clock::System,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn backend(&self) -> &dyn CloudBackend {
        self.backend.as_ref()
    }
}

/// Last `/`-separated segment of a resource name or URL.
pub(crate) fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
