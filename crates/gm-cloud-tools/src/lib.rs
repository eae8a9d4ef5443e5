//! Domain query executors for GcpMon.
//!
//! Each executor issues one (paginated) query against a cloud domain through
//! a backend trait and normalizes the result into the shared record types:
//! warehouse usage and load volume, batch-job executions, execution logs,
//! VM CPU metrics, VM inventory and identity accounts. Backends: the Google
//! Cloud REST backend (`GcpHttpBackend`) and a scripted `MockCloudBackend`.

pub mod backend;
pub mod catalog_source;
pub mod executors;
pub mod http;
pub mod mock;

// Re-export key types for convenience
pub use backend::{
    BatchJobBackend, CloudBackend, ComputeBackend, IdentityBackend, LogBackend, MetricBackend,
    WarehouseBackend,
};
pub use catalog_source::ScopedCatalogSource;
pub use executors::{Clock, ExecutorSettings, Executors};
pub use http::{Credentials, Endpoints, GcpHttpBackend};
pub use mock::MockCloudBackend;
