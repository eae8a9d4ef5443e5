//! Catalog listings backed by the executors, scoped to the configured project.

use async_trait::async_trait;

use gm_protocol::{QueryResult, ResourceIdentifier, ResourceKind};
use gm_resolver::CatalogSource;

use crate::executors::Executors;

/// Lists every resource kind within the project, region and zone the
/// executors were configured with.
#[derive(Clone)]
pub struct ScopedCatalogSource {
    executors: Executors,
}

impl ScopedCatalogSource {
    pub fn new(executors: Executors) -> Self {
        Self { executors }
    }
}

#[async_trait]
impl CatalogSource for ScopedCatalogSource {
    async fn list_resources(&self, kind: ResourceKind) -> QueryResult<Vec<ResourceIdentifier>> {
        let settings = self.executors.settings();
        match kind {
            ResourceKind::Dataset => self.executors.list_datasets(&settings.project_id).await,
            ResourceKind::BatchJob => {
                self.executors
                    .list_batch_jobs(&settings.project_number)
                    .await
            }
            ResourceKind::ServiceAccount => {
                self.executors
                    .list_service_accounts(&settings.project_number)
                    .await
            }
            ResourceKind::VmInstance => {
                let vms = self
                    .executors
                    .list_vms(&settings.project_id, &settings.zone)
                    .await?;
                Ok(vms.iter().map(|vm| vm.to_identifier()).collect())
            }
        }
    }
}
