//! Custom service accounts.

use gm_protocol::{QueryResult, ResourceIdentifier, ResourceKind, SERVICE_ACCOUNT_SUFFIX, validate_name};

use super::Executors;

/// Substrings marking platform-managed agents (default compute, build, platform services).
const MANAGED_MARKERS: &[&str] = &["compute", "cloudbuild", "cloudservices"];

/// True for accounts created by the project owner rather than the platform.
pub fn is_custom_service_account(email: &str, project_number: &str) -> bool {
    !email.starts_with(&format!("{project_number}@"))
        && email.contains(SERVICE_ACCOUNT_SUFFIX)
        && !MANAGED_MARKERS.iter().any(|m| email.contains(m))
}

impl Executors {
    pub async fn list_service_accounts(
        &self,
        project_number: &str,
    ) -> QueryResult<Vec<ResourceIdentifier>> {
        validate_name("project number", project_number)?;
        let emails = self.backend().list_service_accounts(project_number).await?;
        let total = emails.len();
        let custom: Vec<ResourceIdentifier> = emails
            .into_iter()
            .filter(|e| is_custom_service_account(e, project_number))
            .map(|e| ResourceIdentifier::new(ResourceKind::ServiceAccount, e))
            .collect();
        tracing::debug!(total, custom = custom.len(), "service accounts listed");
        Ok(custom)
    }
}
