//! VM inventory.

use serde_json::Value;

use gm_protocol::{
    Domain, QueryError, QueryResult, VmDescriptor, VmResourcePath, validate_name,
};

use super::{Executors, last_segment};

fn string_field(raw: &Value, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) => Some(s.clone()),
        // Compute reports numeric ids as strings, but be lenient.
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Build a descriptor from a raw instance resource. `None` when it has no name.
pub fn vm_descriptor(raw: Value) -> Option<VmDescriptor> {
    let name = string_field(&raw, "name")?;
    Some(VmDescriptor {
        name,
        id: string_field(&raw, "id"),
        zone: string_field(&raw, "zone").map(|z| last_segment(&z).to_string()),
        status: string_field(&raw, "status"),
        machine_type: string_field(&raw, "machineType").map(|m| last_segment(&m).to_string()),
        self_link: string_field(&raw, "selfLink"),
        creation_timestamp: string_field(&raw, "creationTimestamp"),
        details: raw,
    })
}

impl Executors {
    pub async fn list_vms(&self, project: &str, zone: &str) -> QueryResult<Vec<VmDescriptor>> {
        validate_name("project", project)?;
        validate_name("zone", zone)?;
        let raw = self.backend().list_instances(project, zone).await?;
        let total = raw.len();
        let vms: Vec<VmDescriptor> = raw.into_iter().filter_map(vm_descriptor).collect();
        if vms.len() != total {
            tracing::warn!(
                domain = %Domain::Compute,
                skipped = total - vms.len(),
                "skipped instances without a name"
            );
        }
        Ok(vms)
    }

    pub async fn describe_vm(&self, path: &VmResourcePath) -> QueryResult<VmDescriptor> {
        let raw = self.backend().get_instance(path).await?;
        vm_descriptor(raw).ok_or_else(|| QueryError::MalformedRecord {
            domain: Domain::Compute,
            message: format!("instance {path} has no name"),
        })
    }

    pub async fn describe_vm_link(&self, self_link: &str) -> QueryResult<VmDescriptor> {
        let path = VmResourcePath::parse(self_link)?;
        self.describe_vm(&path).await
    }
}
