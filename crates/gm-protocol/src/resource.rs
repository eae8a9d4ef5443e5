use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};

/// Category of a known resource identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Dataset,
    ServiceAccount,
    BatchJob,
    VmInstance,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        Self::Dataset,
        Self::ServiceAccount,
        Self::BatchJob,
        Self::VmInstance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dataset => "dataset",
            Self::ServiceAccount => "service_account",
            Self::BatchJob => "batch_job",
            Self::VmInstance => "vm_instance",
        }
    }

    /// Position in fixed per-kind tables.
    pub fn index(&self) -> usize {
        match self {
            Self::Dataset => 0,
            Self::ServiceAccount => 1,
            Self::BatchJob => 2,
            Self::VmInstance => 3,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete resource known to the catalog. Unique per `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    pub kind: ResourceKind,
    /// Canonical identifier (dataset id, account e-mail, job name, instance name).
    pub id: String,
    /// Human-facing name; equals `id` when the backend reports nothing better.
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
}

impl ResourceIdentifier {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            kind,
            display_name: id.clone(),
            id,
            self_link: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_self_link(mut self, link: impl Into<String>) -> Self {
        self.self_link = Some(link.into());
        self
    }
}

static VM_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:https://www\.googleapis\.com/compute/v1/)?projects/([^/]+)/zones/([^/]+)/instances/([^/]+)$",
    )
    .expect("static regex")
});

/// Structured path to a single VM instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmResourcePath {
    pub project: String,
    pub zone: String,
    pub instance: String,
}

impl VmResourcePath {
    /// Parse a full self link or the short `projects/../zones/../instances/..` form.
    pub fn parse(link: &str) -> QueryResult<Self> {
        let caps = VM_PATH_RE
            .captures(link.trim())
            .ok_or_else(|| QueryError::InvalidReference(format!("invalid VM self link: {link}")))?;
        let path = Self {
            project: caps[1].to_string(),
            zone: caps[2].to_string(),
            instance: caps[3].to_string(),
        };
        validate_name("project", &path.project)?;
        validate_name("zone", &path.zone)?;
        validate_name("instance", &path.instance)?;
        Ok(path)
    }

    pub fn self_link(&self) -> String {
        format!(
            "https://www.googleapis.com/compute/v1/projects/{}/zones/{}/instances/{}",
            self.project, self.zone, self.instance
        )
    }
}

impl std::fmt::Display for VmResourcePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "projects/{}/zones/{}/instances/{}",
            self.project, self.zone, self.instance
        )
    }
}

/// Validate a plain resource name used to build a backend path, filter or query.
///
/// Accepts ASCII letters, digits and `- _ . : @`; anything else (path
/// separators, quotes, whitespace) is rejected.
pub fn validate_name(what: &str, name: &str) -> QueryResult<()> {
    if name.is_empty() {
        return Err(QueryError::InvalidReference(format!("empty {what}")));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '@'))
    {
        return Err(QueryError::InvalidReference(format!(
            "invalid {what}: {name:?}"
        )));
    }
    Ok(())
}
