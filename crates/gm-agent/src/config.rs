//! Agent configuration, loadable from TOML or environment.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use gm_cloud_tools::{Credentials, Endpoints, ExecutorSettings};
use gm_protocol::validate_name;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which backend serves queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Google Cloud REST APIs.
    #[default]
    Gcp,
    /// Built-in sample project, no network.
    Mock,
}

/// Top-level configuration for the agent.
#[derive(Clone, Deserialize)]
pub struct AgentConfig {
    pub project_number: String,
    pub project_id: String,
    /// Region hosting batch jobs.
    pub region: String,
    /// Default zone for VM listings.
    pub zone: String,
    /// OAuth access token. Required for the `gcp` backend.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub backend: BackendKind,
    /// Location qualifier of the warehouse jobs view ("us", "eu", ...).
    #[serde(default = "default_warehouse_location")]
    pub warehouse_location: String,
    /// Offset from UTC, in minutes, for calendar-date bucketing.
    #[serde(default)]
    pub reporting_utc_offset_minutes: i32,
    /// Deadline for each tool call.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    #[serde(default)]
    pub endpoints: Endpoints,
}

fn default_warehouse_location() -> String {
    "us".to_string()
}

fn default_call_timeout() -> u64 {
    30
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("project_number", &self.project_number)
            .field("project_id", &self.project_id)
            .field("region", &self.region)
            .field("zone", &self.zone)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("backend", &self.backend)
            .field("warehouse_location", &self.warehouse_location)
            .field("reporting_utc_offset_minutes", &self.reporting_utc_offset_minutes)
            .field("call_timeout_secs", &self.call_timeout_secs)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

impl AgentConfig {
    /// Load and validate config from a TOML file path.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load config through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |var: &'static str| lookup(var).ok_or(ConfigError::MissingEnv(var));

        let backend = match lookup("GM_BACKEND").as_deref() {
            None | Some("gcp") => BackendKind::Gcp,
            Some("mock") => BackendKind::Mock,
            Some(other) => {
                return Err(ConfigError::InvalidEnv {
                    var: "GM_BACKEND",
                    value: other.to_string(),
                });
            }
        };

        let config = Self {
            project_number: required("GCP_PROJECT_NUMBER")?,
            project_id: required("GCP_PROJECT_ID")?,
            region: required("GCP_REGION")?,
            zone: required("GCP_ZONE")?,
            access_token: lookup("GCP_ACCESS_TOKEN"),
            backend,
            warehouse_location: lookup("GM_WAREHOUSE_LOCATION")
                .unwrap_or_else(default_warehouse_location),
            reporting_utc_offset_minutes: parse_var(
                &lookup,
                "GM_REPORTING_UTC_OFFSET_MINUTES",
                0,
            )?,
            call_timeout_secs: parse_var(&lookup, "GM_CALL_TIMEOUT_SECS", default_call_timeout())?,
            endpoints: Endpoints::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let names = [
            ("project number", &self.project_number),
            ("project id", &self.project_id),
            ("region", &self.region),
            ("zone", &self.zone),
            ("warehouse location", &self.warehouse_location),
        ];
        for (what, value) in names {
            validate_name(what, value).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        if self.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid("call_timeout_secs must be positive".into()));
        }
        if self.backend == BackendKind::Gcp
            && self.access_token.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigError::Invalid(
                "access_token is required for the gcp backend".into(),
            ));
        }
        self.executor_settings().map(|_| ())
    }

    pub fn executor_settings(&self) -> Result<ExecutorSettings, ConfigError> {
        ExecutorSettings::new(
            self.project_number.clone(),
            self.project_id.clone(),
            self.region.clone(),
            self.zone.clone(),
            self.warehouse_location.clone(),
            self.reporting_utc_offset_minutes,
        )
        .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Shared credential for the REST backend.
    pub fn credentials(&self) -> Arc<Credentials> {
        Arc::new(Credentials::bearer(
            self.access_token.clone().unwrap_or_default(),
        ))
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE_ENV: &[(&str, &str)] = &[
        ("GCP_PROJECT_NUMBER", "123456789"),
        ("GCP_PROJECT_ID", "acme-prod"),
        ("GCP_REGION", "us-central1"),
        ("GCP_ZONE", "us-east1-b"),
        ("GCP_ACCESS_TOKEN", "ya29.token"),
    ];

    #[test]
    fn deserialize_minimal_config() {
        let toml = r#"
project_number = "123456789"
project_id = "acme-prod"
region = "us-central1"
zone = "us-east1-b"
access_token = "ya29.token"
"#;
        let config: AgentConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.backend, BackendKind::Gcp);
        assert_eq!(config.warehouse_location, "us"); // default
        assert_eq!(config.reporting_utc_offset_minutes, 0); // default
        assert_eq!(config.call_timeout(), Duration::from_secs(30)); // default
        assert_eq!(config.endpoints, Endpoints::default());
    }

    #[test]
    fn deserialize_full_config() {
        let toml = r#"
project_number = "123456789"
project_id = "acme-prod"
region = "us-central1"
zone = "us-east1-b"
backend = "mock"
warehouse_location = "eu"
reporting_utc_offset_minutes = -300
call_timeout_secs = 10

[endpoints]
bigquery = "http://localhost:9050"
"#;
        let config: AgentConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.backend, BackendKind::Mock);
        assert_eq!(config.warehouse_location, "eu");
        assert_eq!(config.endpoints.bigquery, "http://localhost:9050");
        assert_eq!(config.endpoints.iam, "https://iam.googleapis.com");
        let settings = config.executor_settings().unwrap();
        assert_eq!(settings.reporting_offset.local_minus_utc(), -300 * 60);
    }

    #[test]
    fn from_env_reads_required_and_optional_vars() {
        let mut pairs = BASE_ENV.to_vec();
        pairs.push(("GM_CALL_TIMEOUT_SECS", "5"));
        pairs.push(("GM_REPORTING_UTC_OFFSET_MINUTES", "60"));
        let config = AgentConfig::from_lookup(env(&pairs)).unwrap();
        assert_eq!(config.project_id, "acme-prod");
        assert_eq!(config.call_timeout_secs, 5);
        assert_eq!(config.reporting_utc_offset_minutes, 60);
    }

    #[test]
    fn from_env_requires_project_number() {
        let pairs: Vec<_> = BASE_ENV
            .iter()
            .copied()
            .filter(|(k, _)| *k != "GCP_PROJECT_NUMBER")
            .collect();
        let err = AgentConfig::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv("GCP_PROJECT_NUMBER")));
    }

    #[test]
    fn from_env_rejects_unparseable_timeout() {
        let mut pairs = BASE_ENV.to_vec();
        pairs.push(("GM_CALL_TIMEOUT_SECS", "soon"));
        let err = AgentConfig::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                var: "GM_CALL_TIMEOUT_SECS",
                ..
            }
        ));
    }

    #[test]
    fn gcp_backend_requires_token() {
        let pairs: Vec<_> = BASE_ENV
            .iter()
            .copied()
            .filter(|(k, _)| *k != "GCP_ACCESS_TOKEN")
            .collect();
        assert!(matches!(
            AgentConfig::from_lookup(env(&pairs)).unwrap_err(),
            ConfigError::Invalid(_)
        ));

        let mut mock = pairs.clone();
        mock.push(("GM_BACKEND", "mock"));
        assert!(AgentConfig::from_lookup(env(&mock)).is_ok());
    }

    #[test]
    fn validate_rejects_bad_names_and_offsets() {
        let mut config = AgentConfig::from_lookup(env(BASE_ENV)).unwrap();
        config.zone = "us east".into();
        assert!(config.validate().is_err());

        let mut config = AgentConfig::from_lookup(env(BASE_ENV)).unwrap();
        config.reporting_utc_offset_minutes = 24 * 60;
        assert!(config.validate().is_err());

        let mut config = AgentConfig::from_lookup(env(BASE_ENV)).unwrap();
        config.call_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let config = AgentConfig::from_lookup(env(BASE_ENV)).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("ya29.token"));
    }
}
