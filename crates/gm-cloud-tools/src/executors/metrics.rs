//! VM CPU utilization over the trailing five minutes.

use chrono::{DateTime, Utc};

use gm_protocol::{Domain, MetricSample, QueryResult, TimeWindow, VmResourcePath, WindowSpec};

use super::Executors;
use crate::backend::{RawPoint, RawTimeSeries, TimeSeriesQuery};

pub const CPU_UTILIZATION_METRIC: &str = "compute.googleapis.com/instance/cpu/utilization";

pub const METRIC_LOOKBACK_MINUTES: i64 = 5;

const INSTANCE_LABEL: &str = "instance_name";

fn point_sample(instance: &str, point: &RawPoint) -> Option<MetricSample> {
    let raw_time = point.interval.end_time.as_deref()?;
    let timestamp = match DateTime::parse_from_rfc3339(raw_time) {
        Ok(t) => t.with_timezone(&Utc),
        Err(e) => {
            tracing::warn!(domain = %Domain::Monitoring, value = raw_time, error = %e, "skipping point with bad end time");
            return None;
        }
    };
    let value = match (point.value.double_value, point.value.int64_value.as_deref()) {
        (Some(v), _) => v,
        (None, Some(raw)) => raw.parse::<i64>().ok()? as f64,
        (None, None) => {
            tracing::warn!(domain = %Domain::Monitoring, instance, "skipping point without value");
            return None;
        }
    };
    Some(MetricSample {
        instance: instance.to_string(),
        timestamp,
        value,
    })
}

/// Flatten series into samples grouped by instance (first appearance order),
/// each group ascending by timestamp.
pub fn normalize_series(requested_instance: &str, series: &[RawTimeSeries]) -> Vec<MetricSample> {
    let mut groups: Vec<(String, Vec<MetricSample>)> = Vec::new();
    for s in series {
        let instance = s
            .metric
            .labels
            .get(INSTANCE_LABEL)
            .map(String::as_str)
            .unwrap_or(requested_instance);
        let idx = match groups.iter().position(|(name, _)| name == instance) {
            Some(i) => i,
            None => {
                groups.push((instance.to_string(), Vec::new()));
                groups.len() - 1
            }
        };
        groups[idx]
            .1
            .extend(s.points.iter().filter_map(|p| point_sample(instance, p)));
    }

    groups
        .into_iter()
        .flat_map(|(_, mut samples)| {
            samples.sort_by_key(|s| s.timestamp);
            samples
        })
        .collect()
}

impl Executors {
    /// Full-resolution CPU utilization for one instance.
    pub async fn monitor_vm(&self, path: &VmResourcePath) -> QueryResult<Vec<MetricSample>> {
        let window = TimeWindow::last(
            self.now(),
            WindowSpec::LastNMinutes(METRIC_LOOKBACK_MINUTES),
        )?;
        let query = TimeSeriesQuery {
            project: path.project.clone(),
            metric_type: CPU_UTILIZATION_METRIC.to_string(),
            instance_name: path.instance.clone(),
            window,
        };
        let series = self.backend().list_time_series(&query).await?;
        let samples = normalize_series(&path.instance, &series);
        tracing::debug!(instance = %path.instance, samples = samples.len(), "cpu series fetched");
        Ok(samples)
    }

    /// Same as `monitor_vm`, from a self link.
    pub async fn monitor_vm_link(&self, self_link: &str) -> QueryResult<Vec<MetricSample>> {
        let path = VmResourcePath::parse(self_link)?;
        self.monitor_vm(&path).await
    }
}
