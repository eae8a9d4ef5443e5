//! Usage and load-bytes executors over warehouse job metadata.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use gm_protocol::{
    BytesLoadedRecord, DailyUsageRecord, Domain, QueryResult, ResourceIdentifier,
    ResourceKind, TimeWindow, UsageRecord, WindowSpec, is_service_account, validate_name,
};

use super::Executors;
use crate::backend::{JobMetadata, JobMetadataQuery, WarehouseJobRow, WarehouseJobType};

const DONE: &str = "DONE";

#[derive(Default)]
struct Totals {
    jobs: u64,
    bytes: u64,
    incomplete: bool,
}

impl Totals {
    fn add(&mut self, bytes: Option<u64>) {
        self.jobs += 1;
        match bytes {
            Some(b) => self.bytes = self.bytes.saturating_add(b),
            None => self.incomplete = true,
        }
    }

    fn into_record(self, subject: String, window: TimeWindow) -> UsageRecord {
        UsageRecord {
            is_service_account: is_service_account(&subject),
            subject,
            job_count: self.jobs,
            bytes_processed: self.bytes,
            window,
            incomplete: self.incomplete,
        }
    }
}

/// A job row that passed the state/type/window filters.
struct Qualified<'a> {
    subject: Option<&'a str>,
    created: DateTime<Utc>,
    bytes: Option<u64>,
}

fn qualifying<'a>(
    window: &'a TimeWindow,
    rows: impl IntoIterator<Item = &'a WarehouseJobRow> + 'a,
    job_type: WarehouseJobType,
) -> impl Iterator<Item = Qualified<'a>> + 'a {
    rows.into_iter().filter_map(move |row| {
        if row.state.as_deref() != Some(DONE) || row.job_type.as_deref() != Some(job_type.as_str())
        {
            return None;
        }
        let Some(created) = row.creation_time else {
            tracing::warn!(domain = %Domain::Warehouse, "skipping job row without creation_time");
            return None;
        };
        if !window.contains(created) {
            return None;
        }
        Some(Qualified {
            subject: row.user_email.as_deref(),
            created,
            bytes: row.total_bytes_processed,
        })
    })
}

fn subject_or_warn(subject: Option<&str>) -> Option<&str> {
    if subject.is_none() {
        tracing::warn!(domain = %Domain::Warehouse, "skipping job row without user_email");
    }
    subject
}

/// Per-subject query usage, descending bytes processed (ties by subject).
pub fn usage_by_user(window: TimeWindow, rows: &[WarehouseJobRow]) -> Vec<UsageRecord> {
    let mut totals: HashMap<&str, Totals> = HashMap::new();
    for job in qualifying(&window, rows, WarehouseJobType::Query) {
        if let Some(subject) = subject_or_warn(job.subject) {
            totals.entry(subject).or_default().add(job.bytes);
        }
    }

    let mut records: Vec<UsageRecord> = totals
        .into_iter()
        .map(|(subject, t)| t.into_record(subject.to_string(), window))
        .collect();
    records.sort_by(|a, b| {
        b.bytes_processed
            .cmp(&a.bytes_processed)
            .then_with(|| a.subject.cmp(&b.subject))
    });
    records
}

/// Per-date, per-subject query usage, ascending date (ties by subject).
pub fn usage_by_day_user(
    window: TimeWindow,
    rows: &[WarehouseJobRow],
    offset: FixedOffset,
) -> Vec<DailyUsageRecord> {
    let mut totals: BTreeMap<(NaiveDate, &str), Totals> = BTreeMap::new();
    for job in qualifying(&window, rows, WarehouseJobType::Query) {
        if let Some(subject) = subject_or_warn(job.subject) {
            let date = TimeWindow::local_date(job.created, offset);
            totals.entry((date, subject)).or_default().add(job.bytes);
        }
    }

    totals
        .into_iter()
        .map(|((date, subject), t)| DailyUsageRecord {
            date,
            usage: t.into_record(subject.to_string(), window),
        })
        .collect()
}

/// Bytes loaded into `dataset` per date, ascending.
pub fn bytes_loaded(
    window: TimeWindow,
    rows: &[WarehouseJobRow],
    dataset: &str,
    offset: FixedOffset,
) -> Vec<BytesLoadedRecord> {
    let mut per_date: BTreeMap<NaiveDate, Totals> = BTreeMap::new();
    let in_dataset = rows
        .iter()
        .filter(|r| r.destination_dataset.as_deref() == Some(dataset));
    for job in qualifying(&window, in_dataset, WarehouseJobType::Load) {
        let date = TimeWindow::local_date(job.created, offset);
        per_date.entry(date).or_default().add(job.bytes);
    }

    per_date
        .into_iter()
        .map(|(date, t)| BytesLoadedRecord {
            date,
            bytes_loaded: t.bytes,
            incomplete: t.incomplete,
        })
        .collect()
}

impl Executors {
    fn day_window(&self, last_n_days: i64) -> QueryResult<TimeWindow> {
        TimeWindow::last(self.now(), WindowSpec::LastNDays(last_n_days))
    }

    async fn job_rows(
        &self,
        project_id: &str,
        window: TimeWindow,
        job_type: WarehouseJobType,
        destination_dataset: Option<&str>,
    ) -> QueryResult<JobMetadata> {
        let query = JobMetadataQuery {
            project_id: project_id.to_string(),
            location: self.settings().warehouse_location.clone(),
            window,
            job_type,
            destination_dataset: destination_dataset.map(str::to_string),
        };
        let meta = self.backend().job_metadata(&query).await?;
        tracing::debug!(
            project = %project_id,
            job_type = job_type.as_str(),
            rows = meta.rows.len(),
            truncated = meta.truncated,
            "warehouse job metadata fetched"
        );
        Ok(meta)
    }

    /// Datasets in a project, in backend order.
    pub async fn list_datasets(&self, project_id: &str) -> QueryResult<Vec<ResourceIdentifier>> {
        validate_name("project id", project_id)?;
        let datasets = self.backend().list_datasets(project_id).await?;
        Ok(datasets
            .into_iter()
            .map(|d| {
                let id = ResourceIdentifier::new(ResourceKind::Dataset, d.dataset_id);
                match d.friendly_name {
                    Some(name) if !name.is_empty() => id.with_display_name(name),
                    _ => id,
                }
            })
            .collect())
    }

    pub async fn usage_by_user(
        &self,
        project_id: &str,
        last_n_days: i64,
    ) -> QueryResult<Vec<UsageRecord>> {
        validate_name("project id", project_id)?;
        let window = self.day_window(last_n_days)?;
        let meta = self
            .job_rows(project_id, window, WarehouseJobType::Query, None)
            .await?;
        let mut records = usage_by_user(window, &meta.rows);
        if meta.truncated {
            records.iter_mut().for_each(|r| r.incomplete = true);
        }
        Ok(records)
    }

    pub async fn usage_by_day_user(
        &self,
        project_id: &str,
        last_n_days: i64,
    ) -> QueryResult<Vec<DailyUsageRecord>> {
        validate_name("project id", project_id)?;
        let window = self.day_window(last_n_days)?;
        let meta = self
            .job_rows(project_id, window, WarehouseJobType::Query, None)
            .await?;
        let mut records =
            usage_by_day_user(window, &meta.rows, self.settings().reporting_offset);
        if meta.truncated {
            records.iter_mut().for_each(|r| r.usage.incomplete = true);
        }
        Ok(records)
    }

    /// Bytes written by load jobs into one dataset. Query-written data
    /// (CTAS, INSERT) is not counted.
    pub async fn bytes_loaded(
        &self,
        project_id: &str,
        dataset: &str,
        last_n_days: i64,
    ) -> QueryResult<Vec<BytesLoadedRecord>> {
        validate_name("project id", project_id)?;
        validate_name("dataset", dataset)?;
        let window = self.day_window(last_n_days)?;
        let meta = self
            .job_rows(project_id, window, WarehouseJobType::Load, Some(dataset))
            .await?;
        let mut records = bytes_loaded(
            window,
            &meta.rows,
            dataset,
            self.settings().reporting_offset,
        );
        if meta.truncated {
            records.iter_mut().for_each(|r| r.incomplete = true);
        }
        Ok(records)
    }
}
