//! Absolute `[start, end)` time windows from relative requests.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};

/// Relative window request ("last N days", "last N minutes").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowSpec {
    LastNDays(i64),
    LastNMinutes(i64),
}

impl WindowSpec {
    fn span(&self) -> QueryResult<Duration> {
        let (n, unit) = match *self {
            Self::LastNDays(n) => (n, "day"),
            Self::LastNMinutes(n) => (n, "minute"),
        };
        if n <= 0 {
            return Err(QueryError::InvalidWindow(format!(
                "{unit} count must be at least 1, got {n}"
            )));
        }
        let span = match *self {
            Self::LastNDays(n) => Duration::try_days(n),
            Self::LastNMinutes(n) => Duration::try_minutes(n),
        };
        span.ok_or_else(|| QueryError::InvalidWindow(format!("{unit} count {n} is out of range")))
    }
}

/// Half-open instant range. Invariant: `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawWindow")]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawWindow> for TimeWindow {
    type Error = QueryError;

    fn try_from(raw: RawWindow) -> QueryResult<Self> {
        if raw.start >= raw.end {
            return Err(QueryError::InvalidWindow(format!(
                "start {} is not before end {}",
                raw.start, raw.end
            )));
        }
        Ok(Self {
            start: raw.start,
            end: raw.end,
        })
    }
}

impl TimeWindow {
    /// Window ending at `now` spanning the requested length.
    pub fn last(now: DateTime<Utc>, spec: WindowSpec) -> QueryResult<Self> {
        let span = spec.span()?;
        let start = now
            .checked_sub_signed(span)
            .ok_or_else(|| QueryError::InvalidWindow(format!("{spec:?} reaches before the epoch range")))?;
        Ok(Self { start, end: now })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Calendar date of an instant in the given reporting offset.
    pub fn local_date(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
        instant.with_timezone(&offset).date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn last_n_days_spans_exactly_n_days() {
        for n in [1, 7, 30, 365] {
            let w = TimeWindow::last(now(), WindowSpec::LastNDays(n)).unwrap();
            assert_eq!(w.duration(), Duration::days(n));
            assert!(w.start() < w.end());
            assert_eq!(w.end(), now());
        }
    }

    #[test]
    fn last_n_minutes_spans_exactly_n_minutes() {
        let w = TimeWindow::last(now(), WindowSpec::LastNMinutes(5)).unwrap();
        assert_eq!(w.duration(), Duration::minutes(5));
    }

    #[test]
    fn non_positive_counts_are_rejected() {
        for spec in [
            WindowSpec::LastNDays(0),
            WindowSpec::LastNDays(-3),
            WindowSpec::LastNMinutes(0),
        ] {
            let err = TimeWindow::last(now(), spec).unwrap_err();
            assert!(matches!(err, QueryError::InvalidWindow(_)), "{spec:?}");
        }
    }

    #[test]
    fn absurd_counts_are_rejected_not_panicking() {
        let err = TimeWindow::last(now(), WindowSpec::LastNDays(i64::MAX)).unwrap_err();
        assert!(matches!(err, QueryError::InvalidWindow(_)));
    }

    #[test]
    fn contains_is_half_open() {
        let w = TimeWindow::last(now(), WindowSpec::LastNDays(1)).unwrap();
        assert!(w.contains(w.start()));
        assert!(!w.contains(w.end()));
    }

    #[test]
    fn deserialize_rejects_inverted_window() {
        let json = r#"{"start":"2024-03-10T12:00:00Z","end":"2024-03-09T12:00:00Z"}"#;
        assert!(serde_json::from_str::<TimeWindow>(json).is_err());

        let w = TimeWindow::last(now(), WindowSpec::LastNDays(2)).unwrap();
        let back: TimeWindow = serde_json::from_str(&serde_json::to_string(&w).unwrap()).unwrap();
        assert_eq!(back, w);
    }

    #[test]
    fn local_date_applies_offset() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 10, 2, 0, 0).unwrap();
        let toronto_winter = FixedOffset::west_opt(5 * 3600).unwrap();
        assert_eq!(
            TimeWindow::local_date(instant, toronto_winter),
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
        );
    }
}
