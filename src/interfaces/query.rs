//! Validation of raw query parameters before they reach the core.

use crate::application::metrics::Granularity;
use crate::clock::Clock;
use crate::domain::payment::PaymentStatus;
use crate::domain::ports::PaymentFilter;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Duration, Utc};

/// Sentinel a dashboard sends to mean "no filter".
const ALL: &str = "All";

/// An optional `[from, to]` window as requested by a caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl MetricsQuery {
    /// Parses RFC 3339 bounds. Empty strings count as absent.
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<Self> {
        Ok(Self {
            from: parse_instant("from", from)?,
            to: parse_instant("to", to)?,
        })
    }

    /// Window for summary and failure-reason queries, defaulting to the last 24 hours.
    pub fn summary_window(&self, clock: &dyn Clock) -> (DateTime<Utc>, DateTime<Utc>) {
        self.resolve(clock, Duration::hours(24))
    }

    /// Window for timeseries queries, defaulting to the last 7 days. Windows
    /// that would yield too many `granularity` buckets are rejected.
    pub fn timeseries_window(
        &self,
        clock: &dyn Clock,
        granularity: Granularity,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let (from, to) = self.resolve(clock, Duration::days(7));
        granularity.check_span(from, to)?;
        Ok((from, to))
    }

    fn resolve(&self, clock: &dyn Clock, lookback: Duration) -> (DateTime<Utc>, DateTime<Utc>) {
        let now = clock.now();
        (
            self.from.unwrap_or(now - lookback),
            self.to.unwrap_or(now),
        )
    }
}

fn parse_instant(name: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw)
        .map(|t| Some(t.with_timezone(&Utc)))
        .map_err(|e| PaymentError::InvalidQuery(format!("{name} {raw:?} is not an RFC 3339 time: {e}")))
}

/// Raw payment-listing parameters, as they arrive from a query string or flags.
#[derive(Debug, Clone, Default)]
pub struct PaymentQuery<'a> {
    pub status: Option<&'a str>,
    pub merchant_id: Option<&'a str>,
    pub min_amount: Option<&'a str>,
    pub max_amount: Option<&'a str>,
}

impl PaymentQuery<'_> {
    pub fn into_filter(self) -> Result<PaymentFilter> {
        Ok(PaymentFilter {
            status: selected(self.status).map(str::parse::<PaymentStatus>).transpose()?,
            merchant_id: selected(self.merchant_id).map(str::to_string),
            min_amount: parse_amount("minAmount", self.min_amount)?,
            max_amount: parse_amount("maxAmount", self.max_amount)?,
            ..PaymentFilter::default()
        })
    }
}

fn selected(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty() && *s != ALL)
}

fn parse_amount(name: &str, raw: Option<&str>) -> Result<Option<u64>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PaymentError::InvalidQuery(format!(
            "{name} must be a non-negative integer, got {raw:?}"
        )));
    }
    raw.parse()
        .map(Some)
        .map_err(|e| PaymentError::InvalidQuery(format!("{name} {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Datelike, TimeZone};

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_missing_bounds_default_to_lookback() {
        let clock = clock();
        let now = clock.now();

        let (from, to) = MetricsQuery::default().summary_window(&clock);
        assert_eq!((from, to), (now - Duration::hours(24), now));

        let (from, to) = MetricsQuery::default()
            .timeseries_window(&clock, Granularity::Hour)
            .unwrap();
        assert_eq!((from, to), (now - Duration::days(7), now));
    }

    #[test]
    fn test_explicit_bounds_are_kept() {
        let query = MetricsQuery::parse(Some("2024-03-01T00:00:00Z"), Some("")).unwrap();
        let clock = clock();
        let (from, to) = query.timeseries_window(&clock, Granularity::Day).unwrap();
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(to, clock.now());
    }

    #[test]
    fn test_oversized_timeseries_window_is_rejected() {
        let query =
            MetricsQuery::parse(Some("0001-01-01T00:00:00Z"), Some("9999-12-31T23:59:59Z")).unwrap();
        let err = query
            .timeseries_window(&clock(), Granularity::Hour)
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidQuery(msg) if msg.contains("hour buckets")));

        // The same span is fine for a summary, which builds no buckets.
        let (from, _) = query.summary_window(&clock());
        assert_eq!(from.year(), 1);
    }

    #[test]
    fn test_offsets_are_normalized_to_utc() {
        let query = MetricsQuery::parse(Some("2024-03-01T02:00:00+02:00"), None).unwrap();
        assert_eq!(query.from, Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_bad_time_is_rejected() {
        let err = MetricsQuery::parse(Some("yesterday"), None).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidQuery(msg) if msg.starts_with("from")));
    }

    #[test]
    fn test_all_means_no_filter() {
        let filter = PaymentQuery {
            status: Some("All"),
            merchant_id: Some("All"),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter, PaymentFilter::default());
    }

    #[test]
    fn test_filter_fields_are_parsed() {
        let filter = PaymentQuery {
            status: Some("captured"),
            merchant_id: Some("merch_03"),
            min_amount: Some("100"),
            max_amount: Some(" 2500 "),
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.status, Some(PaymentStatus::Captured));
        assert_eq!(filter.merchant_id.as_deref(), Some("merch_03"));
        assert_eq!(filter.min_amount, Some(100));
        assert_eq!(filter.max_amount, Some(2500));
    }

    #[test]
    fn test_non_integer_amounts_are_rejected() {
        for raw in ["12.5", "-3", "ten"] {
            let err = PaymentQuery {
                min_amount: Some(raw),
                ..Default::default()
            }
            .into_filter()
            .unwrap_err();
            assert!(matches!(err, PaymentError::InvalidQuery(_)), "{raw}");
        }
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let err = PaymentQuery {
            status: Some("Pending"),
            ..Default::default()
        }
        .into_filter()
        .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidQuery(_)));
    }
}
