//! Read-only aggregates over a `[from, to]` window, both ends inclusive.

use crate::domain::event::EventType;
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{EventFilter, EventStoreBox, PaymentFilter};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

const UNKNOWN_REASON: &str = "Unknown";

/// Upper bound on the buckets a single timeseries query may produce.
pub const MAX_TIMESERIES_BUCKETS: i64 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total_payments: u64,
    pub total_amount_cents: u64,
    pub captured_count: u64,
    pub failed_count: u64,
    pub refunded_count: u64,
    /// `captured / (captured + failed)`, 0 when neither occurred.
    pub success_rate: f64,
    pub avg_amount_cents: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeseriesBucket {
    pub bucket_start: DateTime<Utc>,
    pub payments_created: u64,
    pub captured: u64,
    pub failed: u64,
    pub refunded: u64,
    pub amount_captured_cents: u64,
}

impl TimeseriesBucket {
    fn empty(bucket_start: DateTime<Utc>) -> Self {
        Self {
            bucket_start,
            payments_created: 0,
            captured: 0,
            failed: 0,
            refunded: 0,
            amount_captured_cents: 0,
        }
    }

    fn add(&mut self, payment: &Payment) {
        self.payments_created += 1;
        match payment.status {
            PaymentStatus::Captured => {
                self.captured += 1;
                self.amount_captured_cents += payment.amount_cents;
            }
            PaymentStatus::Failed => self.failed += 1,
            PaymentStatus::Refunded => self.refunded += 1,
            PaymentStatus::Created | PaymentStatus::Authorized => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReasonCount {
    pub reason: String,
    pub count: u64,
}

/// Width of a timeseries bucket. Buckets start on UTC hour/day boundaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    #[default]
    Day,
}

impl Granularity {
    fn seconds(self) -> i64 {
        match self {
            Granularity::Hour => 3_600,
            Granularity::Day => 86_400,
        }
    }

    pub fn step(self) -> Duration {
        Duration::seconds(self.seconds())
    }

    /// Start of the bucket containing `at`.
    pub fn floor(self, at: DateTime<Utc>) -> DateTime<Utc> {
        let secs = at.timestamp();
        DateTime::from_timestamp(secs - secs.rem_euclid(self.seconds()), 0).unwrap_or(at)
    }

    /// Number of buckets from `floor(from)` through `floor(to)`, 0 when `from > to`.
    pub fn bucket_count(self, from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
        if from > to {
            return 0;
        }
        (self.floor(to) - self.floor(from)).num_seconds() / self.seconds() + 1
    }

    pub fn check_span(self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<()> {
        let buckets = self.bucket_count(from, to);
        if buckets > MAX_TIMESERIES_BUCKETS {
            return Err(PaymentError::InvalidQuery(format!(
                "window spans {buckets} {self} buckets, at most {MAX_TIMESERIES_BUCKETS} allowed"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
        })
    }
}

impl FromStr for Granularity {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" => Ok(Granularity::Hour),
            "day" => Ok(Granularity::Day),
            other => Err(PaymentError::InvalidQuery(format!(
                "bucket must be \"hour\" or \"day\", got {other:?}"
            ))),
        }
    }
}

/// Computes dashboard aggregates straight from the store on every call.
#[derive(Clone)]
pub struct MetricsEngine {
    store: EventStoreBox,
}

impl MetricsEngine {
    pub fn new(store: EventStoreBox) -> Self {
        Self { store }
    }

    pub async fn summary(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<MetricsSummary> {
        let payments = self.payments_in(from, to).await?;

        let total_payments = payments.len() as u64;
        let total_amount_cents: u64 = payments.iter().map(|p| p.amount_cents).sum();
        let count = |status| payments.iter().filter(|p| p.status == status).count() as u64;
        let captured_count = count(PaymentStatus::Captured);
        let failed_count = count(PaymentStatus::Failed);
        let refunded_count = count(PaymentStatus::Refunded);

        let decided = captured_count + failed_count;
        let success_rate = if decided > 0 {
            captured_count as f64 / decided as f64
        } else {
            0.0
        };
        let avg_amount_cents = if total_payments > 0 {
            total_amount_cents as f64 / total_payments as f64
        } else {
            0.0
        };

        Ok(MetricsSummary {
            from,
            to,
            total_payments,
            total_amount_cents,
            captured_count,
            failed_count,
            refunded_count,
            success_rate,
            avg_amount_cents,
        })
    }

    /// One bucket per step from `floor(from)` through `floor(to)`, empty ones
    /// included, ascending.
    pub async fn timeseries(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        granularity: Granularity,
    ) -> Result<Vec<TimeseriesBucket>> {
        if from > to {
            return Ok(Vec::new());
        }
        granularity.check_span(from, to)?;

        let mut buckets = BTreeMap::new();
        let last = granularity.floor(to);
        let mut start = granularity.floor(from);
        while start <= last {
            buckets.insert(start, TimeseriesBucket::empty(start));
            start += granularity.step();
        }

        for payment in self.payments_in(from, to).await? {
            let start = granularity.floor(payment.created_at);
            buckets
                .entry(start)
                .or_insert_with(|| TimeseriesBucket::empty(start))
                .add(&payment);
        }

        Ok(buckets.into_values().collect())
    }

    /// `Failed` events in the window grouped by reason, most frequent first.
    pub async fn failure_reasons(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<FailureReasonCount>> {
        let events = self
            .store
            .find_events(&EventFilter::new(from, to).of_type(EventType::Failed))
            .await?;

        let mut counts: HashMap<String, u64> = HashMap::new();
        for event in &events {
            let reason = event
                .failure_reason()
                .map_or(UNKNOWN_REASON, |r| r.as_str());
            *counts.entry(reason.to_string()).or_default() += 1;
        }

        let mut reasons: Vec<FailureReasonCount> = counts
            .into_iter()
            .map(|(reason, count)| FailureReasonCount { reason, count })
            .collect();
        reasons.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.reason.cmp(&b.reason)));
        Ok(reasons)
    }

    async fn payments_in(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Payment>> {
        if from > to {
            return Ok(Vec::new());
        }
        self.store
            .find_payments(&PaymentFilter::created_between(from, to))
            .await
    }
}
