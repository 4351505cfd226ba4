use super::event::{EventKind, EventType, PaymentEvent};
use super::payment::{NewPayment, Payment, PaymentId, PaymentStatus};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Durable event log plus the per-payment current-status projection.
///
/// Implementations must apply an appended event and its status update as one
/// atomic step, so a concurrent reader never sees one without the other.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn create_payment(&self, payment: NewPayment) -> Result<Payment>;

    /// Appends an event and moves the payment to the matching status.
    ///
    /// Fails with `InvalidTransition` when the event does not follow the
    /// payment's current status, and `PaymentNotFound` for unknown ids.
    async fn append_event(&self, payment_id: PaymentId, kind: EventKind) -> Result<PaymentEvent>;

    async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>>;

    /// Payments matching `filter`, newest first.
    async fn find_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>>;

    /// Events matching `filter`, oldest first.
    async fn find_events(&self, filter: &EventFilter) -> Result<Vec<PaymentEvent>>;

    /// Every event of one payment, in append order.
    async fn events_for_payment(&self, payment_id: PaymentId) -> Result<Vec<PaymentEvent>>;

    /// Stores an externally seeded payment as-is, without events.
    async fn import_payment(&self, payment: Payment) -> Result<()>;
}

pub type EventStoreBox = Arc<dyn EventStore>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentFilter {
    pub status: Option<PaymentStatus>,
    pub merchant_id: Option<String>,
    pub min_amount: Option<u64>,
    pub max_amount: Option<u64>,
    /// Inclusive lower bound on creation time.
    pub created_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on creation time.
    pub created_to: Option<DateTime<Utc>>,
}

impl PaymentFilter {
    pub fn created_between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            created_from: Some(from),
            created_to: Some(to),
            ..Self::default()
        }
    }

    pub fn matches(&self, payment: &Payment) -> bool {
        self.status.is_none_or(|s| payment.status == s)
            && self
                .merchant_id
                .as_deref()
                .is_none_or(|m| payment.merchant_id == m)
            && self.min_amount.is_none_or(|min| payment.amount_cents >= min)
            && self.max_amount.is_none_or(|max| payment.amount_cents <= max)
            && self.created_from.is_none_or(|from| payment.created_at >= from)
            && self.created_to.is_none_or(|to| payment.created_at <= to)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventFilter {
    pub event_type: Option<EventType>,
    /// Inclusive.
    pub from: DateTime<Utc>,
    /// Inclusive.
    pub to: DateTime<Utc>,
}

impl EventFilter {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            event_type: None,
            from,
            to,
        }
    }

    pub fn of_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn matches(&self, event: &PaymentEvent) -> bool {
        self.event_type.is_none_or(|t| event.event_type() == t)
            && event.created_at >= self.from
            && event.created_at <= self.to
    }
}

/// Checks `kind` against the transition graph for a payment currently in
/// `status` that has `prior_events` recorded events.
pub fn check_transition(
    payment_id: PaymentId,
    status: PaymentStatus,
    prior_events: usize,
    kind: &EventKind,
) -> Result<()> {
    let event = kind.event_type();
    let allowed = if prior_events == 0 {
        event == EventType::Created
    } else {
        status.permits(event)
    };
    if allowed {
        Ok(())
    } else {
        Err(PaymentError::InvalidTransition {
            payment_id,
            from: status,
            event,
        })
    }
}

/// Timestamp for the next event of a payment: `now`, nudged 1ms past the
/// payment's previous event when the clock has not moved forward.
pub fn next_event_time(now: DateTime<Utc>, previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match previous {
        Some(prev) if now <= prev => prev + Duration::milliseconds(1),
        _ => now,
    }
}
