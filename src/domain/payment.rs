use crate::domain::event::EventType;
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque payment identifier, generated at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub Uuid);

impl PaymentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PaymentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Where a payment sits in its lifecycle.
///
/// `Created → Authorized → Captured → Refunded`, with `Failed` reachable from
/// `Created` and `Authorized`. `Failed` and `Refunded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PaymentStatus {
    Created,
    Authorized,
    Captured,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 5] = [
        PaymentStatus::Created,
        PaymentStatus::Authorized,
        PaymentStatus::Captured,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
    ];

    /// Whether an event of type `event` may be applied to a payment in this status.
    ///
    /// The initial `Created` event is not covered here: it is only valid for a
    /// payment with no events yet, which the store checks.
    pub fn permits(self, event: EventType) -> bool {
        use EventType as E;
        use PaymentStatus as S;
        matches!(
            (self, event),
            (S::Created, E::Authorized)
                | (S::Created, E::Failed)
                | (S::Authorized, E::Captured)
                | (S::Authorized, E::Failed)
                | (S::Captured, E::Refunded)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Created => "Created",
            PaymentStatus::Authorized => "Authorized",
            PaymentStatus::Captured => "Captured",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Refunded => "Refunded",
        }
    }
}

impl From<EventType> for PaymentStatus {
    fn from(event: EventType) -> Self {
        match event {
            EventType::Created => PaymentStatus::Created,
            EventType::Authorized => PaymentStatus::Authorized,
            EventType::Captured => PaymentStatus::Captured,
            EventType::Failed => PaymentStatus::Failed,
            EventType::Refunded => PaymentStatus::Refunded,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PaymentError::InvalidQuery(format!("unknown payment status '{s}'")))
    }
}

/// A payment and its current-status projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: PaymentId,
    /// Amount in minor currency units.
    pub amount_cents: u64,
    pub currency: String,
    pub merchant_id: String,
    /// Status of the most recently applied event.
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The immutable attributes of a payment about to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub amount_cents: u64,
    pub currency: String,
    pub merchant_id: String,
}

impl NewPayment {
    pub fn new(amount_cents: u64, currency: impl Into<String>, merchant_id: impl Into<String>) -> Self {
        Self {
            amount_cents,
            currency: currency.into(),
            merchant_id: merchant_id.into(),
        }
    }

    pub fn into_payment(self, id: PaymentId, at: DateTime<Utc>) -> Payment {
        Payment {
            id,
            amount_cents: self.amount_cents,
            currency: self.currency,
            merchant_id: self.merchant_id,
            status: PaymentStatus::Created,
            created_at: at,
            updated_at: at,
        }
    }
}
