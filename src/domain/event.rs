use crate::domain::payment::PaymentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of an appended lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    Created,
    Authorized,
    Captured,
    Failed,
    Refunded,
}

/// Why a payment failed.
///
/// Reasons outside the known set are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FailureReason {
    InvalidMerchant,
    DoNotHonor,
    InsufficientFunds,
    FraudSuspected,
    Other(String),
}

impl FailureReason {
    /// Reasons an issuer may give when declining an authorized payment.
    pub const DECLINES: [FailureReason; 3] = [
        FailureReason::DoNotHonor,
        FailureReason::InsufficientFunds,
        FailureReason::FraudSuspected,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            FailureReason::InvalidMerchant => "InvalidMerchant",
            FailureReason::DoNotHonor => "DoNotHonor",
            FailureReason::InsufficientFunds => "InsufficientFunds",
            FailureReason::FraudSuspected => "FraudSuspected",
            FailureReason::Other(reason) => reason,
        }
    }
}

impl From<String> for FailureReason {
    fn from(value: String) -> Self {
        match value.as_str() {
            "InvalidMerchant" => FailureReason::InvalidMerchant,
            "DoNotHonor" => FailureReason::DoNotHonor,
            "InsufficientFunds" => FailureReason::InsufficientFunds,
            "FraudSuspected" => FailureReason::FraudSuspected,
            _ => FailureReason::Other(value),
        }
    }
}

impl From<FailureReason> for String {
    fn from(value: FailureReason) -> Self {
        match value {
            FailureReason::Other(reason) => reason,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to a payment. Only `Failed` carries metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Authorized,
    Captured,
    Failed { reason: Option<FailureReason> },
    Refunded,
}

impl EventKind {
    pub fn failed(reason: FailureReason) -> Self {
        EventKind::Failed {
            reason: Some(reason),
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::Created => EventType::Created,
            EventKind::Authorized => EventType::Authorized,
            EventKind::Captured => EventType::Captured,
            EventKind::Failed { .. } => EventType::Failed,
            EventKind::Refunded => EventType::Refunded,
        }
    }

    /// Rebuilds a kind from its wire parts.
    ///
    /// Metadata that is missing, not an object, or lacks a string `reason`
    /// yields a `Failed` event without a reason. Metadata stored as a JSON
    /// string is parsed first.
    pub fn from_parts(event_type: EventType, metadata: Option<&Value>) -> Self {
        match event_type {
            EventType::Created => EventKind::Created,
            EventType::Authorized => EventKind::Authorized,
            EventType::Captured => EventKind::Captured,
            EventType::Refunded => EventKind::Refunded,
            EventType::Failed => EventKind::Failed {
                reason: metadata.and_then(reason_from_metadata),
            },
        }
    }

    pub fn metadata(&self) -> Option<Value> {
        match self {
            EventKind::Failed {
                reason: Some(reason),
            } => Some(json!({ "reason": reason.as_str() })),
            _ => None,
        }
    }
}

fn reason_from_metadata(metadata: &Value) -> Option<FailureReason> {
    match metadata {
        Value::String(raw) => serde_json::from_str::<Value>(raw)
            .ok()
            .as_ref()
            .and_then(reason_from_metadata),
        Value::Object(fields) => fields
            .get("reason")
            .and_then(Value::as_str)
            .filter(|reason| !reason.is_empty())
            .map(|reason| FailureReason::from(reason.to_string())),
        _ => None,
    }
}

/// An immutable lifecycle event, as appended to the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "EventRecord", into = "EventRecord")]
pub struct PaymentEvent {
    pub id: EventId,
    pub payment_id: PaymentId,
    pub kind: EventKind,
    pub created_at: DateTime<Utc>,
}

impl PaymentEvent {
    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    /// The failure reason, or `None` for non-failure events and failures
    /// recorded without one.
    pub fn failure_reason(&self) -> Option<&FailureReason> {
        match &self.kind {
            EventKind::Failed { reason } => reason.as_ref(),
            _ => None,
        }
    }
}

/// Wire shape: `{id, paymentId, type, metadata?, createdAt}`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventRecord {
    id: EventId,
    payment_id: PaymentId,
    #[serde(rename = "type")]
    event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Value>,
    created_at: DateTime<Utc>,
}

impl From<EventRecord> for PaymentEvent {
    fn from(record: EventRecord) -> Self {
        Self {
            id: record.id,
            payment_id: record.payment_id,
            kind: EventKind::from_parts(record.event_type, record.metadata.as_ref()),
            created_at: record.created_at,
        }
    }
}

impl From<PaymentEvent> for EventRecord {
    fn from(event: PaymentEvent) -> Self {
        Self {
            id: event.id,
            payment_id: event.payment_id,
            event_type: event.kind.event_type(),
            metadata: event.kind.metadata(),
            created_at: event.created_at,
        }
    }
}
