use crate::domain::event::EventType;
use crate::domain::payment::{PaymentId, PaymentStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Payment {0} not found")]
    PaymentNotFound(PaymentId),
    #[error("Invalid transition for payment {payment_id}: {event:?} cannot follow {from:?}")]
    InvalidTransition {
        payment_id: PaymentId,
        from: PaymentStatus,
        event: EventType,
    },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, PaymentError>;
