use crate::domain::payment::{Payment, PaymentId, PaymentStatus};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::Read;

/// One CSV row. `id` and `updatedAt` may be left out of hand-written files.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentRow {
    #[serde(default)]
    id: Option<PaymentId>,
    amount_cents: u64,
    currency: String,
    merchant_id: String,
    status: PaymentStatus,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Payment {
            id: row.id.unwrap_or_default(),
            amount_cents: row.amount_cents,
            currency: row.currency,
            merchant_id: row.merchant_id,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at.unwrap_or(row.created_at),
        }
    }
}

/// Reads payments from a CSV source with a camelCase header row.
///
/// Whitespace around fields is trimmed. Rows are deserialized lazily, so a
/// malformed row yields an error without ending the stream.
pub struct PaymentReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> PaymentReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn payments(self) -> impl Iterator<Item = Result<Payment>> {
        self.reader
            .into_deserialize::<PaymentRow>()
            .map(|result| result.map(Payment::from).map_err(PaymentError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_reader_fills_optional_columns() {
        let data = "amountCents, currency, merchantId, status, createdAt\n\
                    1250, USD, merch_02, Captured, 2024-03-01T10:15:00Z";
        let payments: Vec<Result<Payment>> = PaymentReader::new(data.as_bytes()).payments().collect();

        assert_eq!(payments.len(), 1);
        let payment = payments[0].as_ref().unwrap();
        assert_eq!(payment.amount_cents, 1250);
        assert_eq!(payment.merchant_id, "merch_02");
        assert_eq!(payment.status, PaymentStatus::Captured);
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap();
        assert_eq!(payment.created_at, created);
        assert_eq!(payment.updated_at, created);
    }

    #[test]
    fn test_reader_keeps_explicit_id() {
        let data = "id,amountCents,currency,merchantId,status,createdAt,updatedAt\n\
                    6f1c2b9e-3a57-4d2f-9a51-0f3c7f2b8e11,100,EUR,merch_01,Failed,2024-03-01T10:00:00Z,2024-03-01T10:00:02Z";
        let payment = PaymentReader::new(data.as_bytes())
            .payments()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(payment.id.to_string(), "6f1c2b9e-3a57-4d2f-9a51-0f3c7f2b8e11");
        assert_eq!(
            payment.updated_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 2).unwrap()
        );
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "amountCents,currency,merchantId,status,createdAt\n\
                    12.5,USD,merch_01,Captured,2024-03-01T10:00:00Z\n\
                    100,USD,merch_01,Pending,2024-03-01T10:00:00Z\n\
                    100,USD,merch_01,Created,2024-03-01T10:00:00Z";
        let results: Vec<Result<Payment>> = PaymentReader::new(data.as_bytes()).payments().collect();

        assert_eq!(results.len(), 3);
        assert!(matches!(results[0], Err(PaymentError::CsvError(_))));
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }
}
