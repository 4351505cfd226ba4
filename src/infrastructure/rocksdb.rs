use crate::clock::{Clock, SystemClock};
use crate::domain::event::{EventId, EventKind, PaymentEvent};
use crate::domain::payment::{NewPayment, Payment, PaymentId};
use crate::domain::ports::{
    EventFilter, EventStore, PaymentFilter, check_transition, next_event_time,
};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for payment records, keyed by payment id.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for the time-ordered event log, keyed by creation time then event id.
pub const CF_EVENTS: &str = "events";

const TIME_KEY_LEN: usize = 8;

/// A payment together with its full event history, so the status projection
/// and the events it derives from never disagree.
#[derive(Debug, Serialize, Deserialize)]
struct PaymentRecord {
    payment: Payment,
    events: Vec<PaymentEvent>,
}

/// A persistent event store using RocksDB.
///
/// Appends are serialized by a mutex. Each append rewrites the payment record
/// and adds the event to `CF_EVENTS` in one `WriteBatch`. Keys in `CF_EVENTS`
/// sort by creation time so window scans are range reads.
///
/// `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDbEventStore {
    db: Arc<DB>,
    clock: Arc<dyn Clock>,
    append_lock: Arc<Mutex<()>>,
}

impl RocksDbEventStore {
    /// Opens or creates a database at `path` with both column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    pub fn open_with_clock<P: AsRef<Path>>(path: P, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_payments = ColumnFamilyDescriptor::new(CF_PAYMENTS, Options::default());
        let cf_events = ColumnFamilyDescriptor::new(CF_EVENTS, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_payments, cf_events])?;
        tracing::debug!("opened rocksdb event store");

        Ok(Self {
            db: Arc::new(db),
            clock,
            append_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PaymentError::InternalError(format!("column family '{name}' not found")))
    }

    fn read_record(&self, payment_id: PaymentId) -> Result<Option<PaymentRecord>> {
        let cf = self.cf(CF_PAYMENTS)?;
        match self.db.get_pinned_cf(cf, payment_id.0.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_record(&self, record: &PaymentRecord) -> Result<()> {
        let cf = self.cf(CF_PAYMENTS)?;
        self.db
            .put_cf(cf, record.payment.id.0.as_bytes(), serde_json::to_vec(record)?)?;
        Ok(())
    }

    /// Writes the updated record and the new event's index entry atomically.
    fn write_append(&self, record: &PaymentRecord, event: &PaymentEvent) -> Result<()> {
        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(CF_PAYMENTS)?,
            record.payment.id.0.as_bytes(),
            serde_json::to_vec(record)?,
        );
        batch.put_cf(self.cf(CF_EVENTS)?, event_key(event)?, serde_json::to_vec(event)?);
        self.db.write(batch)?;
        Ok(())
    }
}

/// Big-endian nanoseconds with the sign bit flipped, so byte order is time order.
fn time_key(at: DateTime<Utc>) -> Result<[u8; TIME_KEY_LEN]> {
    let nanos = at
        .timestamp_nanos_opt()
        .ok_or_else(|| PaymentError::InternalError(format!("timestamp {at} out of range")))?;
    Ok(encode_nanos(nanos))
}

/// Like `time_key`, but saturates instants outside the nanosecond range to
/// the smallest or largest key. Only used for scan bounds.
fn scan_bound(at: DateTime<Utc>) -> [u8; TIME_KEY_LEN] {
    match at.timestamp_nanos_opt() {
        Some(nanos) => encode_nanos(nanos),
        None if at.timestamp() < 0 => [0x00; TIME_KEY_LEN],
        None => [0xFF; TIME_KEY_LEN],
    }
}

fn encode_nanos(nanos: i64) -> [u8; TIME_KEY_LEN] {
    ((nanos as u64) ^ (1 << 63)).to_be_bytes()
}

fn event_key(event: &PaymentEvent) -> Result<Vec<u8>> {
    let mut key = time_key(event.created_at)?.to_vec();
    key.extend_from_slice(event.id.0.as_bytes());
    Ok(key)
}

#[async_trait]
impl EventStore for RocksDbEventStore {
    async fn create_payment(&self, payment: NewPayment) -> Result<Payment> {
        let payment = payment.into_payment(PaymentId::new(), self.clock.now());
        self.write_record(&PaymentRecord {
            payment: payment.clone(),
            events: Vec::new(),
        })?;
        Ok(payment)
    }

    async fn append_event(&self, payment_id: PaymentId, kind: EventKind) -> Result<PaymentEvent> {
        let _guard = self.append_lock.lock().await;

        let mut record = self
            .read_record(payment_id)?
            .ok_or(PaymentError::PaymentNotFound(payment_id))?;
        check_transition(payment_id, record.payment.status, record.events.len(), &kind)?;

        let previous = record.events.last().map(|e| e.created_at);
        let event = PaymentEvent {
            id: EventId::new(),
            payment_id,
            kind,
            created_at: next_event_time(self.clock.now(), previous),
        };
        record.payment.status = event.event_type().into();
        record.payment.updated_at = event.created_at;
        record.events.push(event.clone());

        self.write_append(&record, &event)?;
        Ok(event)
    }

    async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.read_record(payment_id)?.map(|record| record.payment))
    }

    async fn find_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>> {
        let cf = self.cf(CF_PAYMENTS)?;
        let mut payments = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let record: PaymentRecord = serde_json::from_slice(&value)?;
            if filter.matches(&record.payment) {
                payments.push(record.payment);
            }
        }
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    async fn find_events(&self, filter: &EventFilter) -> Result<Vec<PaymentEvent>> {
        if filter.from > filter.to {
            return Ok(Vec::new());
        }
        let cf = self.cf(CF_EVENTS)?;
        let start = scan_bound(filter.from);
        let end = scan_bound(filter.to);

        let mut events = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&start, Direction::Forward))
        {
            let (key, value) = item?;
            if key[..TIME_KEY_LEN] > end[..] {
                break;
            }
            let event: PaymentEvent = serde_json::from_slice(&value)?;
            if filter.matches(&event) {
                events.push(event);
            }
        }
        Ok(events)
    }

    async fn events_for_payment(&self, payment_id: PaymentId) -> Result<Vec<PaymentEvent>> {
        Ok(self
            .read_record(payment_id)?
            .map(|record| record.events)
            .unwrap_or_default())
    }

    /// Replaces any existing record for the same id, history included.
    async fn import_payment(&self, payment: Payment) -> Result<()> {
        self.write_record(&PaymentRecord {
            payment,
            events: Vec::new(),
        })
    }
}
