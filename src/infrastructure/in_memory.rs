use crate::clock::{Clock, SystemClock};
use crate::domain::event::{EventId, EventKind, PaymentEvent};
use crate::domain::payment::{NewPayment, Payment, PaymentId};
use crate::domain::ports::{
    EventFilter, EventStore, PaymentFilter, check_transition, next_event_time,
};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    payments: HashMap<PaymentId, Payment>,
    /// Append-only log, in append order.
    events: Vec<PaymentEvent>,
    /// Indexes into `events` per payment.
    by_payment: HashMap<PaymentId, Vec<usize>>,
}

/// A thread-safe in-memory event store.
///
/// Payments, the event log and the per-payment index all live behind one
/// `RwLock`, so an append and its status update are observed together.
/// `Clone` shares the underlying state.
#[derive(Clone)]
pub struct InMemoryEventStore {
    state: Arc<RwLock<State>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventStore {
    /// Creates a new, empty store stamped by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            clock,
        }
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn create_payment(&self, payment: NewPayment) -> Result<Payment> {
        let payment = payment.into_payment(PaymentId::new(), self.clock.now());
        let mut state = self.state.write().await;
        state.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn append_event(&self, payment_id: PaymentId, kind: EventKind) -> Result<PaymentEvent> {
        let mut state = self.state.write().await;
        let State {
            payments,
            events,
            by_payment,
        } = &mut *state;

        let payment = payments
            .get_mut(&payment_id)
            .ok_or(PaymentError::PaymentNotFound(payment_id))?;
        let indexes = by_payment.entry(payment_id).or_default();
        check_transition(payment_id, payment.status, indexes.len(), &kind)?;

        let previous = indexes.last().map(|&i| events[i].created_at);
        let event = PaymentEvent {
            id: EventId::new(),
            payment_id,
            kind,
            created_at: next_event_time(self.clock.now(), previous),
        };

        payment.status = event.event_type().into();
        payment.updated_at = event.created_at;
        indexes.push(events.len());
        events.push(event.clone());
        Ok(event)
    }

    async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state.payments.get(&payment_id).cloned())
    }

    async fn find_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>> {
        let state = self.state.read().await;
        let mut payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    async fn find_events(&self, filter: &EventFilter) -> Result<Vec<PaymentEvent>> {
        let state = self.state.read().await;
        let mut events: Vec<PaymentEvent> = state
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.created_at);
        Ok(events)
    }

    async fn events_for_payment(&self, payment_id: PaymentId) -> Result<Vec<PaymentEvent>> {
        let state = self.state.read().await;
        Ok(state
            .by_payment
            .get(&payment_id)
            .map(|indexes| indexes.iter().map(|&i| state.events[i].clone()).collect())
            .unwrap_or_default())
    }

    async fn import_payment(&self, payment: Payment) -> Result<()> {
        let mut state = self.state.write().await;
        state.payments.insert(payment.id, payment);
        Ok(())
    }
}
