//! One simulated payment, driven from creation to its final status.
//!
//! The state machine is [`plan_next`]: given the current status it decides how
//! long to wait and which event comes next. [`LifecycleSimulator`] creates the
//! payment, then loops over `plan_next`, sleeping between steps.

use crate::application::broadcast::Broadcaster;
use crate::config::SimulatorConfig;
use crate::domain::event::{EventKind, FailureReason};
use crate::domain::payment::{NewPayment, PaymentId, PaymentStatus};
use crate::domain::ports::EventStoreBox;
use crate::error::{PaymentError, Result};
use crate::rng::{RandomSource, pick};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStep {
    pub delay: Duration,
    pub kind: EventKind,
}

/// Decides the next transition for a payment in `status`, or `None` when the
/// run is over.
pub fn plan_next(
    status: PaymentStatus,
    rng: &dyn RandomSource,
    config: &SimulatorConfig,
) -> Option<PlannedStep> {
    match status {
        PaymentStatus::Created => {
            let delay = rng.uniform_ms(config.authorize_delay.min_ms, config.authorize_delay.max_ms);
            let kind = if rng.chance(config.authorize_probability) {
                EventKind::Authorized
            } else {
                EventKind::failed(FailureReason::InvalidMerchant)
            };
            Some(PlannedStep { delay, kind })
        }
        PaymentStatus::Authorized => {
            let delay = rng.uniform_ms(config.capture_delay.min_ms, config.capture_delay.max_ms);
            let kind = if rng.chance(config.capture_probability) {
                EventKind::Captured
            } else {
                let reason = pick(rng, &FailureReason::DECLINES)
                    .cloned()
                    .unwrap_or(FailureReason::DoNotHonor);
                EventKind::failed(reason)
            };
            Some(PlannedStep { delay, kind })
        }
        PaymentStatus::Captured => rng.chance(config.refund_probability).then(|| PlannedStep {
            delay: Duration::from_millis(config.refund_delay_ms),
            kind: EventKind::Refunded,
        }),
        PaymentStatus::Failed | PaymentStatus::Refunded => None,
    }
}

/// Runs payment lifecycles against a store, publishing every appended event.
pub struct LifecycleSimulator {
    store: EventStoreBox,
    broadcaster: Arc<Broadcaster>,
    rng: Arc<dyn RandomSource>,
    config: Arc<SimulatorConfig>,
}

impl LifecycleSimulator {
    pub fn new(
        store: EventStoreBox,
        broadcaster: Arc<Broadcaster>,
        rng: Arc<dyn RandomSource>,
        config: Arc<SimulatorConfig>,
    ) -> Self {
        Self {
            store,
            broadcaster,
            rng,
            config,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Simulates one payment end to end and returns its id.
    ///
    /// A store error ends this run where it happened. Events already appended
    /// stay appended.
    pub async fn run_lifecycle(&self) -> Result<PaymentId> {
        let payment = self.store.create_payment(self.draw_payment()?).await?;
        let payment_id = payment.id;
        tracing::debug!(%payment_id, amount_cents = payment.amount_cents, "lifecycle started");

        let mut status = self.emit(payment_id, EventKind::Created).await?;
        loop {
            let Some(step) = plan_next(status, self.rng.as_ref(), &self.config) else {
                break;
            };
            tokio::time::sleep(step.delay).await;
            status = self.emit(payment_id, step.kind).await?;
        }

        tracing::debug!(%payment_id, %status, "lifecycle finished");
        Ok(payment_id)
    }

    fn draw_payment(&self) -> Result<NewPayment> {
        let merchant_id = pick(self.rng.as_ref(), &self.config.merchant_ids)
            .cloned()
            .ok_or_else(|| PaymentError::InvalidConfig("merchant_ids must not be empty".to_string()))?;
        let amount_cents = self
            .rng
            .between(self.config.min_amount_cents, self.config.max_amount_cents);
        Ok(NewPayment::new(amount_cents, self.config.currency.clone(), merchant_id))
    }

    /// Appends first, then publishes. Publishing cannot fail.
    async fn emit(&self, payment_id: PaymentId, kind: EventKind) -> Result<PaymentStatus> {
        let event = self.store.append_event(payment_id, kind).await?;
        self.broadcaster.publish(&event);
        Ok(event.event_type().into())
    }
}
