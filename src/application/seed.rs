//! Bulk demo data for dashboards: payments with random statuses spread over
//! the last 30 days, imported without event history.

use crate::clock::Clock;
use crate::config::SimulatorConfig;
use crate::domain::payment::{NewPayment, Payment, PaymentId, PaymentStatus};
use crate::domain::ports::EventStoreBox;
use crate::error::{PaymentError, Result};
use crate::rng::{RandomSource, pick};
use chrono::Duration;

pub const SEED_CURRENCIES: [&str; 3] = ["USD", "EUR", "GBP"];

const SEED_SPAN_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Draws `count` payments and imports them into `store`.
pub async fn seed_payments(
    store: &EventStoreBox,
    rng: &dyn RandomSource,
    clock: &dyn Clock,
    config: &SimulatorConfig,
    count: usize,
) -> Result<Vec<Payment>> {
    let now = clock.now();
    let mut seeded = Vec::with_capacity(count);
    for _ in 0..count {
        let status = pick(rng, &PaymentStatus::ALL)
            .copied()
            .unwrap_or(PaymentStatus::Created);
        let currency = pick(rng, &SEED_CURRENCIES).copied().unwrap_or("USD");
        let merchant_id = pick(rng, &config.merchant_ids)
            .cloned()
            .ok_or_else(|| PaymentError::InvalidConfig("merchant_ids must not be empty".to_string()))?;
        let amount_cents = rng.between(config.min_amount_cents, config.max_amount_cents);
        let age = Duration::milliseconds(rng.between(0, SEED_SPAN_MS - 1) as i64);

        let payment = Payment {
            status,
            ..NewPayment::new(amount_cents, currency, merchant_id).into_payment(PaymentId::new(), now - age)
        };
        store.import_payment(payment.clone()).await?;
        seeded.push(payment);
    }
    tracing::info!(count, "seeded payments");
    Ok(seeded)
}
