//! Simulator tuning: branch probabilities, step delays, and the pools a new
//! payment is drawn from.

use crate::error::{PaymentError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Half-open delay range `[min_ms, max_ms)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Period between lifecycle runs when `start` is called without one.
    pub default_interval_ms: u64,
    pub authorize_delay: DelayRange,
    pub authorize_probability: f64,
    pub capture_delay: DelayRange,
    pub capture_probability: f64,
    pub refund_delay_ms: u64,
    pub refund_probability: f64,
    pub merchant_ids: Vec<String>,
    pub currency: String,
    /// Inclusive.
    pub min_amount_cents: u64,
    /// Inclusive.
    pub max_amount_cents: u64,
    /// Messages buffered per live-feed subscriber before it starts missing events.
    pub subscriber_buffer: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: 1500,
            authorize_delay: DelayRange::new(300, 1300),
            authorize_probability: 0.90,
            capture_delay: DelayRange::new(500, 1500),
            capture_probability: 0.85,
            refund_delay_ms: 1000,
            refund_probability: 0.10,
            merchant_ids: (1..=5).map(|i| format!("merch_{i:02}")).collect(),
            currency: "USD".to_string(),
            min_amount_cents: 100,
            max_amount_cents: 10_099,
            subscriber_buffer: 256,
        }
    }
}

impl SimulatorConfig {
    /// Loads a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: SimulatorConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_interval(&self) -> Duration {
        Duration::from_millis(self.default_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, p) in [
            ("authorize_probability", self.authorize_probability),
            ("capture_probability", self.capture_probability),
            ("refund_probability", self.refund_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(PaymentError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {p}"
                )));
            }
        }
        for (name, range) in [
            ("authorize_delay", self.authorize_delay),
            ("capture_delay", self.capture_delay),
        ] {
            if range.min_ms > range.max_ms {
                return Err(PaymentError::InvalidConfig(format!(
                    "{name}.min_ms ({}) exceeds max_ms ({})",
                    range.min_ms, range.max_ms
                )));
            }
        }
        if self.default_interval_ms == 0 {
            return Err(PaymentError::InvalidConfig(
                "default_interval_ms must be positive".to_string(),
            ));
        }
        if self.merchant_ids.is_empty() {
            return Err(PaymentError::InvalidConfig(
                "merchant_ids must not be empty".to_string(),
            ));
        }
        if self.min_amount_cents > self.max_amount_cents {
            return Err(PaymentError::InvalidConfig(format!(
                "min_amount_cents ({}) exceeds max_amount_cents ({})",
                self.min_amount_cents, self.max_amount_cents
            )));
        }
        if self.subscriber_buffer == 0 {
            return Err(PaymentError::InvalidConfig(
                "subscriber_buffer must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
