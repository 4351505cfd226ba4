//! Simulation and read-side services built on the [`EventStore`] port.
//!
//! The [`driver::SimulatorDriver`] ticks on an interval and spawns one
//! [`lifecycle::LifecycleSimulator`] run per tick. Every appended event is
//! fanned out through the [`broadcast::Broadcaster`]. [`metrics::MetricsEngine`]
//! reads the same store for dashboards.
//!
//! [`EventStore`]: crate::domain::ports::EventStore

pub mod broadcast;
pub mod driver;
pub mod lifecycle;
pub mod metrics;
pub mod seed;
