//! Payments, lifecycle events, and the store port they are persisted through.

pub mod event;
pub mod payment;
pub mod ports;
