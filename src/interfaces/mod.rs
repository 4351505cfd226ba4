//! Adapters between the outside world and the core: CSV import/export and
//! query-parameter validation.

pub mod csv;
pub mod query;
