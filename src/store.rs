//! The durable operation log and its record format.

pub mod log;
pub mod record;
