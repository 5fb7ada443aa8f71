//! Background upkeep of the index.

pub mod optimize;
