//! Identifiers and time source shared by every crate of the engine.

pub mod clock;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use types::AggregateId;
