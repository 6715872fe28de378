//! Shared kernel of the reconciliation engine.
//!
//! - [`Aggregate`] / [`DomainEvent`] for event-sourced entities
//! - [`CommandHandler`] and [`UnitOfWork`] for staging and committing events
//! - [`retry_on_conflict`] for optimistic-concurrency retries
//! - [`Money`] and [`Percentage`] for integer-exact pricing
//! - the [`DomainError`] taxonomy, [`EngineConfig`] and tracing setup

pub mod aggregate;
pub mod command;
pub mod config;
pub mod error;
pub mod ids;
pub mod money;
pub mod retry;
pub mod telemetry;
pub mod unit_of_work;

pub use aggregate::{Aggregate, DomainEvent, SnapshotCapable};
pub use command::{CommandHandler, CommandResult, Staged};
pub use config::{EngineConfig, LogFormat, TransitionPolicy};
pub use error::DomainError;
pub use ids::{BatchId, CategoryId, CustomerId, DiscountId, OrderId, ProductId};
pub use money::{Money, Percentage};
pub use retry::{RetryPolicy, retry_on_conflict};
pub use unit_of_work::UnitOfWork;
