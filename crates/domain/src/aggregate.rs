//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// A fact recorded in a stream. Named in the past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Name stored alongside the payload.
    fn event_type(&self) -> &'static str;

    /// Indexed fields for query-by-field lookups.
    fn tags(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

/// An event-sourced consistency boundary.
///
/// State is rebuilt by folding events through [`Aggregate::apply`]; command
/// methods on the implementing type decide which events to emit and never
/// mutate state themselves.
pub trait Aggregate: Default + Clone + Send + Sync + Sized {
    type Event: DomainEvent;
    type Error: std::error::Error + Send + Sync;

    fn aggregate_type() -> &'static str;

    /// `None` until the creating event has been applied.
    fn id(&self) -> Option<AggregateId>;

    fn version(&self) -> Version;

    fn set_version(&mut self, version: Version);

    /// Folds one event into the state. Must be deterministic and infallible.
    fn apply(&mut self, event: Self::Event);

    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}

/// Aggregates whose state can be stored as a snapshot.
pub trait SnapshotCapable: Aggregate + Serialize + DeserializeOwned {
    /// Events between snapshots.
    fn snapshot_interval() -> usize {
        100
    }

    fn should_snapshot(&self) -> bool {
        self.version().as_i64() > 0
            && (self.version().as_i64() as usize).is_multiple_of(Self::snapshot_interval())
    }
}
