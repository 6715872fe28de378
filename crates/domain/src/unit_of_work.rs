//! Atomic multi-stream commits.

use event_store::{EventStore, Snapshot, StreamAppend, Version};

use crate::command::Staged;
use crate::error::DomainError;

/// Collects staged appends across aggregates and commits them together.
///
/// Every append carries the version its aggregate was read at, so the
/// commit succeeds only if none of the touched streams moved in between.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    appends: Vec<StreamAppend>,
    snapshots: Vec<Snapshot>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a staged append and hands back the post-commit state.
    pub fn push<A>(&mut self, staged: Staged<A>) -> A {
        self.appends.push(staged.append);
        self.snapshots.extend(staged.snapshot);
        staged.aggregate
    }

    /// Number of streams this unit will write.
    pub fn len(&self) -> usize {
        self.appends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appends.is_empty()
    }

    /// Writes every staged append in one store commit, then saves due
    /// snapshots. Snapshot failures are logged and do not fail the commit.
    pub async fn commit<S>(self, store: &S) -> Result<Vec<Version>, DomainError>
    where
        S: EventStore + ?Sized,
    {
        if self.appends.is_empty() {
            return Ok(Vec::new());
        }

        let versions = store.commit(self.appends).await?;

        for snapshot in self.snapshots {
            let aggregate_id = snapshot.aggregate_id;
            if let Err(e) = store.save_snapshot(snapshot).await {
                tracing::warn!(%aggregate_id, error = %e, "failed to save snapshot");
            }
        }

        Ok(versions)
    }
}
