use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};

use crate::{AggregateId, Version};

/// Serialized state of a stream at a given version.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Version of the last event folded into `state`.
    pub version: Version,

    pub taken_at: DateTime<Utc>,
    pub state: serde_json::Value,
}

impl Snapshot {
    /// Captures `state` as the snapshot of a stream at `version`.
    pub fn capture<T: Serialize>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        version: Version,
        state: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            version,
            taken_at: Utc::now(),
            state: serde_json::to_value(state)?,
        })
    }

    /// Deserializes the captured state.
    pub fn restore<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.state)
    }
}
