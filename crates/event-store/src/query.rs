use std::collections::BTreeMap;

use crate::{AggregateId, EventEnvelope, Version};

/// Filter over stored events. Every set criterion must match.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub aggregate_id: Option<AggregateId>,
    pub aggregate_type: Option<String>,

    /// Any of these event types.
    pub event_types: Option<Vec<String>>,

    /// Exact matches on envelope tags.
    pub tags: BTreeMap<String, String>,

    pub from_version: Option<Version>,
    pub to_version: Option<Version>,
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types
            .get_or_insert_with(Vec::new)
            .push(event_type.into());
        self
    }

    /// Requires the envelope tag `key` to equal `value`.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn from_version(mut self, version: Version) -> Self {
        self.from_version = Some(version);
        self
    }

    pub fn to_version(mut self, version: Version) -> Self {
        self.to_version = Some(version);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Evaluates every criterion except `limit` against one envelope.
    pub fn matches(&self, event: &EventEnvelope) -> bool {
        if let Some(id) = self.aggregate_id
            && event.aggregate_id != id
        {
            return false;
        }
        if let Some(ref aggregate_type) = self.aggregate_type
            && &event.aggregate_type != aggregate_type
        {
            return false;
        }
        if let Some(ref types) = self.event_types
            && !types.contains(&event.event_type)
        {
            return false;
        }
        if let Some(from) = self.from_version
            && event.version < from
        {
            return false;
        }
        if let Some(to) = self.to_version
            && event.version > to
        {
            return false;
        }
        self.tags
            .iter()
            .all(|(key, value)| event.tag(key) == Some(value.as_str()))
    }
}
