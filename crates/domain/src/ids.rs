//! Typed identifiers.
//!
//! Batches, orders and customers are streams and wrap a UUID; catalog
//! entities are owned by an external collaborator and keep its string keys.

use common::AggregateId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! stream_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// The event stream holding this entity.
            pub fn stream(&self) -> AggregateId {
                AggregateId::from_uuid(self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<AggregateId> for $name {
            fn from(id: AggregateId) -> Self {
                Self(id.as_uuid())
            }
        }

        impl From<$name> for AggregateId {
            fn from(id: $name) -> Self {
                id.stream()
            }
        }
    };
}

macro_rules! key_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

stream_id!(
    /// Internal identifier of a stock batch.
    BatchId
);
stream_id!(OrderId);
stream_id!(CustomerId);

key_id!(
    /// Catalog key of a product.
    ProductId
);
key_id!(CategoryId);
key_id!(DiscountId);
