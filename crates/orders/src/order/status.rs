//! Order and payment state machines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fulfilment status of an order.
///
/// ```text
/// Pending ──► PendingConfirmation ──► Confirmed ──► Delivered
///    │                │                   │
///    └────────────────┴───────────────────┴──► Cancelled | Refunded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    #[serde(alias = "placed")]
    Pending,
    PendingConfirmation,
    Confirmed,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Forward steps may skip `PendingConfirmation` but never `Confirmed`.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, PendingConfirmation | Confirmed | Cancelled | Refunded)
                | (PendingConfirmation, Confirmed | Cancelled | Refunded)
                | (Confirmed, Delivered | Cancelled | Refunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::PendingConfirmation => "pending_confirmation",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment status, advancing independently of [`OrderStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    PendingConfirmation,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, PendingConfirmation | Paid | Refunded)
                | (PendingConfirmation, Paid | Refunded)
                | (Paid, Refunded)
        )
    }

    /// Money has changed hands (or been returned); the invoice is fixed.
    pub fn is_settled(self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Refunded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::PendingConfirmation => "pending_confirmation",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange<S> {
    pub status: S,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Recorded outside the transition table by an operator.
    #[serde(default)]
    pub overridden: bool,
}

impl<S> StatusChange<S> {
    pub fn new(status: S, at: DateTime<Utc>) -> Self {
        Self {
            status,
            at,
            note: None,
            overridden: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_moves_forward_only() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(PendingConfirmation));
        assert!(PendingConfirmation.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Delivered));

        assert!(!Delivered.can_transition_to(Pending));
        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn alternate_terminals_only_from_open_states() {
        use OrderStatus::*;
        for open in [Pending, PendingConfirmation, Confirmed] {
            assert!(open.can_transition_to(Cancelled));
            assert!(open.can_transition_to(Refunded));
            assert!(!open.is_terminal());
        }
        for done in [Delivered, Cancelled, Refunded] {
            assert!(done.is_terminal());
            assert!(!done.can_transition_to(Cancelled));
            assert!(!done.can_transition_to(Refunded));
        }
    }

    #[test]
    fn payment_status_table() {
        use PaymentStatus::*;
        assert!(Pending.can_transition_to(PendingConfirmation));
        assert!(PendingConfirmation.can_transition_to(Paid));
        assert!(Paid.can_transition_to(Refunded));
        assert!(Pending.can_transition_to(Refunded));

        assert!(!Paid.can_transition_to(Pending));
        assert!(!Refunded.can_transition_to(Paid));
        assert!(Paid.is_settled());
        assert!(!PendingConfirmation.is_settled());
    }

    #[test]
    fn placed_is_accepted_as_pending() {
        let status: OrderStatus = serde_json::from_str("\"placed\"").unwrap();
        assert_eq!(status, OrderStatus::Pending);
        assert_eq!(
            serde_json::to_string(&OrderStatus::PendingConfirmation).unwrap(),
            "\"pending_confirmation\""
        );
    }
}
