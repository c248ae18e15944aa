//! Order status transition graph
//!
//! ```text
//! pending -> confirmed -> processing -> shipped -> delivered -> completed
//!    |           |            |            |
//!    +-----------+------------+------------+--> cancelled
//! ```
//!
//! Reverse edges are rejected; `completed` and `cancelled` are terminal.

use crate::events::event_types;
use crate::models::OrderStatus;

/// Violation of the lifecycle graph
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("invalid status transition from {from} to {to}")]
    NotAllowed { from: OrderStatus, to: OrderStatus },
}

impl From<TransitionError> for crate::Error {
    fn from(error: TransitionError) -> Self {
        match error {
            TransitionError::NotAllowed { from, to } => {
                crate::Error::InvalidTransition { from: from.to_string(), to: to.to_string() }
            }
        }
    }
}

/// Validate one edge of the graph
pub fn check_transition(from: OrderStatus, to: OrderStatus) -> Result<(), TransitionError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(TransitionError::NotAllowed { from, to })
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    pub fn can_transition_to(&self, new_status: OrderStatus) -> bool {
        use OrderStatus::*;

        match (self, new_status) {
            (Pending, Confirmed) => true,
            (Confirmed, Processing) => true,
            (Processing, Shipped) => true,
            (Shipped, Delivered) => true,
            (Delivered, Completed) => true,

            (Pending, Cancelled) => true,
            (Confirmed, Cancelled) => true,
            (Processing, Cancelled) => true,
            (Shipped, Cancelled) => true,

            _ => false,
        }
    }

    /// Broker event type emitted when an order enters this status
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderStatus::Confirmed => event_types::ORDER_CONFIRMED,
            OrderStatus::Shipped => event_types::ORDER_SHIPPED,
            OrderStatus::Delivered => event_types::ORDER_DELIVERED,
            OrderStatus::Cancelled => event_types::ORDER_CANCELLED,
            _ => event_types::ORDER_UPDATED,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn test_forward_transitions() {
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(Delivered.can_transition_to(Completed));
    }

    #[test]
    fn test_reverse_transitions_rejected() {
        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Delivered.can_transition_to(Pending));
        assert!(!Delivered.can_transition_to(Shipped));
        assert!(!Completed.can_transition_to(Delivered));
    }

    #[test]
    fn test_cancellation_edges() {
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Cancelled));
        assert!(Shipped.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Cancelled));
    }

    #[test]
    fn test_no_skipping() {
        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Confirmed.can_transition_to(Delivered));
    }

    #[test]
    fn test_terminal_states() {
        assert!(Completed.is_terminal());
        assert!(Cancelled.is_terminal());
        assert!(!Delivered.is_terminal());
        assert!(!Pending.is_terminal());
    }

    #[test]
    fn test_check_transition_error() {
        assert!(check_transition(Pending, Confirmed).is_ok());

        let err = check_transition(Delivered, Pending).unwrap_err();
        assert_eq!(err.to_string(), "invalid status transition from delivered to pending");

        let core: crate::Error = err.into();
        assert_eq!(core.status_code(), 409);
        assert_eq!(core.category(), "invalid_transition");
    }

    #[test]
    fn test_event_types() {
        assert_eq!(Confirmed.event_type(), "order.confirmed");
        assert_eq!(Shipped.event_type(), "order.shipped");
        assert_eq!(Delivered.event_type(), "order.delivered");
        assert_eq!(Cancelled.event_type(), "order.cancelled");
        assert_eq!(Processing.event_type(), "order.updated");
        assert_eq!(Completed.event_type(), "order.updated");
    }
}
