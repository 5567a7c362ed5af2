//! Primary-sale orders.
//!
//! An order is created `Pending` when a mint is prepared and reconciled
//! exactly once against the ledger. Once `Confirmed` it never changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Address, EventId, OrderId, Result, TixgateError, UserId};

/// Lifecycle status of an order.
///
/// Transitions are monotonic: `Pending → Confirmed` or `Pending → Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Failed,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Confirmed => write!(f, "CONFIRMED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub event_id: EventId,
    pub quantity: u32,
    /// `quantity * ticket_price`, in ledger base units.
    pub total_price: u64,
    pub status: OrderStatus,
    /// Where minted assets are delivered (the buyer's custodial address).
    pub recipient: Address,
    /// Base64 of the unsigned mint transaction handed to the wallet. Only a
    /// signature over exactly this transaction confirms the order.
    pub prepared_transaction: Option<String>,
    /// Ledger transaction reference once reconciled.
    pub tx_signature: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a pending order.
    ///
    /// # Errors
    /// Returns [`TixgateError::InvalidAmount`] if the total overflows.
    pub fn pending(
        user_id: UserId,
        event_id: EventId,
        quantity: u32,
        unit_price: u64,
        recipient: Address,
    ) -> Result<Self> {
        let total_price = unit_price
            .checked_mul(u64::from(quantity))
            .ok_or_else(|| TixgateError::InvalidAmount {
                reason: format!("{quantity} x {unit_price} overflows"),
            })?;
        let now = Utc::now();
        Ok(Self {
            id: OrderId::new(),
            user_id,
            event_id,
            quantity,
            total_price,
            status: OrderStatus::Pending,
            recipient,
            prepared_transaction: None,
            tx_signature: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// `Pending → Confirmed`, stamping the transaction reference.
    ///
    /// # Errors
    /// Returns [`TixgateError::OrderNotPending`] from any other state.
    pub fn mark_confirmed(&mut self, signature: &str) -> Result<()> {
        self.ensure_pending()?;
        self.status = OrderStatus::Confirmed;
        self.tx_signature = Some(signature.to_string());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `Pending → Failed`. Only for an explicit on-ledger rejection, never
    /// for a confirmation timeout.
    ///
    /// # Errors
    /// Returns [`TixgateError::OrderNotPending`] from any other state.
    pub fn mark_failed(&mut self, signature: &str, reason: &str) -> Result<()> {
        self.ensure_pending()?;
        self.status = OrderStatus::Failed;
        self.tx_signature = Some(signature.to_string());
        self.failure_reason = Some(reason.to_string());
        self.updated_at = Utc::now();
        Ok(())
    }

    fn ensure_pending(&self) -> Result<()> {
        if self.status == OrderStatus::Pending {
            Ok(())
        } else {
            Err(TixgateError::OrderNotPending {
                order: self.id,
                status: self.status.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_order() -> Order {
        Order::pending(UserId::new(), EventId::new(), 2, 2, Address::random()).unwrap()
    }

    #[test]
    fn total_is_quantity_times_price() {
        assert_eq!(make_order().total_price, 4);
    }

    #[test]
    fn total_overflow_rejected() {
        let err = Order::pending(UserId::new(), EventId::new(), 3, u64::MAX, Address::random())
            .unwrap_err();
        assert!(matches!(err, TixgateError::InvalidAmount { .. }));
    }

    #[test]
    fn confirmed_order_is_immutable() {
        let mut order = make_order();
        order.mark_confirmed("sig1").unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert!(order.mark_failed("sig2", "late").is_err());
        assert!(order.mark_confirmed("sig2").is_err());
        assert_eq!(order.tx_signature.as_deref(), Some("sig1"));
    }

    #[test]
    fn failed_order_records_reason() {
        let mut order = make_order();
        order.mark_failed("sig", "insufficient lamports").unwrap();
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(order.failure_reason.as_deref(), Some("insufficient lamports"));
    }
}
