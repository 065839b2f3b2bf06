use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{ModelError, Money};

/// Order status in the fulfillment lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Ready,
    Completed,
    Canceled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Ready,
        OrderStatus::Completed,
        OrderStatus::Canceled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Ready => "ready",
            OrderStatus::Completed => "completed",
            OrderStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Canceled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ModelError::UnknownStatus {
                kind: "order",
                value: s.to_string(),
            })
    }
}

/// A product line within an order. Name and category are snapshotted at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub category: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl LineItem {
    pub fn subtotal(&self) -> Option<Money> {
        self.unit_price.checked_times(self.quantity)
    }
}

/// Order as handed over by the checkout flow, before it is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_id: String,
    pub customer_name: String,
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub placed_at: Option<DateTime<Utc>>,
}

/// The single source of truth for a customer's purchase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: String,
    pub customer_name: String,
    pub items: Vec<LineItem>,
    pub total: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Validates line items and fixes the total. The total is never recomputed afterwards.
    pub fn place(new: NewOrder, now: DateTime<Utc>) -> Result<Self, ModelError> {
        if new.items.is_empty() {
            return Err(ModelError::EmptyOrder);
        }

        let mut total = Money::ZERO;
        for item in &new.items {
            if item.quantity == 0 {
                return Err(ModelError::InvalidQuantity(item.product_id));
            }
            if item.unit_price.is_negative() {
                return Err(ModelError::NegativePrice(item.product_id));
            }
            total = item
                .subtotal()
                .and_then(|subtotal| total.checked_add(subtotal))
                .ok_or(ModelError::TotalOverflow)?;
        }

        let created_at = new.placed_at.unwrap_or(now);
        Ok(Self {
            id: Uuid::new_v4(),
            customer_id: new.customer_id,
            customer_name: new.customer_name,
            items: new.items,
            total,
            status: OrderStatus::Pending,
            created_at,
            updated_at: created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: u32, price: &str) -> LineItem {
        LineItem {
            product_id: Uuid::new_v4(),
            product_name: "Heirloom Tomatoes".to_string(),
            category: "vegetables".to_string(),
            quantity,
            unit_price: price.parse().unwrap(),
        }
    }

    fn new_order(items: Vec<LineItem>) -> NewOrder {
        NewOrder {
            customer_id: "cust-1".to_string(),
            customer_name: "Ada Farmer".to_string(),
            items,
            placed_at: None,
        }
    }

    #[test]
    fn test_total_is_sum_of_subtotals() {
        let order = Order::place(new_order(vec![item(3, "2.50"), item(1, "10.05")]), Utc::now()).unwrap();
        assert_eq!(order.total, "17.55".parse::<Money>().unwrap());
        assert_eq!(order.total.to_string(), "17.55");
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_rejects_bad_line_items() {
        assert_eq!(
            Order::place(new_order(vec![]), Utc::now()).unwrap_err(),
            ModelError::EmptyOrder
        );
        assert!(matches!(
            Order::place(new_order(vec![item(0, "1.00")]), Utc::now()),
            Err(ModelError::InvalidQuantity(_))
        ));
        assert!(matches!(
            Order::place(new_order(vec![item(1, "-1.00")]), Utc::now()),
            Err(ModelError::NegativePrice(_))
        ));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }
}
