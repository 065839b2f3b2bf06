pub mod models;
pub mod money;
pub mod range;
pub mod pii;

pub use models::{
    Availability, AuditEntry, Driver, DriverStatistics, LineItem, NewOrder, NewPickup, Order,
    OrderStatus, Pickup, PickupStatus, PickupView, Rating,
};
pub use money::{Money, Percent};
pub use range::DateRange;

/// Errors raised while constructing model values from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("Order must contain at least one line item")]
    EmptyOrder,
    #[error("Line item quantity must be positive (product {0})")]
    InvalidQuantity(uuid::Uuid),
    #[error("Line item unit price must not be negative (product {0})")]
    NegativePrice(uuid::Uuid),
    #[error("Order total overflows the currency range")]
    TotalOverflow,
    #[error("Invalid amount '{0}': expected a decimal with at most two places")]
    InvalidAmount(String),
    #[error("Unknown {kind} status '{value}'")]
    UnknownStatus { kind: &'static str, value: String },
    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),
    #[error("Date range start {start} is after end {end}")]
    InvertedRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },
}
