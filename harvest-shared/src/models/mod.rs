pub mod audit;
pub mod driver;
pub mod order;
pub mod pickup;

pub use audit::AuditEntry;
pub use driver::{Availability, Driver, DriverStatistics, Rating};
pub use order::{LineItem, NewOrder, Order, OrderStatus};
pub use pickup::{NewPickup, Pickup, PickupStatus, PickupView};
