pub mod drivers;
pub mod export;
pub mod lifecycle;
pub mod manager;
pub mod pickup;

#[cfg(test)]
pub(crate) mod testing;

pub use drivers::DriverAvailabilityTracker;
pub use export::{header_csv, pickups_csv, rows_csv, write_pickups_csv, EXPORT_HEADER};
pub use lifecycle::{Effect, Lifecycle};
pub use manager::{OrderLifecycleManager, OrderTransition};
pub use pickup::{DispatchSettings, PickupScheduler, PickupStatusUpdate};
