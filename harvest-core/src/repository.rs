use async_trait::async_trait;
use harvest_shared::{AuditEntry, DateRange, Driver, Order, Pickup};
use uuid::Uuid;

use crate::changes::ChangeSet;
use crate::filter::{Page, PickupFilter, PickupPage};
use crate::CoreResult;

/// Read access to orders. Orders are written only through [`ChangeStore`].
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>>;

    /// Orders whose creation date falls in `range`, or every order when `None`.
    async fn list_orders(&self, range: Option<DateRange>) -> CoreResult<Vec<Order>>;
}

#[async_trait]
pub trait PickupRepository: Send + Sync {
    async fn get_pickup(&self, id: Uuid) -> CoreResult<Option<Pickup>>;

    /// The pickup for `order_id` that is neither completed nor canceled.
    async fn active_pickup_for_order(&self, order_id: Uuid) -> CoreResult<Option<Pickup>>;

    /// Matching pickups ordered by pickup date, then id. `page: None` returns all.
    async fn query_pickups(&self, filter: &PickupFilter, page: Option<Page>) -> CoreResult<PickupPage>;
}

#[async_trait]
pub trait DriverRepository: Send + Sync {
    async fn get_driver(&self, id: Uuid) -> CoreResult<Option<Driver>>;

    async fn list_drivers(&self) -> CoreResult<Vec<Driver>>;

    /// Driver onboarding happens outside the core; this exists for seeding.
    async fn insert_driver(&self, driver: &Driver) -> CoreResult<()>;
}

/// Append-only audit sink.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> CoreResult<()>;

    /// Newest first.
    async fn recent(&self, limit: usize) -> CoreResult<Vec<AuditEntry>>;
}

#[async_trait]
pub trait ChangeStore: Send + Sync {
    /// Applies every write and audit entry atomically, or none of them.
    async fn commit(&self, changes: ChangeSet) -> CoreResult<()>;
}

/// Everything the fulfillment core needs from persistence.
pub trait FulfillmentStore:
    OrderRepository + PickupRepository + DriverRepository + AuditLog + ChangeStore
{
}

impl<T> FulfillmentStore for T where
    T: OrderRepository + PickupRepository + DriverRepository + AuditLog + ChangeStore
{
}
