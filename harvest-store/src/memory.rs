//! In-process store used when no database is configured, and by tests.
//!
//! A single [`RwLock`] guards every table. `commit` stages its writes against
//! the locked tables and only merges them once every guard has held.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harvest_core::{
    AuditLog, ChangeSet, ChangeStore, CoreError, CoreResult, DriverRepository, OrderRepository,
    Page, PickupFilter, PickupPage, PickupRepository, Write,
};
use harvest_shared::{
    Availability, AuditEntry, DateRange, Driver, Order, Pickup, PickupStatus, PickupView,
};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    orders: HashMap<Uuid, Order>,
    pickups: HashMap<Uuid, Pickup>,
    drivers: HashMap<Uuid, Driver>,
    audit: Vec<AuditEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Rows changed by a commit in progress, layered over the committed tables.
struct Staging<'a> {
    base: &'a Tables,
    at: DateTime<Utc>,
    orders: HashMap<Uuid, Order>,
    pickups: HashMap<Uuid, Pickup>,
    drivers: HashMap<Uuid, Driver>,
}

impl<'a> Staging<'a> {
    fn new(base: &'a Tables, at: DateTime<Utc>) -> Self {
        Self {
            base,
            at,
            orders: HashMap::new(),
            pickups: HashMap::new(),
            drivers: HashMap::new(),
        }
    }

    fn current_order(&self, id: Uuid) -> Option<&Order> {
        self.orders.get(&id).or_else(|| self.base.orders.get(&id))
    }

    fn order(&mut self, id: Uuid) -> CoreResult<&mut Order> {
        match self.orders.entry(id) {
            Entry::Occupied(staged) => Ok(staged.into_mut()),
            Entry::Vacant(slot) => {
                let order = self
                    .base
                    .orders
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| CoreError::not_found("order", id))?;
                Ok(slot.insert(order))
            }
        }
    }

    fn pickup(&mut self, id: Uuid) -> CoreResult<&mut Pickup> {
        match self.pickups.entry(id) {
            Entry::Occupied(staged) => Ok(staged.into_mut()),
            Entry::Vacant(slot) => {
                let pickup = self
                    .base
                    .pickups
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| CoreError::not_found("pickup", id))?;
                Ok(slot.insert(pickup))
            }
        }
    }

    fn driver(&mut self, id: Uuid) -> CoreResult<&mut Driver> {
        match self.drivers.entry(id) {
            Entry::Occupied(staged) => Ok(staged.into_mut()),
            Entry::Vacant(slot) => {
                let driver = self
                    .base
                    .drivers
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| CoreError::not_found("driver", id))?;
                Ok(slot.insert(driver))
            }
        }
    }

    /// Every pickup as it would look after the writes staged so far.
    fn all_pickups(&self) -> impl Iterator<Item = &Pickup> {
        self.base
            .pickups
            .values()
            .filter(|p| !self.pickups.contains_key(&p.id))
            .chain(self.pickups.values())
    }

    fn apply(&mut self, write: Write) -> CoreResult<()> {
        let at = self.at;
        match write {
            Write::InsertOrder(order) => {
                if self.base.orders.contains_key(&order.id) || self.orders.contains_key(&order.id) {
                    return Err(CoreError::Conflict(format!("order {} already exists", order.id)));
                }
                self.orders.insert(order.id, order);
            }
            Write::InsertPickup {
                pickup,
                order_status,
            } => {
                let order = self
                    .current_order(pickup.order_id)
                    .ok_or_else(|| CoreError::not_found("order", pickup.order_id))?;
                if order.status != order_status {
                    return Err(CoreError::Conflict(format!(
                        "order {} is {}, not {}",
                        order.id, order.status, order_status
                    )));
                }
                if let Some(open) = self
                    .all_pickups()
                    .find(|p| p.order_id == pickup.order_id && p.status != PickupStatus::Canceled)
                {
                    return Err(CoreError::Conflict(format!(
                        "order {} already has pickup {}",
                        pickup.order_id, open.id
                    )));
                }
                self.pickups.insert(pickup.id, pickup);
            }
            Write::OrderStatus {
                order_id,
                expected,
                next,
            } => {
                let order = self.order(order_id)?;
                if order.status != expected {
                    return Err(CoreError::Conflict(format!(
                        "order {} is {}, not {}",
                        order_id, order.status, expected
                    )));
                }
                order.status = next;
                order.updated_at = at;
            }
            Write::PickupStatus {
                pickup_id,
                expected,
                next,
                assign_driver,
            } => {
                let pickup = self.pickup(pickup_id)?;
                if pickup.status != expected {
                    return Err(CoreError::Conflict(format!(
                        "pickup {} is {}, not {}",
                        pickup_id, pickup.status, expected
                    )));
                }
                pickup.status = next;
                if assign_driver.is_some() {
                    pickup.driver_id = assign_driver;
                }
                pickup.updated_at = at;
            }
            Write::DriverAvailability {
                driver_id,
                expected,
                next,
            } => {
                let driver = self.driver(driver_id)?;
                if let Some(expected) = expected {
                    if driver.availability != expected {
                        return Err(CoreError::Conflict(format!(
                            "driver {} is {}, not {}",
                            driver_id, driver.availability, expected
                        )));
                    }
                }
                driver.availability = next;
                driver.updated_at = at;
            }
            Write::DriverCompletion { driver_id, rating } => {
                let driver = self.driver(driver_id)?;
                driver.completed_pickups += 1;
                if let Some(rating) = rating {
                    driver.rating_sum += u64::from(rating.value());
                    driver.rating_count += 1;
                }
                driver.updated_at = at;
            }
            Write::ReleaseDriver { driver_id } => {
                let still_assigned = self
                    .all_pickups()
                    .any(|p| p.driver_id == Some(driver_id) && p.status.is_active_assignment());
                let driver = self.driver(driver_id)?;
                if driver.availability == Availability::Busy && !still_assigned {
                    driver.availability = Availability::Available;
                    driver.updated_at = at;
                }
            }
            Write::NoOpenPickup { order_id } => {
                if let Some(open) = self
                    .all_pickups()
                    .find(|p| p.order_id == order_id && !p.status.is_terminal())
                {
                    return Err(CoreError::Conflict(format!(
                        "order {} has open pickup {}",
                        order_id, open.id
                    )));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, range: Option<DateRange>) -> CoreResult<Vec<Order>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| range.map_or(true, |r| r.contains_instant(o.created_at)))
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(orders)
    }
}

#[async_trait]
impl PickupRepository for MemoryStore {
    async fn get_pickup(&self, id: Uuid) -> CoreResult<Option<Pickup>> {
        Ok(self.tables.read().await.pickups.get(&id).cloned())
    }

    async fn active_pickup_for_order(&self, order_id: Uuid) -> CoreResult<Option<Pickup>> {
        let tables = self.tables.read().await;
        Ok(tables
            .pickups
            .values()
            .find(|p| p.order_id == order_id && !p.status.is_terminal())
            .cloned())
    }

    async fn query_pickups(&self, filter: &PickupFilter, page: Option<Page>) -> CoreResult<PickupPage> {
        let tables = self.tables.read().await;
        let mut views: Vec<PickupView> = tables
            .pickups
            .values()
            .map(|pickup| PickupView {
                customer_name: tables
                    .orders
                    .get(&pickup.order_id)
                    .map(|o| o.customer_name.clone())
                    .unwrap_or_default(),
                pickup: pickup.clone(),
            })
            .filter(|view| filter.matches(view))
            .collect();
        views.sort_by(|a, b| {
            a.pickup
                .scheduled_for
                .cmp(&b.pickup.scheduled_for)
                .then(a.pickup.id.cmp(&b.pickup.id))
        });

        let total = views.len() as u64;
        let page = page.unwrap_or(Page {
            offset: 0,
            limit: total,
        });
        let items = views
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect();

        Ok(PickupPage {
            items,
            total,
            offset: page.offset,
            limit: page.limit,
        })
    }
}

#[async_trait]
impl DriverRepository for MemoryStore {
    async fn get_driver(&self, id: Uuid) -> CoreResult<Option<Driver>> {
        Ok(self.tables.read().await.drivers.get(&id).cloned())
    }

    async fn list_drivers(&self) -> CoreResult<Vec<Driver>> {
        let tables = self.tables.read().await;
        let mut drivers: Vec<Driver> = tables.drivers.values().cloned().collect();
        drivers.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(drivers)
    }

    async fn insert_driver(&self, driver: &Driver) -> CoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.drivers.contains_key(&driver.id) {
            return Err(CoreError::Conflict(format!("driver {} already exists", driver.id)));
        }
        tables.drivers.insert(driver.id, driver.clone());
        Ok(())
    }
}

#[async_trait]
impl AuditLog for MemoryStore {
    async fn append(&self, entry: AuditEntry) -> CoreResult<()> {
        self.tables.write().await.audit.push(entry);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> CoreResult<Vec<AuditEntry>> {
        let tables = self.tables.read().await;
        Ok(tables.audit.iter().rev().take(limit).cloned().collect())
    }
}

#[async_trait]
impl ChangeStore for MemoryStore {
    async fn commit(&self, changes: ChangeSet) -> CoreResult<()> {
        let mut tables = self.tables.write().await;
        let write_count = changes.writes.len();

        let (orders, pickups, drivers) = {
            let mut staging = Staging::new(&tables, changes.at);
            for write in changes.writes {
                staging.apply(write)?;
            }
            (staging.orders, staging.pickups, staging.drivers)
        };

        tables.orders.extend(orders);
        tables.pickups.extend(pickups);
        tables.drivers.extend(drivers);
        tables.audit.extend(changes.audit);

        debug!(writes = write_count, "Change set committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use harvest_shared::{LineItem, NewOrder, NewPickup, OrderStatus, Rating};

    fn order(customer: &str) -> Order {
        Order::place(
            NewOrder {
                customer_id: "c-1".into(),
                customer_name: customer.into(),
                items: vec![LineItem {
                    product_id: Uuid::new_v4(),
                    product_name: "Honey".into(),
                    category: "pantry".into(),
                    quantity: 2,
                    unit_price: "7.50".parse().unwrap(),
                }],
                placed_at: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn pickup(order_id: Uuid) -> Pickup {
        Pickup::new(
            NewPickup {
                order_id,
                location: "Farm gate".into(),
                scheduled_for: Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap(),
                contact_person: None,
                notes: None,
            },
            Utc::now(),
        )
    }

    fn insert(pickup: Pickup) -> Write {
        Write::InsertPickup {
            pickup,
            order_status: OrderStatus::Pending,
        }
    }

    fn order_moves(order_id: Uuid, expected: OrderStatus, next: OrderStatus) -> ChangeSet {
        let mut changes = ChangeSet::new(Utc::now());
        changes.write(Write::OrderStatus {
            order_id,
            expected,
            next,
        });
        changes
    }

    async fn seeded() -> (MemoryStore, Order) {
        let store = MemoryStore::new();
        let order = order("Ada");
        let mut changes = ChangeSet::new(Utc::now());
        changes.write(Write::InsertOrder(order.clone()));
        store.commit(changes).await.unwrap();
        (store, order)
    }

    #[tokio::test]
    async fn test_failed_guard_rolls_back_whole_set() {
        let (store, order) = seeded().await;

        let mut changes = ChangeSet::new(Utc::now());
        changes
            .write(Write::OrderStatus {
                order_id: order.id,
                expected: OrderStatus::Pending,
                next: OrderStatus::Processing,
            })
            .write(Write::OrderStatus {
                order_id: order.id,
                expected: OrderStatus::Pending,
                next: OrderStatus::Canceled,
            })
            .audit(Some("admin"), "two writes");

        let err = store.commit(changes).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert!(store.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_open_pickup_rejected() {
        let (store, order) = seeded().await;

        let mut changes = ChangeSet::new(Utc::now());
        changes.write(insert(pickup(order.id)));
        store.commit(changes).await.unwrap();

        let mut changes = ChangeSet::new(Utc::now());
        changes.write(insert(pickup(order.id)));
        let err = store.commit(changes).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_pickup_insert_fails_once_order_was_canceled() {
        let (store, order) = seeded().await;
        store
            .commit(order_moves(order.id, OrderStatus::Pending, OrderStatus::Processing))
            .await
            .unwrap();

        // built while the order was processing
        let mut create = ChangeSet::new(Utc::now());
        create.write(Write::InsertPickup {
            pickup: pickup(order.id),
            order_status: OrderStatus::Processing,
        });

        let mut cancel = order_moves(order.id, OrderStatus::Processing, OrderStatus::Canceled);
        cancel.write(Write::NoOpenPickup { order_id: order.id });
        store.commit(cancel).await.unwrap();

        let err = store.commit(create).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        assert!(store.active_pickup_for_order(order.id).await.unwrap().is_none());
        let page = store.query_pickups(&PickupFilter::default(), None).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_cancel_fails_when_pickup_appeared_since_lookup() {
        let (store, order) = seeded().await;
        store
            .commit(order_moves(order.id, OrderStatus::Pending, OrderStatus::Processing))
            .await
            .unwrap();

        // lookup found no pickup, so nothing is staged for cascade
        let mut cancel = order_moves(order.id, OrderStatus::Processing, OrderStatus::Canceled);
        cancel.write(Write::NoOpenPickup { order_id: order.id });

        let mut create = ChangeSet::new(Utc::now());
        create.write(Write::InsertPickup {
            pickup: pickup(order.id),
            order_status: OrderStatus::Processing,
        });
        store.commit(create).await.unwrap();

        let err = store.commit(cancel).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_release_keeps_driver_with_other_assignment() {
        let store = MemoryStore::new();
        let mut driver = Driver::new(Uuid::new_v4(), "Rosa".into(), "Van".into(), Utc::now());
        driver.availability = Availability::Busy;
        store.insert_driver(&driver).await.unwrap();

        let mut changes = ChangeSet::new(Utc::now());
        let first = order("Ada");
        let second = order("Bo");
        let mut held = pickup(second.id);
        held.status = PickupStatus::InTransit;
        held.driver_id = Some(driver.id);
        changes
            .write(Write::InsertOrder(first))
            .write(Write::InsertOrder(second))
            .write(insert(held))
            .write(Write::DriverCompletion {
                driver_id: driver.id,
                rating: Rating::try_from(5u8).ok(),
            })
            .write(Write::ReleaseDriver { driver_id: driver.id });
        store.commit(changes).await.unwrap();

        let stored = store.get_driver(driver.id).await.unwrap().unwrap();
        assert_eq!(stored.availability, Availability::Busy);
        assert_eq!(stored.completed_pickups, 1);
        assert_eq!(stored.rating_count, 1);
    }

    #[tokio::test]
    async fn test_query_joins_customer_name() {
        let (store, order) = seeded().await;
        let mut changes = ChangeSet::new(Utc::now());
        changes.write(insert(pickup(order.id)));
        store.commit(changes).await.unwrap();

        let filter = PickupFilter {
            search: Some("ada".into()),
            ..PickupFilter::default()
        };
        let page = store.query_pickups(&filter, None).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].customer_name, "Ada");
    }
}
