use chrono::{TimeZone, Utc};
use harvest_core::{DriverRepository, RequestContext};
use harvest_shared::{Availability, Driver, LineItem, NewOrder, NewPickup};
use harvest_store::MemoryStore;
use std::sync::Arc;
use uuid::Uuid;

use crate::{DispatchSettings, DriverAvailabilityTracker, OrderLifecycleManager, PickupScheduler};

pub(crate) struct Fixture {
    pub store: Arc<MemoryStore>,
    pub orders: OrderLifecycleManager,
    pub pickups: PickupScheduler,
    pub drivers: DriverAvailabilityTracker,
    pub admin: RequestContext,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let pickups = PickupScheduler::new(store.clone(), DispatchSettings::default());
        Self {
            orders: OrderLifecycleManager::new(store.clone(), pickups.clone()),
            drivers: DriverAvailabilityTracker::new(store.clone()),
            pickups,
            store,
            admin: RequestContext::new("admin-1", "admin", [], None),
        }
    }

    pub async fn driver(&self, availability: Availability) -> Uuid {
        let mut driver = Driver::new(Uuid::new_v4(), "Rosa".into(), "Pickup truck".into(), Utc::now());
        driver.availability = availability;
        self.store.insert_driver(&driver).await.unwrap();
        driver.id
    }
}

pub(crate) fn new_order(prices: &[&str]) -> NewOrder {
    NewOrder {
        customer_id: "cust-1".to_string(),
        customer_name: "Ada Farmer".to_string(),
        items: prices
            .iter()
            .map(|price| LineItem {
                product_id: Uuid::new_v4(),
                product_name: "Sweet Corn".to_string(),
                category: "vegetables".to_string(),
                quantity: 1,
                unit_price: price.parse().unwrap(),
            })
            .collect(),
        placed_at: None,
    }
}

/// Pickup at 09:00 on the given day of June 2024.
pub(crate) fn pickup_at(order_id: Uuid, day: u32) -> NewPickup {
    NewPickup {
        order_id,
        location: "North Barn".to_string(),
        scheduled_for: Utc.with_ymd_and_hms(2024, 6, day, 9, 0, 0).unwrap(),
        contact_person: Some("Lin".to_string()),
        notes: None,
    }
}
