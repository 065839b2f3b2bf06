use chrono::Utc;
use harvest_core::{
    Capability, ChangeSet, CoreError, CoreResult, FulfillmentStore, RequestContext, Write,
};
use harvest_shared::{Availability, Driver, DriverStatistics, Rating};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Owns driver availability and completion counters
#[derive(Clone)]
pub struct DriverAvailabilityTracker {
    store: Arc<dyn FulfillmentStore>,
}

impl DriverAvailabilityTracker {
    pub fn new(store: Arc<dyn FulfillmentStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, ctx: &RequestContext, driver_id: Uuid) -> CoreResult<Driver> {
        ctx.require(Capability::ManageDrivers)?;
        self.load(driver_id).await
    }

    pub async fn list(&self, ctx: &RequestContext) -> CoreResult<Vec<Driver>> {
        ctx.require(Capability::ManageDrivers)?;
        self.store.list_drivers().await
    }

    /// Administrative override. Every availability change is legal.
    pub async fn set_availability(
        &self,
        ctx: &RequestContext,
        driver_id: Uuid,
        availability: Availability,
    ) -> CoreResult<Driver> {
        ctx.require(Capability::ManageDrivers)?;
        let mut driver = self.load(driver_id).await?;
        let previous = driver.availability;

        let mut changes = ChangeSet::new(Utc::now());
        changes
            .write(Write::DriverAvailability {
                driver_id,
                expected: None,
                next: availability,
            })
            .audit(
                ctx.actor(),
                format!("driver {} availability {} -> {}", driver_id, previous, availability),
            );
        self.store.commit(changes).await?;

        info!(%driver_id, from = %previous, to = %availability, "Driver availability set");
        driver.availability = availability;
        Ok(driver)
    }

    pub async fn statistics(&self, ctx: &RequestContext) -> CoreResult<DriverStatistics> {
        ctx.require(Capability::ManageDrivers)?;
        let drivers = self.store.list_drivers().await?;
        Ok(DriverStatistics::from_drivers(&drivers))
    }

    /// Adds the completion to a pickup's change set. Only the scheduler calls this,
    /// and only for a pickup entering `completed`.
    pub(crate) fn record_completion(
        &self,
        changes: &mut ChangeSet,
        actor: Option<&str>,
        driver_id: Uuid,
        rating: Option<Rating>,
    ) {
        let description = match rating {
            Some(rating) => format!(
                "driver {} completed a pickup (rated {})",
                driver_id,
                rating.value()
            ),
            None => format!("driver {} completed a pickup", driver_id),
        };
        changes
            .write(Write::DriverCompletion { driver_id, rating })
            .audit(actor, description);
    }

    /// Guards that the driver can take an assignment and stages the move to busy.
    pub(crate) fn occupy(&self, changes: &mut ChangeSet, driver: &Driver) -> CoreResult<()> {
        if driver.availability != Availability::Available {
            return Err(CoreError::DriverUnavailable {
                driver_id: driver.id,
                availability: driver.availability,
            });
        }
        changes.write(Write::DriverAvailability {
            driver_id: driver.id,
            expected: Some(Availability::Available),
            next: Availability::Busy,
        });
        Ok(())
    }

    pub(crate) fn release(&self, changes: &mut ChangeSet, driver_id: Uuid) {
        changes.write(Write::ReleaseDriver { driver_id });
    }

    pub(crate) async fn load(&self, driver_id: Uuid) -> CoreResult<Driver> {
        self.store
            .get_driver(driver_id)
            .await?
            .ok_or_else(|| CoreError::not_found("driver", driver_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_store::MemoryStore;
    use harvest_core::AuditLog;
    use harvest_core::DriverRepository;

    async fn setup() -> (Arc<MemoryStore>, DriverAvailabilityTracker, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let driver = Driver::new(Uuid::new_v4(), "Rosa".into(), "Pickup truck".into(), Utc::now());
        store.insert_driver(&driver).await.unwrap();
        let tracker = DriverAvailabilityTracker::new(store.clone());
        (store, tracker, driver.id)
    }

    #[tokio::test]
    async fn test_set_availability_is_always_legal_and_audited() {
        let (store, tracker, driver_id) = setup().await;
        let ctx = RequestContext::new("admin-1", "admin", [], None);

        for availability in [Availability::Busy, Availability::Offline, Availability::Available] {
            let driver = tracker.set_availability(&ctx, driver_id, availability).await.unwrap();
            assert_eq!(driver.availability, availability);
        }

        let entries = store.recent(10).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].actor.as_deref(), Some("admin-1"));
    }

    #[tokio::test]
    async fn test_set_availability_requires_capability() {
        let (_store, tracker, driver_id) = setup().await;
        let analyst = RequestContext::new("a-1", "analyst", [], None);
        let err = tracker
            .set_availability(&analyst, driver_id, Availability::Available)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_unknown_driver() {
        let (_store, tracker, _) = setup().await;
        let ctx = RequestContext::system();
        let err = tracker
            .set_availability(&ctx, Uuid::new_v4(), Availability::Busy)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { entity: "driver", .. }));
    }

    #[tokio::test]
    async fn test_statistics() {
        let (_store, tracker, driver_id) = setup().await;
        let ctx = RequestContext::system();
        tracker.set_availability(&ctx, driver_id, Availability::Available).await.unwrap();

        let stats = tracker.statistics(&ctx).await.unwrap();
        assert_eq!(stats.total_drivers, 1);
        assert_eq!(stats.available, 1);
        assert_eq!(stats.mean_rating, None);
        assert_eq!(stats.total_completed_pickups, 0);
    }
}
