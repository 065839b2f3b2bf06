use chrono::Utc;
use harvest_core::{
    Capability, ChangeSet, CoreError, CoreResult, FulfillmentStore, Page, PickupFilter, PickupPage,
    RequestContext, TransitionOutcome, Write,
};
use harvest_shared::{NewPickup, OrderStatus, Pickup, PickupStatus, PickupView, Rating};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::drivers::DriverAvailabilityTracker;
use crate::lifecycle::{decide, Decision, Effect, Lifecycle};

/// Paging limits for pickup listings.
#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            default_page_size: 25,
            max_page_size: 100,
        }
    }
}

/// A requested pickup status change.
#[derive(Debug, Clone, Copy)]
pub struct PickupStatusUpdate {
    pub pickup_id: Uuid,
    pub target: PickupStatus,
    /// Caller's belief of the current status.
    pub expected: Option<PickupStatus>,
    /// Only accepted together with `target: Completed`.
    pub rating: Option<Rating>,
}

/// Creates pickups, assigns drivers, and drives pickup status
#[derive(Clone)]
pub struct PickupScheduler {
    store: Arc<dyn FulfillmentStore>,
    drivers: DriverAvailabilityTracker,
    settings: DispatchSettings,
}

impl PickupScheduler {
    pub fn new(store: Arc<dyn FulfillmentStore>, settings: DispatchSettings) -> Self {
        Self {
            drivers: DriverAvailabilityTracker::new(store.clone()),
            store,
            settings,
        }
    }

    /// Open a pickup for an order that is being processed.
    pub async fn create(&self, ctx: &RequestContext, new: NewPickup) -> CoreResult<Pickup> {
        ctx.require(Capability::ManagePickups)?;

        let location = new.location.trim();
        if location.is_empty() {
            return Err(CoreError::Validation("pickup location is required".to_string()));
        }
        let new = NewPickup {
            location: location.to_string(),
            ..new
        };

        let order = self
            .store
            .get_order(new.order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("order", new.order_id))?;
        if order.status != OrderStatus::Processing {
            return Err(CoreError::InvalidTransition(format!(
                "order {} is {}; pickups are created while it is processing",
                order.id, order.status
            )));
        }
        if let Some(existing) = self.store.active_pickup_for_order(order.id).await? {
            return Err(CoreError::Conflict(format!(
                "order {} already has pickup {}",
                order.id, existing.id
            )));
        }

        let pickup = Pickup::new(new, Utc::now());
        let mut changes = ChangeSet::new(pickup.created_at);
        changes
            .write(Write::InsertPickup {
                pickup: pickup.clone(),
                order_status: order.status,
            })
            .audit(
                ctx.actor(),
                format!(
                    "pickup {} created for order {} at {}",
                    pickup.id, order.id, pickup.location
                ),
            );
        self.store.commit(changes).await?;

        info!(pickup_id = %pickup.id, order_id = %order.id, "Pickup created");
        Ok(pickup)
    }

    pub async fn get(&self, ctx: &RequestContext, pickup_id: Uuid) -> CoreResult<Pickup> {
        ctx.require(Capability::ManagePickups)?;
        self.load(pickup_id).await
    }

    /// Assign an available driver; the pickup becomes scheduled and the driver busy.
    pub async fn assign_driver(
        &self,
        ctx: &RequestContext,
        pickup_id: Uuid,
        driver_id: Uuid,
    ) -> CoreResult<Pickup> {
        ctx.require(Capability::ManagePickups)?;
        let mut pickup = self.load(pickup_id).await?;

        if pickup.status.is_terminal() {
            return Err(CoreError::InvalidTransition(format!(
                "pickup {} is {} and cannot be assigned",
                pickup.id, pickup.status
            )));
        }
        if pickup.status != PickupStatus::Pending {
            return Err(CoreError::Conflict(format!(
                "pickup {} is already {} and no longer accepts assignment",
                pickup.id, pickup.status
            )));
        }

        let driver = self.drivers.load(driver_id).await?;
        let mut changes = ChangeSet::new(Utc::now());
        changes.write(Write::PickupStatus {
            pickup_id,
            expected: PickupStatus::Pending,
            next: PickupStatus::Scheduled,
            assign_driver: Some(driver_id),
        });
        for effect in PickupStatus::effects(PickupStatus::Pending, PickupStatus::Scheduled) {
            if effect == Effect::OccupyDriver {
                self.drivers.occupy(&mut changes, &driver)?;
            }
        }
        changes.audit(
            ctx.actor(),
            format!("pickup {} assigned to driver {}; pending -> scheduled", pickup_id, driver_id),
        );
        self.commit(changes, pickup_id).await?;

        info!(%pickup_id, %driver_id, "Driver assigned");
        pickup.status = PickupStatus::Scheduled;
        pickup.driver_id = Some(driver_id);
        Ok(pickup)
    }

    pub async fn update_status(
        &self,
        ctx: &RequestContext,
        update: PickupStatusUpdate,
    ) -> CoreResult<TransitionOutcome<PickupStatus>> {
        ctx.require(Capability::ManagePickups)?;
        if update.rating.is_some() && update.target != PickupStatus::Completed {
            return Err(CoreError::Validation(
                "a rating can only accompany a completion".to_string(),
            ));
        }

        let pickup = self.load(update.pickup_id).await?;
        if decide(pickup.id, pickup.status, update.expected, update.target)? == Decision::NoOp {
            return Ok(TransitionOutcome::unchanged(pickup.status));
        }

        match update.target {
            PickupStatus::Scheduled => {
                return Err(CoreError::InvalidTransition(format!(
                    "pickup {} is scheduled by assigning a driver",
                    pickup.id
                )));
            }
            PickupStatus::InTransit | PickupStatus::Completed => {
                self.ensure_order_ready(&pickup).await?;
            }
            PickupStatus::Pending | PickupStatus::Canceled => {}
        }

        let mut changes = ChangeSet::new(Utc::now());
        self.stage_transition(&mut changes, ctx.actor(), &pickup, update.target, update.rating);
        self.commit(changes, pickup.id).await?;

        info!(pickup_id = %pickup.id, from = %pickup.status, to = %update.target, "Pickup status changed");
        Ok(TransitionOutcome::applied(pickup.status, update.target))
    }

    /// Cancel a non-terminal pickup; terminal pickups are left as they are.
    pub async fn cancel(
        &self,
        ctx: &RequestContext,
        pickup_id: Uuid,
    ) -> CoreResult<TransitionOutcome<PickupStatus>> {
        ctx.require(Capability::ManagePickups)?;
        let pickup = self.load(pickup_id).await?;
        if pickup.status.is_terminal() {
            return Ok(TransitionOutcome::unchanged(pickup.status));
        }

        let mut changes = ChangeSet::new(Utc::now());
        self.stage_cancel(&mut changes, ctx.actor(), &pickup);
        self.commit(changes, pickup.id).await?;

        info!(pickup_id = %pickup.id, from = %pickup.status, "Pickup canceled");
        Ok(TransitionOutcome::applied(pickup.status, PickupStatus::Canceled))
    }

    /// The cancellation path shared with the order cascade.
    pub(crate) fn stage_cancel(&self, changes: &mut ChangeSet, actor: Option<&str>, pickup: &Pickup) {
        self.stage_transition(changes, actor, pickup, PickupStatus::Canceled, None);
    }

    pub async fn query(
        &self,
        ctx: &RequestContext,
        filter: PickupFilter,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> CoreResult<PickupPage> {
        ctx.require(Capability::ManagePickups)?;
        let filter = validate_filter(filter)?;
        let page = Page::new(
            offset.unwrap_or(0),
            limit.unwrap_or(self.settings.default_page_size),
            self.settings.max_page_size,
        )?;
        self.store.query_pickups(&filter, Some(page)).await
    }

    /// Every matching pickup, unpaginated, in listing order.
    pub async fn export(&self, ctx: &RequestContext, filter: PickupFilter) -> CoreResult<Vec<PickupView>> {
        ctx.require(Capability::ManagePickups)?;
        let filter = validate_filter(filter)?;
        Ok(self.store.query_pickups(&filter, None).await?.items)
    }

    fn stage_transition(
        &self,
        changes: &mut ChangeSet,
        actor: Option<&str>,
        pickup: &Pickup,
        target: PickupStatus,
        rating: Option<Rating>,
    ) {
        changes
            .write(Write::PickupStatus {
                pickup_id: pickup.id,
                expected: pickup.status,
                next: target,
                assign_driver: None,
            })
            .audit(
                actor,
                format!("pickup {} status {} -> {}", pickup.id, pickup.status, target),
            );

        let Some(driver_id) = pickup.driver_id else {
            return;
        };
        for effect in PickupStatus::effects(pickup.status, target) {
            match effect {
                Effect::RecordDriverCompletion => {
                    self.drivers.record_completion(changes, actor, driver_id, rating)
                }
                Effect::ReleaseDriver => self.drivers.release(changes, driver_id),
                Effect::OccupyDriver | Effect::CancelActivePickup => {}
            }
        }
    }

    /// A pickup may not run ahead of its order.
    async fn ensure_order_ready(&self, pickup: &Pickup) -> CoreResult<()> {
        let order = self
            .store
            .get_order(pickup.order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("order", pickup.order_id))?;
        match order.status {
            OrderStatus::Ready | OrderStatus::Completed => Ok(()),
            status => Err(CoreError::InvalidTransition(format!(
                "order {} is {}; pickup {} cannot move ahead of it",
                order.id, status, pickup.id
            ))),
        }
    }

    async fn commit(&self, changes: ChangeSet, pickup_id: Uuid) -> CoreResult<()> {
        self.store.commit(changes).await.inspect_err(|err| {
            if matches!(err, CoreError::Conflict(_)) {
                warn!(%pickup_id, "Pickup changed concurrently; update rejected");
            }
        })
    }

    async fn load(&self, pickup_id: Uuid) -> CoreResult<Pickup> {
        self.store
            .get_pickup(pickup_id)
            .await?
            .ok_or_else(|| CoreError::not_found("pickup", pickup_id))
    }
}

fn validate_filter(filter: PickupFilter) -> CoreResult<PickupFilter> {
    if let (Some(from), Some(to)) = (filter.from, filter.to) {
        if from > to {
            return Err(CoreError::Validation(format!(
                "start date {} is after end date {}",
                from, to
            )));
        }
    }
    Ok(filter.normalized())
}
