use chrono::Utc;
use harvest_core::{
    Capability, ChangeSet, CoreError, CoreResult, FulfillmentStore, RequestContext,
    TransitionOutcome, Write,
};
use harvest_shared::{NewOrder, Order, OrderStatus};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::lifecycle::{decide, Decision, Effect, Lifecycle};
use crate::pickup::PickupScheduler;

/// A requested order status change.
#[derive(Debug, Clone, Copy)]
pub struct OrderTransition {
    pub order_id: Uuid,
    pub target: OrderStatus,
    /// Caller's belief of the current status. `None` trusts the status read
    /// when the request starts.
    pub expected: Option<OrderStatus>,
}

/// Manages order lifecycle and state transitions
#[derive(Clone)]
pub struct OrderLifecycleManager {
    store: Arc<dyn FulfillmentStore>,
    pickups: PickupScheduler,
}

impl OrderLifecycleManager {
    pub fn new(store: Arc<dyn FulfillmentStore>, pickups: PickupScheduler) -> Self {
        Self { store, pickups }
    }

    /// Accept an order from checkout. The total is fixed here and never recomputed.
    pub async fn place(&self, ctx: &RequestContext, new: NewOrder) -> CoreResult<Order> {
        ctx.require(Capability::ManageOrders)?;
        if new.customer_id.trim().is_empty() {
            return Err(CoreError::Validation("customer reference is required".to_string()));
        }

        let order = Order::place(new, Utc::now())?;
        let mut changes = ChangeSet::new(Utc::now());
        changes.write(Write::InsertOrder(order.clone())).audit(
            ctx.actor(),
            format!(
                "order {} placed for customer {} (total {})",
                order.id, order.customer_id, order.total
            ),
        );
        self.store.commit(changes).await?;

        info!(order_id = %order.id, total = %order.total, "Order placed");
        Ok(order)
    }

    pub async fn get(&self, ctx: &RequestContext, order_id: Uuid) -> CoreResult<Order> {
        ctx.require(Capability::ManageOrders)?;
        self.load(order_id).await
    }

    /// Move an order along its lifecycle. Cancellation also cancels the order's
    /// open pickup in the same commit.
    pub async fn transition(
        &self,
        ctx: &RequestContext,
        request: OrderTransition,
    ) -> CoreResult<TransitionOutcome<OrderStatus>> {
        ctx.require(Capability::ManageOrders)?;
        let order = self.load(request.order_id).await?;

        if decide(order.id, order.status, request.expected, request.target)? == Decision::NoOp {
            return Ok(TransitionOutcome::unchanged(order.status));
        }

        let mut changes = ChangeSet::new(Utc::now());
        changes
            .write(Write::OrderStatus {
                order_id: order.id,
                expected: order.status,
                next: request.target,
            })
            .audit(
                ctx.actor(),
                format!("order {} status {} -> {}", order.id, order.status, request.target),
            );

        for effect in OrderStatus::effects(order.status, request.target) {
            if effect == Effect::CancelActivePickup {
                if let Some(pickup) = self.store.active_pickup_for_order(order.id).await? {
                    self.pickups.stage_cancel(&mut changes, ctx.actor(), &pickup);
                }
                changes.write(Write::NoOpenPickup { order_id: order.id });
            }
        }

        self.store.commit(changes).await.inspect_err(|err| {
            if matches!(err, CoreError::Conflict(_)) {
                warn!(order_id = %order.id, "Order changed concurrently; transition rejected");
            }
        })?;

        info!(order_id = %order.id, from = %order.status, to = %request.target, "Order status changed");
        Ok(TransitionOutcome::applied(order.status, request.target))
    }

    async fn load(&self, order_id: Uuid) -> CoreResult<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("order", order_id))
    }
}
