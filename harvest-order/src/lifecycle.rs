//! Transition and effect tables for the order and pickup state machines.
//!
//! Every status change consults these tables. Nothing else decides whether an
//! edge is legal or which secondary writes it triggers.

use harvest_core::{CoreError, CoreResult};
use harvest_shared::{OrderStatus, PickupStatus};
use std::fmt;
use uuid::Uuid;

/// Secondary work attached to a status edge, executed in the same change set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Cancel the order's non-terminal pickup.
    CancelActivePickup,
    /// Move the assigned driver from available to busy.
    OccupyDriver,
    /// Count one completed pickup for the assigned driver.
    RecordDriverCompletion,
    /// Return the assigned driver to available if nothing else holds them.
    ReleaseDriver,
}

/// One row of an effect table. `from: None` matches any source status.
pub struct EffectRule<S: 'static> {
    pub from: Option<S>,
    pub to: S,
    pub effects: &'static [Effect],
}

pub trait Lifecycle: Copy + Eq + fmt::Display + 'static {
    const ENTITY: &'static str;
    /// Every legal edge. Anything absent is rejected.
    const EDGES: &'static [(Self, Self)];
    const EFFECTS: &'static [EffectRule<Self>];

    fn is_terminal(self) -> bool;

    fn can_transition(self, to: Self) -> bool {
        Self::EDGES.contains(&(self, to))
    }

    fn effects(from: Self, to: Self) -> Vec<Effect> {
        Self::EFFECTS
            .iter()
            .filter(|rule| rule.to == to && rule.from.map_or(true, |f| f == from))
            .flat_map(|rule| rule.effects.iter().copied())
            .collect()
    }
}

impl Lifecycle for OrderStatus {
    const ENTITY: &'static str = "order";

    const EDGES: &'static [(Self, Self)] = &[
        (OrderStatus::Pending, OrderStatus::Processing),
        (OrderStatus::Processing, OrderStatus::Ready),
        (OrderStatus::Ready, OrderStatus::Completed),
        (OrderStatus::Pending, OrderStatus::Canceled),
        (OrderStatus::Processing, OrderStatus::Canceled),
        (OrderStatus::Ready, OrderStatus::Canceled),
    ];

    const EFFECTS: &'static [EffectRule<Self>] = &[EffectRule {
        from: None,
        to: OrderStatus::Canceled,
        effects: &[Effect::CancelActivePickup],
    }];

    fn is_terminal(self) -> bool {
        OrderStatus::is_terminal(self)
    }
}

impl Lifecycle for PickupStatus {
    const ENTITY: &'static str = "pickup";

    const EDGES: &'static [(Self, Self)] = &[
        (PickupStatus::Pending, PickupStatus::Scheduled),
        (PickupStatus::Scheduled, PickupStatus::InTransit),
        (PickupStatus::InTransit, PickupStatus::Completed),
        (PickupStatus::Pending, PickupStatus::Canceled),
        (PickupStatus::Scheduled, PickupStatus::Canceled),
        (PickupStatus::InTransit, PickupStatus::Canceled),
    ];

    const EFFECTS: &'static [EffectRule<Self>] = &[
        EffectRule {
            from: Some(PickupStatus::Pending),
            to: PickupStatus::Scheduled,
            effects: &[Effect::OccupyDriver],
        },
        EffectRule {
            from: None,
            to: PickupStatus::Completed,
            effects: &[Effect::RecordDriverCompletion, Effect::ReleaseDriver],
        },
        EffectRule {
            from: None,
            to: PickupStatus::Canceled,
            effects: &[Effect::ReleaseDriver],
        },
    ];

    fn is_terminal(self) -> bool {
        PickupStatus::is_terminal(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Already in the target status; report success without writing.
    NoOp,
    Apply,
}

/// Checks a requested change against the stored status.
///
/// `expected` is the caller's belief of the current status. A stale belief is a
/// conflict, not an invalid transition, so the caller knows to refresh.
pub fn decide<S: Lifecycle>(id: Uuid, stored: S, expected: Option<S>, target: S) -> CoreResult<Decision> {
    if stored == target {
        return Ok(Decision::NoOp);
    }

    if let Some(expected) = expected {
        if expected != stored {
            return Err(CoreError::Conflict(format!(
                "{} {} is {}, not {}",
                S::ENTITY,
                id,
                stored,
                expected
            )));
        }
    }

    if !stored.can_transition(target) {
        let reason = if stored.is_terminal() {
            format!("{} {} is {} and cannot change", S::ENTITY, id, stored)
        } else {
            format!("{} {} cannot move from {} to {}", S::ENTITY, id, stored, target)
        };
        return Err(CoreError::InvalidTransition(reason));
    }

    Ok(Decision::Apply)
}
