//! Atomic units of work.
//!
//! Every mutation in the core is described as a [`ChangeSet`]: guarded writes
//! plus the audit entries that document them. A [`crate::ChangeStore`] applies
//! a change set entirely or not at all. A guard that no longer holds at commit
//! time fails the whole set with [`crate::CoreError::Conflict`].

use chrono::{DateTime, Utc};
use harvest_shared::{
    Availability, AuditEntry, Order, OrderStatus, Pickup, PickupStatus, Rating,
};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    InsertOrder(Order),
    /// Guarded by the owning order still being `order_status` and by "no other
    /// non-canceled pickup exists for the order".
    InsertPickup {
        pickup: Pickup,
        order_status: OrderStatus,
    },
    OrderStatus {
        order_id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
    },
    PickupStatus {
        pickup_id: Uuid,
        expected: PickupStatus,
        next: PickupStatus,
        assign_driver: Option<Uuid>,
    },
    /// `expected: None` is an unconditional administrative override.
    DriverAvailability {
        driver_id: Uuid,
        expected: Option<Availability>,
        next: Availability,
    },
    DriverCompletion {
        driver_id: Uuid,
        rating: Option<Rating>,
    },
    /// Not a guard: a busy driver with no remaining scheduled or in-transit
    /// pickup (after the preceding writes) becomes available, otherwise nothing.
    ReleaseDriver { driver_id: Uuid },
    /// Guard: after the preceding writes, the order has no pending, scheduled
    /// or in-transit pickup. Closes the gap between a cancel's pickup lookup and
    /// its commit.
    NoOpenPickup { order_id: Uuid },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    pub at: DateTime<Utc>,
    pub writes: Vec<Write>,
    pub audit: Vec<AuditEntry>,
}

impl ChangeSet {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            at,
            writes: Vec::new(),
            audit: Vec::new(),
        }
    }

    pub fn write(&mut self, write: Write) -> &mut Self {
        self.writes.push(write);
        self
    }

    pub fn audit(&mut self, actor: Option<&str>, description: impl Into<String>) -> &mut Self {
        self.audit
            .push(AuditEntry::new(actor.map(str::to_string), description, self.at));
        self
    }
}
