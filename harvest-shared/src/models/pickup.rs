use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickupStatus {
    Pending,
    Scheduled,
    InTransit,
    Completed,
    Canceled,
}

impl PickupStatus {
    pub const ALL: [PickupStatus; 5] = [
        PickupStatus::Pending,
        PickupStatus::Scheduled,
        PickupStatus::InTransit,
        PickupStatus::Completed,
        PickupStatus::Canceled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PickupStatus::Pending => "pending",
            PickupStatus::Scheduled => "scheduled",
            PickupStatus::InTransit => "in_transit",
            PickupStatus::Completed => "completed",
            PickupStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PickupStatus::Completed | PickupStatus::Canceled)
    }

    /// A driver is committed to the pickup.
    pub fn is_active_assignment(self) -> bool {
        matches!(self, PickupStatus::Scheduled | PickupStatus::InTransit)
    }
}

impl fmt::Display for PickupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PickupStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PickupStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ModelError::UnknownStatus {
                kind: "pickup",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPickup {
    pub order_id: Uuid,
    pub location: String,
    pub scheduled_for: DateTime<Utc>,
    #[serde(default)]
    pub contact_person: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// The scheduled hand-off fulfilling an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pickup {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: PickupStatus,
    pub scheduled_for: DateTime<Utc>,
    pub location: String,
    pub contact_person: Option<String>,
    pub driver_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pickup {
    pub fn new(new: NewPickup, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: new.order_id,
            status: PickupStatus::Pending,
            scheduled_for: new.scheduled_for,
            location: new.location,
            contact_person: new.contact_person,
            driver_id: None,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Pickup joined with the owning order's customer, as listed and exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupView {
    #[serde(flatten)]
    pub pickup: Pickup,
    pub customer_name: String,
}
