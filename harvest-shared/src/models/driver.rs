use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::ModelError;

/// Dispatch eligibility of a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Busy,
    Offline,
}

impl Availability {
    pub const ALL: [Availability; 3] = [
        Availability::Available,
        Availability::Busy,
        Availability::Offline,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Availability::Available => "available",
            Availability::Busy => "busy",
            Availability::Offline => "offline",
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Availability {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Availability::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ModelError::UnknownStatus {
                kind: "driver availability",
                value: s.to_string(),
            })
    }
}

/// Customer score for a completed pickup, 1 through 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Rating {
    type Error = ModelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (1..=5).contains(&value) {
            Ok(Rating(value))
        } else {
            Err(ModelError::InvalidRating(value))
        }
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> u8 {
        rating.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub vehicle: String,
    pub availability: Availability,
    pub rating_sum: u64,
    pub rating_count: u64,
    pub completed_pickups: u64,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    pub fn new(id: Uuid, name: String, vehicle: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            vehicle,
            availability: Availability::Offline,
            rating_sum: 0,
            rating_count: 0,
            completed_pickups: 0,
            updated_at: now,
        }
    }

    /// Mean rating, absent until the first rated completion.
    pub fn rating(&self) -> Option<f64> {
        (self.rating_count > 0).then(|| self.rating_sum as f64 / self.rating_count as f64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverStatistics {
    pub total_drivers: u64,
    pub available: u64,
    pub busy: u64,
    pub offline: u64,
    pub mean_rating: Option<f64>,
    pub total_completed_pickups: u64,
}

impl DriverStatistics {
    pub fn from_drivers<'a>(drivers: impl IntoIterator<Item = &'a Driver>) -> Self {
        let mut stats = DriverStatistics::default();
        let mut rating_total = 0.0;
        let mut rated = 0u64;

        for driver in drivers {
            stats.total_drivers += 1;
            match driver.availability {
                Availability::Available => stats.available += 1,
                Availability::Busy => stats.busy += 1,
                Availability::Offline => stats.offline += 1,
            }
            stats.total_completed_pickups += driver.completed_pickups;
            if let Some(rating) = driver.rating() {
                rating_total += rating;
                rated += 1;
            }
        }

        if rated > 0 {
            let mean = rating_total / rated as f64;
            stats.mean_rating = Some((mean * 100.0).round() / 100.0);
        }
        stats
    }
}
