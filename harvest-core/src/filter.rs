use chrono::NaiveDate;
use harvest_shared::{PickupStatus, PickupView};
use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

/// Typed pickup filter shared by listing and export.
///
/// Every field narrows the result; an empty filter matches all pickups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupFilter {
    pub status: Option<PickupStatus>,
    /// Case-insensitive substring of the order id or the customer name.
    pub search: Option<String>,
    /// Case-insensitive substring of the location.
    pub location: Option<String>,
    /// Inclusive lower bound on the pickup date.
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on the pickup date.
    pub to: Option<NaiveDate>,
}

impl PickupFilter {
    pub fn with_status(mut self, status: PickupStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// Blank search strings are treated as absent.
    pub fn normalized(mut self) -> Self {
        self.search = non_blank(self.search);
        self.location = non_blank(self.location);
        self
    }

    pub fn matches(&self, view: &PickupView) -> bool {
        let pickup = &view.pickup;
        if self.status.is_some_and(|status| status != pickup.status) {
            return false;
        }

        let date = pickup.scheduled_for.date_naive();
        if self.from.is_some_and(|from| date < from) || self.to.is_some_and(|to| date > to) {
            return false;
        }

        if let Some(location) = &self.location {
            if !contains_ignore_case(&pickup.location, location) {
                return false;
            }
        }

        if let Some(search) = &self.search {
            let order_id = pickup.order_id.to_string();
            if !contains_ignore_case(&order_id, search)
                && !contains_ignore_case(&view.customer_name, search)
            {
                return false;
            }
        }

        true
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

impl Page {
    /// Clamps `limit` into `1..=max_limit`. Offsets must fit a signed 64-bit
    /// SQL parameter.
    pub fn new(offset: u64, limit: u64, max_limit: u64) -> CoreResult<Self> {
        let max_offset = i64::MAX as u64;
        if offset > max_offset {
            return Err(CoreError::Validation(format!(
                "offset {} exceeds {}",
                offset, max_offset
            )));
        }
        Ok(Self {
            offset,
            limit: limit.clamp(1, max_limit.clamp(1, max_offset)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PickupPage {
    pub items: Vec<PickupView>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use harvest_shared::{NewPickup, Pickup};
    use uuid::Uuid;

    fn view(status: PickupStatus, day: u32, location: &str, customer: &str) -> PickupView {
        let mut pickup = Pickup::new(
            NewPickup {
                order_id: Uuid::new_v4(),
                location: location.to_string(),
                scheduled_for: Utc.with_ymd_and_hms(2024, 5, day, 9, 30, 0).unwrap(),
                contact_person: None,
                notes: None,
            },
            Utc::now(),
        );
        pickup.status = status;
        PickupView {
            pickup,
            customer_name: customer.to_string(),
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    #[test]
    fn test_status_and_inclusive_dates() {
        let filter = PickupFilter::default()
            .with_status(PickupStatus::Scheduled)
            .between(date(10), date(12));

        assert!(filter.matches(&view(PickupStatus::Scheduled, 10, "North Barn", "Ada")));
        assert!(filter.matches(&view(PickupStatus::Scheduled, 12, "North Barn", "Ada")));
        assert!(!filter.matches(&view(PickupStatus::Scheduled, 13, "North Barn", "Ada")));
        assert!(!filter.matches(&view(PickupStatus::Pending, 11, "North Barn", "Ada")));
    }

    #[test]
    fn test_search_covers_order_id_and_customer() {
        let v = view(PickupStatus::Pending, 1, "Market Square", "Grace Hopper");
        let by_name = PickupFilter {
            search: Some("hopper".into()),
            ..Default::default()
        };
        assert!(by_name.matches(&v));

        let prefix = v.pickup.order_id.to_string()[..8].to_uppercase();
        let by_id = PickupFilter {
            search: Some(prefix),
            ..Default::default()
        };
        assert!(by_id.matches(&v));

        let by_location = PickupFilter {
            location: Some("square".into()),
            ..Default::default()
        };
        assert!(by_location.matches(&v));
    }

    #[test]
    fn test_blank_search_is_ignored() {
        let filter = PickupFilter {
            search: Some("   ".into()),
            ..Default::default()
        }
        .normalized();
        assert!(filter.search.is_none());
    }

    #[test]
    fn test_page_clamps_limit() {
        assert_eq!(Page::new(0, 0, 50).unwrap().limit, 1);
        assert_eq!(Page::new(0, 500, 50).unwrap().limit, 50);
    }

    #[test]
    fn test_page_rejects_offset_beyond_sql_range() {
        assert_eq!(Page::new(i64::MAX as u64, 10, 50).unwrap().offset, i64::MAX as u64);
        let err = Page::new(i64::MAX as u64 + 1, 10, 50).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(Page::new(u64::MAX, 10, 50).is_err());
    }
}
