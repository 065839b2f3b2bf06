use harvest_core::CoreError;
use harvest_shared::OrderStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which orders count as sales.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevenuePolicy {
    #[default]
    CompletedOnly,
    /// Also counts orders still awaiting processing.
    IncludePending,
}

impl RevenuePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            RevenuePolicy::CompletedOnly => "completed_only",
            RevenuePolicy::IncludePending => "include_pending",
        }
    }

    pub fn qualifies(self, status: OrderStatus) -> bool {
        match self {
            RevenuePolicy::CompletedOnly => status == OrderStatus::Completed,
            RevenuePolicy::IncludePending => {
                matches!(status, OrderStatus::Completed | OrderStatus::Pending)
            }
        }
    }
}

impl fmt::Display for RevenuePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevenuePolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed_only" => Ok(RevenuePolicy::CompletedOnly),
            "include_pending" => Ok(RevenuePolicy::IncludePending),
            other => Err(CoreError::Validation(format!(
                "unknown revenue policy '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualifying_statuses() {
        assert!(RevenuePolicy::CompletedOnly.qualifies(OrderStatus::Completed));
        assert!(!RevenuePolicy::CompletedOnly.qualifies(OrderStatus::Pending));
        assert!(RevenuePolicy::IncludePending.qualifies(OrderStatus::Pending));
        assert!(!RevenuePolicy::IncludePending.qualifies(OrderStatus::Canceled));
        assert!(!RevenuePolicy::IncludePending.qualifies(OrderStatus::Ready));
    }

    #[test]
    fn test_parse() {
        assert_eq!("include_pending".parse::<RevenuePolicy>().unwrap(), RevenuePolicy::IncludePending);
        assert!("everything".parse::<RevenuePolicy>().is_err());
    }
}
