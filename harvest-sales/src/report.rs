use chrono::NaiveDate;
use harvest_shared::{DateRange, Money, Percent};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: Money,
    pub orders: u64,
}

/// Direction of a product's unit sales against the preceding period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Flat,
    /// No sales in the preceding period.
    New,
}

impl Trend {
    pub fn between(previous_units: u64, units: u64) -> Self {
        if previous_units == 0 {
            return if units == 0 { Trend::Flat } else { Trend::New };
        }
        match units.cmp(&previous_units) {
            std::cmp::Ordering::Greater => Trend::Up,
            std::cmp::Ordering::Less => Trend::Down,
            std::cmp::Ordering::Equal => Trend::Flat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSales {
    pub product_id: Uuid,
    pub product_name: String,
    pub category: String,
    pub units: u64,
    pub revenue: Money,
    pub previous_units: u64,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySales {
    pub category: String,
    pub units: u64,
    pub revenue: Money,
    /// Share of all category revenue, one decimal place.
    pub share: Percent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesReport {
    pub range: DateRange,
    pub total_revenue: Money,
    pub order_count: u64,
    pub average_order_value: Money,
    pub revenue_by_date: Vec<DailyRevenue>,
    pub top_products: Vec<ProductSales>,
    pub categories: Vec<CategorySales>,
}
