pub mod engine;
pub mod policy;
pub mod report;

pub use engine::SalesAggregationEngine;
pub use policy::RevenuePolicy;
pub use report::{CategorySales, DailyRevenue, ProductSales, SalesReport, Trend};
