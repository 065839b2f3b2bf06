//! Read-only aggregation over placed orders.
//!
//! Figures are computed from each order's fixed total and its line-item
//! snapshots, so later catalog edits never change historical numbers.

use chrono::NaiveDate;
use harvest_core::{Capability, CoreError, CoreResult, OrderRepository, RequestContext};
use harvest_shared::{DateRange, Money, Order};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::policy::RevenuePolicy;
use crate::report::{CategorySales, DailyRevenue, ProductSales, SalesReport, Trend};

#[derive(Clone)]
pub struct SalesAggregationEngine {
    orders: Arc<dyn OrderRepository>,
    policy: RevenuePolicy,
    top_products_limit: usize,
}

impl SalesAggregationEngine {
    pub fn new(orders: Arc<dyn OrderRepository>, policy: RevenuePolicy, top_products_limit: usize) -> Self {
        Self {
            orders,
            policy,
            top_products_limit,
        }
    }

    /// Qualifying revenue per calendar day, date-ordered. Days without sales are omitted.
    pub async fn revenue_by_date(&self, ctx: &RequestContext, range: DateRange) -> CoreResult<Vec<DailyRevenue>> {
        ctx.require(Capability::ViewReports)?;
        let orders = self.qualifying(Some(range)).await?;
        revenue_by_date(&orders)
    }

    /// Best sellers in `range` by units, ties broken by revenue.
    pub async fn top_products(
        &self,
        ctx: &RequestContext,
        range: DateRange,
        n: usize,
    ) -> CoreResult<Vec<ProductSales>> {
        ctx.require(Capability::ViewReports)?;
        let current = self.qualifying(Some(range)).await?;
        let previous = match range.preceding() {
            Some(preceding) => self.qualifying(Some(preceding)).await?,
            None => Vec::new(),
        };
        top_products(&current, &previous, n)
    }

    /// Revenue per product category across every recorded sale.
    pub async fn sales_by_category(&self, ctx: &RequestContext) -> CoreResult<Vec<CategorySales>> {
        ctx.require(Capability::ViewReports)?;
        let orders = self.qualifying(None).await?;
        sales_by_category(&orders)
    }

    pub async fn average_order_value(&self, ctx: &RequestContext, range: DateRange) -> CoreResult<Money> {
        ctx.require(Capability::ViewReports)?;
        let orders = self.qualifying(Some(range)).await?;
        average_order_value(&orders)
    }

    pub async fn report(&self, ctx: &RequestContext, range: DateRange) -> CoreResult<SalesReport> {
        ctx.require(Capability::ViewReports)?;

        let current = self.qualifying(Some(range)).await?;
        let previous = match range.preceding() {
            Some(preceding) => self.qualifying(Some(preceding)).await?,
            None => Vec::new(),
        };
        let all_time = self.qualifying(None).await?;

        let report = SalesReport {
            range,
            total_revenue: total_revenue(&current)?,
            order_count: current.len() as u64,
            average_order_value: average_order_value(&current)?,
            revenue_by_date: revenue_by_date(&current)?,
            top_products: top_products(&current, &previous, self.top_products_limit)?,
            categories: sales_by_category(&all_time)?,
        };

        debug!(
            start = %range.start,
            end = %range.end,
            orders = report.order_count,
            policy = %self.policy,
            "Sales report assembled"
        );
        Ok(report)
    }

    async fn qualifying(&self, range: Option<DateRange>) -> CoreResult<Vec<Order>> {
        let mut orders = self.orders.list_orders(range).await?;
        orders.retain(|order| self.policy.qualifies(order.status));
        Ok(orders)
    }
}

fn overflow() -> CoreError {
    CoreError::Validation("sales figures exceed the representable amount".to_string())
}

fn revenue_by_date(orders: &[Order]) -> CoreResult<Vec<DailyRevenue>> {
    let mut days: BTreeMap<NaiveDate, (Money, u64)> = BTreeMap::new();
    for order in orders {
        let day = days.entry(order.created_at.date_naive()).or_default();
        day.0 = day.0.checked_add(order.total).ok_or_else(overflow)?;
        day.1 += 1;
    }
    Ok(days
        .into_iter()
        .map(|(date, (revenue, orders))| DailyRevenue { date, revenue, orders })
        .collect())
}

fn total_revenue(orders: &[Order]) -> CoreResult<Money> {
    Money::checked_sum(orders.iter().map(|o| o.total)).ok_or_else(overflow)
}

fn average_order_value(orders: &[Order]) -> CoreResult<Money> {
    Ok(total_revenue(orders)?.div_rounded(orders.len() as u64))
}

#[derive(Default)]
struct Tally {
    name: String,
    category: String,
    units: u64,
    revenue: Money,
}

fn tally_products(orders: &[Order]) -> CoreResult<HashMap<Uuid, Tally>> {
    let mut products: HashMap<Uuid, Tally> = HashMap::new();
    for item in orders.iter().flat_map(|o| o.items.iter()) {
        let subtotal = item.subtotal().ok_or_else(overflow)?;
        let tally = products.entry(item.product_id).or_insert_with(|| Tally {
            name: item.product_name.clone(),
            category: item.category.clone(),
            ..Tally::default()
        });
        tally.units += u64::from(item.quantity);
        tally.revenue = tally.revenue.checked_add(subtotal).ok_or_else(overflow)?;
    }
    Ok(products)
}

fn top_products(current: &[Order], previous: &[Order], n: usize) -> CoreResult<Vec<ProductSales>> {
    let previous = tally_products(previous)?;
    let mut ranked: Vec<ProductSales> = tally_products(current)?
        .into_iter()
        .map(|(product_id, tally)| {
            let previous_units = previous.get(&product_id).map_or(0, |p| p.units);
            ProductSales {
                product_id,
                product_name: tally.name,
                category: tally.category,
                units: tally.units,
                revenue: tally.revenue,
                previous_units,
                trend: Trend::between(previous_units, tally.units),
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.units
            .cmp(&a.units)
            .then(b.revenue.cmp(&a.revenue))
            .then_with(|| a.product_name.cmp(&b.product_name))
            .then(a.product_id.cmp(&b.product_id))
    });
    ranked.truncate(n);
    Ok(ranked)
}

fn sales_by_category(orders: &[Order]) -> CoreResult<Vec<CategorySales>> {
    let mut categories: HashMap<String, (u64, Money)> = HashMap::new();
    for item in orders.iter().flat_map(|o| o.items.iter()) {
        let subtotal = item.subtotal().ok_or_else(overflow)?;
        let entry = categories.entry(item.category.clone()).or_default();
        entry.0 += u64::from(item.quantity);
        entry.1 = entry.1.checked_add(subtotal).ok_or_else(overflow)?;
    }

    let total = Money::checked_sum(categories.values().map(|(_, revenue)| *revenue)).ok_or_else(overflow)?;
    let mut rows = categories
        .into_iter()
        .map(|(category, (units, revenue))| {
            Ok(CategorySales {
                category,
                units,
                share: revenue.share_of(total).ok_or_else(overflow)?,
                revenue,
            })
        })
        .collect::<CoreResult<Vec<CategorySales>>>()?;
    rows.sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| a.category.cmp(&b.category)));
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use harvest_core::{ChangeSet, ChangeStore, Write};
    use harvest_shared::{LineItem, NewOrder, OrderStatus};
    use harvest_store::MemoryStore;

    struct Product {
        id: Uuid,
        name: &'static str,
        category: &'static str,
    }

    fn product(name: &'static str, category: &'static str) -> Product {
        Product {
            id: Uuid::new_v4(),
            name,
            category,
        }
    }

    fn line(product: &Product, quantity: u32, price: &str) -> LineItem {
        LineItem {
            product_id: product.id,
            product_name: product.name.to_string(),
            category: product.category.to_string(),
            quantity,
            unit_price: price.parse().unwrap(),
        }
    }

    fn order_on(day: u32, status: OrderStatus, items: Vec<LineItem>) -> Order {
        let mut order = Order::place(
            NewOrder {
                customer_id: "c-1".into(),
                customer_name: "Ada".into(),
                items,
                placed_at: Some(Utc.with_ymd_and_hms(2024, 3, day, 14, 0, 0).unwrap()),
            },
            Utc::now(),
        )
        .unwrap();
        order.status = status;
        order
    }

    async fn engine_with(orders: Vec<Order>, policy: RevenuePolicy) -> SalesAggregationEngine {
        let store = Arc::new(MemoryStore::new());
        let mut changes = ChangeSet::new(Utc::now());
        for order in orders {
            changes.write(Write::InsertOrder(order));
        }
        store.commit(changes).await.unwrap();
        SalesAggregationEngine::new(store, policy, 5)
    }

    fn march(start: u32, end: u32) -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 3, start).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, end).unwrap(),
        )
        .unwrap()
    }

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_revenue_by_date_is_exact() {
        let corn = product("Sweet Corn", "vegetables");
        let engine = engine_with(
            vec![
                order_on(3, OrderStatus::Completed, vec![line(&corn, 1, "150.00")]),
                order_on(1, OrderStatus::Completed, vec![line(&corn, 1, "200.50")]),
                order_on(2, OrderStatus::Completed, vec![line(&corn, 1, "75.25")]),
            ],
            RevenuePolicy::CompletedOnly,
        )
        .await;
        let ctx = RequestContext::new("analyst-1", "analyst", [], None);

        let days = engine.revenue_by_date(&ctx, march(1, 31)).await.unwrap();
        let figures: Vec<(u32, Money)> = days
            .iter()
            .map(|d| (chrono::Datelike::day(&d.date), d.revenue))
            .collect();
        assert_eq!(
            figures,
            vec![(1, money("200.50")), (2, money("75.25")), (3, money("150.00"))]
        );
        let total = Money::checked_sum(days.iter().map(|d| d.revenue)).unwrap();
        assert_eq!(total, money("425.75"));
        assert_eq!(total.to_string(), "425.75");
    }

    #[tokio::test]
    async fn test_policy_selects_orders() {
        let jam = product("Jam", "pantry");
        let orders = vec![
            order_on(1, OrderStatus::Completed, vec![line(&jam, 1, "10.00")]),
            order_on(1, OrderStatus::Pending, vec![line(&jam, 1, "5.00")]),
            order_on(1, OrderStatus::Canceled, vec![line(&jam, 1, "99.00")]),
        ];
        let ctx = RequestContext::system();

        let completed = engine_with(orders.clone(), RevenuePolicy::CompletedOnly).await;
        assert_eq!(completed.average_order_value(&ctx, march(1, 1)).await.unwrap(), money("10.00"));

        let with_pending = engine_with(orders, RevenuePolicy::IncludePending).await;
        assert_eq!(with_pending.average_order_value(&ctx, march(1, 1)).await.unwrap(), money("7.50"));
    }

    #[tokio::test]
    async fn test_average_of_nothing_is_zero() {
        let engine = engine_with(Vec::new(), RevenuePolicy::CompletedOnly).await;
        let value = engine
            .average_order_value(&RequestContext::system(), march(1, 31))
            .await
            .unwrap();
        assert_eq!(value, Money::ZERO);
    }

    #[tokio::test]
    async fn test_top_products_rank_and_trend() {
        let corn = product("Sweet Corn", "vegetables");
        let eggs = product("Eggs", "dairy");
        let honey = product("Honey", "pantry");
        let engine = engine_with(
            vec![
                // preceding period: 11-20 March
                order_on(15, OrderStatus::Completed, vec![line(&corn, 5, "1.00"), line(&eggs, 1, "4.00")]),
                // current period: 21-30 March
                order_on(21, OrderStatus::Completed, vec![line(&corn, 3, "1.00"), line(&eggs, 3, "4.00")]),
                order_on(25, OrderStatus::Completed, vec![line(&honey, 1, "12.00")]),
            ],
            RevenuePolicy::CompletedOnly,
        )
        .await;

        let top = engine
            .top_products(&RequestContext::system(), march(21, 30), 2)
            .await
            .unwrap();
        assert_eq!(top.len(), 2);
        // equal units; eggs wins on revenue
        assert_eq!(top[0].product_name, "Eggs");
        assert_eq!(top[0].revenue, money("12.00"));
        assert_eq!(top[0].trend, Trend::Up);
        assert_eq!(top[1].product_name, "Sweet Corn");
        assert_eq!(top[1].previous_units, 5);
        assert_eq!(top[1].trend, Trend::Down);
    }

    #[tokio::test]
    async fn test_categories_cover_all_time_with_shares() {
        let corn = product("Sweet Corn", "vegetables");
        let jam = product("Jam", "pantry");
        let engine = engine_with(
            vec![
                order_on(1, OrderStatus::Completed, vec![line(&corn, 3, "10.00")]),
                order_on(28, OrderStatus::Completed, vec![line(&jam, 1, "10.00")]),
            ],
            RevenuePolicy::CompletedOnly,
        )
        .await;

        let rows = engine.sales_by_category(&RequestContext::system()).await.unwrap();
        assert_eq!(rows[0].category, "vegetables");
        assert_eq!(rows[0].share.to_string(), "75.0");
        assert_eq!(rows[1].share.to_string(), "25.0");
    }

    #[tokio::test]
    async fn test_revenue_past_currency_range_is_rejected() {
        let tractor = product("Tractor", "machinery");
        let engine = engine_with(
            vec![
                order_on(4, OrderStatus::Completed, vec![line(&tractor, 1, "500000000000000000000000000.00")]),
                order_on(4, OrderStatus::Completed, vec![line(&tractor, 1, "500000000000000000000000000.00")]),
            ],
            RevenuePolicy::CompletedOnly,
        )
        .await;
        let ctx = RequestContext::system();

        let err = engine.revenue_by_date(&ctx, march(1, 31)).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        let err = engine.average_order_value(&ctx, march(1, 31)).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        let err = engine.sales_by_category(&ctx).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        let err = engine.report(&ctx, march(1, 31)).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_report_assembles_figures() {
        let corn = product("Sweet Corn", "vegetables");
        let engine = engine_with(
            vec![
                order_on(1, OrderStatus::Completed, vec![line(&corn, 1, "10.00")]),
                order_on(2, OrderStatus::Completed, vec![line(&corn, 2, "10.00")]),
                order_on(2, OrderStatus::Completed, vec![line(&corn, 1, "0.01")]),
            ],
            RevenuePolicy::CompletedOnly,
        )
        .await;

        let report = engine.report(&RequestContext::system(), march(1, 7)).await.unwrap();
        assert_eq!(report.order_count, 3);
        assert_eq!(report.total_revenue, money("30.01"));
        assert_eq!(report.average_order_value, money("10.00"));
        assert_eq!(report.revenue_by_date.len(), 2);
        assert_eq!(report.top_products[0].units, 4);
    }

    #[tokio::test]
    async fn test_requires_report_capability() {
        let engine = engine_with(Vec::new(), RevenuePolicy::CompletedOnly).await;
        let dispatcher = RequestContext::new("d-1", "dispatcher", [], None);
        let err = engine.report(&dispatcher, march(1, 2)).await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }
}
