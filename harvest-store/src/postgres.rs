//! Postgres-backed [`FulfillmentStore`](harvest_core::FulfillmentStore).
//!
//! A change set runs in one transaction. Status guards are compare-and-swap
//! updates (`... WHERE status = $expected`); a guard that matches no row rolls
//! the transaction back and surfaces as a conflict.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harvest_core::{
    AuditLog, ChangeSet, ChangeStore, CoreError, CoreResult, DriverRepository, OrderRepository,
    Page, PickupFilter, PickupPage, PickupRepository, Write,
};
use harvest_shared::{
    AuditEntry, DateRange, Driver, LineItem, Money, Order, Pickup, PickupView,
};
use rust_decimal::Decimal;
use sqlx::postgres::PgQueryResult;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, error};
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

const PICKUP_COLUMNS: &str = "p.id, p.order_id, p.status, p.scheduled_for, p.location, \
     p.contact_person, p.driver_id, p.notes, p.created_at, p.updated_at, o.customer_name";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    customer_id: String,
    customer_name: String,
    status: String,
    total: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct LineRow {
    order_id: Uuid,
    product_id: Uuid,
    product_name: String,
    category: String,
    quantity: i32,
    unit_price: Decimal,
}

#[derive(sqlx::FromRow)]
struct PickupRow {
    id: Uuid,
    order_id: Uuid,
    status: String,
    scheduled_for: DateTime<Utc>,
    location: String,
    contact_person: Option<String>,
    driver_id: Option<Uuid>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    customer_name: String,
}

#[derive(sqlx::FromRow)]
struct DriverRow {
    id: Uuid,
    name: String,
    vehicle: String,
    availability: String,
    rating_sum: i64,
    rating_count: i64,
    completed_pickups: i64,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    actor: Option<String>,
    description: String,
    recorded_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, lines: Vec<LineRow>) -> CoreResult<Order> {
        let items = lines
            .into_iter()
            .map(|line| {
                Ok(LineItem {
                    product_id: line.product_id,
                    product_name: line.product_name,
                    category: line.category,
                    quantity: u32::try_from(line.quantity).map_err(corrupt)?,
                    unit_price: Money::try_from(line.unit_price).map_err(corrupt)?,
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(Order {
            id: self.id,
            customer_id: self.customer_id,
            customer_name: self.customer_name,
            items,
            total: Money::try_from(self.total).map_err(corrupt)?,
            status: self.status.parse().map_err(corrupt)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl TryFrom<PickupRow> for PickupView {
    type Error = CoreError;

    fn try_from(row: PickupRow) -> CoreResult<Self> {
        Ok(PickupView {
            pickup: Pickup {
                id: row.id,
                order_id: row.order_id,
                status: row.status.parse().map_err(corrupt)?,
                scheduled_for: row.scheduled_for,
                location: row.location,
                contact_person: row.contact_person,
                driver_id: row.driver_id,
                notes: row.notes,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            customer_name: row.customer_name,
        })
    }
}

impl TryFrom<DriverRow> for Driver {
    type Error = CoreError;

    fn try_from(row: DriverRow) -> CoreResult<Self> {
        Ok(Driver {
            id: row.id,
            name: row.name,
            vehicle: row.vehicle,
            availability: row.availability.parse().map_err(corrupt)?,
            rating_sum: u64::try_from(row.rating_sum).map_err(corrupt)?,
            rating_count: u64::try_from(row.rating_count).map_err(corrupt)?,
            completed_pickups: u64::try_from(row.completed_pickups).map_err(corrupt)?,
            updated_at: row.updated_at,
        })
    }
}

fn db_error(err: sqlx::Error) -> CoreError {
    if let Some(db) = err.as_database_error() {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return CoreError::Conflict(format!(
                "{} already exists",
                db.constraint().unwrap_or("record")
            ));
        }
    }
    error!(error = %err, "Database error");
    CoreError::Persistence(err.to_string())
}

fn out_of_range(err: impl fmt::Display) -> CoreError {
    CoreError::Validation(format!("page bounds out of range: {}", err))
}

fn corrupt(err: impl fmt::Display) -> CoreError {
    error!(error = %err, "Stored row failed to decode");
    CoreError::Persistence(format!("stored row is invalid: {}", err))
}

/// Loads line items for the given orders, keyed by order id, in stored order.
async fn lines_for(pool: &PgPool, order_ids: &[Uuid]) -> CoreResult<HashMap<Uuid, Vec<LineRow>>> {
    let rows: Vec<LineRow> = sqlx::query_as(
        "SELECT order_id, product_id, product_name, category, quantity, unit_price \
         FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position",
    )
    .bind(order_ids)
    .fetch_all(pool)
    .await
    .map_err(db_error)?;

    let mut grouped: HashMap<Uuid, Vec<LineRow>> = HashMap::new();
    for row in rows {
        grouped.entry(row.order_id).or_default().push(row);
    }
    Ok(grouped)
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(
            "SELECT id, customer_id, customer_name, status, total, created_at, updated_at \
             FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut lines = lines_for(&self.pool, &[id]).await?;
        row.into_order(lines.remove(&id).unwrap_or_default()).map(Some)
    }

    async fn list_orders(&self, range: Option<DateRange>) -> CoreResult<Vec<Order>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, customer_id, customer_name, status, total, created_at, updated_at \
             FROM orders",
        );
        if let Some(range) = range {
            qb.push(" WHERE (created_at AT TIME ZONE 'UTC')::date BETWEEN ")
                .push_bind(range.start)
                .push(" AND ")
                .push_bind(range.end);
        }
        qb.push(" ORDER BY created_at, id");

        let rows: Vec<OrderRow> = qb
            .build_query_as::<OrderRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let mut lines = lines_for(&self.pool, &ids).await?;
        rows.into_iter()
            .map(|row| {
                let items = lines.remove(&row.id).unwrap_or_default();
                row.into_order(items)
            })
            .collect()
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    format!("%{}%", escaped)
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &PickupFilter) {
    qb.push(" FROM pickups p JOIN orders o ON o.id = p.order_id WHERE TRUE");
    if let Some(status) = filter.status {
        qb.push(" AND p.status = ").push_bind(status.as_str());
    }
    if let Some(search) = &filter.search {
        let pattern = escape_like(search);
        qb.push(" AND (p.order_id::text ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR o.customer_name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(location) = &filter.location {
        qb.push(" AND p.location ILIKE ").push_bind(escape_like(location));
    }
    if let Some(from) = filter.from {
        qb.push(" AND (p.scheduled_for AT TIME ZONE 'UTC')::date >= ")
            .push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND (p.scheduled_for AT TIME ZONE 'UTC')::date <= ")
            .push_bind(to);
    }
}

#[async_trait]
impl PickupRepository for PgStore {
    async fn get_pickup(&self, id: Uuid) -> CoreResult<Option<Pickup>> {
        let row: Option<PickupRow> = sqlx::query_as(&format!(
            "SELECT {} FROM pickups p JOIN orders o ON o.id = p.order_id WHERE p.id = $1",
            PICKUP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(|row| PickupView::try_from(row).map(|view| view.pickup))
            .transpose()
    }

    async fn active_pickup_for_order(&self, order_id: Uuid) -> CoreResult<Option<Pickup>> {
        let row: Option<PickupRow> = sqlx::query_as(&format!(
            "SELECT {} FROM pickups p JOIN orders o ON o.id = p.order_id \
             WHERE p.order_id = $1 AND p.status NOT IN ('completed', 'canceled')",
            PICKUP_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(|row| PickupView::try_from(row).map(|view| view.pickup))
            .transpose()
    }

    async fn query_pickups(&self, filter: &PickupFilter, page: Option<Page>) -> CoreResult<PickupPage> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*)");
        push_filter(&mut count, filter);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        let total = u64::try_from(total).map_err(corrupt)?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {}", PICKUP_COLUMNS));
        push_filter(&mut select, filter);
        select.push(" ORDER BY p.scheduled_for, p.id");
        let page = match page {
            Some(page) => {
                select
                    .push(" LIMIT ")
                    .push_bind(i64::try_from(page.limit).map_err(out_of_range)?)
                    .push(" OFFSET ")
                    .push_bind(i64::try_from(page.offset).map_err(out_of_range)?);
                page
            }
            None => Page {
                offset: 0,
                limit: total,
            },
        };

        let rows: Vec<PickupRow> = select
            .build_query_as::<PickupRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        let items = rows
            .into_iter()
            .map(PickupView::try_from)
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(PickupPage {
            items,
            total,
            offset: page.offset,
            limit: page.limit,
        })
    }
}

#[async_trait]
impl DriverRepository for PgStore {
    async fn get_driver(&self, id: Uuid) -> CoreResult<Option<Driver>> {
        let row: Option<DriverRow> = sqlx::query_as(
            "SELECT id, name, vehicle, availability, rating_sum, rating_count, completed_pickups, \
             updated_at FROM drivers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(Driver::try_from).transpose()
    }

    async fn list_drivers(&self) -> CoreResult<Vec<Driver>> {
        let rows: Vec<DriverRow> = sqlx::query_as(
            "SELECT id, name, vehicle, availability, rating_sum, rating_count, completed_pickups, \
             updated_at FROM drivers ORDER BY name, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(Driver::try_from).collect()
    }

    async fn insert_driver(&self, driver: &Driver) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO drivers (id, name, vehicle, availability, rating_sum, rating_count, \
             completed_pickups, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(driver.id)
        .bind(&driver.name)
        .bind(&driver.vehicle)
        .bind(driver.availability.as_str())
        .bind(driver.rating_sum as i64)
        .bind(driver.rating_count as i64)
        .bind(driver.completed_pickups as i64)
        .bind(driver.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }
}

async fn insert_audit(conn: &mut PgConnection, entry: &AuditEntry) -> CoreResult<()> {
    sqlx::query("INSERT INTO audit_log (id, actor, description, recorded_at) VALUES ($1, $2, $3, $4)")
        .bind(entry.id)
        .bind(entry.actor.as_deref())
        .bind(&entry.description)
        .bind(entry.recorded_at)
        .execute(conn)
        .await
        .map_err(db_error)?;
    Ok(())
}

#[async_trait]
impl AuditLog for PgStore {
    async fn append(&self, entry: AuditEntry) -> CoreResult<()> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        insert_audit(&mut *conn, &entry).await
    }

    async fn recent(&self, limit: usize) -> CoreResult<Vec<AuditEntry>> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            "SELECT id, actor, description, recorded_at FROM audit_log ORDER BY seq DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows
            .into_iter()
            .map(|row| AuditEntry {
                id: row.id,
                actor: row.actor,
                description: row.description,
                recorded_at: row.recorded_at,
            })
            .collect())
    }
}

/// Turns a guarded update that matched nothing into `NotFound` or `Conflict`.
async fn check_guard(
    conn: &mut PgConnection,
    result: PgQueryResult,
    entity: &'static str,
    id: Uuid,
    expected: &str,
) -> CoreResult<()> {
    if result.rows_affected() > 0 {
        return Ok(());
    }
    let sql = match entity {
        "order" => "SELECT status FROM orders WHERE id = $1",
        "pickup" => "SELECT status FROM pickups WHERE id = $1",
        _ => "SELECT availability FROM drivers WHERE id = $1",
    };
    let current: Option<String> = sqlx::query_scalar(sql)
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(db_error)?;
    match current {
        None => Err(CoreError::not_found(entity, id)),
        Some(current) => Err(CoreError::Conflict(format!(
            "{} {} is {}, not {}",
            entity, id, current, expected
        ))),
    }
}

async fn apply(conn: &mut PgConnection, write: &Write, at: DateTime<Utc>) -> CoreResult<()> {
    match write {
        Write::InsertOrder(order) => {
            sqlx::query(
                "INSERT INTO orders (id, customer_id, customer_name, status, total, \
                 created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(order.id)
            .bind(&order.customer_id)
            .bind(&order.customer_name)
            .bind(order.status.as_str())
            .bind(order.total.amount())
            .bind(order.created_at)
            .bind(order.updated_at)
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;

            for (position, item) in order.items.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO order_items (order_id, position, product_id, product_name, \
                     category, quantity, unit_price) VALUES ($1, $2, $3, $4, $5, $6, $7)",
                )
                .bind(order.id)
                .bind(position as i32)
                .bind(item.product_id)
                .bind(&item.product_name)
                .bind(&item.category)
                .bind(i32::try_from(item.quantity).map_err(corrupt)?)
                .bind(item.unit_price.amount())
                .execute(&mut *conn)
                .await
                .map_err(db_error)?;
            }
        }
        Write::InsertPickup {
            pickup,
            order_status,
        } => {
            // Row lock serializes against a concurrent order status change.
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                    .bind(pickup.order_id)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(db_error)?;
            match current {
                None => return Err(CoreError::not_found("order", pickup.order_id)),
                Some(current) if current != order_status.as_str() => {
                    return Err(CoreError::Conflict(format!(
                        "order {} is {}, not {}",
                        pickup.order_id, current, order_status
                    )));
                }
                Some(_) => {}
            }

            // pickups_one_open_per_order rejects a second open pickup
            sqlx::query(
                "INSERT INTO pickups (id, order_id, status, scheduled_for, location, \
                 contact_person, driver_id, notes, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(pickup.id)
            .bind(pickup.order_id)
            .bind(pickup.status.as_str())
            .bind(pickup.scheduled_for)
            .bind(&pickup.location)
            .bind(pickup.contact_person.as_deref())
            .bind(pickup.driver_id)
            .bind(pickup.notes.as_deref())
            .bind(pickup.created_at)
            .bind(pickup.updated_at)
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
        }
        Write::OrderStatus {
            order_id,
            expected,
            next,
        } => {
            let result = sqlx::query(
                "UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4",
            )
            .bind(next.as_str())
            .bind(at)
            .bind(order_id)
            .bind(expected.as_str())
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
            check_guard(conn, result, "order", *order_id, expected.as_str()).await?;
        }
        Write::PickupStatus {
            pickup_id,
            expected,
            next,
            assign_driver,
        } => {
            let result = sqlx::query(
                "UPDATE pickups SET status = $1, driver_id = COALESCE($2, driver_id), \
                 updated_at = $3 WHERE id = $4 AND status = $5",
            )
            .bind(next.as_str())
            .bind(*assign_driver)
            .bind(at)
            .bind(pickup_id)
            .bind(expected.as_str())
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
            check_guard(conn, result, "pickup", *pickup_id, expected.as_str()).await?;
        }
        Write::DriverAvailability {
            driver_id,
            expected,
            next,
        } => {
            let expected = expected.map(|a| a.as_str());
            let result = sqlx::query(
                "UPDATE drivers SET availability = $1, updated_at = $2 \
                 WHERE id = $3 AND ($4::text IS NULL OR availability = $4)",
            )
            .bind(next.as_str())
            .bind(at)
            .bind(driver_id)
            .bind(expected)
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
            check_guard(conn, result, "driver", *driver_id, expected.unwrap_or("any")).await?;
        }
        Write::DriverCompletion { driver_id, rating } => {
            let (sum, count) = match rating {
                Some(rating) => (i64::from(rating.value()), 1_i64),
                None => (0, 0),
            };
            let result = sqlx::query(
                "UPDATE drivers SET completed_pickups = completed_pickups + 1, \
                 rating_sum = rating_sum + $2, rating_count = rating_count + $3, updated_at = $4 \
                 WHERE id = $1",
            )
            .bind(driver_id)
            .bind(sum)
            .bind(count)
            .bind(at)
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
            if result.rows_affected() == 0 {
                return Err(CoreError::not_found("driver", driver_id));
            }
        }
        Write::NoOpenPickup { order_id } => {
            let open: Option<Uuid> = sqlx::query_scalar(
                "SELECT id FROM pickups WHERE order_id = $1 \
                 AND status NOT IN ('completed', 'canceled') LIMIT 1",
            )
            .bind(order_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_error)?;
            if let Some(open) = open {
                return Err(CoreError::Conflict(format!(
                    "order {} has open pickup {}",
                    order_id, open
                )));
            }
        }
        Write::ReleaseDriver { driver_id } => {
            sqlx::query(
                "UPDATE drivers SET availability = 'available', updated_at = $2 \
                 WHERE id = $1 AND availability = 'busy' AND NOT EXISTS ( \
                     SELECT 1 FROM pickups WHERE driver_id = $1 \
                     AND status IN ('scheduled', 'in_transit'))",
            )
            .bind(driver_id)
            .bind(at)
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
        }
    }
    Ok(())
}

#[async_trait]
impl ChangeStore for PgStore {
    async fn commit(&self, changes: ChangeSet) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // An early return drops `tx`, which rolls the transaction back.
        for write in &changes.writes {
            apply(&mut *tx, write, changes.at).await?;
        }
        for entry in &changes.audit {
            insert_audit(&mut *tx, entry).await?;
        }

        tx.commit().await.map_err(db_error)?;
        debug!(writes = changes.writes.len(), "Change set committed");
        Ok(())
    }
}
