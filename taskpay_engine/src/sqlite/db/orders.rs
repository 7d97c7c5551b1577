use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderStatus, UserId},
    traits::EscrowError,
};

/// Inserts a new order at `open` using the given connection. This is not atomic on its own; embed the call inside
/// a transaction together with the escrow debit and pass `&mut *tx` as the connection argument.
pub async fn insert(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, EscrowError> {
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                requester,
                title,
                description,
                amount,
                reference_link,
                work_deadline
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(order.requester)
    .bind(order.title)
    .bind(order.description)
    .bind(order.amount)
    .bind(order.reference_link)
    .bind(order.work_deadline)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Order #{} inserted for requester {}", order.id, order.requester);
    Ok(order)
}

pub async fn fetch(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, EscrowError> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(order_id).fetch_optional(conn).await?;
    Ok(order)
}

/// The mutation half of a guarded state transition. Fields set here are written together with the new status;
/// `require_*` fields become extra `WHERE` guards alongside the expected-status check.
#[derive(Debug, Clone, Default)]
pub struct OrderTransition {
    pub new_status: OrderStatus,
    pub set_worker: Option<UserId>,
    pub set_confirm_code: Option<String>,
    pub set_confirm_deadline: Option<DateTime<Utc>>,
    pub require_worker: Option<UserId>,
    pub require_unassigned: bool,
    pub require_no_code: bool,
    pub require_code: Option<String>,
    pub require_deadline_at_or_before: Option<DateTime<Utc>>,
}

impl OrderTransition {
    pub fn to(new_status: OrderStatus) -> Self {
        Self { new_status, ..Self::default() }
    }
}

/// Applies a state transition as a single conditional `UPDATE ... WHERE id = ? AND status = ?expected [AND guards]
/// RETURNING *`. Returns `None` when no row matched: the precondition did not hold, or a concurrent writer moved
/// the order first. Precondition check and mutation are one atomic statement, so two racing transitions on the
/// same order can never both succeed.
pub async fn transition(
    order_id: i64,
    expected: OrderStatus,
    change: OrderTransition,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, EscrowError> {
    let mut builder = QueryBuilder::new("UPDATE orders SET updated_at = CURRENT_TIMESTAMP, ");
    let mut set_clause = builder.separated(", ");
    set_clause.push("status = ");
    set_clause.push_bind_unseparated(change.new_status.to_string());
    if let Some(worker) = change.set_worker {
        set_clause.push("worker = ");
        set_clause.push_bind_unseparated(worker);
    }
    if let Some(code) = change.set_confirm_code {
        set_clause.push("confirm_code = ");
        set_clause.push_bind_unseparated(code);
    }
    if let Some(deadline) = change.set_confirm_deadline {
        set_clause.push("confirm_deadline = ");
        set_clause.push_bind_unseparated(deadline);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(order_id);
    builder.push(" AND status = ");
    builder.push_bind(expected.to_string());
    if let Some(worker) = change.require_worker {
        builder.push(" AND worker = ");
        builder.push_bind(worker);
    }
    if change.require_unassigned {
        builder.push(" AND worker IS NULL");
    }
    if change.require_no_code {
        builder.push(" AND confirm_code IS NULL");
    }
    if let Some(code) = change.require_code {
        builder.push(" AND confirm_code = ");
        builder.push_bind(code);
    }
    if let Some(cutoff) = change.require_deadline_at_or_before {
        builder.push(" AND confirm_deadline IS NOT NULL AND confirm_deadline <= ");
        builder.push_bind(cutoff);
    }
    builder.push(" RETURNING *");
    trace!("📝️ Executing transition: {}", builder.sql());
    let result =
        builder.build().fetch_optional(conn).await?.map(|row: SqliteRow| Order::from_row(&row)).transpose()?;
    Ok(result)
}

/// Orders stuck in `waiting_confirmation` past their confirmation deadline. The predicate is a plain deadline
/// comparison, so a delayed scan still finds everything the missed cycles would have.
pub async fn list_expired_confirmation(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, EscrowError> {
    let orders = sqlx::query_as(
        r#"
        SELECT * FROM orders
        WHERE status = 'waiting_confirmation'
          AND confirm_deadline IS NOT NULL
          AND confirm_deadline <= $1
        "#,
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

pub async fn list_open_excluding(user: UserId, conn: &mut SqliteConnection) -> Result<Vec<Order>, EscrowError> {
    let orders = sqlx::query_as(
        "SELECT * FROM orders WHERE status = 'open' AND requester != $1 ORDER BY created_at DESC",
    )
    .bind(user)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

pub async fn list_for_requester(user: UserId, conn: &mut SqliteConnection) -> Result<Vec<Order>, EscrowError> {
    let orders = sqlx::query_as("SELECT * FROM orders WHERE requester = $1 ORDER BY created_at DESC")
        .bind(user)
        .fetch_all(conn)
        .await?;
    Ok(orders)
}

pub async fn list_active_for_worker(user: UserId, conn: &mut SqliteConnection) -> Result<Vec<Order>, EscrowError> {
    let orders = sqlx::query_as(
        r#"
        SELECT * FROM orders
        WHERE worker = $1
          AND status IN ('in_progress', 'waiting_confirmation')
        ORDER BY created_at DESC
        "#,
    )
    .bind(user)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

/// Codes of all orders currently awaiting confirmation.
pub async fn pending_codes(conn: &mut SqliteConnection) -> Result<Vec<String>, EscrowError> {
    let codes = sqlx::query_scalar(
        "SELECT confirm_code FROM orders WHERE status = 'waiting_confirmation' AND confirm_code IS NOT NULL",
    )
    .fetch_all(conn)
    .await?;
    Ok(codes)
}
