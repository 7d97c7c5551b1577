use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{OrderResponse, UserId},
    traits::EscrowError,
};

/// Records an application, returning `false` if this (order, worker) pair already exists. The UNIQUE constraint
/// is the deduplication mechanism; hitting it means someone already recorded the application.
pub async fn insert(order_id: i64, worker: UserId, conn: &mut SqliteConnection) -> Result<bool, EscrowError> {
    let result = sqlx::query("INSERT INTO order_responses (order_id, worker) VALUES ($1, $2)")
        .bind(order_id)
        .bind(worker)
        .execute(conn)
        .await;
    match result {
        Ok(_) => {
            debug!("🙋️ Worker {worker} applied to order #{order_id}");
            Ok(true)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub async fn exists(order_id: i64, worker: UserId, conn: &mut SqliteConnection) -> Result<bool, EscrowError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM order_responses WHERE order_id = $1 AND worker = $2")
            .bind(order_id)
            .bind(worker)
            .fetch_one(conn)
            .await?;
    Ok(count > 0)
}

pub async fn list_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderResponse>, EscrowError> {
    let responses =
        sqlx::query_as("SELECT * FROM order_responses WHERE order_id = $1 ORDER BY created_at ASC")
            .bind(order_id)
            .fetch_all(conn)
            .await?;
    Ok(responses)
}
