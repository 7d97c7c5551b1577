use log::debug;
use sqlx::SqliteConnection;

use crate::traits::EscrowError;

/// Consumes a confirmation code, returning `false` when the code value has already been redeemed anywhere in the
/// system. Call inside the same transaction that completes the order, so consumption and completion commit (or
/// roll back) together.
pub async fn record_used(code: &str, order_id: i64, conn: &mut SqliteConnection) -> Result<bool, EscrowError> {
    let result = sqlx::query("INSERT INTO used_confirmation_codes (code, order_id) VALUES ($1, $2)")
        .bind(code)
        .bind(order_id)
        .execute(conn)
        .await;
    match result {
        Ok(_) => {
            debug!("🔑️ Confirmation code consumed for order #{order_id}");
            Ok(true)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub async fn is_used(code: &str, conn: &mut SqliteConnection) -> Result<bool, EscrowError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM used_confirmation_codes WHERE code = $1")
        .bind(code)
        .fetch_one(conn)
        .await?;
    Ok(count > 0)
}
