use log::trace;
use sqlx::SqliteConnection;
use taskpay_common::Cents;

use crate::{
    db_types::{Account, Role, UserId},
    traits::EscrowError,
};

/// Fetches the account for `user`, lazily inserting an empty one on first contact.
pub async fn fetch_or_create(user: UserId, conn: &mut SqliteConnection) -> Result<Account, EscrowError> {
    sqlx::query("INSERT INTO accounts (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user)
        .execute(&mut *conn)
        .await?;
    let account = fetch(user, conn).await?.ok_or(EscrowError::AccountNotFound(user))?;
    Ok(account)
}

pub async fn fetch(user: UserId, conn: &mut SqliteConnection) -> Result<Option<Account>, EscrowError> {
    let account =
        sqlx::query_as("SELECT * FROM accounts WHERE user_id = $1").bind(user).fetch_optional(conn).await?;
    Ok(account)
}

pub async fn set_role(user: UserId, role: Role, conn: &mut SqliteConnection) -> Result<(), EscrowError> {
    let result =
        sqlx::query("UPDATE accounts SET role = $1, updated_at = CURRENT_TIMESTAMP WHERE user_id = $2")
            .bind(role.to_string())
            .bind(user)
            .execute(conn)
            .await?;
    if result.rows_affected() == 0 {
        return Err(EscrowError::AccountNotFound(user));
    }
    Ok(())
}

pub async fn set_email(user: UserId, email: &str, conn: &mut SqliteConnection) -> Result<(), EscrowError> {
    let result =
        sqlx::query("UPDATE accounts SET email = $1, updated_at = CURRENT_TIMESTAMP WHERE user_id = $2")
            .bind(email)
            .bind(user)
            .execute(conn)
            .await?;
    if result.rows_affected() == 0 {
        return Err(EscrowError::AccountNotFound(user));
    }
    Ok(())
}

/// Applies `balance = balance + delta` as one statement. There is no read-modify-write window, so concurrent
/// adjustments on the same account cannot lose updates.
pub async fn adjust_balance(user: UserId, delta: Cents, conn: &mut SqliteConnection) -> Result<(), EscrowError> {
    let result =
        sqlx::query("UPDATE accounts SET balance = balance + $1, updated_at = CURRENT_TIMESTAMP WHERE user_id = $2")
            .bind(delta)
            .bind(user)
            .execute(conn)
            .await?;
    if result.rows_affected() == 0 {
        return Err(EscrowError::AccountNotFound(user));
    }
    trace!("🧾️ Balance of user {user} adjusted by {delta}");
    Ok(())
}

/// The escrow debit: subtracts `amount` only when the balance covers it. Returns `false` when it does not (or the
/// account does not exist); the caller decides which error that maps to.
pub async fn debit_for_escrow(
    user: UserId,
    amount: Cents,
    conn: &mut SqliteConnection,
) -> Result<bool, EscrowError> {
    let result = sqlx::query(
        "UPDATE accounts SET balance = balance - $1, updated_at = CURRENT_TIMESTAMP WHERE user_id = $2 AND balance \
         >= $1",
    )
    .bind(amount)
    .bind(user)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
