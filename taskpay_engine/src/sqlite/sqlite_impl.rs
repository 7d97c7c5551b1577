//! `SqliteDatabase` is the concrete SQLite backend for the escrow engine.
//!
//! Each trait method that moves money or changes order state is a single transaction composed from the low-level
//! functions in [`super::db`], so a transition's precondition check, mutation and ledger adjustment commit as one
//! atomic unit.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::{debug, error};
use sqlx::SqlitePool;
use taskpay_common::Cents;

use super::db::{accounts, codes, new_pool, orders, orders::OrderTransition, responses};
use crate::{
    db_types::{Account, NewOrder, Order, OrderResponse, OrderStatus, Role, UserId},
    traits::{AccountManagement, EscrowDatabase, EscrowError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, EscrowError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl AccountManagement for SqliteDatabase {
    async fn fetch_or_create_account(&self, user: UserId) -> Result<Account, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        accounts::fetch_or_create(user, &mut conn).await
    }

    async fn fetch_account(&self, user: UserId) -> Result<Option<Account>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        accounts::fetch(user, &mut conn).await
    }

    async fn set_role(&self, user: UserId, role: Role) -> Result<(), EscrowError> {
        let mut conn = self.pool.acquire().await?;
        accounts::set_role(user, role, &mut conn).await
    }

    async fn set_contact_email(&self, user: UserId, email: &str) -> Result<(), EscrowError> {
        let mut conn = self.pool.acquire().await?;
        accounts::set_email(user, email, &mut conn).await
    }

    async fn adjust_balance(&self, user: UserId, delta: Cents) -> Result<(), EscrowError> {
        let mut conn = self.pool.acquire().await?;
        accounts::adjust_balance(user, delta, &mut conn).await
    }
}

impl EscrowDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_escrow_order(&self, order: NewOrder) -> Result<Order, EscrowError> {
        let mut tx = self.pool.begin().await?;
        let debited = accounts::debit_for_escrow(order.requester, order.amount, &mut tx).await?;
        if !debited {
            // Transaction rolls back on drop; nothing has been written.
            return Err(EscrowError::InsufficientFunds { user: order.requester, amount: order.amount });
        }
        let order = orders::insert(order, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order #{} funded and opened; {} held in escrow", order.id, order.amount);
        Ok(order)
    }

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch(order_id, &mut conn).await
    }

    async fn add_response(&self, order_id: i64, worker: UserId) -> Result<bool, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        responses::insert(order_id, worker, &mut conn).await
    }

    async fn has_response(&self, order_id: i64, worker: UserId) -> Result<bool, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        responses::exists(order_id, worker, &mut conn).await
    }

    async fn responses_for_order(&self, order_id: i64) -> Result<Vec<OrderResponse>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        responses::list_for_order(order_id, &mut conn).await
    }

    async fn assign_worker(&self, order_id: i64, worker: UserId) -> Result<Option<Order>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let change = OrderTransition {
            set_worker: Some(worker),
            require_unassigned: true,
            ..OrderTransition::to(OrderStatus::InProgress)
        };
        orders::transition(order_id, OrderStatus::Open, change, &mut conn).await
    }

    async fn begin_confirmation(
        &self,
        order_id: i64,
        worker: UserId,
        code: &str,
        deadline: DateTime<Utc>,
    ) -> Result<Option<Order>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let change = OrderTransition {
            set_confirm_code: Some(code.to_string()),
            set_confirm_deadline: Some(deadline),
            require_worker: Some(worker),
            require_no_code: true,
            ..OrderTransition::to(OrderStatus::WaitingConfirmation)
        };
        orders::transition(order_id, OrderStatus::InProgress, change, &mut conn).await
    }

    async fn confirm_delivery(&self, order_id: i64, code: &str) -> Result<Order, EscrowError> {
        let mut tx = self.pool.begin().await?;
        // Consuming the code first means the loser of a confirm race fails on the UNIQUE constraint before it can
        // touch the order row.
        let consumed = codes::record_used(code, order_id, &mut tx).await?;
        if !consumed {
            return Err(EscrowError::CodeAlreadyUsed);
        }
        let change = OrderTransition {
            require_code: Some(code.to_string()),
            ..OrderTransition::to(OrderStatus::Completed)
        };
        let Some(order) = orders::transition(order_id, OrderStatus::WaitingConfirmation, change, &mut tx).await?
        else {
            // The guard missed. Re-read inside the transaction to tell a wrong code apart from an order that is
            // no longer waiting. The transaction rolls back on drop, so the code consumption above is undone.
            let mismatch = orders::fetch(order_id, &mut tx)
                .await?
                .is_some_and(|o| o.status == OrderStatus::WaitingConfirmation && o.confirm_code.as_deref() != Some(code));
            return Err(if mismatch {
                EscrowError::CodeMismatch(order_id)
            } else {
                EscrowError::OrderWrongState(order_id)
            });
        };
        let worker = order.worker.ok_or_else(|| {
            error!("🗃️ Order #{order_id} reached completed without an assigned worker. This is a bug.");
            EscrowError::DatabaseError(format!("order {order_id} completed without an assigned worker"))
        })?;
        accounts::adjust_balance(worker, order.amount, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order #{order_id} completed; {} released to worker {worker}", order.amount);
        Ok(order)
    }

    async fn refund_expired_order(
        &self,
        order_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, EscrowError> {
        let mut tx = self.pool.begin().await?;
        let change = OrderTransition {
            require_deadline_at_or_before: Some(now),
            ..OrderTransition::to(OrderStatus::Refunded)
        };
        let Some(order) = orders::transition(order_id, OrderStatus::WaitingConfirmation, change, &mut tx).await?
        else {
            // Already confirmed or refunded by another writer. Nothing to do.
            return Ok(None);
        };
        accounts::adjust_balance(order.requester, order.amount, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order #{order_id} refunded; {} returned to requester {}", order.amount, order.requester);
        Ok(Some(order))
    }

    async fn expired_confirmation_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        orders::list_expired_confirmation(now, &mut conn).await
    }

    async fn pending_confirmation_codes(&self) -> Result<Vec<String>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        orders::pending_codes(&mut conn).await
    }

    async fn is_code_used(&self, code: &str) -> Result<bool, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        codes::is_used(code, &mut conn).await
    }

    async fn open_orders_excluding(&self, user: UserId) -> Result<Vec<Order>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        orders::list_open_excluding(user, &mut conn).await
    }

    async fn orders_for_requester(&self, user: UserId) -> Result<Vec<Order>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        orders::list_for_requester(user, &mut conn).await
    }

    async fn active_orders_for_worker(&self, user: UserId) -> Result<Vec<Order>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        orders::list_active_for_worker(user, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), EscrowError> {
        self.pool.close().await;
        Ok(())
    }
}
