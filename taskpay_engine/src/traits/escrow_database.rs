use chrono::{DateTime, Utc};
use taskpay_common::Cents;
use thiserror::Error;

use crate::{
    db_types::{Account, NewOrder, Order, OrderResponse, Role, UserId},
    traits::EmailGatewayError,
};

/// Account and ledger operations shared by every backend.
///
/// Balance adjustments must be atomic increments on the stored value, never read-modify-write round trips through
/// the caller.
#[allow(async_fn_in_trait)]
pub trait AccountManagement {
    /// Fetches the account for `user`, creating an empty one (role `unassigned`, zero balance) if none exists.
    async fn fetch_or_create_account(&self, user: UserId) -> Result<Account, EscrowError>;

    async fn fetch_account(&self, user: UserId) -> Result<Option<Account>, EscrowError>;

    async fn set_role(&self, user: UserId, role: Role) -> Result<(), EscrowError>;

    async fn set_contact_email(&self, user: UserId, email: &str) -> Result<(), EscrowError>;

    /// Applies `balance = balance + delta` as a single statement. Fails with [`EscrowError::AccountNotFound`] if the
    /// account does not exist.
    async fn adjust_balance(&self, user: UserId, delta: Cents) -> Result<(), EscrowError>;
}

/// The storage contract consumed by the order lifecycle engine.
///
/// Every mutating method is a single atomic unit: the precondition check and the resulting mutation either both
/// happen or neither does. State transitions are conditional updates guarded by the expected status, so two
/// concurrent transitions on the same order can never both succeed. Methods that race a concurrent writer report
/// it through their return value (`None` / `false` / a typed error), never by panicking.
#[allow(async_fn_in_trait)]
pub trait EscrowDatabase: Clone + AccountManagement {
    /// The URL of the backing store.
    fn url(&self) -> &str;

    /// In one transaction: debit the requester by `order.amount` (the escrow reservation) and insert the order at
    /// `open`. Fails with [`EscrowError::InsufficientFunds`] when the balance does not cover the amount; in that
    /// case nothing is written.
    async fn create_escrow_order(&self, order: NewOrder) -> Result<Order, EscrowError>;

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, EscrowError>;

    /// Records a worker's application. Returns `false` when the (order, worker) pair already exists; the
    /// uniqueness violation means "someone already did this" and is not an error.
    async fn add_response(&self, order_id: i64, worker: UserId) -> Result<bool, EscrowError>;

    async fn has_response(&self, order_id: i64, worker: UserId) -> Result<bool, EscrowError>;

    async fn responses_for_order(&self, order_id: i64) -> Result<Vec<OrderResponse>, EscrowError>;

    /// `open → in_progress`, setting the worker exactly once. Returns `None` when the order is no longer `open`
    /// or already has a worker (a concurrent assign won).
    async fn assign_worker(&self, order_id: i64, worker: UserId) -> Result<Option<Order>, EscrowError>;

    /// `in_progress → waiting_confirmation`, storing the freshly issued code and its deadline. The code column
    /// must still be empty; a code, once set, is never reassigned for the same order. Returns `None` when the
    /// guard fails.
    async fn begin_confirmation(
        &self,
        order_id: i64,
        worker: UserId,
        code: &str,
        deadline: DateTime<Utc>,
    ) -> Result<Option<Order>, EscrowError>;

    /// `waiting_confirmation → completed` in one transaction: consume the code in the global used-code registry,
    /// flip the status (guarded on the stored code matching) and credit the assigned worker. A duplicate code
    /// consumption fails with [`EscrowError::CodeAlreadyUsed`]; a wrong code for an order still awaiting
    /// confirmation with [`EscrowError::CodeMismatch`]; any other guard failure with
    /// [`EscrowError::OrderWrongState`]. Exactly one of two racing calls can succeed.
    async fn confirm_delivery(&self, order_id: i64, code: &str) -> Result<Order, EscrowError>;

    /// `waiting_confirmation → refunded` in one transaction, guarded on `confirm_deadline <= now`, crediting the
    /// requester. Returns `None` when the order was already moved on by another writer, which makes the
    /// reconciliation scan idempotent.
    async fn refund_expired_order(&self, order_id: i64, now: DateTime<Utc>) -> Result<Option<Order>, EscrowError>;

    /// All orders sitting in `waiting_confirmation` whose confirmation deadline has passed.
    async fn expired_confirmation_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, EscrowError>;

    /// Codes currently awaiting confirmation. The code generator rejects collisions against this set.
    async fn pending_confirmation_codes(&self) -> Result<Vec<String>, EscrowError>;

    async fn is_code_used(&self, code: &str) -> Result<bool, EscrowError>;

    /// Open orders a worker may apply to, i.e. excluding their own.
    async fn open_orders_excluding(&self, user: UserId) -> Result<Vec<Order>, EscrowError>;

    async fn orders_for_requester(&self, user: UserId) -> Result<Vec<Order>, EscrowError>;

    /// A worker's `in_progress` and `waiting_confirmation` orders.
    async fn active_orders_for_worker(&self, user: UserId) -> Result<Vec<Order>, EscrowError>;

    /// Closes the store connection.
    async fn close(&mut self) -> Result<(), EscrowError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum EscrowError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("No account exists for user {0}")]
    AccountNotFound(UserId),
    #[error("Order {0} does not exist")]
    OrderNotFound(i64),
    #[error("User {user} does not have {amount} available to fund this order")]
    InsufficientFunds { user: UserId, amount: Cents },
    #[error("The order amount must be positive, not {0}")]
    InvalidAmount(Cents),
    #[error("{0} does not look like a contact e-mail address")]
    InvalidEmail(String),
    #[error("Order {0} is no longer open")]
    OrderNotOpen(i64),
    #[error("User {worker} has already applied to order {order_id}")]
    AlreadyApplied { order_id: i64, worker: UserId },
    #[error("The owner of order {0} cannot apply to it")]
    CannotApplyToOwnOrder(i64),
    #[error("User {user} is not the owner of order {order_id}")]
    NotOwner { order_id: i64, user: UserId },
    #[error("User {worker} never applied to order {order_id}")]
    UnknownApplicant { order_id: i64, worker: UserId },
    #[error("User {user} is not the assigned worker for order {order_id}")]
    NotAssignedWorker { order_id: i64, user: UserId },
    #[error("Order {0} is not in the right state for this transition")]
    OrderWrongState(i64),
    #[error("User {0} has no contact e-mail on record")]
    NoContactEmail(UserId),
    #[error("The presented code does not match the one issued for order {0}")]
    CodeMismatch(i64),
    #[error("That confirmation code has already been redeemed")]
    CodeAlreadyUsed,
    #[error("Could not generate a fresh confirmation code")]
    CodeSpaceExhausted,
    #[error("Email gateway failure: {0}")]
    EmailGateway(#[from] EmailGatewayError),
}

impl From<sqlx::Error> for EscrowError {
    fn from(e: sqlx::Error) -> Self {
        EscrowError::DatabaseError(e.to_string())
    }
}
