use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use taskpay_common::Cents;
use thiserror::Error;

//--------------------------------------       UserId        ---------------------------------------------------------
/// An opaque key identifying a user on the chat front-end. The engine never interprets it; it only correlates
/// accounts, orders, responses and confirmation senders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct UserId(pub i64);

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

//--------------------------------------        Role         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The user has not picked a side yet. Accounts are created lazily on first contact.
    #[default]
    Unassigned,
    /// Deposits funds and owns orders.
    Requester,
    /// Applies to orders and gets paid on confirmed delivery.
    Worker,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Unassigned => write!(f, "unassigned"),
            Role::Requester => write!(f, "requester"),
            Role::Worker => write!(f, "worker"),
        }
    }
}

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unassigned" => Ok(Self::Unassigned),
            "requester" => Ok(Self::Requester),
            "worker" => Ok(Self::Worker),
            s => Err(ConversionError(format!("Invalid role: {s}"))),
        }
    }
}

//--------------------------------------     OrderStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// The order is funded and visible to workers. Escrow has already been debited from the requester.
    #[default]
    Open,
    /// A worker has been assigned and is doing the work.
    InProgress,
    /// The worker has delivered; the engine is waiting for the confirmation code to come back by mail.
    WaitingConfirmation,
    /// Terminal. The code was redeemed and the worker was credited.
    Completed,
    /// Terminal. The confirmation window lapsed and the requester was credited back.
    Refunded,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Refunded)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Open => write!(f, "open"),
            OrderStatus::InProgress => write!(f, "in_progress"),
            OrderStatus::WaitingConfirmation => write!(f, "waiting_confirmation"),
            OrderStatus::Completed => write!(f, "completed"),
            OrderStatus::Refunded => write!(f, "refunded"),
        }
    }
}

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "waiting_confirmation" => Ok(Self::WaitingConfirmation),
            "completed" => Ok(Self::Completed),
            "refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------      Account        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: i64,
    pub user_id: UserId,
    pub role: Role,
    pub balance: Cents,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        Order        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    /// The account that funded the order. Set at creation, never changed.
    pub requester: UserId,
    /// The assigned worker. Set exactly once, on the `open → in_progress` transition.
    pub worker: Option<UserId>,
    pub title: String,
    pub description: String,
    /// Immutable after creation. The exact amount held in escrow.
    pub amount: Cents,
    pub reference_link: Option<String>,
    pub status: OrderStatus,
    pub work_deadline: DateTime<Utc>,
    /// Set once per lifecycle when the worker delivers; never reassigned for the same order.
    pub confirm_code: Option<String>,
    pub confirm_deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PartialEq for Order {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Order {}

//--------------------------------------      NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub requester: UserId,
    pub title: String,
    pub description: String,
    pub amount: Cents,
    /// When the work itself is due. Distinct from the confirmation deadline, which is only set at delivery time.
    pub work_deadline: DateTime<Utc>,
    pub reference_link: Option<String>,
}

impl NewOrder {
    pub fn new(
        requester: UserId,
        title: impl Into<String>,
        description: impl Into<String>,
        amount: Cents,
        work_deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            requester,
            title: title.into(),
            description: description.into(),
            amount,
            work_deadline,
            reference_link: None,
        }
    }

    pub fn with_reference_link(mut self, link: impl Into<String>) -> Self {
        self.reference_link = Some(link.into());
        self
    }
}

//--------------------------------------    OrderResponse    ---------------------------------------------------------
/// A worker's application to an open order. Unique per (order, worker).
#[derive(Debug, Clone, FromRow)]
pub struct OrderResponse {
    pub id: i64,
    pub order_id: i64,
    pub worker: UserId,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------      UsedCode       ---------------------------------------------------------
/// A consumed confirmation code. Uniqueness on `code` makes every code redeemable at most once system-wide.
#[derive(Debug, Clone, FromRow)]
pub struct UsedCode {
    pub id: i64,
    pub code: String,
    pub order_id: i64,
    pub used_at: DateTime<Utc>,
}
