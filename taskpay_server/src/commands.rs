//! The command decoding boundary for chat front-ends.
//!
//! Front-ends deliver user actions as short delimited callback strings (`worker:respond:42`). Those strings are
//! decoded exactly once, here, into the closed [`ClientCommand`] vocabulary; everything past this module works
//! with typed values only. Free-text dialog input (order fields, contact addresses) goes through the validated
//! constructors instead of the string parser.
use std::str::FromStr;

use chrono::{Duration, Utc};
use taskpay_common::Cents;
use taskpay_engine::db_types::{NewOrder, Role, UserId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    SetRole(Role),
    SetContactEmail(String),
    ShowBalance,
    TopUp(Cents),
    CreateOrder(OrderDraft),
    /// The requester's own orders, any status.
    ListRequesterOrders,
    /// Open orders the caller may apply to.
    ListOpenOrders,
    /// The worker's in-progress and waiting-confirmation orders.
    ListActiveOrders,
    ListResponses { order_id: i64 },
    Respond { order_id: i64 },
    Approve { order_id: i64, worker: UserId },
    Deliver { order_id: i64 },
    CheckEmail,
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("Unrecognised command: {0}")]
pub struct CommandParseError(String);

impl FromStr for ClientCommand {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s.split(':').collect::<Vec<_>>();
        let cmd = match parts.as_slice() {
            ["set_role", "requester"] => Self::SetRole(Role::Requester),
            ["set_role", "worker"] => Self::SetRole(Role::Worker),
            ["wallet", "show"] => Self::ShowBalance,
            ["wallet", "topup", amount] => {
                let amount = parse_amount(amount).map_err(|_| CommandParseError(s.to_string()))?;
                Self::TopUp(amount)
            },
            ["requester", "orders"] => Self::ListRequesterOrders,
            ["requester", "responses", id] => Self::ListResponses { order_id: parse_id(id, s)? },
            ["requester", "approve", id, worker] => {
                Self::Approve { order_id: parse_id(id, s)?, worker: UserId(parse_id(worker, s)?) }
            },
            ["worker", "open_orders"] => Self::ListOpenOrders,
            ["worker", "my_orders"] => Self::ListActiveOrders,
            ["worker", "respond", id] => Self::Respond { order_id: parse_id(id, s)? },
            ["worker", "deliver", id] => Self::Deliver { order_id: parse_id(id, s)? },
            ["worker", "check_email"] => Self::CheckEmail,
            _ => return Err(CommandParseError(s.to_string())),
        };
        Ok(cmd)
    }
}

fn parse_id(value: &str, original: &str) -> Result<i64, CommandParseError> {
    value.parse::<i64>().map_err(|_| CommandParseError(original.to_string()))
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("'{0}' is not a valid positive amount")]
    BadAmount(String),
    #[error("'{0}' is not a valid number of hours")]
    BadHours(String),
    #[error("The order needs a title")]
    EmptyTitle,
    #[error("'{0}' does not look like an e-mail address")]
    BadEmail(String),
}

/// A positive currency amount as entered by a user.
pub fn parse_amount(value: &str) -> Result<Cents, ValidationError> {
    let amount = value.parse::<Cents>().map_err(|_| ValidationError::BadAmount(value.to_string()))?;
    if !amount.is_positive() {
        return Err(ValidationError::BadAmount(value.to_string()));
    }
    Ok(amount)
}

/// A work deadline in whole hours from now.
pub fn parse_deadline_hours(value: &str) -> Result<i64, ValidationError> {
    match value.trim().parse::<i64>() {
        Ok(hours) if hours > 0 => Ok(hours),
        _ => Err(ValidationError::BadHours(value.to_string())),
    }
}

/// The validated result of the order creation dialog.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDraft {
    pub title: String,
    pub description: String,
    pub amount: Cents,
    pub deadline_hours: i64,
    pub reference_link: Option<String>,
}

impl OrderDraft {
    pub fn from_dialog(
        title: &str,
        description: &str,
        amount: &str,
        deadline_hours: &str,
        reference_link: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        Ok(Self {
            title: title.to_string(),
            description: description.trim().to_string(),
            amount: parse_amount(amount)?,
            deadline_hours: parse_deadline_hours(deadline_hours)?,
            reference_link: reference_link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
        })
    }

    pub fn into_new_order(self, requester: UserId) -> NewOrder {
        let work_deadline = Utc::now() + Duration::hours(self.deadline_hours);
        let mut order = NewOrder::new(requester, self.title, self.description, self.amount, work_deadline);
        if let Some(link) = self.reference_link {
            order = order.with_reference_link(link);
        }
        order
    }
}
