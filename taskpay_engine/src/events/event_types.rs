use serde::{Deserialize, Serialize};

use crate::db_types::Order;

/// Emitted after a confirmation code was redeemed and the worker was credited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCompletedEvent {
    pub order: Order,
}

impl OrderCompletedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Emitted after a lapsed confirmation window sent the escrow back to the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRefundedEvent {
    pub order: Order,
}

impl OrderRefundedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}
