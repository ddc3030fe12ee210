use serde::{Deserialize, Serialize};

use crate::db_types::{Order, Refund};

/// Emitted once per order, by whichever path (confirmation or webhook) recorded the capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Emitted after a refund has been processed by the gateway and recorded locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRefundedEvent {
    pub order: Order,
    pub refund: Refund,
}

impl OrderRefundedEvent {
    pub fn new(order: Order, refund: Refund) -> Self {
        Self { order, refund }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    OrderPaid(OrderPaidEvent),
    OrderRefunded(OrderRefundedEvent),
}
