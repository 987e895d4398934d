use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::offer::Offer;
use crate::models::order::OrderStatus;

/// Published after every committed status change. `old_status` is absent
/// for the creation event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderEvent {
    pub order_id: Uuid,
    pub old_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    pub timestamp: DateTime<Utc>,
}

/// Everything pushed to live subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    OrderEvent(OrderEvent),
    Offer(Offer),
}
