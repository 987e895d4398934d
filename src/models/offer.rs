use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A time-bounded proposal of one order to one courier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Offer {
    pub id: Uuid,
    pub order_id: Uuid,
    pub courier_id: Uuid,
    pub distance_km: f64,
    pub sent_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfferResponse {
    Accept,
    Decline,
}

impl From<bool> for OfferResponse {
    fn from(accept: bool) -> Self {
        if accept {
            OfferResponse::Accept
        } else {
            OfferResponse::Decline
        }
    }
}
