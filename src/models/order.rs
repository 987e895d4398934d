use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::courier::GeoPoint;
use crate::models::pricing::PricingBreakdown;
use crate::models::zone::PricingRule;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Assigned,
    CourierEnRoutePickup,
    PickedUp,
    EnRouteDropoff,
    Delivered,
    Completed,
    Canceled,
    Disputed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::Created,
        OrderStatus::Assigned,
        OrderStatus::CourierEnRoutePickup,
        OrderStatus::PickedUp,
        OrderStatus::EnRouteDropoff,
        OrderStatus::Delivered,
        OrderStatus::Completed,
        OrderStatus::Canceled,
        OrderStatus::Disputed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Assigned => "assigned",
            OrderStatus::CourierEnRoutePickup => "courier_en_route_pickup",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::EnRouteDropoff => "en_route_dropoff",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Disputed => "disputed",
        }
    }

    /// Completed and canceled orders are finished; disputed orders wait for
    /// manual resolution and accept no automatic transition either.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Canceled | OrderStatus::Disputed
        )
    }

    /// States in which a courier is attached to the order.
    pub fn has_courier(self) -> bool {
        matches!(
            self,
            OrderStatus::Assigned
                | OrderStatus::CourierEnRoutePickup
                | OrderStatus::PickedUp
                | OrderStatus::EnRouteDropoff
                | OrderStatus::Delivered
                | OrderStatus::Completed
                | OrderStatus::Disputed
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContactInfo {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

/// Address as captured when the order was placed. Later edits to a saved
/// address never reach an existing order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddressSnapshot {
    pub label: Option<String>,
    pub street: String,
    pub city: String,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub instructions: Option<String>,
    pub location: GeoPoint,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Dimensions {
    pub length_cm: f64,
    pub width_cm: f64,
    pub height_cm: f64,
}

impl Dimensions {
    pub fn volume_liters(&self) -> f64 {
        self.length_cm * self.width_cm * self.height_cm / 1_000.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Package {
    pub description: String,
    pub declared_value: Decimal,
    pub weight_kg: Option<f64>,
    pub dimensions: Option<Dimensions>,
}

impl Package {
    pub fn weight(&self) -> f64 {
        self.weight_kg.unwrap_or(0.0)
    }

    pub fn volume_liters(&self) -> f64 {
        self.dimensions.map(|d| d.volume_liters()).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    CustomerRequested,
    CourierWithdrew,
    SystemCanceled,
    NoCouriersAvailable,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    WaitFee,
}

/// A charge raised after the order was priced. The original breakdown is
/// never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Adjustment {
    pub kind: AdjustmentKind,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    /// Optimistic concurrency token, bumped by the repository on every save.
    pub version: u64,
    pub status: OrderStatus,
    pub customer_id: Uuid,
    pub courier_id: Option<Uuid>,
    pub pickup_address: AddressSnapshot,
    pub pickup_contact: ContactInfo,
    pub dropoff_address: AddressSnapshot,
    pub dropoff_contact: ContactInfo,
    pub package: Package,
    pub pricing: PricingBreakdown,
    pub rate_card: PricingRule,
    pub adjustments: Vec<Adjustment>,
    pub pickup_code: String,
    pub replaces: Option<Uuid>,
    pub cancel_reason: Option<CancelReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pickup_time: Option<DateTime<Utc>>,
    pub dropoff_time: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub disputed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_active(&self) -> bool {
        !matches!(self.status, OrderStatus::Completed | OrderStatus::Canceled)
    }

    pub fn adjustment_total(&self) -> Decimal {
        self.adjustments.iter().map(|a| a.amount).sum()
    }
}
