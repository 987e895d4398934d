use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::courier::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingRule {
    pub id: Uuid,
    pub base_fare: Decimal,
    pub per_km_rate: Decimal,
    pub per_minute_rate: Decimal,
    pub surge_multiplier: Decimal,
    pub wait_time_rate: Decimal,
    pub max_bag_weight_kg: f64,
    pub max_bag_volume_liters: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: Uuid,
    pub name: String,
    pub coordinates: Vec<GeoPoint>,
    pub is_active: bool,
    /// Higher wins when zones overlap under the priority policy.
    pub priority: i32,
    /// Insertion order; later active rules supersede earlier ones.
    pub pricing_rules: Vec<PricingRule>,
}

impl Zone {
    pub fn active_rule(&self) -> Option<&PricingRule> {
        self.pricing_rules.iter().rev().find(|rule| rule.is_active)
    }
}
