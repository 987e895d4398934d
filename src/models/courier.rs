use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Foot,
    Bike,
    Scooter,
}

impl VehicleType {
    pub fn max_weight_kg(self) -> f64 {
        match self {
            VehicleType::Foot => 2.0,
            VehicleType::Bike => 5.0,
            VehicleType::Scooter => 8.0,
        }
    }

    pub fn max_volume_liters(self) -> f64 {
        match self {
            VehicleType::Foot => 10.0,
            VehicleType::Bike => 25.0,
            VehicleType::Scooter => 40.0,
        }
    }

    pub fn can_carry(self, weight_kg: f64, volume_liters: f64) -> bool {
        weight_kg <= self.max_weight_kg() && volume_liters <= self.max_volume_liters()
    }
}

/// A reported position together with the moment it was observed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LocationFix {
    pub point: GeoPoint,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Earnings {
    pub total: Decimal,
    pub deliveries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierProfile {
    pub id: Uuid,
    pub name: String,
    pub is_online: bool,
    pub vehicle_type: VehicleType,
    pub service_zones: HashSet<Uuid>,
    pub current_location: Option<LocationFix>,
    pub rating: f64,
    pub earnings: Earnings,
    pub updated_at: DateTime<Utc>,
}

impl CourierProfile {
    pub fn serves(&self, zone_id: Uuid) -> bool {
        self.service_zones.contains(&zone_id)
    }
}
