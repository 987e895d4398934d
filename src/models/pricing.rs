use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fare components in the currency's minor unit precision.
///
/// `total` is always the exact sum of the six components.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingBreakdown {
    pub base_fare: Decimal,
    pub distance_fee: Decimal,
    pub time_fee: Decimal,
    pub surge_fee: Decimal,
    pub wait_fee: Decimal,
    pub service_fee: Decimal,
    pub total: Decimal,
    pub currency: String,
}

impl PricingBreakdown {
    pub fn component_sum(&self) -> Decimal {
        self.base_fare
            + self.distance_fee
            + self.time_fee
            + self.surge_fee
            + self.wait_fee
            + self.service_fee
    }
}

/// Trip estimate returned alongside a breakdown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub distance_km: f64,
    pub eta_minutes: u32,
    pub pricing: PricingBreakdown,
}
