use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::warn;

use crate::config::PricingSettings;
use crate::error::DispatchError;
use crate::models::pricing::PricingBreakdown;
use crate::models::zone::PricingRule;

/// Computes fare breakdowns from a zone's rule. Stateless apart from the
/// configured service fee rate and currency.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    service_fee_rate: Decimal,
    currency: String,
}

impl PricingEngine {
    pub fn new(settings: &PricingSettings) -> Self {
        Self {
            service_fee_rate: settings.service_fee_rate,
            currency: settings.currency.clone(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn compute(
        &self,
        rule: &PricingRule,
        distance_km: f64,
        eta_minutes: u32,
        demand_multiplier: Decimal,
    ) -> Result<PricingBreakdown, DispatchError> {
        validate_rule(rule)?;

        if !distance_km.is_finite() || distance_km < 0.0 {
            return Err(DispatchError::InvalidInput(format!(
                "distance must be a non-negative number, got {distance_km}"
            )));
        }
        let distance = Decimal::from_f64(distance_km)
            .ok_or_else(|| DispatchError::InvalidInput(format!("distance {distance_km}")))?
            .round_dp(3);

        let scale = minor_units(&self.currency);
        let money =
            |value: Decimal| value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);

        let base_fare = money(rule.base_fare);
        let distance_fee = money(distance * rule.per_km_rate);
        let time_fee = money(Decimal::from(eta_minutes) * rule.per_minute_rate);
        let surge_factor = (demand_multiplier - Decimal::ONE).max(Decimal::ZERO);
        let surge_fee = money((base_fare + distance_fee + time_fee) * surge_factor);
        let service_fee =
            money((base_fare + distance_fee + time_fee + surge_fee) * self.service_fee_rate);
        let wait_fee = Decimal::ZERO;

        let total = base_fare + distance_fee + time_fee + surge_fee + wait_fee + service_fee;

        Ok(PricingBreakdown {
            base_fare,
            distance_fee,
            time_fee,
            surge_fee,
            wait_fee,
            service_fee,
            total,
            currency: self.currency.clone(),
        })
    }

    /// Follow-up charge for time a courier spent waiting at pickup beyond
    /// the grace period.
    pub fn wait_fee(&self, rule: &PricingRule, waited_minutes: u32, grace_minutes: u32) -> Decimal {
        let billable = waited_minutes.saturating_sub(grace_minutes);
        (Decimal::from(billable) * rule.wait_time_rate).round_dp_with_strategy(
            minor_units(&self.currency),
            RoundingStrategy::MidpointAwayFromZero,
        )
    }
}

pub fn validate_rule(rule: &PricingRule) -> Result<(), DispatchError> {
    let rates = [
        ("base_fare", rule.base_fare),
        ("per_km_rate", rule.per_km_rate),
        ("per_minute_rate", rule.per_minute_rate),
        ("wait_time_rate", rule.wait_time_rate),
        ("surge_multiplier", rule.surge_multiplier),
    ];
    for (name, value) in rates {
        if value < Decimal::ZERO {
            return Err(DispatchError::InvalidZoneRule(format!(
                "{name} must be >= 0, got {value}"
            )));
        }
    }

    if !(rule.max_bag_weight_kg > 0.0) {
        return Err(DispatchError::InvalidZoneRule(
            "max_bag_weight_kg must be > 0".to_string(),
        ));
    }
    if !(rule.max_bag_volume_liters > 0.0) {
        return Err(DispatchError::InvalidZoneRule(
            "max_bag_volume_liters must be > 0".to_string(),
        ));
    }

    if rule.surge_multiplier < Decimal::ONE {
        warn!(rule_id = %rule.id, surge_multiplier = %rule.surge_multiplier, "pricing rule discounts below base");
    }

    Ok(())
}

fn minor_units(currency: &str) -> u32 {
    match currency {
        "JPY" | "KRW" | "VND" => 0,
        _ => 2,
    }
}
