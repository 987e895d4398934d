use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::Json;
use axum::Router;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::GeoPoint;
use crate::models::zone::{PricingRule, Zone};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/zones", post(create_zone).get(list_zones))
        .route("/zones/:id/rules", post(add_rule))
}

#[derive(Deserialize)]
pub struct PricingRuleRequest {
    pub base_fare: Decimal,
    pub per_km_rate: Decimal,
    pub per_minute_rate: Decimal,
    #[serde(default = "unit_multiplier")]
    pub surge_multiplier: Decimal,
    #[serde(default)]
    pub wait_time_rate: Decimal,
    pub max_bag_weight_kg: f64,
    pub max_bag_volume_liters: f64,
    #[serde(default = "enabled")]
    pub is_active: bool,
}

impl PricingRuleRequest {
    fn into_rule(self) -> PricingRule {
        PricingRule {
            id: Uuid::new_v4(),
            base_fare: self.base_fare,
            per_km_rate: self.per_km_rate,
            per_minute_rate: self.per_minute_rate,
            surge_multiplier: self.surge_multiplier,
            wait_time_rate: self.wait_time_rate,
            max_bag_weight_kg: self.max_bag_weight_kg,
            max_bag_volume_liters: self.max_bag_volume_liters,
            is_active: self.is_active,
            created_at: Utc::now(),
        }
    }
}

#[derive(Deserialize)]
pub struct CreateZoneRequest {
    pub name: String,
    pub coordinates: Vec<GeoPoint>,
    #[serde(default = "enabled")]
    pub is_active: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub pricing_rule: Option<PricingRuleRequest>,
}

fn unit_multiplier() -> Decimal {
    Decimal::ONE
}

fn enabled() -> bool {
    true
}

async fn create_zone(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateZoneRequest>,
) -> Result<Json<Zone>, AppError> {
    let zone = Zone {
        id: Uuid::new_v4(),
        name: payload.name,
        coordinates: payload.coordinates,
        is_active: payload.is_active,
        priority: payload.priority,
        pricing_rules: payload
            .pricing_rule
            .map(PricingRuleRequest::into_rule)
            .into_iter()
            .collect(),
    };

    let zone = state.zones.insert(zone)?;
    tracing::info!(zone_id = %zone.id, name = %zone.name, "zone registered");
    Ok(Json(zone))
}

async fn list_zones(State(state): State<Arc<AppState>>) -> Json<Vec<Zone>> {
    let mut zones = state.zones.list();
    zones.sort_by(|a, b| a.name.cmp(&b.name));
    Json(zones)
}

async fn add_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PricingRuleRequest>,
) -> Result<Json<Zone>, AppError> {
    let zone = state.zones.add_rule(id, payload.into_rule())?;
    Ok(Json(zone))
}
