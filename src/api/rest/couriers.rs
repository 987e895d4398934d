use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::{CourierProfile, Earnings, GeoPoint, LocationFix, VehicleType};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers", post(create_courier).get(list_couriers))
        .route("/couriers/:id", get(get_courier))
        .route("/couriers/:id/status", patch(update_courier_status))
        .route("/couriers/:id/location", patch(update_courier_location))
}

#[derive(Deserialize)]
pub struct CreateCourierRequest {
    pub name: String,
    pub vehicle_type: VehicleType,
    pub service_zones: HashSet<Uuid>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default = "default_rating")]
    pub rating: f64,
}

fn default_rating() -> f64 {
    5.0
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub is_online: bool,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

async fn create_courier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCourierRequest>,
) -> Result<Json<CourierProfile>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    if payload.service_zones.is_empty() {
        return Err(AppError::BadRequest(
            "service_zones cannot be empty".to_string(),
        ));
    }

    if let Some(unknown) = payload
        .service_zones
        .iter()
        .find(|zone_id| state.zones.get(**zone_id).is_none())
    {
        return Err(AppError::BadRequest(format!("unknown zone {unknown}")));
    }

    let now = Utc::now();
    let courier = CourierProfile {
        id: Uuid::new_v4(),
        name: payload.name,
        is_online: payload.is_online,
        vehicle_type: payload.vehicle_type,
        service_zones: payload.service_zones,
        current_location: payload.location.map(|point| LocationFix {
            point,
            recorded_at: now,
        }),
        rating: payload.rating.clamp(0.0, 5.0),
        earnings: Earnings::default(),
        updated_at: now,
    };

    let courier = state.couriers.upsert(courier).await?;
    tracing::info!(courier_id = %courier.id, vehicle = ?courier.vehicle_type, "courier registered");
    Ok(Json(courier))
}

async fn list_couriers(State(state): State<Arc<AppState>>) -> Json<Vec<CourierProfile>> {
    let mut couriers = state.couriers.list().await;
    couriers.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    Json(couriers)
}

async fn get_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CourierProfile>, AppError> {
    Ok(Json(state.couriers.get(id).await?))
}

async fn update_courier_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<CourierProfile>, AppError> {
    let courier = state.couriers.set_online(id, payload.is_online).await?;
    tracing::info!(courier_id = %id, is_online = courier.is_online, "courier status changed");
    Ok(Json(courier))
}

async fn update_courier_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<CourierProfile>, AppError> {
    let location = payload.location;
    if !(-90.0..=90.0).contains(&location.lat) || !(-180.0..=180.0).contains(&location.lng) {
        return Err(AppError::BadRequest(format!(
            "coordinates out of range: {}, {}",
            location.lat, location.lng
        )));
    }

    Ok(Json(state.couriers.update_location(id, location).await?))
}
