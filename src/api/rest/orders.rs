use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::intake::{CreateOrderRequest, QuoteRequest};
use crate::engine::matching::CancelOutcome;
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::offer::Offer;
use crate::models::order::{Order, OrderStatus};
use crate::models::pricing::Quote;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/quotes", post(quote))
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/offer", get(get_pending_offer))
        .route("/orders/:id/transitions", post(transition_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/pickup", post(confirm_pickup))
        .route("/orders/:id/wait-fee", post(record_wait_fee))
        .route("/orders/:id/offer-response", post(respond_to_offer))
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderFilter {
    #[default]
    All,
    Active,
    Finished,
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub customer_id: Uuid,
    #[serde(default)]
    pub filter: OrderFilter,
}

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub target: OrderStatus,
    pub actor: Actor,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub actor: Actor,
}

#[derive(Deserialize)]
pub struct PickupRequest {
    pub courier_id: Uuid,
    pub pickup_code: String,
}

#[derive(Deserialize)]
pub struct WaitFeeRequest {
    pub actor: Actor,
    pub waited_minutes: u32,
}

#[derive(Deserialize)]
pub struct OfferResponseRequest {
    pub courier_id: Uuid,
    pub accept: bool,
}

async fn quote(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QuoteRequest>,
) -> Result<Json<Quote>, AppError> {
    Ok(Json(state.intake.quote(payload).await?))
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.intake.create(payload).await?))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    let orders = state
        .orders
        .list_by_customer(query.customer_id)
        .await?
        .into_iter()
        .filter(|order| match query.filter {
            OrderFilter::All => true,
            OrderFilter::Active => order.is_active(),
            OrderFilter::Finished => !order.is_active(),
        })
        .collect();

    Ok(Json(orders))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.orders.get(id).await?))
}

async fn get_pending_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Offer>, AppError> {
    state
        .dispatcher
        .pending_offer(id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no outstanding offer for order {id}")))
}

async fn transition_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> Result<Json<Order>, AppError> {
    match payload.target {
        OrderStatus::Canceled => {
            let outcome = state.dispatcher.cancel_order(id, payload.actor).await?;
            Ok(Json(outcome.order))
        }
        target => Ok(Json(
            state.lifecycle.transition(id, target, &payload.actor).await?,
        )),
    }
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<CancelOutcome>, AppError> {
    Ok(Json(state.dispatcher.cancel_order(id, payload.actor).await?))
}

async fn confirm_pickup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PickupRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .lifecycle
        .confirm_pickup(id, payload.courier_id, &payload.pickup_code)
        .await?;
    Ok(Json(order))
}

async fn record_wait_fee(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<WaitFeeRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .lifecycle
        .record_wait_fee(id, &payload.actor, payload.waited_minutes)
        .await?;
    Ok(Json(order))
}

async fn respond_to_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OfferResponseRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .dispatcher
        .respond(id, payload.courier_id, payload.accept.into())
        .await?;
    Ok(Json(order))
}
