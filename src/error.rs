use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::order::OrderStatus;

/// Domain failures raised by the pricing, lifecycle and matching engines.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    #[error("{actor} may not move an order from {from} to {to}")]
    Unauthorized {
        actor: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("invalid zone rule: {0}")]
    InvalidZoneRule(String),

    #[error("invalid zone: {0}")]
    InvalidZone(String),

    #[error("offer for order {order_id} has expired")]
    OfferExpired { order_id: Uuid },

    #[error("order {order_id} is already assigned")]
    OrderAlreadyAssigned { order_id: Uuid },

    #[error("order {order_id} changed concurrently (expected version {expected}, found {actual})")]
    VersionConflict {
        order_id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("no couriers available")]
    NoCouriersAvailable,

    #[error("geocoding failed: {0}")]
    GeocodeFailure(String),

    #[error("location of courier {courier_id} is stale")]
    StaleLocation { courier_id: Uuid },

    #[error("order {0} not found")]
    OrderNotFound(Uuid),

    #[error("courier {0} not found")]
    CourierNotFound(Uuid),

    #[error("zone {0} not found")]
    ZoneNotFound(Uuid),

    #[error("pickup location is outside every active zone")]
    OutsideServiceArea,

    #[error("zone {0} has no active pricing rule")]
    NoActivePricingRule(Uuid),

    #[error("package rejected: {0}")]
    PackageRejected(String),

    #[error("pickup code does not match")]
    PickupCodeMismatch,

    #[error("wait fee already recorded for order {0}")]
    WaitFeeAlreadyRecorded(Uuid),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("notification failed: {0}")]
    Notification(String),
}

impl DispatchError {
    /// Expected concurrency outcomes: the caller re-reads and retries or
    /// accepts the resolved state.
    pub fn is_race(&self) -> bool {
        matches!(
            self,
            DispatchError::VersionConflict { .. }
                | DispatchError::OfferExpired { .. }
                | DispatchError::OrderAlreadyAssigned { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("no couriers available")]
    NoAvailableCouriers,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        let message = err.to_string();
        match err {
            DispatchError::OrderNotFound(_)
            | DispatchError::CourierNotFound(_)
            | DispatchError::ZoneNotFound(_) => AppError::NotFound(message),
            DispatchError::Unauthorized { .. } => AppError::Forbidden(message),
            DispatchError::IllegalTransition { .. }
            | DispatchError::OfferExpired { .. }
            | DispatchError::OrderAlreadyAssigned { .. }
            | DispatchError::VersionConflict { .. }
            | DispatchError::WaitFeeAlreadyRecorded(_) => AppError::Conflict(message),
            DispatchError::NoCouriersAvailable => AppError::NoAvailableCouriers,
            DispatchError::Notification(_) => AppError::Internal(message),
            DispatchError::InvalidZoneRule(_)
            | DispatchError::InvalidZone(_)
            | DispatchError::GeocodeFailure(_)
            | DispatchError::StaleLocation { .. }
            | DispatchError::OutsideServiceArea
            | DispatchError::NoActivePricingRule(_)
            | DispatchError::PackageRejected(_)
            | DispatchError::PickupCodeMismatch
            | DispatchError::InvalidInput(_) => AppError::BadRequest(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::NoAvailableCouriers => (
                StatusCode::SERVICE_UNAVAILABLE,
                "no couriers available".to_string(),
            ),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
