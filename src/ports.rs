//! Boundaries the engines talk through. Storage, courier presence, offer
//! delivery, event fan-out and geocoding are all injected behind these traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::courier::{CourierProfile, GeoPoint, LocationFix};
use crate::models::event::OrderEvent;
use crate::models::offer::Offer;
use crate::models::order::Order;

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: Order) -> Result<Order, DispatchError>;

    async fn get(&self, order_id: Uuid) -> Result<Order, DispatchError>;

    /// Compare-and-set write. Fails with `VersionConflict` unless the stored
    /// version equals `expected_version`; on success the returned order
    /// carries the bumped version.
    async fn save(&self, order: Order, expected_version: u64) -> Result<Order, DispatchError>;

    async fn list_by_customer(&self, customer_id: Uuid) -> Result<Vec<Order>, DispatchError>;

    async fn count(&self) -> usize;
}

#[async_trait]
pub trait CourierDirectory: Send + Sync {
    async fn upsert(&self, courier: CourierProfile) -> Result<CourierProfile, DispatchError>;

    async fn get(&self, courier_id: Uuid) -> Result<CourierProfile, DispatchError>;

    async fn list(&self) -> Vec<CourierProfile>;

    async fn list_online_in_zone(&self, zone_id: Uuid) -> Vec<CourierProfile>;

    /// Current position, or `StaleLocation` when older than `max_age`.
    async fn get_location(
        &self,
        courier_id: Uuid,
        max_age: Duration,
    ) -> Result<LocationFix, DispatchError>;

    async fn set_online(
        &self,
        courier_id: Uuid,
        online: bool,
    ) -> Result<CourierProfile, DispatchError>;

    async fn update_location(
        &self,
        courier_id: Uuid,
        point: GeoPoint,
    ) -> Result<CourierProfile, DispatchError>;

    async fn record_delivery(
        &self,
        courier_id: Uuid,
        payout: Decimal,
    ) -> Result<CourierProfile, DispatchError>;
}

#[async_trait]
pub trait OfferChannel: Send + Sync {
    async fn send_offer(&self, offer: &Offer) -> Result<(), DispatchError>;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &OrderEvent) -> Result<(), DispatchError>;
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<GeoPoint, DispatchError>;
}

pub type SharedOrderRepository = Arc<dyn OrderRepository>;
pub type SharedCourierDirectory = Arc<dyn CourierDirectory>;
pub type SharedOfferChannel = Arc<dyn OfferChannel>;
pub type SharedEventPublisher = Arc<dyn EventPublisher>;
pub type SharedGeocoder = Arc<dyn Geocoder>;

