#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use courier_dispatch::config::{DispatchSettings, PricingSettings, ZoneOverlapPolicy};
use courier_dispatch::engine::intake::{AddressInput, CreateOrderRequest, OrderIntake};
use courier_dispatch::engine::lifecycle::OrderLifecycle;
use courier_dispatch::engine::matching::Dispatcher;
use courier_dispatch::engine::pricing::PricingEngine;
use courier_dispatch::engine::queue::DispatchQueue;
use courier_dispatch::error::DispatchError;
use courier_dispatch::feed::BroadcastFeed;
use courier_dispatch::geo::geocoder::GazetteerGeocoder;
use courier_dispatch::models::courier::{
    CourierProfile, Earnings, GeoPoint, LocationFix, VehicleType,
};
use courier_dispatch::models::offer::Offer;
use courier_dispatch::models::order::{ContactInfo, Order, Package};
use courier_dispatch::models::zone::{PricingRule, Zone};
use courier_dispatch::observability::metrics::Metrics;
use courier_dispatch::ports::{CourierDirectory, OfferChannel};
use courier_dispatch::store::{InMemoryCourierDirectory, InMemoryOrderRepository};
use courier_dispatch::zones::ZoneRegistry;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use uuid::Uuid;

pub const PICKUP: GeoPoint = GeoPoint {
    lat: 37.7936,
    lng: -122.3958,
};

pub const DROPOFF: GeoPoint = GeoPoint {
    lat: 37.7609,
    lng: -122.4350,
};

/// Offer channel that keeps every offer it was asked to deliver and can be
/// told to refuse particular couriers.
#[derive(Default)]
pub struct RecordingOffers {
    sent: Mutex<Vec<Offer>>,
    unreachable: Mutex<HashSet<Uuid>>,
}

impl RecordingOffers {
    pub fn sent(&self) -> Vec<Offer> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_for(&self, order_id: Uuid) -> Option<Offer> {
        self.sent()
            .into_iter()
            .rev()
            .find(|offer| offer.order_id == order_id)
    }

    pub fn offered_couriers(&self, order_id: Uuid) -> Vec<Uuid> {
        self.sent()
            .into_iter()
            .filter(|offer| offer.order_id == order_id)
            .map(|offer| offer.courier_id)
            .collect()
    }

    pub fn make_unreachable(&self, courier_id: Uuid) {
        self.unreachable.lock().unwrap().insert(courier_id);
    }
}

#[async_trait]
impl OfferChannel for RecordingOffers {
    async fn send_offer(&self, offer: &Offer) -> Result<(), DispatchError> {
        if self.unreachable.lock().unwrap().contains(&offer.courier_id) {
            return Err(DispatchError::Notification(format!(
                "courier {} unreachable",
                offer.courier_id
            )));
        }
        self.sent.lock().unwrap().push(offer.clone());
        Ok(())
    }
}

pub struct World {
    pub dispatcher: Arc<Dispatcher>,
    pub lifecycle: Arc<OrderLifecycle>,
    pub intake: OrderIntake,
    pub orders: Arc<InMemoryOrderRepository>,
    pub couriers: Arc<InMemoryCourierDirectory>,
    pub offers: Arc<RecordingOffers>,
    pub feed: BroadcastFeed,
    pub metrics: Metrics,
    pub zone_id: Uuid,
    pub queued: mpsc::Receiver<Uuid>,
}

pub fn rule() -> PricingRule {
    PricingRule {
        id: Uuid::new_v4(),
        base_fare: dec!(5.00),
        per_km_rate: dec!(1.50),
        per_minute_rate: dec!(0.25),
        surge_multiplier: dec!(1.0),
        wait_time_rate: dec!(0.30),
        max_bag_weight_kg: 8.0,
        max_bag_volume_liters: 40.0,
        is_active: true,
        created_at: Utc::now(),
    }
}

pub fn downtown() -> Zone {
    Zone {
        id: Uuid::new_v4(),
        name: "downtown".to_string(),
        coordinates: vec![
            GeoPoint { lat: 37.70, lng: -122.52 },
            GeoPoint { lat: 37.70, lng: -122.35 },
            GeoPoint { lat: 37.84, lng: -122.35 },
            GeoPoint { lat: 37.84, lng: -122.52 },
        ],
        is_active: true,
        priority: 0,
        pricing_rules: vec![rule()],
    }
}

pub fn world(settings: DispatchSettings) -> World {
    let orders = Arc::new(InMemoryOrderRepository::new());
    let couriers = Arc::new(InMemoryCourierDirectory::new());
    let offers = Arc::new(RecordingOffers::default());
    let feed = BroadcastFeed::new(256);
    let metrics = Metrics::new();
    let pricing = PricingSettings::default();

    let zones = Arc::new(ZoneRegistry::new(ZoneOverlapPolicy::Priority));
    let zone_id = zones.insert(downtown()).unwrap().id;

    let lifecycle = Arc::new(OrderLifecycle::new(
        orders.clone(),
        couriers.clone(),
        Arc::new(feed.clone()),
        PricingEngine::new(&pricing),
        pricing.wait_grace_minutes,
        metrics.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        orders.clone(),
        couriers.clone(),
        zones.clone(),
        offers.clone(),
        lifecycle.clone(),
        settings,
        metrics.clone(),
    ));
    let (queue, queued) = DispatchQueue::channel(64);
    let intake = OrderIntake::new(
        orders.clone(),
        Arc::new(GazetteerGeocoder::new()),
        zones,
        lifecycle.clone(),
        pricing,
        queue,
    );

    World {
        dispatcher,
        lifecycle,
        intake,
        orders,
        couriers,
        offers,
        feed,
        metrics,
        zone_id,
        queued,
    }
}

pub fn address(street: &str, location: GeoPoint) -> AddressInput {
    AddressInput {
        label: None,
        street: street.to_string(),
        city: "San Francisco".to_string(),
        zip_code: None,
        country: None,
        instructions: None,
        location: Some(location),
    }
}

pub fn contact(name: &str) -> ContactInfo {
    ContactInfo {
        name: name.to_string(),
        phone: "+1 415 555 0100".to_string(),
        email: None,
    }
}

pub fn order_request(customer_id: Uuid) -> CreateOrderRequest {
    CreateOrderRequest {
        customer_id,
        pickup_address: address("1 Market St", PICKUP),
        pickup_contact: contact("Ana"),
        dropoff_address: address("500 Castro St", DROPOFF),
        dropoff_contact: contact("Ben"),
        package: Package {
            description: "documents".to_string(),
            declared_value: dec!(40),
            weight_kg: Some(1.0),
            dimensions: None,
        },
    }
}

impl World {
    /// Online courier in the test zone with a fresh fix `offset_deg`
    /// degrees of latitude north of the pickup.
    pub async fn courier_at(&self, offset_deg: f64, vehicle: VehicleType) -> Uuid {
        let now = Utc::now();
        self.courier_with_fix(offset_deg, vehicle, now).await
    }

    pub async fn courier_with_fix(
        &self,
        offset_deg: f64,
        vehicle: VehicleType,
        recorded_at: chrono::DateTime<Utc>,
    ) -> Uuid {
        let profile = CourierProfile {
            id: Uuid::new_v4(),
            name: format!("courier-{offset_deg}"),
            is_online: true,
            vehicle_type: vehicle,
            service_zones: HashSet::from([self.zone_id]),
            current_location: Some(LocationFix {
                point: GeoPoint {
                    lat: PICKUP.lat + offset_deg,
                    lng: PICKUP.lng,
                },
                recorded_at,
            }),
            rating: 4.5,
            earnings: Earnings::default(),
            updated_at: recorded_at,
        };
        self.couriers.upsert(profile).await.unwrap().id
    }

    pub async fn stale_courier(&self, offset_deg: f64) -> Uuid {
        let long_ago = Utc::now() - ChronoDuration::minutes(10);
        self.courier_with_fix(offset_deg, VehicleType::Bike, long_ago)
            .await
    }

    /// Creates an order through intake and starts matching it right away.
    pub async fn dispatched_order(&self) -> Order {
        let order = self
            .intake
            .create(order_request(Uuid::new_v4()))
            .await
            .unwrap();
        self.dispatcher.start(order.id).await.unwrap();
        order
    }
}
