use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PricingSettings;
use crate::engine::lifecycle::OrderLifecycle;
use crate::engine::pricing::PricingEngine;
use crate::engine::queue::DispatchQueue;
use crate::error::DispatchError;
use crate::geo::{eta_minutes, haversine_km};
use crate::models::courier::GeoPoint;
use crate::models::order::{AddressSnapshot, ContactInfo, Order, OrderStatus, Package};
use crate::models::pricing::Quote;
use crate::models::zone::PricingRule;
use crate::ports::{SharedGeocoder, SharedOrderRepository};
use crate::zones::ZoneRegistry;

const PICKUP_CODE_LEN: usize = 6;
const PICKUP_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Clone, Deserialize)]
pub struct AddressInput {
    #[serde(default)]
    pub label: Option<String>,
    pub street: String,
    pub city: String,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    /// Geocoded from the address fields when absent.
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

impl AddressInput {
    /// Single-line form handed to the geocoder, e.g. `1 Market St, San Francisco, US`.
    pub fn query(&self) -> String {
        [
            Some(self.street.as_str()),
            Some(self.city.as_str()),
            self.zip_code.as_deref(),
            self.country.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    pub pickup_address: AddressInput,
    pub pickup_contact: ContactInfo,
    pub dropoff_address: AddressInput,
    pub dropoff_contact: ContactInfo,
    pub package: Package,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteRequest {
    pub pickup_address: AddressInput,
    pub dropoff_address: AddressInput,
}

/// Turns customer requests into priced `created` orders and hands them to
/// the dispatch queue.
pub struct OrderIntake {
    orders: SharedOrderRepository,
    geocoder: SharedGeocoder,
    zones: Arc<ZoneRegistry>,
    lifecycle: Arc<OrderLifecycle>,
    pricing: PricingEngine,
    settings: PricingSettings,
    queue: DispatchQueue,
}

impl OrderIntake {
    pub fn new(
        orders: SharedOrderRepository,
        geocoder: SharedGeocoder,
        zones: Arc<ZoneRegistry>,
        lifecycle: Arc<OrderLifecycle>,
        settings: PricingSettings,
        queue: DispatchQueue,
    ) -> Self {
        Self {
            orders,
            geocoder,
            zones,
            lifecycle,
            pricing: PricingEngine::new(&settings),
            settings,
            queue,
        }
    }

    pub async fn quote(&self, request: QuoteRequest) -> Result<Quote, DispatchError> {
        let pickup = self.locate(&request.pickup_address).await?;
        let dropoff = self.locate(&request.dropoff_address).await?;
        let (_, quote) = self.price_trip(&pickup.location, &dropoff.location)?;
        Ok(quote)
    }

    pub async fn create(&self, request: CreateOrderRequest) -> Result<Order, DispatchError> {
        validate_contact("pickup", &request.pickup_contact)?;
        validate_contact("dropoff", &request.dropoff_contact)?;

        let pickup_address = self.locate(&request.pickup_address).await?;
        let dropoff_address = self.locate(&request.dropoff_address).await?;

        let (rule, quote) = self.price_trip(&pickup_address.location, &dropoff_address.location)?;
        self.validate_package(&request.package, &rule)?;

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            version: 0,
            status: OrderStatus::Created,
            customer_id: request.customer_id,
            courier_id: None,
            pickup_address,
            pickup_contact: request.pickup_contact,
            dropoff_address,
            dropoff_contact: request.dropoff_contact,
            package: request.package,
            pricing: quote.pricing,
            rate_card: rule,
            adjustments: Vec::new(),
            pickup_code: generate_pickup_code(),
            replaces: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
            pickup_time: None,
            dropoff_time: None,
            completed_at: None,
            canceled_at: None,
            disputed_at: None,
        };

        let stored = self.orders.insert(order).await?;
        info!(
            order_id = %stored.id,
            customer_id = %stored.customer_id,
            distance_km = quote.distance_km,
            total = %stored.pricing.total,
            "order created"
        );

        self.lifecycle.announce_created(&stored).await;

        if let Err(err) = self.queue.enqueue(stored.id).await {
            warn!(order_id = %stored.id, error = %err, "order stored but not queued for dispatch");
        }

        Ok(stored)
    }

    async fn locate(&self, input: &AddressInput) -> Result<AddressSnapshot, DispatchError> {
        if input.street.trim().is_empty() || input.city.trim().is_empty() {
            return Err(DispatchError::InvalidInput(
                "address needs a street and a city".to_string(),
            ));
        }

        let location = match input.location {
            Some(point) => point,
            None => self.geocoder.geocode(&input.query()).await?,
        };
        if !(-90.0..=90.0).contains(&location.lat) || !(-180.0..=180.0).contains(&location.lng) {
            return Err(DispatchError::InvalidInput(format!(
                "coordinates out of range: {}, {}",
                location.lat, location.lng
            )));
        }

        Ok(AddressSnapshot {
            label: input.label.clone(),
            street: input.street.clone(),
            city: input.city.clone(),
            zip_code: input.zip_code.clone(),
            country: input.country.clone(),
            instructions: input.instructions.clone(),
            location,
        })
    }

    /// Prices a pickup-to-dropoff trip under the pickup zone's active rule.
    fn price_trip(
        &self,
        pickup: &GeoPoint,
        dropoff: &GeoPoint,
    ) -> Result<(PricingRule, Quote), DispatchError> {
        let zone = self
            .zones
            .resolve(pickup)
            .ok_or(DispatchError::OutsideServiceArea)?;
        let rule = zone
            .active_rule()
            .cloned()
            .ok_or(DispatchError::NoActivePricingRule(zone.id))?;

        let distance_km = haversine_km(pickup, dropoff);
        let eta = eta_minutes(distance_km, Some(self.settings.average_speed_kmh));
        let pricing = self
            .pricing
            .compute(&rule, distance_km, eta, rule.surge_multiplier)?;

        Ok((
            rule,
            Quote {
                distance_km,
                eta_minutes: eta,
                pricing,
            },
        ))
    }

    fn validate_package(&self, package: &Package, rule: &PricingRule) -> Result<(), DispatchError> {
        if package.description.trim().is_empty() {
            return Err(DispatchError::PackageRejected(
                "description cannot be empty".to_string(),
            ));
        }
        if package.declared_value < Decimal::ZERO {
            return Err(DispatchError::PackageRejected(
                "declared value cannot be negative".to_string(),
            ));
        }
        if package.declared_value > self.settings.max_declared_value {
            return Err(DispatchError::PackageRejected(format!(
                "declared value {} exceeds {}",
                package.declared_value, self.settings.max_declared_value
            )));
        }

        if let Some(weight) = package.weight_kg {
            if !(weight > 0.0) {
                return Err(DispatchError::PackageRejected(
                    "weight must be positive".to_string(),
                ));
            }
        }
        if let Some(dimensions) = package.dimensions {
            let sides = [dimensions.length_cm, dimensions.width_cm, dimensions.height_cm];
            if sides.iter().any(|side| !(*side > 0.0)) {
                return Err(DispatchError::PackageRejected(
                    "dimensions must be positive".to_string(),
                ));
            }
        }

        if package.weight() > rule.max_bag_weight_kg {
            return Err(DispatchError::PackageRejected(format!(
                "weight {} kg exceeds bag limit {} kg",
                package.weight(),
                rule.max_bag_weight_kg
            )));
        }
        if package.volume_liters() > rule.max_bag_volume_liters {
            return Err(DispatchError::PackageRejected(format!(
                "volume {:.1} l exceeds bag limit {} l",
                package.volume_liters(),
                rule.max_bag_volume_liters
            )));
        }

        Ok(())
    }
}

fn validate_contact(which: &str, contact: &ContactInfo) -> Result<(), DispatchError> {
    if contact.name.trim().is_empty() || contact.phone.trim().is_empty() {
        return Err(DispatchError::InvalidInput(format!(
            "{which} contact needs a name and a phone number"
        )));
    }
    Ok(())
}

pub fn generate_pickup_code() -> String {
    let mut rng = rand::thread_rng();
    (0..PICKUP_CODE_LEN)
        .map(|_| PICKUP_CODE_CHARSET[rng.gen_range(0..PICKUP_CODE_CHARSET.len())] as char)
        .collect()
}
