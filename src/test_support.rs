use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::models::courier::GeoPoint;
use crate::models::order::{AddressSnapshot, ContactInfo, Order, OrderStatus, Package};
use crate::models::pricing::PricingBreakdown;
use crate::models::zone::PricingRule;

pub(crate) fn sample_rule() -> PricingRule {
    PricingRule {
        id: Uuid::new_v4(),
        base_fare: dec!(5.00),
        per_km_rate: dec!(1.50),
        per_minute_rate: dec!(0.25),
        surge_multiplier: dec!(1.0),
        wait_time_rate: dec!(0.30),
        max_bag_weight_kg: 5.0,
        max_bag_volume_liters: 25.0,
        is_active: true,
        created_at: Utc::now(),
    }
}

fn address(street: &str, lat: f64, lng: f64) -> AddressSnapshot {
    AddressSnapshot {
        label: None,
        street: street.to_string(),
        city: "San Francisco".to_string(),
        zip_code: None,
        country: Some("US".to_string()),
        instructions: None,
        location: GeoPoint { lat, lng },
    }
}

fn contact(name: &str) -> ContactInfo {
    ContactInfo {
        name: name.to_string(),
        phone: "+1 415 555 0100".to_string(),
        email: None,
    }
}

pub(crate) fn sample_order() -> Order {
    let now = Utc::now();
    Order {
        id: Uuid::new_v4(),
        version: 0,
        status: OrderStatus::Created,
        customer_id: Uuid::new_v4(),
        courier_id: None,
        pickup_address: address("1 Market St", 37.7936, -122.3958),
        pickup_contact: contact("Ana"),
        dropoff_address: address("500 Castro St", 37.7609, -122.4350),
        dropoff_contact: contact("Ben"),
        package: Package {
            description: "documents".to_string(),
            declared_value: dec!(40),
            weight_kg: Some(1.0),
            dimensions: None,
        },
        pricing: PricingBreakdown {
            base_fare: dec!(5.00),
            distance_fee: dec!(4.80),
            time_fee: dec!(2.50),
            surge_fee: Decimal::ZERO,
            wait_fee: Decimal::ZERO,
            service_fee: dec!(1.85),
            total: dec!(14.15),
            currency: "USD".to_string(),
        },
        rate_card: sample_rule(),
        adjustments: Vec::new(),
        pickup_code: "AB12CD".to_string(),
        replaces: None,
        cancel_reason: None,
        created_at: now,
        updated_at: now,
        pickup_time: None,
        dropoff_time: None,
        completed_at: None,
        canceled_at: None,
        disputed_at: None,
    }
}
