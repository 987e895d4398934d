use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::courier::{CourierProfile, GeoPoint, LocationFix};
use crate::models::order::Order;
use crate::ports::{CourierDirectory, OrderRepository};

/// Orders keyed by id. `save` is a compare-and-set on `Order::version`
/// performed under the shard lock of the entry.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: DashMap<Uuid, Order>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, mut order: Order) -> Result<Order, DispatchError> {
        use dashmap::mapref::entry::Entry;

        match self.orders.entry(order.id) {
            Entry::Occupied(_) => Err(DispatchError::InvalidInput(format!(
                "order {} already exists",
                order.id
            ))),
            Entry::Vacant(slot) => {
                order.version = 1;
                slot.insert(order.clone());
                Ok(order)
            }
        }
    }

    async fn get(&self, order_id: Uuid) -> Result<Order, DispatchError> {
        self.orders
            .get(&order_id)
            .map(|order| order.clone())
            .ok_or(DispatchError::OrderNotFound(order_id))
    }

    async fn save(&self, mut order: Order, expected_version: u64) -> Result<Order, DispatchError> {
        let mut stored = self
            .orders
            .get_mut(&order.id)
            .ok_or(DispatchError::OrderNotFound(order.id))?;

        if stored.version != expected_version {
            return Err(DispatchError::VersionConflict {
                order_id: order.id,
                expected: expected_version,
                actual: stored.version,
            });
        }

        order.version = expected_version + 1;
        *stored = order.clone();
        Ok(order)
    }

    async fn list_by_customer(&self, customer_id: Uuid) -> Result<Vec<Order>, DispatchError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.customer_id == customer_id)
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn count(&self) -> usize {
        self.orders.len()
    }
}

#[derive(Default)]
pub struct InMemoryCourierDirectory {
    couriers: DashMap<Uuid, CourierProfile>,
}

impl InMemoryCourierDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CourierDirectory for InMemoryCourierDirectory {
    async fn upsert(&self, courier: CourierProfile) -> Result<CourierProfile, DispatchError> {
        self.couriers.insert(courier.id, courier.clone());
        Ok(courier)
    }

    async fn get(&self, courier_id: Uuid) -> Result<CourierProfile, DispatchError> {
        self.couriers
            .get(&courier_id)
            .map(|courier| courier.clone())
            .ok_or(DispatchError::CourierNotFound(courier_id))
    }

    async fn list(&self) -> Vec<CourierProfile> {
        self.couriers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn list_online_in_zone(&self, zone_id: Uuid) -> Vec<CourierProfile> {
        self.couriers
            .iter()
            .filter(|entry| entry.is_online && entry.serves(zone_id))
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn get_location(
        &self,
        courier_id: Uuid,
        max_age: Duration,
    ) -> Result<LocationFix, DispatchError> {
        let courier = self
            .couriers
            .get(&courier_id)
            .ok_or(DispatchError::CourierNotFound(courier_id))?;
        let fix = courier
            .current_location
            .ok_or(DispatchError::StaleLocation { courier_id })?;

        let age = Utc::now().signed_duration_since(fix.recorded_at);
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        if age > max_age {
            return Err(DispatchError::StaleLocation { courier_id });
        }

        Ok(fix)
    }

    async fn set_online(
        &self,
        courier_id: Uuid,
        online: bool,
    ) -> Result<CourierProfile, DispatchError> {
        let mut courier = self
            .couriers
            .get_mut(&courier_id)
            .ok_or(DispatchError::CourierNotFound(courier_id))?;

        courier.is_online = online;
        courier.updated_at = Utc::now();
        Ok(courier.clone())
    }

    async fn update_location(
        &self,
        courier_id: Uuid,
        point: GeoPoint,
    ) -> Result<CourierProfile, DispatchError> {
        let mut courier = self
            .couriers
            .get_mut(&courier_id)
            .ok_or(DispatchError::CourierNotFound(courier_id))?;

        let now = Utc::now();
        courier.current_location = Some(LocationFix {
            point,
            recorded_at: now,
        });
        courier.updated_at = now;
        Ok(courier.clone())
    }

    async fn record_delivery(
        &self,
        courier_id: Uuid,
        payout: Decimal,
    ) -> Result<CourierProfile, DispatchError> {
        let mut courier = self
            .couriers
            .get_mut(&courier_id)
            .ok_or(DispatchError::CourierNotFound(courier_id))?;

        courier.earnings.total += payout;
        courier.earnings.deliveries += 1;
        courier.updated_at = Utc::now();
        Ok(courier.clone())
    }
}
