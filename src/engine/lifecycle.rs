use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::pricing::PricingEngine;
use crate::engine::state_machine::{self, Transition};
use crate::error::DispatchError;
use crate::models::actor::Actor;
use crate::models::event::OrderEvent;
use crate::models::order::{Adjustment, AdjustmentKind, CancelReason, Order, OrderStatus};
use crate::observability::metrics::Metrics;
use crate::ports::{SharedCourierDirectory, SharedEventPublisher, SharedOrderRepository};

const PUBLISH_ATTEMPTS: u32 = 4;
const PUBLISH_BACKOFF: Duration = Duration::from_millis(250);

/// Applies state machine edges to stored orders. Each change is one
/// compare-and-set write; events go out only after the write lands.
pub struct OrderLifecycle {
    orders: SharedOrderRepository,
    couriers: SharedCourierDirectory,
    events: SharedEventPublisher,
    pricing: PricingEngine,
    wait_grace_minutes: u32,
    metrics: Metrics,
}

impl OrderLifecycle {
    pub fn new(
        orders: SharedOrderRepository,
        couriers: SharedCourierDirectory,
        events: SharedEventPublisher,
        pricing: PricingEngine,
        wait_grace_minutes: u32,
        metrics: Metrics,
    ) -> Self {
        Self {
            orders,
            couriers,
            events,
            pricing,
            wait_grace_minutes,
            metrics,
        }
    }

    pub fn orders(&self) -> &SharedOrderRepository {
        &self.orders
    }

    pub async fn transition(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        actor: &Actor,
    ) -> Result<Order, DispatchError> {
        let current = self.orders.get(order_id).await?;
        if current.status != target {
            match target {
                OrderStatus::Assigned => {
                    return Err(DispatchError::InvalidInput(
                        "orders are assigned by accepting an offer".to_string(),
                    ));
                }
                OrderStatus::PickedUp => {
                    return Err(DispatchError::InvalidInput(
                        "pickup is confirmed with the pickup code".to_string(),
                    ));
                }
                _ => {}
            }
        }

        let applied = state_machine::transition(&current, target, actor, Utc::now())?;
        self.commit(&current, applied).await
    }

    pub async fn cancel(
        &self,
        order_id: Uuid,
        actor: &Actor,
        reason: Option<CancelReason>,
    ) -> Result<Order, DispatchError> {
        let current = self.orders.get(order_id).await?;
        self.cancel_snapshot(&current, actor, reason).await
    }

    /// Cancels starting from an already-read snapshot; fails with
    /// `VersionConflict` if the order moved since.
    pub async fn cancel_snapshot(
        &self,
        current: &Order,
        actor: &Actor,
        reason: Option<CancelReason>,
    ) -> Result<Order, DispatchError> {
        let now = Utc::now();
        let applied = match reason {
            Some(reason) => state_machine::cancel(current, actor, reason, now)?,
            None => state_machine::transition(current, OrderStatus::Canceled, actor, now)?,
        };
        self.commit(current, applied).await
    }

    /// `created -> assigned` for the courier whose offer the matcher accepted.
    pub async fn assign(&self, current: &Order, courier_id: Uuid) -> Result<Order, DispatchError> {
        let applied = state_machine::transition(
            current,
            OrderStatus::Assigned,
            &Actor::Courier(courier_id),
            Utc::now(),
        )?;
        self.commit(current, applied).await
    }

    pub async fn confirm_pickup(
        &self,
        order_id: Uuid,
        courier_id: Uuid,
        pickup_code: &str,
    ) -> Result<Order, DispatchError> {
        let current = self.orders.get(order_id).await?;
        if !current
            .pickup_code
            .eq_ignore_ascii_case(pickup_code.trim())
        {
            warn!(order_id = %order_id, courier_id = %courier_id, "pickup code mismatch");
            return Err(DispatchError::PickupCodeMismatch);
        }

        let applied = state_machine::transition(
            &current,
            OrderStatus::PickedUp,
            &Actor::Courier(courier_id),
            Utc::now(),
        )?;
        self.commit(&current, applied).await
    }

    /// Records the pickup wait charge as a separate adjustment. The priced
    /// breakdown shown to the customer stays as it was.
    pub async fn record_wait_fee(
        &self,
        order_id: Uuid,
        actor: &Actor,
        waited_minutes: u32,
    ) -> Result<Order, DispatchError> {
        let current = self.orders.get(order_id).await?;

        let at_pickup = matches!(
            current.status,
            OrderStatus::CourierEnRoutePickup | OrderStatus::PickedUp
        );
        if !at_pickup {
            return Err(DispatchError::InvalidInput(format!(
                "wait fee can only be recorded around pickup, order is {}",
                current.status
            )));
        }

        let allowed = match actor {
            Actor::Courier(id) => current.courier_id == Some(*id),
            Actor::System => true,
            Actor::Customer(_) | Actor::Admin => false,
        };
        if !allowed {
            return Err(DispatchError::Unauthorized {
                actor: actor.to_string(),
                from: current.status,
                to: current.status,
            });
        }

        if current
            .adjustments
            .iter()
            .any(|adjustment| adjustment.kind == AdjustmentKind::WaitFee)
        {
            return Err(DispatchError::WaitFeeAlreadyRecorded(order_id));
        }

        let amount = self
            .pricing
            .wait_fee(&current.rate_card, waited_minutes, self.wait_grace_minutes);

        let now = Utc::now();
        let mut next = current.clone();
        next.adjustments.push(Adjustment {
            kind: AdjustmentKind::WaitFee,
            amount,
            created_at: now,
        });
        next.updated_at = now;

        let saved = self.orders.save(next, current.version).await?;
        info!(order_id = %order_id, amount = %amount, waited_minutes, "wait fee recorded");
        Ok(saved)
    }

    /// Persists a transition computed from `current`. No-op transitions are
    /// returned as-is without a write or an event.
    pub async fn commit(&self, current: &Order, applied: Transition) -> Result<Order, DispatchError> {
        if !applied.changed {
            return Ok(applied.order);
        }

        let saved = self.orders.save(applied.order, current.version).await?;

        self.metrics
            .transitions_total
            .with_label_values(&[applied.to.as_str()])
            .inc();
        info!(
            order_id = %saved.id,
            from = %applied.from,
            to = %applied.to,
            version = saved.version,
            "order transitioned"
        );

        if applied.to == OrderStatus::Completed {
            self.credit_courier(&saved).await;
        }

        self.publish(OrderEvent {
            order_id: saved.id,
            old_status: Some(applied.from),
            new_status: applied.to,
            timestamp: saved.updated_at,
        })
        .await;

        Ok(saved)
    }

    pub async fn announce_created(&self, order: &Order) {
        self.metrics
            .transitions_total
            .with_label_values(&[OrderStatus::Created.as_str()])
            .inc();
        self.publish(OrderEvent {
            order_id: order.id,
            old_status: None,
            new_status: order.status,
            timestamp: order.created_at,
        })
        .await;
    }

    async fn credit_courier(&self, order: &Order) {
        let Some(courier_id) = order.courier_id else {
            return;
        };
        let payout = order.pricing.total - order.pricing.service_fee + order.adjustment_total();
        if let Err(err) = self.couriers.record_delivery(courier_id, payout).await {
            error!(order_id = %order.id, courier_id = %courier_id, error = %err, "failed to credit courier earnings");
        }
    }

    /// First attempt inline so events for one order keep their order; retries
    /// run in the background and never touch the committed state.
    async fn publish(&self, event: OrderEvent) {
        let Err(err) = self.events.publish(&event).await else {
            return;
        };
        warn!(order_id = %event.order_id, error = %err, "event publication failed; retrying");

        let events = self.events.clone();
        tokio::spawn(async move {
            for attempt in 2..=PUBLISH_ATTEMPTS {
                sleep(PUBLISH_BACKOFF * attempt).await;
                match events.publish(&event).await {
                    Ok(()) => return,
                    Err(err) => {
                        warn!(order_id = %event.order_id, attempt, error = %err, "event publication retry failed")
                    }
                }
            }
            error!(order_id = %event.order_id, new_status = %event.new_status, "giving up on event publication");
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::OrderLifecycle;
    use crate::config::PricingSettings;
    use crate::engine::pricing::PricingEngine;
    use crate::error::DispatchError;
    use crate::feed::BroadcastFeed;
    use crate::models::actor::Actor;
    use crate::models::courier::{CourierProfile, Earnings, VehicleType};
    use crate::models::event::{FeedMessage, OrderEvent};
    use crate::models::order::{Order, OrderStatus};
    use crate::observability::metrics::Metrics;
    use crate::ports::{CourierDirectory, EventPublisher, OrderRepository};
    use crate::store::{InMemoryCourierDirectory, InMemoryOrderRepository};
    use crate::test_support::sample_order;

    /// Fails the first `failures` publications, then succeeds.
    struct FlakyPublisher {
        failures: u32,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl EventPublisher for FlakyPublisher {
        async fn publish(&self, _event: &OrderEvent) -> Result<(), DispatchError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                Err(DispatchError::Notification("broker unavailable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct Harness {
        lifecycle: OrderLifecycle,
        orders: Arc<InMemoryOrderRepository>,
        couriers: Arc<InMemoryCourierDirectory>,
    }

    fn harness_with(events: Arc<dyn EventPublisher>) -> Harness {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let couriers = Arc::new(InMemoryCourierDirectory::new());
        let settings = PricingSettings::default();
        Harness {
            lifecycle: OrderLifecycle::new(
                orders.clone(),
                couriers.clone(),
                events,
                PricingEngine::new(&settings),
                settings.wait_grace_minutes,
                Metrics::new(),
            ),
            orders,
            couriers,
        }
    }

    async fn courier(couriers: &InMemoryCourierDirectory) -> Uuid {
        let profile = CourierProfile {
            id: Uuid::new_v4(),
            name: "Cora".to_string(),
            is_online: true,
            vehicle_type: VehicleType::Bike,
            service_zones: HashSet::new(),
            current_location: None,
            rating: 4.7,
            earnings: Earnings::default(),
            updated_at: Utc::now(),
        };
        couriers.upsert(profile).await.unwrap().id
    }

    async fn stored_order(h: &Harness, status: OrderStatus, courier_id: Option<Uuid>) -> Order {
        let mut order = sample_order();
        order.status = status;
        order.courier_id = courier_id;
        h.orders.insert(order).await.unwrap()
    }

    #[tokio::test]
    async fn committed_transition_publishes_one_event() {
        let feed = Arc::new(BroadcastFeed::new(16));
        let mut rx = feed.subscribe();
        let h = harness_with(feed);
        let courier_id = courier(&h.couriers).await;
        let order = stored_order(&h, OrderStatus::Assigned, Some(courier_id)).await;

        let moved = h
            .lifecycle
            .transition(order.id, OrderStatus::CourierEnRoutePickup, &Actor::Courier(courier_id))
            .await
            .unwrap();
        assert_eq!(moved.version, order.version + 1);

        match rx.recv().await.unwrap() {
            FeedMessage::OrderEvent(event) => {
                assert_eq!(event.order_id, order.id);
                assert_eq!(event.old_status, Some(OrderStatus::Assigned));
                assert_eq!(event.new_status, OrderStatus::CourierEnRoutePickup);
            }
            other => panic!("unexpected feed message {other:?}"),
        }
    }

    #[tokio::test]
    async fn repeated_transition_is_silent() {
        let feed = Arc::new(BroadcastFeed::new(16));
        let mut rx = feed.subscribe();
        let h = harness_with(feed);
        let courier_id = courier(&h.couriers).await;
        let order = stored_order(&h, OrderStatus::PickedUp, Some(courier_id)).await;

        let same = h
            .lifecycle
            .transition(order.id, OrderStatus::PickedUp, &Actor::Courier(courier_id))
            .await
            .unwrap();

        assert_eq!(same, order);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stale_snapshot_loses_to_a_concurrent_write() {
        let h = harness_with(Arc::new(BroadcastFeed::new(16)));
        let courier_id = courier(&h.couriers).await;
        let order = stored_order(&h, OrderStatus::Assigned, Some(courier_id)).await;

        h.lifecycle
            .transition(order.id, OrderStatus::CourierEnRoutePickup, &Actor::System)
            .await
            .unwrap();

        let err = h
            .lifecycle
            .cancel_snapshot(&order, &Actor::System, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::VersionConflict { .. }));
        assert_eq!(
            h.orders.get(order.id).await.unwrap().status,
            OrderStatus::CourierEnRoutePickup
        );
    }

    #[tokio::test]
    async fn pickup_requires_the_matching_code() {
        let h = harness_with(Arc::new(BroadcastFeed::new(16)));
        let courier_id = courier(&h.couriers).await;
        let order = stored_order(&h, OrderStatus::CourierEnRoutePickup, Some(courier_id)).await;

        assert_eq!(
            h.lifecycle
                .confirm_pickup(order.id, courier_id, "ZZ99ZZ")
                .await
                .unwrap_err(),
            DispatchError::PickupCodeMismatch
        );

        let picked = h
            .lifecycle
            .confirm_pickup(order.id, courier_id, " ab12cd ")
            .await
            .unwrap();
        assert_eq!(picked.status, OrderStatus::PickedUp);
        assert!(picked.pickup_time.is_some());
    }

    #[tokio::test]
    async fn plain_transition_cannot_skip_the_pickup_code() {
        let h = harness_with(Arc::new(BroadcastFeed::new(16)));
        let courier_id = courier(&h.couriers).await;
        let order = stored_order(&h, OrderStatus::CourierEnRoutePickup, Some(courier_id)).await;

        let err = h
            .lifecycle
            .transition(order.id, OrderStatus::PickedUp, &Actor::Courier(courier_id))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidInput(_)));
        assert_eq!(h.orders.get(order.id).await.unwrap(), order);
    }

    #[tokio::test]
    async fn assigned_order_accepts_a_repeated_assigned_target() {
        let h = harness_with(Arc::new(BroadcastFeed::new(16)));
        let courier_id = courier(&h.couriers).await;
        let order = stored_order(&h, OrderStatus::Assigned, Some(courier_id)).await;

        let same = h
            .lifecycle
            .transition(order.id, OrderStatus::Assigned, &Actor::System)
            .await
            .unwrap();
        assert_eq!(same, order);

        let created = stored_order(&h, OrderStatus::Created, None).await;
        assert!(matches!(
            h.lifecycle
                .transition(created.id, OrderStatus::Assigned, &Actor::System)
                .await,
            Err(DispatchError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn wait_fee_is_a_single_adjustment_outside_the_breakdown() {
        let h = harness_with(Arc::new(BroadcastFeed::new(16)));
        let courier_id = courier(&h.couriers).await;
        let order = stored_order(&h, OrderStatus::CourierEnRoutePickup, Some(courier_id)).await;
        let actor = Actor::Courier(courier_id);

        let charged = h.lifecycle.record_wait_fee(order.id, &actor, 12).await.unwrap();
        assert_eq!(charged.adjustments.len(), 1);
        assert_eq!(charged.adjustments[0].amount, dec!(2.10));
        assert_eq!(charged.pricing, order.pricing);
        assert_eq!(charged.status, OrderStatus::CourierEnRoutePickup);

        assert_eq!(
            h.lifecycle
                .record_wait_fee(order.id, &actor, 20)
                .await
                .unwrap_err(),
            DispatchError::WaitFeeAlreadyRecorded(order.id)
        );
    }

    #[tokio::test]
    async fn wait_fee_is_rejected_away_from_pickup() {
        let h = harness_with(Arc::new(BroadcastFeed::new(16)));
        let courier_id = courier(&h.couriers).await;
        let order = stored_order(&h, OrderStatus::EnRouteDropoff, Some(courier_id)).await;

        assert!(matches!(
            h.lifecycle
                .record_wait_fee(order.id, &Actor::Courier(courier_id), 10)
                .await,
            Err(DispatchError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn completion_credits_courier_earnings() {
        let h = harness_with(Arc::new(BroadcastFeed::new(16)));
        let courier_id = courier(&h.couriers).await;
        let order = stored_order(&h, OrderStatus::Delivered, Some(courier_id)).await;

        h.lifecycle
            .transition(order.id, OrderStatus::Completed, &Actor::Customer(order.customer_id))
            .await
            .unwrap();

        let profile = h.couriers.get(courier_id).await.unwrap();
        assert_eq!(profile.earnings.deliveries, 1);
        assert_eq!(profile.earnings.total, dec!(12.30));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_publication_is_retried_without_rolling_back() {
        let publisher = Arc::new(FlakyPublisher {
            failures: 2,
            attempts: AtomicU32::new(0),
        });
        let h = harness_with(publisher.clone());
        let order = stored_order(&h, OrderStatus::Created, None).await;

        let canceled = h
            .lifecycle
            .cancel(order.id, &Actor::Customer(order.customer_id), None)
            .await
            .unwrap();
        assert_eq!(canceled.status, OrderStatus::Canceled);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(publisher.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(
            h.orders.get(order.id).await.unwrap().status,
            OrderStatus::Canceled
        );
    }
}
