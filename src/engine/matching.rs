use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{AssignedCancelPolicy, DispatchSettings, ExhaustedPoolPolicy};
use crate::engine::intake::generate_pickup_code;
use crate::engine::lifecycle::OrderLifecycle;
use crate::engine::ranking::{is_eligible, rank, Candidate};
use crate::error::DispatchError;
use crate::models::actor::Actor;
use crate::models::offer::{Offer, OfferResponse};
use crate::models::order::{CancelReason, Order, OrderStatus};
use crate::observability::metrics::Metrics;
use crate::ports::{SharedCourierDirectory, SharedOfferChannel, SharedOrderRepository};
use crate::zones::ZoneRegistry;

struct PendingOffer {
    offer: Offer,
    deadline: Instant,
    timer: JoinHandle<()>,
}

/// A scheduled re-evaluation while the order waits in `created`.
struct Retry {
    timer: JoinHandle<()>,
    /// Whether couriers who passed earlier are asked again.
    new_round: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Scheduled,
    CourierFreed,
}

/// Matching state for one order. Every offer, response, expiry and
/// cancellation for the order runs while holding this session's lock.
struct MatchSession {
    order_id: Uuid,
    started_at: Instant,
    started: bool,
    finished: bool,
    /// Couriers who declined or let an offer lapse in the current round.
    passed: HashSet<Uuid>,
    pending: Option<PendingOffer>,
    retry: Option<Retry>,
}

impl MatchSession {
    fn new(order_id: Uuid) -> Self {
        Self {
            order_id,
            started_at: Instant::now(),
            started: false,
            finished: false,
            passed: HashSet::new(),
            pending: None,
            retry: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelOutcome {
    pub order: Order,
    /// Fresh order put back into matching after a courier withdrew.
    pub replacement: Option<Order>,
}

/// Offers `created` orders to couriers one at a time until one accepts,
/// the pool runs dry, or the order times out.
pub struct Dispatcher {
    orders: SharedOrderRepository,
    couriers: SharedCourierDirectory,
    zones: Arc<ZoneRegistry>,
    offers: SharedOfferChannel,
    lifecycle: Arc<OrderLifecycle>,
    settings: DispatchSettings,
    metrics: Metrics,
    sessions: DashMap<Uuid, Arc<Mutex<MatchSession>>>,
    /// courier id -> order id of the single offer the courier is holding.
    pending_by_courier: DashMap<Uuid, Uuid>,
    /// courier id -> orders waiting for that courier's offer to resolve.
    waiting_on: DashMap<Uuid, HashSet<Uuid>>,
}

impl Dispatcher {
    pub fn new(
        orders: SharedOrderRepository,
        couriers: SharedCourierDirectory,
        zones: Arc<ZoneRegistry>,
        offers: SharedOfferChannel,
        lifecycle: Arc<OrderLifecycle>,
        settings: DispatchSettings,
        metrics: Metrics,
    ) -> Self {
        Self {
            orders,
            couriers,
            zones,
            offers,
            lifecycle,
            settings,
            metrics,
            sessions: DashMap::new(),
            pending_by_courier: DashMap::new(),
            waiting_on: DashMap::new(),
        }
    }

    pub fn matching_count(&self) -> usize {
        self.sessions.len()
    }

    pub async fn pending_offer(&self, order_id: Uuid) -> Option<Offer> {
        let session = self.sessions.get(&order_id).map(|s| Arc::clone(s.value()))?;
        let guard = session.lock().await;
        guard.pending.as_ref().map(|pending| pending.offer.clone())
    }

    pub async fn start(self: &Arc<Self>, order_id: Uuid) -> Result<(), DispatchError> {
        self.begin(order_id, None).await
    }

    async fn begin(self: &Arc<Self>, order_id: Uuid, excluded: Option<Uuid>) -> Result<(), DispatchError> {
        let session = self.session(order_id);
        let mut guard = session.lock().await;
        if guard.started || guard.finished {
            return Ok(());
        }

        guard.passed.extend(excluded);
        guard.started = true;
        guard.started_at = Instant::now();
        self.metrics.orders_matching.inc();
        info!(order_id = %order_id, "matching started");

        self.advance(&mut guard).await;
        Ok(())
    }

    /// Courier answer to an outstanding offer. Acceptance is a
    /// compare-and-set on both the live offer and the stored order.
    pub async fn respond(
        self: &Arc<Self>,
        order_id: Uuid,
        courier_id: Uuid,
        response: OfferResponse,
    ) -> Result<Order, DispatchError> {
        let Some(session) = self.sessions.get(&order_id).map(|s| Arc::clone(s.value())) else {
            return Err(self.late_response(order_id).await);
        };
        let mut guard = session.lock().await;

        let holder = guard.pending.as_ref().map(|pending| pending.offer.courier_id);
        if guard.finished || holder != Some(courier_id) {
            debug!(order_id = %order_id, courier_id = %courier_id, "response without a live offer");
            if !guard.finished && holder.is_some() && matches!(response, OfferResponse::Accept) {
                return Err(DispatchError::OrderAlreadyAssigned { order_id });
            }
            return Err(self.late_response(order_id).await);
        }

        let Some(pending) = guard.pending.take() else {
            return Err(DispatchError::OfferExpired { order_id });
        };
        pending.timer.abort();

        if Instant::now() >= pending.deadline {
            self.lapse(&mut guard, pending);
            self.advance(&mut guard).await;
            return Err(DispatchError::OfferExpired { order_id });
        }

        self.release(courier_id, order_id);

        match response {
            OfferResponse::Accept => {
                let current = self.orders.get(order_id).await?;
                match self.lifecycle.assign(&current, courier_id).await {
                    Ok(assigned) => {
                        self.metrics
                            .offers_total
                            .with_label_values(&["accepted"])
                            .inc();
                        info!(order_id = %order_id, courier_id = %courier_id, "offer accepted");
                        self.finish(&mut guard, "assigned");
                        Ok(assigned)
                    }
                    Err(err) => {
                        warn!(order_id = %order_id, courier_id = %courier_id, error = %err, "acceptance lost to a concurrent change");
                        guard.passed.insert(courier_id);
                        self.advance(&mut guard).await;
                        Err(err)
                    }
                }
            }
            OfferResponse::Decline => {
                self.metrics
                    .offers_total
                    .with_label_values(&["declined"])
                    .inc();
                info!(order_id = %order_id, courier_id = %courier_id, "offer declined");
                guard.passed.insert(courier_id);
                self.advance(&mut guard).await;
                self.orders.get(order_id).await
            }
        }
    }

    /// Cancels on behalf of `actor`. A `created` order is canceled under its
    /// matching lock so it cannot overtake an acceptance already in flight.
    pub async fn cancel_order(
        self: &Arc<Self>,
        order_id: Uuid,
        actor: Actor,
    ) -> Result<CancelOutcome, DispatchError> {
        let order = self.orders.get(order_id).await?;

        match order.status {
            OrderStatus::Created => {
                let session = self.sessions.get(&order_id).map(|s| Arc::clone(s.value()));
                let mut guard = match &session {
                    Some(session) => Some(session.lock().await),
                    None => None,
                };

                let current = self.orders.get(order_id).await?;
                if current.status.has_courier() {
                    return Err(DispatchError::OrderAlreadyAssigned { order_id });
                }

                let canceled = match self.lifecycle.cancel_snapshot(&current, &actor, None).await {
                    Ok(canceled) => canceled,
                    Err(err @ DispatchError::VersionConflict { .. }) => {
                        if self.orders.get(order_id).await?.status.has_courier() {
                            return Err(DispatchError::OrderAlreadyAssigned { order_id });
                        }
                        return Err(err);
                    }
                    Err(err) => return Err(err),
                };
                if let Some(guard) = guard.as_mut() {
                    if let Some(pending) = guard.pending.take() {
                        pending.timer.abort();
                        self.release(pending.offer.courier_id, order_id);
                    }
                    self.finish(guard, "canceled");
                }

                Ok(CancelOutcome {
                    order: canceled,
                    replacement: None,
                })
            }
            OrderStatus::Assigned => {
                if matches!(actor, Actor::Customer(_)) {
                    return Err(DispatchError::OrderAlreadyAssigned { order_id });
                }

                let canceled = self.lifecycle.cancel_snapshot(&order, &actor, None).await?;
                let replacement = match self.settings.assigned_cancel {
                    AssignedCancelPolicy::Rematch => {
                        Some(self.rematch(&canceled, order.courier_id).await?)
                    }
                    AssignedCancelPolicy::Finalize => None,
                };

                Ok(CancelOutcome {
                    order: canceled,
                    replacement,
                })
            }
            _ => {
                let order = self.lifecycle.cancel_snapshot(&order, &actor, None).await?;
                Ok(CancelOutcome {
                    order,
                    replacement: None,
                })
            }
        }
    }

    fn session(&self, order_id: Uuid) -> Arc<Mutex<MatchSession>> {
        self.sessions
            .entry(order_id)
            .or_insert_with(|| Arc::new(Mutex::new(MatchSession::new(order_id))))
            .clone()
    }

    /// Error for a response that has no live offer to land on.
    async fn late_response(&self, order_id: Uuid) -> DispatchError {
        match self.orders.get(order_id).await {
            Ok(order) if order.status.has_courier() => DispatchError::OrderAlreadyAssigned { order_id },
            Ok(_) => DispatchError::OfferExpired { order_id },
            Err(err) => err,
        }
    }

    /// Offers the order to the best available courier, or concludes the
    /// round when nobody is left.
    async fn advance(self: &Arc<Self>, session: &mut MatchSession) {
        let order_id = session.order_id;

        let order = match self.orders.get(order_id).await {
            Ok(order) => order,
            Err(err) => {
                error!(order_id = %order_id, error = %err, "failed to load order for matching");
                self.finish(session, "error");
                return;
            }
        };

        if order.status != OrderStatus::Created {
            debug!(order_id = %order_id, status = %order.status, "order left matching");
            self.finish(session, "abandoned");
            return;
        }

        if session.started_at.elapsed() >= self.settings.order_timeout {
            warn!(order_id = %order_id, "order timed out before a courier accepted");
            self.give_up(session, &order).await;
            return;
        }

        let Some(zone) = self.zones.resolve(&order.pickup_address.location) else {
            warn!(order_id = %order_id, "pickup no longer inside an active zone");
            self.give_up(session, &order).await;
            return;
        };

        let (ranked, mut busy) = self.candidates(&order, zone.id, &session.passed).await;
        for candidate in ranked {
            let courier_id = candidate.courier.id;
            if !self.reserve(courier_id, order_id) {
                busy.push(courier_id);
                continue;
            }

            match self.send_offer(session, candidate).await {
                Ok(()) => return,
                Err(err) => {
                    warn!(order_id = %order_id, courier_id = %courier_id, error = %err, "offer delivery failed");
                    self.release(courier_id, order_id);
                    session.passed.insert(courier_id);
                }
            }
        }

        for courier_id in &busy {
            self.waiting_on.entry(*courier_id).or_default().insert(order_id);
        }

        match self.settings.exhausted_pool {
            ExhaustedPoolPolicy::Cancel if busy.is_empty() => {
                info!(order_id = %order_id, zone_id = %zone.id, "candidate pool exhausted");
                self.give_up(session, &order).await;
            }
            ExhaustedPoolPolicy::Cancel => {
                debug!(order_id = %order_id, busy = busy.len(), "waiting for couriers holding other offers");
                self.schedule_retry(session, false);
            }
            ExhaustedPoolPolicy::Hold => self.schedule_retry(session, true),
        }
    }

    /// Eligible couriers ranked against freshly read locations, plus the
    /// eligible ones currently holding another order's offer.
    async fn candidates(
        &self,
        order: &Order,
        zone_id: Uuid,
        passed: &HashSet<Uuid>,
    ) -> (Vec<Candidate>, Vec<Uuid>) {
        let pickup = order.pickup_address.location;
        let mut pool = Vec::new();
        let mut busy = Vec::new();

        for courier in self.couriers.list_online_in_zone(zone_id).await {
            if passed.contains(&courier.id) || !is_eligible(&courier, zone_id, &order.package) {
                continue;
            }

            match self
                .couriers
                .get_location(courier.id, self.settings.location_freshness)
                .await
            {
                Ok(_) if self.pending_by_courier.contains_key(&courier.id) => busy.push(courier.id),
                Ok(fix) => pool.push(Candidate::new(courier, fix, &pickup)),
                Err(DispatchError::StaleLocation { courier_id }) => {
                    debug!(courier_id = %courier_id, "skipping courier with stale location")
                }
                Err(err) => warn!(courier_id = %courier.id, error = %err, "courier location unavailable"),
            }
        }

        (rank(pool), busy)
    }

    async fn send_offer(
        self: &Arc<Self>,
        session: &mut MatchSession,
        candidate: Candidate,
    ) -> Result<(), DispatchError> {
        let response_time = self.settings.courier_response_time;
        let sent_at = Utc::now();
        let offer = Offer {
            id: Uuid::new_v4(),
            order_id: session.order_id,
            courier_id: candidate.courier.id,
            distance_km: candidate.distance_km,
            sent_at,
            deadline: sent_at
                + chrono::Duration::from_std(response_time).unwrap_or(chrono::Duration::zero()),
        };

        self.offers.send_offer(&offer).await?;

        let deadline = Instant::now() + response_time;
        let timer = self.spawn_expiry(offer.order_id, offer.id, deadline);

        self.metrics.offers_total.with_label_values(&["sent"]).inc();
        info!(
            order_id = %offer.order_id,
            courier_id = %offer.courier_id,
            distance_km = offer.distance_km,
            "offer sent"
        );

        session.pending = Some(PendingOffer {
            offer,
            deadline,
            timer,
        });
        Ok(())
    }

    fn spawn_expiry(self: &Arc<Self>, order_id: Uuid, offer_id: Uuid, deadline: Instant) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let task: BoxFuture<'static, ()> = Box::pin(async move {
            sleep_until(deadline).await;
            this.expire(order_id, offer_id).await;
        });
        tokio::spawn(task)
    }

    async fn expire(self: &Arc<Self>, order_id: Uuid, offer_id: Uuid) {
        let Some(session) = self.sessions.get(&order_id).map(|s| Arc::clone(s.value())) else {
            return;
        };
        let mut guard = session.lock().await;
        if guard.finished {
            return;
        }

        let is_current = guard
            .pending
            .as_ref()
            .is_some_and(|pending| pending.offer.id == offer_id);
        if !is_current {
            return;
        }

        if let Some(pending) = guard.pending.take() {
            self.lapse(&mut guard, pending);
            self.advance(&mut guard).await;
        }
    }

    /// Books the offer as timed out. The caller decides what happens next.
    fn lapse(self: &Arc<Self>, session: &mut MatchSession, pending: PendingOffer) {
        let courier_id = pending.offer.courier_id;
        self.release(courier_id, session.order_id);
        session.passed.insert(courier_id);
        self.metrics.offers_total.with_label_values(&["expired"]).inc();
        info!(order_id = %session.order_id, courier_id = %courier_id, "offer expired");
    }

    fn schedule_retry(self: &Arc<Self>, session: &mut MatchSession, new_round: bool) {
        let remaining = self
            .settings
            .order_timeout
            .saturating_sub(session.started_at.elapsed());
        let wait = self.settings.retry_interval.min(remaining);
        debug!(order_id = %session.order_id, wait_secs = wait.as_secs(), new_round, "holding order for another round");

        let timer = self.spawn_retry(session.order_id, Wake::Scheduled, Some(wait));
        if let Some(previous) = session.retry.replace(Retry { timer, new_round }) {
            previous.timer.abort();
        }
    }

    fn spawn_retry(self: &Arc<Self>, order_id: Uuid, wake: Wake, after: Option<Duration>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let task: BoxFuture<'static, ()> = Box::pin(async move {
            if let Some(wait) = after {
                sleep(wait).await;
            }
            this.retry(order_id, wake).await;
        });
        tokio::spawn(task)
    }

    async fn retry(self: &Arc<Self>, order_id: Uuid, wake: Wake) {
        let Some(session) = self.sessions.get(&order_id).map(|s| Arc::clone(s.value())) else {
            return;
        };
        let mut guard = session.lock().await;
        if guard.finished || guard.pending.is_some() {
            return;
        }
        let Some(waiting) = guard.retry.take() else {
            return;
        };

        let new_round = match wake {
            Wake::Scheduled => waiting.new_round,
            Wake::CourierFreed => {
                waiting.timer.abort();
                false
            }
        };
        if new_round {
            guard.passed.clear();
        }
        self.advance(&mut guard).await;
    }

    /// Re-runs matching for orders that were only waiting on `courier_id`.
    fn wake_waiting(self: &Arc<Self>, courier_id: Uuid) {
        let Some((_, orders)) = self.waiting_on.remove(&courier_id) else {
            return;
        };
        for order_id in orders {
            self.spawn_retry(order_id, Wake::CourierFreed, None);
        }
    }

    async fn give_up(self: &Arc<Self>, session: &mut MatchSession, order: &Order) {
        match self
            .lifecycle
            .cancel_snapshot(order, &Actor::System, Some(CancelReason::NoCouriersAvailable))
            .await
        {
            Ok(_) => info!(order_id = %order.id, "order canceled: no couriers available"),
            Err(err) => warn!(order_id = %order.id, error = %err, "failed to cancel unmatched order"),
        }
        self.finish(session, "no_couriers");
    }

    fn finish(self: &Arc<Self>, session: &mut MatchSession, outcome: &str) {
        if session.finished {
            return;
        }
        session.finished = true;

        if let Some(pending) = session.pending.take() {
            pending.timer.abort();
            self.release(pending.offer.courier_id, session.order_id);
        }
        if let Some(retry) = session.retry.take() {
            retry.timer.abort();
        }

        if session.started {
            self.metrics.orders_matching.dec();
            self.metrics
                .match_latency_seconds
                .with_label_values(&[outcome])
                .observe(session.started_at.elapsed().as_secs_f64());
        }

        self.sessions.remove(&session.order_id);
        debug!(order_id = %session.order_id, outcome, "matching finished");
    }

    fn reserve(&self, courier_id: Uuid, order_id: Uuid) -> bool {
        match self.pending_by_courier.entry(courier_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(order_id);
                true
            }
        }
    }

    fn release(self: &Arc<Self>, courier_id: Uuid, order_id: Uuid) {
        let released = self
            .pending_by_courier
            .remove_if(&courier_id, |_, held| *held == order_id)
            .is_some();
        if released {
            self.wake_waiting(courier_id);
        }
    }

    /// Puts a copy of a withdrawn order back into matching with the same
    /// addresses and price. The courier who dropped it is not asked again.
    async fn rematch(
        self: &Arc<Self>,
        canceled: &Order,
        previous_courier: Option<Uuid>,
    ) -> Result<Order, DispatchError> {
        let now = Utc::now();
        let mut replacement = canceled.clone();
        replacement.id = Uuid::new_v4();
        replacement.version = 0;
        replacement.status = OrderStatus::Created;
        replacement.courier_id = None;
        replacement.pickup_code = generate_pickup_code();
        replacement.replaces = Some(canceled.id);
        replacement.adjustments.clear();
        replacement.cancel_reason = None;
        replacement.created_at = now;
        replacement.updated_at = now;
        replacement.pickup_time = None;
        replacement.dropoff_time = None;
        replacement.completed_at = None;
        replacement.canceled_at = None;
        replacement.disputed_at = None;

        let stored = self.orders.insert(replacement).await?;
        self.lifecycle.announce_created(&stored).await;
        info!(order_id = %stored.id, replaces = %canceled.id, "order returned to matching");

        self.begin(stored.id, previous_courier).await?;
        Ok(stored)
    }
}

/// Starts matching for every order id pushed onto the dispatch queue.
pub async fn run_dispatch_loop(dispatcher: Arc<Dispatcher>, mut order_rx: mpsc::Receiver<Uuid>) {
    info!("dispatch loop started");

    while let Some(order_id) = order_rx.recv().await {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            if let Err(err) = dispatcher.start(order_id).await {
                error!(order_id = %order_id, error = %err, "failed to start matching");
            }
        });
    }

    warn!("dispatch loop stopped: queue channel closed");
}
