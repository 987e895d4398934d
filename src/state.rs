use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::intake::OrderIntake;
use crate::engine::lifecycle::OrderLifecycle;
use crate::engine::matching::Dispatcher;
use crate::engine::pricing::PricingEngine;
use crate::engine::queue::DispatchQueue;
use crate::feed::BroadcastFeed;
use crate::geo::geocoder::GazetteerGeocoder;
use crate::observability::metrics::Metrics;
use crate::ports::{SharedCourierDirectory, SharedGeocoder, SharedOrderRepository};
use crate::store::{InMemoryCourierDirectory, InMemoryOrderRepository};
use crate::zones::ZoneRegistry;

pub struct AppState {
    pub orders: SharedOrderRepository,
    pub couriers: SharedCourierDirectory,
    pub zones: Arc<ZoneRegistry>,
    pub lifecycle: Arc<OrderLifecycle>,
    pub dispatcher: Arc<Dispatcher>,
    pub intake: OrderIntake,
    pub feed: BroadcastFeed,
    pub metrics: Metrics,
}

impl AppState {
    /// Wires the in-memory adapters. The receiver feeds `run_dispatch_loop`.
    pub fn new(config: &Config) -> (Self, mpsc::Receiver<Uuid>) {
        Self::with_geocoder(config, Arc::new(GazetteerGeocoder::new()))
    }

    pub fn with_geocoder(config: &Config, geocoder: SharedGeocoder) -> (Self, mpsc::Receiver<Uuid>) {
        let orders: SharedOrderRepository = Arc::new(InMemoryOrderRepository::new());
        let couriers: SharedCourierDirectory = Arc::new(InMemoryCourierDirectory::new());
        let zones = Arc::new(ZoneRegistry::new(config.zone_overlap));
        let feed = BroadcastFeed::new(config.event_buffer_size);
        let metrics = Metrics::new();
        let (queue, order_rx) = DispatchQueue::channel(config.order_queue_size);

        let lifecycle = Arc::new(OrderLifecycle::new(
            orders.clone(),
            couriers.clone(),
            Arc::new(feed.clone()),
            PricingEngine::new(&config.pricing),
            config.pricing.wait_grace_minutes,
            metrics.clone(),
        ));

        let dispatcher = Arc::new(Dispatcher::new(
            orders.clone(),
            couriers.clone(),
            zones.clone(),
            Arc::new(feed.clone()),
            lifecycle.clone(),
            config.dispatch.clone(),
            metrics.clone(),
        ));

        let intake = OrderIntake::new(
            orders.clone(),
            geocoder,
            zones.clone(),
            lifecycle.clone(),
            config.pricing.clone(),
            queue,
        );

        (
            Self {
                orders,
                couriers,
                zones,
                lifecycle,
                dispatcher,
                intake,
                feed,
                metrics,
            },
            order_rx,
        )
    }
}
