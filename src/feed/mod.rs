use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::DispatchError;
use crate::models::event::{FeedMessage, OrderEvent};
use crate::models::offer::Offer;
use crate::ports::{EventPublisher, OfferChannel};

/// Fan-out of offers and order events to live subscribers (WebSocket
/// clients, trackers). Messages sent while nobody listens are dropped.
#[derive(Clone)]
pub struct BroadcastFeed {
    tx: broadcast::Sender<FeedMessage>,
}

impl BroadcastFeed {
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _unused_rx) = broadcast::channel(buffer_size.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedMessage> {
        self.tx.subscribe()
    }

    fn push(&self, message: FeedMessage) {
        if self.tx.send(message).is_err() {
            debug!("feed message dropped: no subscribers");
        }
    }
}

#[async_trait]
impl OfferChannel for BroadcastFeed {
    async fn send_offer(&self, offer: &Offer) -> Result<(), DispatchError> {
        self.push(FeedMessage::Offer(offer.clone()));
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for BroadcastFeed {
    async fn publish(&self, event: &OrderEvent) -> Result<(), DispatchError> {
        self.push(FeedMessage::OrderEvent(event.clone()));
        Ok(())
    }
}
