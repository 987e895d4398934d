use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::DispatchError;

/// Producer side of the dispatch queue. The loop in `matching` owns the
/// receiver and starts one match session per id.
#[derive(Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<Uuid>,
}

impl DispatchQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Uuid>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub async fn enqueue(&self, order_id: Uuid) -> Result<(), DispatchError> {
        self.tx
            .send(order_id)
            .await
            .map_err(|err| DispatchError::Notification(format!("dispatch queue send failed: {err}")))
    }
}
