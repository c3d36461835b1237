use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Events emitted by the checkout pipeline. Consumers run outside the
/// transactional path; emission failures are logged, never propagated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    PaymentIntentCreated {
        intent_id: Uuid,
        external_ref: String,
    },
    PaymentVerified {
        intent_id: Uuid,
        order_id: Uuid,
    },
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    DiscountRedeemed {
        code: String,
        order_id: Uuid,
    },
    LowStockDetected {
        product_id: Uuid,
        quantity: i32,
        threshold: i32,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging (not propagating) channel failures.
    /// Used after a durable commit where the caller must not fail.
    pub async fn send_logged(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropped event after commit");
        }
    }
}

/// Builds a channel pair sized for a pool of request handlers.
pub fn channel() -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(1024);
    (EventSender::new(tx), rx)
}

/// Background event processor. Currently logs; wire integrations
/// (webhooks, analytics) hang off this loop.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::LowStockDetected {
                product_id,
                quantity,
                threshold,
            } => {
                warn!(
                    product_id = %product_id,
                    quantity = quantity,
                    threshold = threshold,
                    "Product fell below its low-stock threshold"
                );
            }
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "Processing order created event");
            }
            other => {
                debug!(event = ?other, "Processing event");
            }
        }
    }
    info!("Event channel closed; processor shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_round_trip_through_the_channel() {
        let (sender, mut rx) = channel();
        let order_id = Uuid::new_v4();
        sender.send(Event::OrderCreated(order_id)).await.unwrap();

        match rx.recv().await {
            Some(Event::OrderCreated(id)) => assert_eq!(id, order_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_logged_swallows_closed_channel() {
        let (sender, rx) = channel();
        drop(rx);
        // Must not panic or error.
        sender.send_logged(Event::OrderCreated(Uuid::new_v4())).await;
    }
}
