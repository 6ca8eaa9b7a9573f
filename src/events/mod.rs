use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted after state has been committed.
///
/// Checkout publishes one `OrderCreated` per seller order only once the
/// surrounding transaction has committed; an event is never a promise of
/// state that could still roll back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    DiscountApplied {
        discount_id: Uuid,
        amount: Decimal,
        order_count: usize,
    },
    CartItemAdded {
        cart_id: Uuid,
        product_id: Uuid,
    },
    CartItemRemoved {
        cart_id: Uuid,
        product_id: Uuid,
    },
    CartCleared(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, failing if the channel is closed or full.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event and downgrades failure to a warning. Used on request
    /// paths where a dropped event must not fail an already-committed
    /// operation.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!("Event delivery failed for {:?}: {}", event, e);
        }
    }
}

/// Consumes events off the channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    order_id = %order_id,
                    from = %old_status,
                    to = %new_status,
                    "order status changed"
                );
            }
            Event::DiscountApplied {
                discount_id,
                amount,
                order_count,
            } => {
                info!(
                    discount_id = %discount_id,
                    amount = %amount,
                    order_count = order_count,
                    "discount applied across checkout"
                );
            }
            Event::CartItemAdded {
                cart_id,
                product_id,
            } => {
                info!(cart_id = %cart_id, product_id = %product_id, "cart item added");
            }
            Event::CartItemRemoved {
                cart_id,
                product_id,
            } => {
                info!(cart_id = %cart_id, product_id = %product_id, "cart item removed");
            }
            Event::CartCleared(cart_id) => {
                info!(cart_id = %cart_id, "cart cleared");
            }
        }
    }

    info!("Event processing loop stopped");
}
