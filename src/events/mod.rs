use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "Event delivery failed");
        }
    }
}

/// Domain events published after a business operation commits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated(Uuid),
    OrderPaid {
        order_id: Uuid,
        transaction_id: String,
    },
    OrderCancelled {
        order_id: Uuid,
        stock_restored: bool,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },

    // Payment events
    PaymentDeclined {
        order_id: Uuid,
        reason: String,
    },

    // Cart events
    CartItemAdded {
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    CartCleared(Uuid),

    // Catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductDeleted(Uuid),
    CategoryUpdated {
        category_id: Uuid,
        is_active: bool,
    },
}

impl Event {
    /// Stable name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderCreated(_) => "order_created",
            Event::OrderPaid { .. } => "order_paid",
            Event::OrderCancelled { .. } => "order_cancelled",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::PaymentDeclined { .. } => "payment_declined",
            Event::CartItemAdded { .. } => "cart_item_added",
            Event::CartCleared(_) => "cart_cleared",
            Event::ProductCreated(_) => "product_created",
            Event::ProductUpdated(_) => "product_updated",
            Event::ProductDeleted(_) => "product_deleted",
            Event::CategoryUpdated { .. } => "category_updated",
        }
    }
}

/// Drains the event channel until every sender is dropped
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderPaid {
                order_id,
                transaction_id,
            } => {
                info!(%order_id, %transaction_id, "Order paid");
            }
            Event::OrderCancelled {
                order_id,
                stock_restored,
            } => {
                info!(%order_id, stock_restored, "Order cancelled");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "Order status changed");
            }
            Event::PaymentDeclined { order_id, reason } => {
                warn!(%order_id, %reason, "Payment declined");
            }
            other => {
                info!(event = other.name(), "Received event: {:?}", other);
            }
        }
    }

    warn!("Event processing loop has ended");
}
