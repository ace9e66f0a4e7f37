//! Real-time order events.
//!
//! Every published event goes to every subscriber. Nothing is persisted or
//! replayed, and a subscriber that falls more than the channel capacity behind
//! skips ahead instead of slowing the publisher down.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::db::{OrderDocument, OrderKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum OrderEvent {
    NewOrder(OrderDocument),
    OrderUpdated(OrderDocument),
    NewClientOrder(OrderDocument),
}

impl OrderEvent {
    /// Event for a freshly inserted document of the given kind
    pub fn created(kind: OrderKind, doc: OrderDocument) -> Self {
        match kind {
            OrderKind::Order => OrderEvent::NewOrder(doc),
            OrderKind::ClientOrder => OrderEvent::NewClientOrder(doc),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::NewOrder(_) => "newOrder",
            OrderEvent::OrderUpdated(_) => "orderUpdated",
            OrderEvent::NewClientOrder(_) => "newClientOrder",
        }
    }

    pub fn document(&self) -> &OrderDocument {
        match self {
            OrderEvent::NewOrder(doc)
            | OrderEvent::OrderUpdated(doc)
            | OrderEvent::NewClientOrder(doc) => doc,
        }
    }
}

/// Fan-out of order events to connected clients
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<OrderEvent>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.tx.subscribe()
    }

    /// Publish to all current subscribers and return how many received it.
    ///
    /// With no subscribers the event is dropped.
    pub fn publish(&self, event: OrderEvent) -> usize {
        let name = event.name();
        let order_id = event.document().id.clone();
        match self.tx.send(event) {
            Ok(receivers) => {
                tracing::debug!(event = name, order_id = %order_id, receivers, "Broadcast order event");
                receivers
            }
            Err(_) => {
                tracing::debug!(event = name, order_id = %order_id, "No listeners, event dropped");
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
