// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus - Pub/Sub for promotion events
//
// In-memory fan-out over a tokio broadcast channel. Slow subscribers lose the
// oldest events (reported as `Lagged`); publishers never block.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::PromotionEvent;

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: PromotionEvent) -> Result<(), EventBusError>;
}

/// Errors that can occur when publishing or receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[derive(Clone)]
pub struct BroadcastEventBus {
    sender: Arc<broadcast::Sender<PromotionEvent>>,
}

impl BroadcastEventBus {
    /// `capacity` events are buffered per subscriber before the oldest are dropped
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[async_trait]
impl EventBus for BroadcastEventBus {
    async fn publish(&self, event: PromotionEvent) -> Result<(), EventBusError> {
        debug!(event_type = event.event_type(), "Publishing promotion event");

        // send() only fails when nobody is subscribed
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to promotion events");
        }
        Ok(())
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<PromotionEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<PromotionEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Promotion event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    pub fn try_recv(&mut self) -> Result<PromotionEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Promotion event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}
