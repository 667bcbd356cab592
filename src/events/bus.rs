//! In-process publish/subscribe dispatcher.
//!
//! Subscriptions are registered while the bus is exclusively owned (setup and
//! teardown); afterwards the bus is shared behind an `Arc` and only
//! `publish`, `start` and `stop` are available, so the registry is never
//! mutated during dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::task::JoinSet;

use super::event::{Event, EventFilter, EventPriority, EventType};
use crate::error::{ConductorError, HandlerError, Result};

/// A subscriber to lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs when the handler fails
    fn name(&self) -> &str;

    /// Process one event. Errors are logged by the bus and go no further.
    async fn handle(&self, event: &Event) -> std::result::Result<(), HandlerError>;
}

/// Opaque handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    filter: EventFilter,
    handler: Arc<dyn EventHandler>,
    priority: EventPriority,
}

/// Best-effort, at-most-once-per-handler event dispatcher.
pub struct EventBus {
    subscriptions: Vec<Subscription>,
    next_id: u64,
    running: AtomicBool,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
            next_id: 0,
            running: AtomicBool::new(false),
        }
    }

    /// Register a handler for one event type or for all of them.
    pub fn subscribe(
        &mut self,
        handler: Arc<dyn EventHandler>,
        filter: impl Into<EventFilter>,
        priority: EventPriority,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        let filter = filter.into();
        debug!("Subscribed handler {} for {:?} at {:?}", handler.name(), filter, priority);
        self.subscriptions.push(Subscription {
            id,
            filter,
            handler,
            priority,
        });
        id
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        match self.subscriptions.iter().position(|s| s.id == id) {
            Some(pos) => {
                let removed = self.subscriptions.remove(pos);
                debug!("Unsubscribed handler {}", removed.handler.name());
                true
            }
            None => {
                warn!("Subscription {:?} was not registered", id);
                false
            }
        }
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        info!("Event bus started with {} subscriptions", self.subscriptions.len());
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("Event bus stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of subscriptions registered with exactly this filter
    pub fn handler_count(&self, filter: impl Into<EventFilter>) -> usize {
        let filter = filter.into();
        self.subscriptions.iter().filter(|s| s.filter == filter).count()
    }

    /// Handlers that would receive an event of this type, highest priority first.
    fn resolve(&self, event_type: EventType) -> Vec<(Arc<dyn EventHandler>, EventPriority)> {
        let mut resolved: Vec<_> = self
            .subscriptions
            .iter()
            .filter(|s| s.filter.matches(event_type))
            .map(|s| (Arc::clone(&s.handler), s.priority))
            .collect();
        resolved.sort_by(|a, b| b.1.cmp(&a.1));
        resolved
    }

    /// Deliver an event to every matching handler concurrently.
    ///
    /// Returns once all handlers have finished. Handler errors and panics are
    /// logged and never reach the publisher.
    pub async fn publish(&self, event: Event) -> Result<()> {
        if !self.is_running() {
            return Err(ConductorError::NotRunning);
        }

        let event = Arc::new(event);
        let handlers = self.resolve(event.event_type);
        let mut names = HashMap::with_capacity(handlers.len());
        let mut set = JoinSet::new();

        for (handler, _priority) in handlers {
            let name = handler.name().to_string();
            let event = Arc::clone(&event);
            let abort = set.spawn(async move { handler.handle(&event).await });
            names.insert(abort.id(), name);
        }

        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((_, Err(e))) => {
                    warn!("{} (event {} {})", ConductorError::Handler(e), event.event_type, event.id);
                }
                Err(join_err) => {
                    let name = names.get(&join_err.id()).map(String::as_str).unwrap_or("unknown");
                    let err = HandlerError::new(name, format!("handler aborted: {}", join_err));
                    warn!("{} (event {} {})", ConductorError::Handler(err), event.event_type, event.id);
                }
            }
        }

        debug!("Published event {} ({})", event.event_type, event.id);
        Ok(())
    }

    /// Publish events one after another, in order.
    pub async fn publish_many(&self, events: Vec<Event>) -> Result<()> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
