//! Event distribution
//!
//! Lifecycle notifications flow from the pipeline and supervisor through the
//! [`EventBus`] to any number of subscribers.

pub mod bus;
pub mod event;
pub mod handlers;

pub use bus::{EventBus, EventHandler, SubscriptionId};
pub use event::{Event, EventFilter, EventPriority, EventType, Stage};
pub use handlers::{
    AuditLogger, ChannelForwarder, MetricsCollector, ProgressTracker, ResearchMetrics, SessionProgress, SessionStatus,
    TaskProgress, TaskStatus,
};
