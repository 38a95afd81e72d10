//! Event Publisher Adapter
//!
//! Implements the `EventPublisher` port with a tracing audit trail and an
//! in-memory collector for tests.

use async_trait::async_trait;
use tracing::{debug, info, Level};

use crate::domain::events::DomainEvent;
use crate::domain::model::UserId;
use crate::domain::ports::EventPublisher;
use crate::error::Result;

/// Writes every purchase attempt and catalog update to the log as JSON.
#[derive(Debug, Clone)]
pub struct LoggingEventPublisher {
    level: Level,
}

impl LoggingEventPublisher {
    /// Log events at `level`; anything below `INFO` is logged at debug.
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        let event_type = event.event_type();
        let json = serde_json::to_string(&event)?;

        if self.level <= Level::INFO {
            info!(event_type = %event_type, event = %json, "Domain event");
        } else {
            debug!(event_type = %event_type, event = %json, "Domain event");
        }

        Ok(())
    }

    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

/// Keeps published events in memory for later inspection.
#[derive(Debug, Default)]
pub struct InMemoryEventCollector {
    events: parking_lot::RwLock<Vec<DomainEvent>>,
}

impl InMemoryEventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Events whose `event_type()` is `event_type`
    pub fn events_of_type(&self, event_type: &str) -> Vec<DomainEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }

    /// Events raised on behalf of one user
    pub fn events_for_user(&self, user_id: UserId) -> Vec<DomainEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.user_id() == Some(user_id))
            .cloned()
            .collect()
    }

    /// `(reason, stage)` of every rejection, in publish order
    pub fn rejections(&self) -> Vec<(String, String)> {
        self.events
            .read()
            .iter()
            .filter_map(|e| match e {
                DomainEvent::OrderRejected { reason, stage, .. } => {
                    Some((reason.clone(), stage.clone()))
                }
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventCollector {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        self.events.write().push(event);
        Ok(())
    }

    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()> {
        self.events.write().extend(events);
        Ok(())
    }
}
