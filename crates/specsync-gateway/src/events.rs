//! Broadcast of generation events to WebSocket clients

use chrono::{DateTime, Local};
use serde::Serialize;
use specsync_core::{EnginePreference, TemplateOutcome};
use tokio::sync::broadcast;

/// Event pushed to every subscriber as `{"event": name, "data": {...}}`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Event {
    Connected {
        message: String,
    },
    SsotUpdated {
        timestamp: DateTime<Local>,
    },
    MappingUpdated {
        timestamp: DateTime<Local>,
    },
    GenerateStart {
        timestamp: DateTime<Local>,
        engine: EnginePreference,
        templates: Vec<String>,
    },
    GenerateProgress(TemplateOutcome),
    GenerateComplete {
        timestamp: DateTime<Local>,
        results: Vec<TemplateOutcome>,
    },
    GenerateError {
        timestamp: DateTime<Local>,
        error: String,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Connected { .. } => "connected",
            Event::SsotUpdated { .. } => "ssot_updated",
            Event::MappingUpdated { .. } => "mapping_updated",
            Event::GenerateStart { .. } => "generate_start",
            Event::GenerateProgress(_) => "generate_progress",
            Event::GenerateComplete { .. } => "generate_complete",
            Event::GenerateError { .. } => "generate_error",
        }
    }
}

/// Fan-out hub shared by all handlers
#[derive(Debug, Clone)]
pub struct EventHub {
    sender: broadcast::Sender<Event>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Send to current subscribers; returns how many received it
    pub fn publish(&self, event: Event) -> usize {
        let name = event.name();
        match self.sender.send(event) {
            Ok(count) => {
                tracing::debug!("Event {} delivered to {} subscriber(s)", name, count);
                count
            }
            Err(_) => 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let event = Event::Connected {
            message: "hello".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "connected");
        assert_eq!(json["data"]["message"], "hello");
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let hub = EventHub::new(8);
        assert_eq!(hub.publish(Event::SsotUpdated { timestamp: Local::now() }), 0);

        let mut rx = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        hub.publish(Event::MappingUpdated { timestamp: Local::now() });

        let received = rx.recv().await.unwrap();
        assert_eq!(received.name(), "mapping_updated");
    }
}
