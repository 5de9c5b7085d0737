use crate::types::{ReviewEvent, ReviewEventKind};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

const CHANNEL_CAPACITY: usize = 256;
const HISTORY_LIMIT: usize = 1000;

/// Broadcast bus carrying progress events from the runner, synthesizer and session
pub struct AgentCommunicationBus {
    /// Broadcast channel for real-time events
    event_sender: broadcast::Sender<ReviewEvent>,

    /// Event history storage
    event_history: Arc<RwLock<Vec<ReviewEvent>>>,
}

impl AgentCommunicationBus {
    pub fn new() -> Self {
        let (event_sender, _) = broadcast::channel(CHANNEL_CAPACITY);

        Self {
            event_sender,
            event_history: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Publish an event to all subscribers
    pub async fn publish(&self, event: ReviewEvent) {
        debug!("Publishing event {:?} from {}", event.kind, event.agent_name);

        {
            let mut history = self.event_history.write().await;
            history.push(event.clone());

            if history.len() > HISTORY_LIMIT {
                let excess = history.len() - HISTORY_LIMIT;
                history.drain(0..excess);
            }
        }

        // Sending only fails when nobody listens
        if let Ok(subscriber_count) = self.event_sender.send(event) {
            debug!("Event broadcast to {} subscribers", subscriber_count);
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<ReviewEvent> {
        self.event_sender.subscribe()
    }

    /// Get event history filtered by criteria, newest last
    pub async fn get_event_history(
        &self,
        agent_name: Option<&str>,
        kind: Option<ReviewEventKind>,
        limit: Option<usize>,
    ) -> Vec<ReviewEvent> {
        let history = self.event_history.read().await;

        let filtered: Vec<ReviewEvent> = history
            .iter()
            .filter(|event| agent_name.map_or(true, |name| event.agent_name == name))
            .filter(|event| kind.map_or(true, |kind| event.kind == kind))
            .cloned()
            .collect();

        match limit {
            Some(limit) if filtered.len() > limit => filtered[filtered.len() - limit..].to_vec(),
            _ => filtered,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.event_sender.receiver_count()
    }
}

impl Default for AgentCommunicationBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper trait for components that report progress on the bus
#[async_trait::async_trait]
pub trait AgentCommunication: Sync {
    /// Name recorded as the event source
    fn agent_name(&self) -> &str;

    async fn publish_event(
        &self,
        communication_bus: &AgentCommunicationBus,
        kind: ReviewEventKind,
        data: serde_json::Value,
    ) {
        let event = ReviewEvent {
            id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            agent_name: self.agent_name().to_string(),
            kind,
            data,
        };

        communication_bus.publish(event).await
    }
}
