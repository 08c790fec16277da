//! Message Bus for pipeline notifications
//!
//! The MessageBus provides a pub/sub pattern so observers (the event log,
//! tests) can follow the pipeline without the pipeline knowing about them. It uses bounded channels to prevent unbounded memory
//! growth and supports both specific event subscriptions and global "All"
//! subscriptions.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Channel buffer size for bounded channels
const CHANNEL_BUFFER_SIZE: usize = 100;

/// Event types that can be published on the message bus
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    /// The status surface changed phase or was hidden
    StatusChanged,
    /// A model exchange completed
    DialogCompleted,
    /// The system prompt file changed on disk and was reloaded
    PromptReloaded,
    /// A capability was dispatched
    CapabilityInvoked,
    /// A dispatch failed and was reported back as an observation
    CapabilityFailed,
    /// Subscribe to all event types
    All,
}

/// Events that can be published on the message bus
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Current phase label, `None` when the surface is hidden
    StatusChanged { phase: Option<String> },
    /// Model exchange finished
    DialogCompleted { model: String, elapsed_ms: u128 },
    /// System prompt reloaded from disk
    PromptReloaded,
    /// Capability dispatched with its arguments
    CapabilityInvoked {
        name: String,
        args: serde_json::Value,
    },
    /// Capability dispatch failed
    CapabilityFailed { name: String, error: String },
}

impl Event {
    /// Get the event type for this event
    pub fn event_type(&self) -> EventType {
        match self {
            Event::StatusChanged { .. } => EventType::StatusChanged,
            Event::DialogCompleted { .. } => EventType::DialogCompleted,
            Event::PromptReloaded => EventType::PromptReloaded,
            Event::CapabilityInvoked { .. } => EventType::CapabilityInvoked,
            Event::CapabilityFailed { .. } => EventType::CapabilityFailed,
        }
    }
}

/// Message bus for pub/sub communication between components
#[derive(Clone)]
pub struct MessageBus {
    /// Map of event types to lists of subscribers
    /// Each subscriber gets a bounded channel with CHANNEL_BUFFER_SIZE capacity
    channels: Arc<Mutex<HashMap<EventType, Vec<mpsc::Sender<Event>>>>>,
}

impl MessageBus {
    /// Create a new MessageBus
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to a specific event type, or `EventType::All`
    pub async fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let mut channels = self.channels.lock().await;
        channels.entry(event_type).or_default().push(tx);
        rx
    }

    /// Publish an event to all subscribers
    ///
    /// The event is sent to all subscribers of the specific event type,
    /// as well as all subscribers of EventType::All. A full channel drops the
    /// event for that subscriber instead of stalling the pipeline, and closed
    /// subscribers are pruned.
    pub async fn publish(&self, event: Event) {
        let mut channels = self.channels.lock().await;
        let event_type = event.event_type();

        for key in [event_type, EventType::All] {
            if let Some(subscribers) = channels.get_mut(&key) {
                subscribers.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::debug!("Subscriber lagging, dropped {:?}", key);
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
            }
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward every event to the log.
///
/// The task ends once every handle to the bus is gone and yields the number
/// of events it logged.
pub async fn spawn_event_log(bus: &MessageBus) -> JoinHandle<usize> {
    let mut rx = bus.subscribe(EventType::All).await;
    tokio::spawn(async move {
        let mut seen = 0;
        while let Some(event) = rx.recv().await {
            seen += 1;
            match event {
                Event::StatusChanged { phase } => {
                    debug!(target: "spassit::events", phase = phase.as_deref().unwrap_or("<hidden>"), "status")
                }
                Event::DialogCompleted { model, elapsed_ms } => {
                    debug!(target: "spassit::events", %model, elapsed_ms = elapsed_ms as u64, "dialog")
                }
                Event::PromptReloaded => info!(target: "spassit::events", "system prompt reloaded"),
                Event::CapabilityInvoked { name, args } => {
                    info!(target: "spassit::events", capability = %name, %args, "invoked")
                }
                Event::CapabilityFailed { name, error } => {
                    warn!(target: "spassit::events", capability = %name, %error, "failed")
                }
            }
        }
        seen
    })
}
