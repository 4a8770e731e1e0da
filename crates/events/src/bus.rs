//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans out [`LifecycleEvent`]s published by the dispatcher.
//! It is designed to be shared via `Arc<EventBus>` across the application.

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use tunegen_core::error::GenerationError;
use tunegen_core::progress::ProgressEstimate;
use tunegen_core::types::{ProviderJobHandle, TaskId, Timestamp};

// ---------------------------------------------------------------------------
// LifecycleEvent
// ---------------------------------------------------------------------------

/// What happened to a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleKind {
    /// The task was accepted into the queue.
    Queued,
    /// The task was admitted and holds a processing slot.
    Started,
    /// The provider accepted the job.
    JobCreated { job: ProviderJobHandle },
    /// A status check finished without a terminal status.
    Progress {
        attempt: u32,
        progress: ProgressEstimate,
    },
    /// The task completed with `tracks` materialized outputs.
    Completed { tracks: usize },
    /// The task failed.
    Failed { error: GenerationError },
}

impl LifecycleKind {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// A lifecycle change of one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleEvent {
    pub task_id: TaskId,
    pub kind: LifecycleKind,
    pub timestamp: Timestamp,
}

impl LifecycleEvent {
    pub fn new(task_id: TaskId, kind: LifecycleKind) -> Self {
        Self {
            task_id,
            kind,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// # Usage
///
/// ```rust
/// use tunegen_core::types::TaskId;
/// use tunegen_events::bus::{EventBus, LifecycleEvent, LifecycleKind};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(LifecycleEvent::new(TaskId::new(), LifecycleKind::Queued));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: LifecycleEvent) {
        // Err only means nobody is subscribed.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
