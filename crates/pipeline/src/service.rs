//! Public handle to a running generation pipeline.
//!
//! [`GenerationService::start`] spawns the dispatcher actor and returns a
//! cheap, cloneable handle. Callers submit requests with
//! [`GenerationService::enqueue`] and observe outcomes by awaiting
//! [`GenerationService::wait`], subscribing to the lifecycle bus, or
//! watching the notification sink. Post-admission failures never surface
//! here; they become terminal `Failed` tasks.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tunegen_core::error::GenerationError;
use tunegen_core::queue::QueueError;
use tunegen_core::request::GenerationRequest;
use tunegen_core::task::Task;
use tunegen_core::types::TaskId;
use tunegen_events::{EventBus, LifecycleEvent, NotificationEvent, NotificationSink};

use crate::config::OrchestratorConfig;
use crate::dispatcher::{Collaborators, Command, Dispatcher, TaskSummary};
use crate::entitlement::EntitlementGate;

/// Synchronous rejection of an enqueue attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnqueueError {
    #[error("Invalid request: {0}")]
    InvalidRequest(GenerationError),

    #[error("Not entitled to generate: {reason}")]
    NotEntitled { reason: String },

    #[error("Queue is full ({capacity} tasks waiting)")]
    QueueFull { capacity: usize },

    #[error("Dispatcher is not running")]
    DispatcherStopped,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Unknown task {0}")]
    UnknownTask(TaskId),

    #[error("Dispatcher is not running")]
    DispatcherStopped,
}

/// Cloneable handle to the dispatcher.
///
/// Dropping the last clone stops the dispatcher; call
/// [`shutdown`](Self::shutdown) to also wait for it to finish.
#[derive(Clone)]
pub struct GenerationService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    commands: mpsc::UnboundedSender<Command>,
    gate: Arc<dyn EntitlementGate>,
    events: Arc<EventBus>,
    notifications: NotificationSink,
    cancel: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ServiceInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl GenerationService {
    /// Spawn the dispatcher on the current Tokio runtime.
    pub fn start(config: OrchestratorConfig, deps: Collaborators) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = Arc::new(EventBus::default());
        let notifications = NotificationSink::new(config.notification_ttl);
        let cancel = CancellationToken::new();
        let gate = Arc::clone(&deps.gate);

        let dispatcher = Dispatcher::new(
            config,
            deps,
            Arc::clone(&events),
            notifications.clone(),
            rx,
            tx.clone(),
            cancel.clone(),
        );
        let handle = tokio::spawn(dispatcher.run());

        Self {
            inner: Arc::new(ServiceInner {
                commands: tx,
                gate,
                events,
                notifications,
                cancel,
                dispatcher: Mutex::new(Some(handle)),
            }),
        }
    }

    /// Validate, check entitlement, and queue a request.
    ///
    /// Returns as soon as the task is queued; it never waits for
    /// admission or provider I/O.
    pub async fn enqueue(&self, request: GenerationRequest) -> Result<TaskId, EnqueueError> {
        request.validate().map_err(EnqueueError::InvalidRequest)?;

        let entitlement = self.inner.gate.can_proceed().await;
        if !entitlement.allowed {
            tracing::info!(reason = %entitlement.reason, "Enqueue refused by entitlement gate");
            return Err(EnqueueError::NotEntitled {
                reason: entitlement.reason,
            });
        }

        let (reply, rx) = oneshot::channel();
        self.send(Command::Enqueue { request, reply })
            .map_err(|_| EnqueueError::DispatcherStopped)?;

        match rx.await {
            Ok(Ok(task_id)) => Ok(task_id),
            Ok(Err(QueueError::Full { capacity })) => Err(EnqueueError::QueueFull { capacity }),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Unexpected queue error on enqueue");
                Err(EnqueueError::DispatcherStopped)
            }
            Err(_) => Err(EnqueueError::DispatcherStopped),
        }
    }

    /// Current state of a task, if the queue still retains it.
    pub async fn task(&self, task_id: TaskId) -> Result<Option<Task>, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Get { task_id, reply })?;
        rx.await.map_err(|_| ServiceError::DispatcherStopped)
    }

    /// Resolve once the task reaches a terminal state.
    pub async fn wait(&self, task_id: TaskId) -> Result<Task, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Wait { task_id, reply })?;
        match rx.await {
            Ok(Some(task)) => Ok(task),
            Ok(None) => Err(ServiceError::UnknownTask(task_id)),
            Err(_) => Err(ServiceError::DispatcherStopped),
        }
    }

    /// Read-only view of every retained task, in submission order.
    pub async fn snapshot(&self) -> Result<Vec<TaskSummary>, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply })?;
        rx.await.map_err(|_| ServiceError::DispatcherStopped)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.events.subscribe()
    }

    pub fn notifications(&self) -> &NotificationSink {
        &self.inner.notifications
    }

    pub fn watch_notifications(&self) -> watch::Receiver<Vec<NotificationEvent>> {
        self.inner.notifications.subscribe()
    }

    /// Stop the dispatcher and wait for it to exit.
    ///
    /// In-flight tasks end as `Failed(Interrupted)`. Calling this more
    /// than once is harmless.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let handle = self.inner.dispatcher.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Dispatcher task panicked");
            }
        }
    }

    // ---- private helpers ----

    fn send(&self, command: Command) -> Result<(), ServiceError> {
        if self.inner.cancel.is_cancelled() {
            return Err(ServiceError::DispatcherStopped);
        }
        self.inner
            .commands
            .send(command)
            .map_err(|_| ServiceError::DispatcherStopped)
    }
}
