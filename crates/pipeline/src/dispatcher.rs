//! Task dispatcher (single-owner actor).
//!
//! The dispatcher owns the [`TaskQueue`] and is the only code that ever
//! mutates it. Everything else talks to it through [`Command`] messages
//! on one unbounded channel: the service handle sends enqueue/inspection
//! requests, and the per-task job runners send job-created, progress and
//! finished messages. Command handling never awaits, so admission is never
//! blocked behind provider I/O.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tunegen_core::error::GenerationError;
use tunegen_core::job_profile::JobProfile;
use tunegen_core::progress::{ProgressEstimate, ProgressEstimator};
use tunegen_core::queue::{QueueError, TaskQueue};
use tunegen_core::request::GenerationRequest;
use tunegen_core::task::{ResultTrack, Task, TaskStatus};
use tunegen_core::types::{ProviderJobHandle, TaskId, Timestamp};
use tunegen_events::{
    EventBus, LifecycleEvent, LifecycleKind, NotificationEvent, NotificationSink,
};
use tunegen_provider::backoff::BackoffConfig;
use tunegen_provider::client::{JobSubmission, ProviderClient};
use tunegen_provider::status::{failure_message, normalize_status, NormalizedStatus};

use crate::artifacts::{materialize, ArtifactStore};
use crate::config::OrchestratorConfig;
use crate::entitlement::EntitlementGate;
use crate::poller::{PollOutcome, Poller};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Messages drained by the dispatcher loop.
pub(crate) enum Command {
    Enqueue {
        request: GenerationRequest,
        reply: oneshot::Sender<Result<TaskId, QueueError>>,
    },
    JobCreated {
        task_id: TaskId,
        job: ProviderJobHandle,
    },
    Polled {
        task_id: TaskId,
        attempt: u32,
    },
    Finished {
        task_id: TaskId,
        outcome: Result<Vec<ResultTrack>, GenerationError>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<TaskSummary>>,
    },
    Get {
        task_id: TaskId,
        reply: oneshot::Sender<Option<Task>>,
    },
    /// Reply once the task is terminal; `None` if the task is unknown.
    Wait {
        task_id: TaskId,
        reply: oneshot::Sender<Option<Task>>,
    },
}

/// Read-only view of one task for queue displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub status: TaskStatus,
    pub descriptor: String,
    pub job: Option<ProviderJobHandle>,
    pub progress: ProgressEstimate,
    pub submitted_at: Timestamp,
}

/// External collaborators injected into the dispatcher.
#[derive(Clone)]
pub struct Collaborators {
    pub provider: Arc<dyn ProviderClient>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub gate: Arc<dyn EntitlementGate>,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub(crate) struct Dispatcher {
    queue: TaskQueue,
    config: OrchestratorConfig,
    deps: Collaborators,
    progress: HashMap<TaskId, ProgressEstimator>,
    waiters: HashMap<TaskId, Vec<oneshot::Sender<Option<Task>>>>,
    events: Arc<EventBus>,
    notifications: NotificationSink,
    inbox: mpsc::UnboundedReceiver<Command>,
    /// Cloned into every job runner so it can report back.
    outbox: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub(crate) fn new(
        config: OrchestratorConfig,
        deps: Collaborators,
        events: Arc<EventBus>,
        notifications: NotificationSink,
        inbox: mpsc::UnboundedReceiver<Command>,
        outbox: mpsc::UnboundedSender<Command>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue: TaskQueue::new(config.queue_capacity, config.finished_retention),
            config,
            deps,
            progress: HashMap::new(),
            waiters: HashMap::new(),
            events,
            notifications,
            inbox,
            outbox,
            cancel,
        }
    }

    /// Drain commands until the cancellation token is triggered.
    pub(crate) async fn run(mut self) {
        tracing::info!(
            concurrency_limit = self.config.concurrency_limit,
            queue_capacity = self.queue.capacity(),
            "Dispatcher started",
        );

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                command = self.inbox.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }

        self.abandon_in_flight();
        tracing::info!("Dispatcher stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Enqueue { request, reply } => {
                let result = self.enqueue(request);
                let _ = reply.send(result);
            }
            Command::JobCreated { task_id, job } => self.on_job_created(task_id, job),
            Command::Polled { task_id, attempt } => self.on_polled(task_id, attempt),
            Command::Finished { task_id, outcome } => self.on_finished(task_id, outcome),
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Get { task_id, reply } => {
                let _ = reply.send(self.queue.get(task_id).cloned());
            }
            Command::Wait { task_id, reply } => match self.queue.get(task_id) {
                Some(task) if task.is_terminal() => {
                    let _ = reply.send(Some(task.clone()));
                }
                Some(_) => self.waiters.entry(task_id).or_default().push(reply),
                None => {
                    let _ = reply.send(None);
                }
            },
        }
    }

    // ---- command handlers ----

    fn enqueue(&mut self, request: GenerationRequest) -> Result<TaskId, QueueError> {
        let descriptor = request.descriptor();
        let task_id = self.queue.push(request)?;

        tracing::info!(task_id = %task_id, descriptor = %descriptor, "Task queued");
        self.publish(task_id, LifecycleKind::Queued);
        self.notifications
            .add_notification(NotificationEvent::info("Generation queued", descriptor));

        self.process_queue();
        Ok(task_id)
    }

    fn on_job_created(&mut self, task_id: TaskId, job: ProviderJobHandle) {
        if let Err(e) = self.queue.attach_job(task_id, job.clone()) {
            tracing::error!(task_id = %task_id, error = %e, "Failed to attach provider job");
            return;
        }
        tracing::info!(task_id = %task_id, job_id = %job, "Provider job created");
        self.publish(task_id, LifecycleKind::JobCreated { job });
    }

    fn on_polled(&mut self, task_id: TaskId, attempt: u32) {
        let Some(estimator) = self.progress.get_mut(&task_id) else {
            return;
        };
        let progress = estimator.record(attempt);
        tracing::debug!(
            task_id = %task_id,
            attempt,
            percent = progress.percent(),
            eta_secs = progress.eta.as_secs(),
            "Task progress",
        );
        self.publish(task_id, LifecycleKind::Progress { attempt, progress });
    }

    fn on_finished(&mut self, task_id: TaskId, outcome: Result<Vec<ResultTrack>, GenerationError>) {
        let result = match outcome {
            Ok(tracks) => self.queue.complete(task_id, tracks),
            Err(error) => self.queue.fail(task_id, error),
        };

        match result {
            Ok(task) => {
                let task = task.clone();
                self.report_terminal(&task);
                if let Some(waiters) = self.waiters.remove(&task_id) {
                    for waiter in waiters {
                        let _ = waiter.send(Some(task.clone()));
                    }
                }
            }
            Err(e) => {
                tracing::error!(task_id = %task_id, error = %e, "Failed to record task outcome");
            }
        }

        self.prune_bookkeeping();
        self.process_queue();
    }

    // ---- admission ----

    /// Admit queued tasks, oldest first, while slots are free.
    fn process_queue(&mut self) {
        let limit = self.config.concurrency_limit;
        loop {
            let Some((task_id, request)) = self
                .queue
                .admit_next(limit)
                .map(|task| (task.id, task.request.clone()))
            else {
                break;
            };

            let profile = self.config.profiles.select(&request);
            self.progress.insert(
                task_id,
                ProgressEstimator::new(profile.attempt_budget(), profile.poll_interval()),
            );

            tracing::info!(
                task_id = %task_id,
                job_type = %profile.job_type_id(),
                processing = self.queue.processing_count(),
                queued = self.queue.pending_count(),
                "Task admitted",
            );
            self.publish(task_id, LifecycleKind::Started);
            self.spawn_job(task_id, request, profile);
        }
    }

    fn spawn_job(&self, task_id: TaskId, request: GenerationRequest, profile: JobProfile) {
        let runner = JobRunner {
            task_id,
            request,
            profile,
            deps: self.deps.clone(),
            backoff: self.config.backoff.clone(),
            reports: self.outbox.clone(),
            cancel: self.cancel.child_token(),
        };
        tokio::spawn(runner.run());
    }

    // ---- helpers ----

    fn report_terminal(&mut self, task: &Task) {
        match (task.tracks(), task.error()) {
            (Some(tracks), _) => {
                if let Some(estimator) = self.progress.get_mut(&task.id) {
                    estimator.finish();
                }
                tracing::info!(task_id = %task.id, tracks = tracks.len(), "Task completed");
                self.publish(task.id, LifecycleKind::Completed { tracks: tracks.len() });

                let title = tracks.first().map(|t| t.title.as_str()).unwrap_or_default();
                let message = match tracks.len() {
                    1 => format!("\"{title}\" is ready"),
                    n => format!("\"{title}\" and {} more are ready", n - 1),
                };
                self.notifications
                    .add_notification(NotificationEvent::success("Track ready", message));
            }
            (None, Some(error)) => {
                tracing::error!(
                    task_id = %task.id,
                    kind = error.kind(),
                    error = %error,
                    "Task failed",
                );
                self.publish(task.id, LifecycleKind::Failed { error: error.clone() });

                let notification = match error {
                    GenerationError::ServiceUnavailable { .. } => NotificationEvent::warning(
                        "Service under maintenance",
                        error.to_string(),
                    ),
                    _ => NotificationEvent::error("Generation failed", error.to_string()),
                };
                self.notifications.add_notification(notification);
            }
            (None, None) => {}
        }
    }

    fn snapshot(&self) -> Vec<TaskSummary> {
        self.queue
            .iter()
            .map(|task| TaskSummary {
                id: task.id,
                status: task.status(),
                descriptor: task.request.descriptor(),
                job: task.job().cloned(),
                progress: self
                    .progress
                    .get(&task.id)
                    .map(ProgressEstimator::current)
                    .unwrap_or_default(),
                submitted_at: task.submitted_at,
            })
            .collect()
    }

    /// Drop progress trackers of tasks the queue no longer retains.
    fn prune_bookkeeping(&mut self) {
        let queue = &self.queue;
        self.progress.retain(|id, _| queue.get(*id).is_some());
    }

    /// Fail every processing task on shutdown so waiters get an answer.
    /// Queued tasks stay queued; their waiters see the dispatcher stop.
    fn abandon_in_flight(&mut self) {
        for task_id in self.queue.processing_ids() {
            if let Ok(task) = self.queue.fail(task_id, GenerationError::Interrupted) {
                let task = task.clone();
                self.report_terminal(&task);
                if let Some(waiters) = self.waiters.remove(&task_id) {
                    for waiter in waiters {
                        let _ = waiter.send(Some(task.clone()));
                    }
                }
            }
        }
        self.waiters.clear();
    }

    fn publish(&self, task_id: TaskId, kind: LifecycleKind) {
        self.events.publish(LifecycleEvent::new(task_id, kind));
    }
}

// ---------------------------------------------------------------------------
// Job runner
// ---------------------------------------------------------------------------

/// Drives one admitted task: create -> poll* -> materialize.
///
/// Runs on its own Tokio task and reports back to the dispatcher only
/// through messages; it never touches the queue.
struct JobRunner {
    task_id: TaskId,
    request: GenerationRequest,
    profile: JobProfile,
    deps: Collaborators,
    backoff: BackoffConfig,
    reports: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
}

impl JobRunner {
    async fn run(self) {
        let outcome = self.execute().await;
        let _ = self.reports.send(Command::Finished {
            task_id: self.task_id,
            outcome,
        });
    }

    async fn execute(&self) -> Result<Vec<ResultTrack>, GenerationError> {
        let task_id = self.task_id;

        let entitlement = self.deps.gate.can_proceed().await;
        if !entitlement.allowed {
            return Err(GenerationError::NotEntitled {
                reason: entitlement.reason,
            });
        }
        self.deps
            .gate
            .consume()
            .await
            .map_err(|e| GenerationError::NotEntitled {
                reason: e.to_string(),
            })?;

        let submission = JobSubmission::new(&self.request, &self.profile);
        let created = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(GenerationError::Interrupted),
            result = self.deps.provider.create_job(&submission) => result.map_err(|e| {
                tracing::warn!(task_id = %task_id, error = %e, "Job creation failed");
                GenerationError::from(e)
            })?,
        };

        let job = created.handle();
        let _ = self.reports.send(Command::JobCreated {
            task_id,
            job: job.clone(),
        });

        if normalize_status(&created.initial_status) == NormalizedStatus::Failed {
            return Err(GenerationError::ProviderFailed {
                message: failure_message(None),
                payload: None,
            });
        }

        let poller = Poller::new(self.deps.provider.as_ref(), &self.backoff);
        let outcome = poller
            .poll(&job, &self.profile, &self.cancel, |attempt| {
                let _ = self.reports.send(Command::Polled { task_id, attempt });
            })
            .await;

        let items = match outcome {
            PollOutcome::Completed(items) => items,
            PollOutcome::Failed(error) => return Err(error),
        };

        let tracks = materialize(self.deps.artifacts.as_ref(), &self.request, items).await;
        if tracks.is_empty() {
            return Err(GenerationError::NoData);
        }
        Ok(tracks)
    }
}
