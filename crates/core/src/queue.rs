//! Bounded FIFO of generation tasks.
//!
//! [`TaskQueue`] owns every non-terminal task plus a bounded window of
//! recently finished ones. It is a plain data structure: the dispatcher
//! holds it exclusively, so every mutation is already serialized.

use std::collections::{HashMap, VecDeque};

use crate::error::GenerationError;
use crate::request::GenerationRequest;
use crate::task::{ResultTrack, Task, TaskStatus, TransitionError};
use crate::types::{ProviderJobHandle, TaskId};

/// Default maximum number of tasks waiting for admission.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
/// Default number of terminal tasks kept for inspection.
pub const DEFAULT_FINISHED_RETENTION: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Queue is full ({capacity} tasks waiting)")]
    Full { capacity: usize },

    #[error("Task {0} not found")]
    UnknownTask(TaskId),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[derive(Debug)]
pub struct TaskQueue {
    capacity: usize,
    finished_retention: usize,
    tasks: HashMap<TaskId, Task>,
    /// Every retained task id, in submission order.
    order: VecDeque<TaskId>,
    /// Queued task ids, oldest first.
    pending: VecDeque<TaskId>,
    /// Terminal task ids, oldest first.
    finished: VecDeque<TaskId>,
    processing: usize,
}

impl TaskQueue {
    pub fn new(capacity: usize, finished_retention: usize) -> Self {
        Self {
            capacity,
            finished_retention,
            tasks: HashMap::new(),
            order: VecDeque::new(),
            pending: VecDeque::new(),
            finished: VecDeque::new(),
            processing: 0,
        }
    }

    /// Append a new task at the tail.
    pub fn push(&mut self, request: GenerationRequest) -> Result<TaskId, QueueError> {
        if self.pending.len() >= self.capacity {
            return Err(QueueError::Full {
                capacity: self.capacity,
            });
        }
        let task = Task::new(request);
        let id = task.id;
        self.tasks.insert(id, task);
        self.order.push_back(id);
        self.pending.push_back(id);
        Ok(id)
    }

    /// Admit the oldest queued task if fewer than `limit` are processing.
    ///
    /// The count check and the increment happen in one `&mut self` call,
    /// so the processing count can never exceed `limit`.
    pub fn admit_next(&mut self, limit: usize) -> Option<&Task> {
        if self.processing >= limit {
            return None;
        }
        while let Some(id) = self.pending.pop_front() {
            let Some(task) = self.tasks.get_mut(&id) else {
                continue;
            };
            if task.start().is_ok() {
                self.processing += 1;
                return self.tasks.get(&id);
            }
        }
        None
    }

    pub fn attach_job(&mut self, id: TaskId, handle: ProviderJobHandle) -> Result<(), QueueError> {
        self.task_mut(id)?.attach_job(handle)?;
        Ok(())
    }

    /// Complete a processing task. An empty track list fails it with
    /// `NoData` instead.
    pub fn complete(&mut self, id: TaskId, tracks: Vec<ResultTrack>) -> Result<&Task, QueueError> {
        self.task_mut(id)?.complete(tracks)?;
        self.on_terminal(id);
        self.task(id)
    }

    pub fn fail(&mut self, id: TaskId, error: GenerationError) -> Result<&Task, QueueError> {
        self.task_mut(id)?.fail(error)?;
        self.on_terminal(id);
        self.task(id)
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// All retained tasks in submission order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    /// Ids of tasks currently processing.
    pub fn processing_ids(&self) -> Vec<TaskId> {
        self.iter()
            .filter(|t| t.status() == TaskStatus::Processing)
            .map(|t| t.id)
            .collect()
    }

    pub fn processing_count(&self) -> usize {
        self.processing
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // ---- private helpers ----

    fn task(&self, id: TaskId) -> Result<&Task, QueueError> {
        self.tasks.get(&id).ok_or(QueueError::UnknownTask(id))
    }

    fn task_mut(&mut self, id: TaskId) -> Result<&mut Task, QueueError> {
        self.tasks.get_mut(&id).ok_or(QueueError::UnknownTask(id))
    }

    /// Release the processing slot and prune old terminal tasks.
    fn on_terminal(&mut self, id: TaskId) {
        self.processing = self.processing.saturating_sub(1);
        self.finished.push_back(id);

        while self.finished.len() > self.finished_retention {
            if let Some(old) = self.finished.pop_front() {
                self.tasks.remove(&old);
                self.order.retain(|x| *x != old);
            }
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, DEFAULT_FINISHED_RETENTION)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
