//! Self-expiring user-facing notifications.
//!
//! [`NotificationSink`] keeps an ordered list of [`NotificationEvent`]s.
//! Every added event schedules its own removal after the sink's TTL,
//! whether or not a consumer ever looked at it. Observers subscribe to a
//! `tokio::sync::watch` channel and always see the whole list in
//! insertion order.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tunegen_core::types::Timestamp;
use uuid::Uuid;

/// How long a notification stays visible.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationEvent {
    pub id: Uuid,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub timestamp: Timestamp,
}

impl NotificationEvent {
    pub fn new(severity: Severity, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            severity,
            title: title.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, title, message)
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Success, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, title, message)
    }
}

/// Ordered, self-expiring notification list.
///
/// Cheap to clone; all clones share the same list.
#[derive(Clone)]
pub struct NotificationSink {
    list: Arc<watch::Sender<Vec<NotificationEvent>>>,
    ttl: Duration,
}

impl NotificationSink {
    pub fn new(ttl: Duration) -> Self {
        let (tx, _) = watch::channel(Vec::new());
        Self {
            list: Arc::new(tx),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Append a notification and schedule its removal after the TTL.
    ///
    /// Returns the id of the added event. No deduplication is performed.
    /// Expiry runs on the current Tokio runtime; outside a runtime the
    /// event stays until removed explicitly.
    pub fn add_notification(&self, event: NotificationEvent) -> Uuid {
        let id = event.id;
        tracing::debug!(
            notification_id = %id,
            severity = ?event.severity,
            title = %event.title,
            "Notification added",
        );
        self.list.send_modify(|list| list.push(event));
        self.schedule_expiry(id);
        id
    }

    /// Remove a notification. Returns `false` if it was already gone.
    pub fn remove_notification(&self, id: Uuid) -> bool {
        remove_from(&self.list, id)
    }

    /// Subscribe to the ordered notification list.
    pub fn subscribe(&self) -> watch::Receiver<Vec<NotificationEvent>> {
        self.list.subscribe()
    }

    /// Current notifications, oldest first.
    pub fn snapshot(&self) -> Vec<NotificationEvent> {
        self.list.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.list.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn schedule_expiry(&self, id: Uuid) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(notification_id = %id, "No runtime, notification will not expire");
            return;
        };
        let list: Weak<watch::Sender<Vec<NotificationEvent>>> = Arc::downgrade(&self.list);
        let ttl = self.ttl;
        handle.spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(list) = list.upgrade() {
                if remove_from(&list, id) {
                    tracing::trace!(notification_id = %id, "Notification expired");
                }
            }
        });
    }
}

impl Default for NotificationSink {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

fn remove_from(list: &watch::Sender<Vec<NotificationEvent>>, id: Uuid) -> bool {
    list.send_if_modified(|events| {
        let before = events.len();
        events.retain(|e| e.id != id);
        events.len() != before
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
