//! Lifecycle event bus and user-facing notifications.
//!
//! - [`EventBus`]: in-process publish/subscribe hub for task
//!   [`LifecycleEvent`]s, backed by `tokio::sync::broadcast`.
//! - [`NotificationSink`]: ordered list of short-lived
//!   [`NotificationEvent`]s that remove themselves after a fixed TTL.

pub mod bus;
pub mod notifications;

pub use bus::{EventBus, LifecycleEvent, LifecycleKind};
pub use notifications::{NotificationEvent, NotificationSink, Severity, DEFAULT_TTL};
