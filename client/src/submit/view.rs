//! Locally reconciled view-state and user-facing notifications.
//!
//! The view carries an epoch. Submissions capture it when they start and
//! only touch the view if it is unchanged when they finish; [`ViewState::reset`]
//! bumps it when the operator navigates away, so late results are dropped
//! instead of landing on a screen that no longer shows them.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::config;
use crate::intent::ActionKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Error,
}

/// A dismissible message for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub text: String,
    pub action: Option<ActionKind>,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn success(action: ActionKind, text: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            text: text.into(),
            action: Some(action),
            at: Utc::now(),
        }
    }

    pub fn error(action: Option<ActionKind>, text: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            text: text.into(),
            action,
            at: Utc::now(),
        }
    }
}

/// What the screen currently shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewSnapshot {
    pub balance: Option<f64>,
    pub pending_count: Option<u64>,
    pub last_score: Option<f64>,
    pub last_transaction_id: Option<String>,
    pub notification: Option<Notification>,
}

#[derive(Debug, Default)]
struct Inner {
    epoch: u64,
    snapshot: ViewSnapshot,
}

pub struct ViewState {
    inner: RwLock<Inner>,
    notifications: broadcast::Sender<Notification>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewState {
    pub fn new() -> Self {
        let (notifications, _) = broadcast::channel(config::NOTIFICATION_CHANNEL_CAPACITY);
        Self {
            inner: RwLock::new(Inner::default()),
            notifications,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.inner.read().epoch
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        self.inner.read().snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// The view was torn down or replaced. Clears it and starts a new epoch.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.epoch += 1;
        inner.snapshot = ViewSnapshot::default();
        tracing::debug!(epoch = inner.epoch, "view reset");
    }

    /// Shows a notification now, regardless of epoch.
    pub fn notify(&self, notification: Notification) {
        self.inner.write().snapshot.notification = Some(notification.clone());
        // No subscribers is fine.
        let _ = self.notifications.send(notification);
    }

    pub fn dismiss(&self) {
        self.inner.write().snapshot.notification = None;
    }

    /// Applies `update` and publishes `notification` only if the view is
    /// still in `epoch`. Returns whether anything was applied.
    pub fn apply_if_current(
        &self,
        epoch: u64,
        update: impl FnOnce(&mut ViewSnapshot),
        notification: Option<Notification>,
    ) -> bool {
        {
            let mut inner = self.inner.write();
            if inner.epoch != epoch {
                tracing::debug!(
                    captured = epoch,
                    current = inner.epoch,
                    "dropping stale result"
                );
                return false;
            }
            update(&mut inner.snapshot);
            if let Some(n) = &notification {
                inner.snapshot.notification = Some(n.clone());
            }
        }
        if let Some(n) = notification {
            let _ = self.notifications.send(n);
        }
        true
    }
}
