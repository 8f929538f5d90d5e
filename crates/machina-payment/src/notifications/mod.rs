//! User-facing notification feed.
//!
//! Newest first, capped at [`MAX_NOTIFICATIONS`]. Every change is persisted
//! to the configured [`NotificationStore`] and broadcast as a full snapshot.

mod store;

pub use store::{JsonFileStore, MemoryStore, NotificationStore};

use chrono::{DateTime, Utc};
use machina_core::{MachinaResult, TokenAmount};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;
use uuid::Uuid;

pub const MAX_NOTIFICATIONS: usize = 100;

/// Ticker used in payment messages.
pub const CURRENCY_SYMBOL: &str = "PEAQ";

const SNAPSHOT_CHANNEL_CAPACITY: usize = 16;

/// Feed entry category. Saved feeds may hold any of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Earning,
    Transaction,
    Machine,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Content of a notification about to be posted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub data: Option<serde_json::Value>,
}

impl NewNotification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            kind,
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn payment(succeeded: bool, amount: TokenAmount, machine_name: &str) -> Self {
        let (title, message) = if succeeded {
            (
                "Transaction Complete",
                format!("Successfully paid {amount} {CURRENCY_SYMBOL} to {machine_name}"),
            )
        } else {
            (
                "Transaction Failed",
                format!("Failed to pay {amount} {CURRENCY_SYMBOL} to {machine_name}"),
            )
        };
        Self::new(NotificationKind::Transaction, title, message).with_data(serde_json::json!({
            "type": if succeeded { "success" } else { "failed" },
            "amount": amount,
            "machineName": machine_name,
        }))
    }

    pub fn airdrop(amount: TokenAmount) -> Self {
        Self::new(
            NotificationKind::Transaction,
            "Funds Received",
            format!("You received {amount} {CURRENCY_SYMBOL} to cover your first use"),
        )
        .with_data(serde_json::json!({ "amount": amount }))
    }

    pub fn system(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::System, title, message)
    }
}

/// Notification feed backed by a store.
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    notifications: Mutex<Vec<Notification>>,
    sender: broadcast::Sender<Vec<Notification>>,
}

impl std::fmt::Debug for NotificationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationService").finish_non_exhaustive()
    }
}

impl NotificationService {
    /// Empty feed; call [`NotificationService::init`] to load saved entries.
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        let (sender, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            store,
            notifications: Mutex::new(Vec::new()),
            sender,
        }
    }

    /// Load persisted notifications, replacing the in-memory feed.
    pub async fn init(&self) -> MachinaResult<()> {
        let mut loaded = self.store.load().await?;
        loaded.truncate(MAX_NOTIFICATIONS);
        debug!(count = loaded.len(), "loaded notifications");
        let mut notifications = self.notifications.lock().await;
        *notifications = loaded;
        self.publish(&notifications);
        Ok(())
    }

    /// Post a notification at the head of the feed.
    pub async fn add(&self, new: NewNotification) -> MachinaResult<Notification> {
        let notification = Notification {
            id: Uuid::new_v4(),
            title: new.title,
            message: new.message,
            kind: new.kind,
            timestamp: Utc::now(),
            read: false,
            data: new.data,
        };

        let mut notifications = self.notifications.lock().await;
        let mut next = Vec::with_capacity(MAX_NOTIFICATIONS);
        next.push(notification.clone());
        next.extend(notifications.iter().take(MAX_NOTIFICATIONS - 1).cloned());
        self.commit(&mut notifications, next).await?;
        Ok(notification)
    }

    /// Returns `false` when no notification has this id.
    pub async fn mark_read(&self, id: Uuid) -> MachinaResult<bool> {
        let mut notifications = self.notifications.lock().await;
        let mut next = notifications.clone();
        let Some(notification) = next.iter_mut().find(|n| n.id == id) else {
            return Ok(false);
        };
        notification.read = true;
        self.commit(&mut notifications, next).await?;
        Ok(true)
    }

    pub async fn mark_all_read(&self) -> MachinaResult<()> {
        let mut notifications = self.notifications.lock().await;
        let mut next = notifications.clone();
        next.iter_mut().for_each(|n| n.read = true);
        self.commit(&mut notifications, next).await
    }

    pub async fn clear(&self) -> MachinaResult<()> {
        let mut notifications = self.notifications.lock().await;
        self.commit(&mut notifications, Vec::new()).await
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().await.clone()
    }

    pub async fn unread_count(&self) -> usize {
        self.notifications
            .lock()
            .await
            .iter()
            .filter(|n| !n.read)
            .count()
    }

    /// Snapshots of the feed after every change.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<Notification>> {
        self.sender.subscribe()
    }

    /// Persist the current feed.
    pub async fn shutdown(&self) -> MachinaResult<()> {
        let notifications = self.notifications.lock().await;
        self.store.save(&notifications).await
    }

    /// Persist `next`, then make it the live feed. A failed save leaves the
    /// live feed untouched.
    async fn commit(
        &self,
        current: &mut Vec<Notification>,
        next: Vec<Notification>,
    ) -> MachinaResult<()> {
        self.store.save(&next).await?;
        *current = next;
        self.publish(current);
        Ok(())
    }

    fn publish(&self, notifications: &[Notification]) {
        // No subscribers is fine.
        let _ = self.sender.send(notifications.to_vec());
    }
}
