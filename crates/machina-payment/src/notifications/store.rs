//! Persistence backends for notifications.

use super::Notification;
use async_trait::async_trait;
use machina_core::{MachinaError, MachinaResult};
use parking_lot::Mutex;
use std::path::PathBuf;

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Previously saved notifications, newest first. Empty when nothing was saved.
    async fn load(&self) -> MachinaResult<Vec<Notification>>;

    /// Replace the saved list.
    async fn save(&self, notifications: &[Notification]) -> MachinaResult<()>;
}

/// Notifications kept as one JSON array on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl NotificationStore for JsonFileStore {
    async fn load(&self) -> MachinaResult<Vec<Notification>> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&content).map_err(|e| {
            MachinaError::internal(format!(
                "corrupt notification store {}: {e}",
                self.path.display()
            ))
        })
    }

    async fn save(&self, notifications: &[Notification]) -> MachinaResult<()> {
        let content = serde_json::to_vec_pretty(notifications)
            .map_err(|e| MachinaError::internal(format!("failed to encode notifications: {e}")))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Vec<Notification>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `notifications`.
    pub fn with(notifications: Vec<Notification>) -> Self {
        Self {
            saved: Mutex::new(notifications),
        }
    }

    pub fn saved(&self) -> Vec<Notification> {
        self.saved.lock().clone()
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn load(&self) -> MachinaResult<Vec<Notification>> {
        Ok(self.saved.lock().clone())
    }

    async fn save(&self, notifications: &[Notification]) -> MachinaResult<()> {
        *self.saved.lock() = notifications.to_vec();
        Ok(())
    }
}
