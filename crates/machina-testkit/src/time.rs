//! Controllable time for deterministic tests.

use async_trait::async_trait;
use machina_core::TimeEffects;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Returns from every sleep immediately and records the requested durations.
#[derive(Debug, Clone, Default)]
pub struct InstantTime {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl InstantTime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every requested sleep, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    /// Sum of all requested sleeps.
    pub fn elapsed(&self) -> Duration {
        self.sleeps.lock().iter().sum()
    }
}

#[async_trait]
impl TimeEffects for InstantTime {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        tokio::task::yield_now().await;
    }
}
