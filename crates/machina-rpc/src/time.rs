//! Wall-clock time.

use async_trait::async_trait;
use machina_core::TimeEffects;
use std::time::Duration;

/// [`TimeEffects`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealTime;

#[async_trait]
impl TimeEffects for RealTime {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
