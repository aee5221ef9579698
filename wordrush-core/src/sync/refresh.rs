use super::GameController;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Periodic background refresh. Stops when dropped or when the controller
/// goes away.
pub struct RefreshHandle {
    task: JoinHandle<()>,
}

impl RefreshHandle {
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl GameController {
    /// Re-read the ledger every `refresh_interval` while a game is active.
    /// Ticks with no active game are skipped without touching the ledger.
    pub fn spawn_refresh(self: &Arc<Self>) -> RefreshHandle {
        let period = self.config().refresh_interval;
        let controller: Weak<GameController> = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(controller) = controller.upgrade() else {
                    break;
                };

                if !controller.view().is_active() {
                    tracing::debug!("No active game, skipping refresh");
                    continue;
                }

                if let Err(e) = controller.refresh().await {
                    tracing::warn!("Background refresh failed: {}", e);
                }
            }
        });

        RefreshHandle { task }
    }
}
