use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window request throttle.
///
/// Admission never rejects: it computes how long the caller must wait so that
/// at most `max_requests` are admitted per `window` and consecutive requests
/// are at least `min_interval` apart, then reserves that slot. The lock is
/// released before sleeping, so a caller abandoned mid-wait only forfeits its
/// slot and never blocks later admissions.
pub struct RateWindow {
    state: Mutex<WindowState>,
    max_requests: usize,
    window: Duration,
    min_interval: Duration,
}

#[derive(Default)]
struct WindowState {
    timestamps: VecDeque<Instant>,
    last_request: Option<Instant>,
}

impl WindowState {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

impl RateWindow {
    pub fn new(max_requests: usize, window: Duration, min_interval: Duration) -> Self {
        Self {
            state: Mutex::new(WindowState::default()),
            max_requests: max_requests.max(1),
            window,
            min_interval,
        }
    }

    /// Wait until a request may be issued, then count it.
    pub async fn admit(&self) {
        let admitted_at = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            state.prune(now, self.window);

            let admitted_at = now + self.required_wait(&state, now);
            state.timestamps.push_back(admitted_at);
            state.last_request = Some(admitted_at);
            admitted_at
        };

        let wait = admitted_at.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            tracing::debug!("[Throttle] Waiting {}ms before next request", wait.as_millis());
            tokio::time::sleep_until(admitted_at).await;
        }
    }

    fn required_wait(&self, state: &WindowState, now: Instant) -> Duration {
        let mut wait = Duration::ZERO;

        if state.timestamps.len() >= self.max_requests {
            // The request that frees a slot is the one `max_requests` back from the end.
            let index = state.timestamps.len() - self.max_requests;
            if let Some(blocking) = state.timestamps.get(index) {
                let frees_at = *blocking + self.window;
                wait = wait.max(frees_at.saturating_duration_since(now));
            }
        }

        if let Some(last) = state.last_request {
            let next_allowed = last + self.min_interval;
            wait = wait.max(next_allowed.saturating_duration_since(now));
        }

        wait
    }

    /// Requests admitted within the trailing window.
    pub async fn requests_in_window(&self) -> usize {
        let mut state = self.state.lock().await;
        state.prune(Instant::now(), self.window);
        state.timestamps.len()
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.timestamps.clear();
        state.last_request = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_min_interval_spacing() {
        let window = RateWindow::new(50, Duration::from_secs(60), Duration::from_millis(1200));
        let start = Instant::now();

        window.admit().await;
        window.admit().await;
        window.admit().await;

        assert_eq!(start.elapsed(), Duration::from_millis(2400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_limit_delays_until_slot_frees() {
        let window = RateWindow::new(3, Duration::from_secs(60), Duration::ZERO);
        let start = Instant::now();

        for _ in 0..3 {
            window.admit().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(window.requests_in_window().await, 3);

        window.admit().await;
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_prunes_old_requests() {
        let window = RateWindow::new(2, Duration::from_secs(60), Duration::ZERO);
        window.admit().await;
        window.admit().await;

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(window.requests_in_window().await, 0);

        let before = Instant::now();
        window.admit().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_admission_keeps_its_slot_only() {
        let window = std::sync::Arc::new(RateWindow::new(
            50,
            Duration::from_secs(60),
            Duration::from_millis(1200),
        ));
        window.admit().await;

        let abandoned = {
            let window = window.clone();
            tokio::spawn(async move { window.admit().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        abandoned.abort();

        let start = Instant::now();
        tokio::time::timeout(Duration::from_secs(10), window.admit())
            .await
            .unwrap();
        // Spaced after the abandoned reservation at 1.2s.
        assert_eq!(start.elapsed(), Duration::from_millis(2300));
        assert_eq!(window.requests_in_window().await, 3);
    }
}
