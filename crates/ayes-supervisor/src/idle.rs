//! Activity tracking: resolves when the stream has been quiet long enough.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Timestamp of the last observed activity on either side of the bridge.
///
/// `wait(window)` resolves once `now - last_ping >= window`; pings while a
/// wait is pending push the deadline forward.
#[derive(Debug, Clone)]
pub struct IdleMonitor {
    last: Arc<Mutex<Instant>>,
}

impl Default for IdleMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl IdleMonitor {
    pub fn new() -> Self {
        Self {
            last: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Stamp now.
    pub fn ping(&self) {
        *self.last.lock().unwrap() = Instant::now();
    }

    /// Time since the last ping.
    pub fn elapsed(&self) -> Duration {
        self.last.lock().unwrap().elapsed()
    }

    /// Resolve once `window` has elapsed since the most recent ping.
    pub async fn wait(&self, window: Duration) {
        loop {
            let elapsed = self.elapsed();
            if elapsed >= window {
                return;
            }
            tokio::time::sleep(window - elapsed).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_wait_resolves_no_earlier_than_window() {
        let monitor = IdleMonitor::new();
        monitor.ping();
        let start = Instant::now();
        monitor.wait(Duration::from_millis(50)).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_ping_pushes_deadline_forward() {
        let monitor = IdleMonitor::new();
        monitor.ping();

        let waiter = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.wait(Duration::from_millis(80)).await })
        };

        // Keep pinging; the waiter must not resolve while activity flows.
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(30)).await;
            monitor.ping();
            assert!(!waiter.is_finished());
        }

        // Quiet now; it resolves within roughly one window.
        timeout(Duration::from_millis(500), waiter)
            .await
            .expect("resolves once quiet")
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_immediate_when_already_idle() {
        let monitor = IdleMonitor::new();
        tokio::time::sleep(Duration::from_millis(30)).await;
        timeout(Duration::from_millis(10), monitor.wait(Duration::from_millis(20)))
            .await
            .expect("already past the window");
    }
}
