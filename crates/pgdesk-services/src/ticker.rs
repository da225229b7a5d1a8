//! Per-tab elapsed-time ticker

use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Periodic task reporting how long a query has been running.
///
/// The task is aborted on [`ElapsedTicker::stop`] and on drop, so a ticker
/// can never outlive the tab that owns it.
pub struct ElapsedTicker {
    handle: JoinHandle<()>,
}

impl ElapsedTicker {
    /// Spawn on the current runtime. Returns `None` outside a runtime.
    pub fn start<F>(started_at: Instant, interval: Duration, on_tick: F) -> Option<Self>
    where
        F: Fn(Duration) + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let interval = interval.max(Duration::from_millis(1));
        let handle = runtime.spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // first tick fires immediately
            ticks.tick().await;
            loop {
                ticks.tick().await;
                on_tick(started_at.elapsed());
            }
        });
        Some(Self { handle })
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ElapsedTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn ticks_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let ticker = ElapsedTicker::start(Instant::now(), Duration::from_millis(5), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(ticks.load(Ordering::SeqCst) >= 1);

        ticker.stop();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(ticker.is_finished());
        let after_stop = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn drop_aborts_task() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let ticker = ElapsedTicker::start(Instant::now(), Duration::from_millis(5), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(ticker);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn no_runtime_no_ticker() {
        assert!(ElapsedTicker::start(Instant::now(), Duration::from_millis(5), |_| {}).is_none());
    }
}
