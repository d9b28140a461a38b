//! Background fetch scheduling.
//!
//! A [`BackgroundFetcher`] periodically runs an injected fetch operation on
//! a server-directed interval plus a bounded random skew. Its lifecycle is
//! strictly one-way (idle, scheduled, stopped); a stopped fetcher can never
//! be rescheduled and must be recreated, which prevents leaked timers.
//! Exactly one timer is outstanding at any time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::warn;

use crate::skew::{clamp_interval, skew_interval};

/// The operation the fetcher runs on every tick.
///
/// Failures are logged and swallowed; they never abort the schedule. Retry
/// policy beyond the fixed schedule belongs to the implementation.
#[async_trait]
pub trait FetchOperation: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<()>;
}

/// Supplier of the server-suggested poll interval.
///
/// `Ok(None)` (absent/malformed) and `Err` both fall back to the default
/// interval; suggestions are clamped to the allowed floor either way.
#[async_trait]
pub trait PollIntervalSource: Send + Sync {
    async fn suggested_interval(&self) -> anyhow::Result<Option<Duration>>;
}

/// Lifecycle misuse. Double-scheduling must fail loudly rather than leak a
/// second timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FetcherError {
    #[error("background fetcher is already scheduled")]
    AlreadyScheduled,

    #[error("cannot start a background fetcher that has been stopped")]
    Stopped,
}

/// Tagged lifecycle state with only forward transitions: idle may become
/// scheduled or stopped, scheduled may become stopped, stopped is terminal.
enum FetcherState {
    Idle,
    Scheduled(#[allow(dead_code)] JoinHandle<()>),
    Stopped,
}

/// Periodically invokes a [`FetchOperation`] with per-instance random skew.
///
/// The skew is drawn once at construction and immutable afterwards, so a
/// fetcher keeps a stable offset from other clients for its whole life.
pub struct BackgroundFetcher {
    op: Arc<dyn FetchOperation>,
    intervals: Arc<dyn PollIntervalSource>,
    skew: Duration,
    stop_tx: watch::Sender<bool>,
    state: FetcherState,
}

impl BackgroundFetcher {
    pub fn new(op: Arc<dyn FetchOperation>, intervals: Arc<dyn PollIntervalSource>) -> Self {
        Self::with_skew(op, intervals, skew_interval())
    }

    /// Create a fetcher with an explicit skew, mainly for tests that need
    /// deterministic timing.
    pub fn with_skew(
        op: Arc<dyn FetchOperation>,
        intervals: Arc<dyn PollIntervalSource>,
        skew: Duration,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            op,
            intervals,
            skew,
            stop_tx,
            state: FetcherState::Idle,
        }
    }

    /// The skew applied to every interval this fetcher schedules.
    pub fn skew(&self) -> Duration {
        self.skew
    }

    /// Start background fetching.
    ///
    /// With `with_initial_skew` the first invocation is delayed by the
    /// fetcher's skew; otherwise it fires immediately. Fails on a fetcher
    /// that is already scheduled or has been stopped.
    pub fn start(&mut self, with_initial_skew: bool) -> Result<(), FetcherError> {
        match self.state {
            FetcherState::Scheduled(_) => return Err(FetcherError::AlreadyScheduled),
            FetcherState::Stopped => return Err(FetcherError::Stopped),
            FetcherState::Idle => {}
        }

        let initial_delay = if with_initial_skew {
            self.skew
        } else {
            Duration::ZERO
        };

        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.op),
            Arc::clone(&self.intervals),
            self.skew,
            self.stop_tx.subscribe(),
            initial_delay,
        ));
        self.state = FetcherState::Scheduled(handle);
        Ok(())
    }

    /// Stop background fetching. One-way and idempotent: stopping twice,
    /// or before ever starting, is a no-op.
    ///
    /// Cancels the pending timer. An in-flight fetch is not interrupted;
    /// it observes the stop on completion and skips rescheduling.
    pub fn stop(&mut self) {
        self.stop_tx.send(true).ok();
        self.state = FetcherState::Stopped;
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        matches!(self.state, FetcherState::Stopped)
    }
}

impl Drop for BackgroundFetcher {
    fn drop(&mut self) {
        // A dropped fetcher must not leave its timer running.
        self.stop_tx.send(true).ok();
    }
}

async fn run_loop(
    op: Arc<dyn FetchOperation>,
    intervals: Arc<dyn PollIntervalSource>,
    skew: Duration,
    mut stop_rx: watch::Receiver<bool>,
    initial_delay: Duration,
) {
    let mut delay = initial_delay;
    loop {
        if !delay.is_zero() {
            tokio::select! {
                _ = sleep(delay) => {}
                _ = stop_rx.changed() => return,
            }
        }
        if *stop_rx.borrow() {
            return;
        }

        if let Err(e) = op.fetch().await {
            warn!("error performing periodic fetch: {e:#}");
        }
        if *stop_rx.borrow() {
            return;
        }

        let suggested = match intervals.suggested_interval().await {
            Ok(suggested) => suggested,
            Err(e) => {
                warn!("error fetching poll interval: {e:#}");
                None
            }
        };
        delay = clamp_interval(suggested) + skew;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingOp {
        count: AtomicUsize,
        fail: bool,
    }

    impl CountingOp {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                count: AtomicUsize::new(0),
                fail,
            })
        }

        fn count(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FetchOperation for CountingOp {
        async fn fetch(&self) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("simulated fetch failure");
            }
            Ok(())
        }
    }

    struct FixedInterval(Option<Duration>);

    #[async_trait]
    impl PollIntervalSource for FixedInterval {
        async fn suggested_interval(&self) -> anyhow::Result<Option<Duration>> {
            Ok(self.0)
        }
    }

    struct BrokenInterval;

    #[async_trait]
    impl PollIntervalSource for BrokenInterval {
        async fn suggested_interval(&self) -> anyhow::Result<Option<Duration>> {
            anyhow::bail!("interval endpoint unreachable")
        }
    }

    fn fetcher_with(
        op: Arc<CountingOp>,
        intervals: impl PollIntervalSource + 'static,
        skew: Duration,
    ) -> BackgroundFetcher {
        BackgroundFetcher::with_skew(op, Arc::new(intervals), skew)
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_start_fetches_without_delay() {
        let op = CountingOp::new(false);
        let mut fetcher = fetcher_with(
            op.clone(),
            FixedInterval(Some(Duration::from_secs(600))),
            Duration::from_secs(5),
        );

        fetcher.start(false).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(op.count(), 1, "first fetch fires immediately");

        fetcher.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn initial_skew_delays_the_first_fetch() {
        let op = CountingOp::new(false);
        let mut fetcher = fetcher_with(
            op.clone(),
            FixedInterval(Some(Duration::from_secs(600))),
            Duration::from_secs(10),
        );

        fetcher.start(true).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(op.count(), 0, "nothing fires before the skew elapses");

        tokio::time::sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;
        assert_eq!(op.count(), 1);

        fetcher.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn reschedules_on_the_clamped_interval_plus_skew() {
        let op = CountingOp::new(false);
        // The 1s suggestion gets clamped to the 5 minute floor.
        let mut fetcher = fetcher_with(
            op.clone(),
            FixedInterval(Some(Duration::from_secs(1))),
            Duration::from_secs(30),
        );

        fetcher.start(false).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(op.count(), 1);

        // Shorter than floor + skew: nothing new yet.
        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        tokio::task::yield_now().await;
        assert_eq!(op.count(), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert_eq!(op.count(), 2);

        fetcher.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failures_never_break_the_schedule() {
        let op = CountingOp::new(true);
        let mut fetcher = fetcher_with(
            op.clone(),
            FixedInterval(None),
            Duration::ZERO,
        );

        fetcher.start(false).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(op.count(), 1);

        // Default interval applies after a failure too.
        tokio::time::sleep(Duration::from_secs(60 * 60 + 1)).await;
        tokio::task::yield_now().await;
        assert_eq!(op.count(), 2);

        fetcher.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn broken_interval_source_falls_back_to_default() {
        let op = CountingOp::new(false);
        let mut fetcher =
            BackgroundFetcher::with_skew(op.clone(), Arc::new(BrokenInterval), Duration::ZERO);

        fetcher.start(false).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(op.count(), 1);

        tokio::time::sleep(Duration::from_secs(60 * 60 + 1)).await;
        tokio::task::yield_now().await;
        assert_eq!(op.count(), 2);

        fetcher.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_fails_loudly() {
        let op = CountingOp::new(false);
        let mut fetcher = fetcher_with(op, FixedInterval(None), Duration::ZERO);

        fetcher.start(false).unwrap();
        assert_eq!(fetcher.start(false), Err(FetcherError::AlreadyScheduled));

        fetcher.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_fetcher_cannot_be_restarted() {
        let op = CountingOp::new(false);
        let mut fetcher = fetcher_with(op, FixedInterval(None), Duration::ZERO);

        fetcher.start(false).unwrap();
        fetcher.stop();
        assert!(fetcher.is_stopped());
        assert_eq!(fetcher.start(false), Err(FetcherError::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_valid_before_start() {
        let op = CountingOp::new(false);
        let mut fetcher = fetcher_with(op, FixedInterval(None), Duration::ZERO);

        fetcher.stop();
        fetcher.stop();
        assert!(fetcher.is_stopped());
        assert_eq!(fetcher.start(false), Err(FetcherError::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_the_pending_timer() {
        let op = CountingOp::new(false);
        let mut fetcher = fetcher_with(
            op.clone(),
            FixedInterval(Some(Duration::from_secs(600))),
            Duration::ZERO,
        );

        fetcher.start(false).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(op.count(), 1);

        fetcher.stop();

        // Long past the next scheduled tick: nothing else may fire.
        tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
        tokio::task::yield_now().await;
        assert_eq!(op.count(), 1);
    }
}
