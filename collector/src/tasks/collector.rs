//! Generic collector task: poll a [`Source`] on a fixed interval and publish
//! the reading into one gauge.

use std::sync::Arc;
use std::time::Duration;

use prometheus::Gauge;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::sources::Source;

/// What a task does with its gauge when a fetch fails.
///
/// The error itself is always logged.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FailurePolicy {
    /// Leave the last published value in place.
    KeepLast,
    /// Overwrite the gauge with a documented fallback value.
    Fallback(f64),
}

/// Result of a single poll, mostly useful for tests and logging.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PollOutcome {
    Updated(f64),
    Kept,
    FellBack(f64),
}

/// A gauge, the source feeding it and the schedule.
pub struct CollectorTask {
    name: String,
    gauge: Gauge,
    interval: Duration,
    source: Arc<dyn Source>,
    policy: FailurePolicy,
}

impl CollectorTask {
    pub fn new(
        name: impl Into<String>,
        gauge: Gauge,
        interval: Duration,
        source: Arc<dyn Source>,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            name: name.into(),
            gauge,
            interval,
            source,
            policy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Fetches once and applies either the reading or the failure policy.
    pub async fn poll_once(&self) -> PollOutcome {
        match self.source.fetch().await {
            Ok(value) => {
                self.gauge.set(value);
                tracing::debug!(metric = %self.name, value, "gauge updated");
                PollOutcome::Updated(value)
            }
            Err(e) => match self.policy {
                FailurePolicy::KeepLast => {
                    tracing::warn!(metric = %self.name, "collection failed, keeping last value: {e}");
                    PollOutcome::Kept
                }
                FailurePolicy::Fallback(value) => {
                    tracing::warn!(metric = %self.name, fallback = value, "collection failed: {e}");
                    self.gauge.set(value);
                    PollOutcome::FellBack(value)
                }
            },
        }
    }

    /// Polls forever. The first poll happens one full interval after start.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            metric = %self.name,
            "collector running with interval {}s",
            self.interval.as_secs()
        );

        loop {
            ticker.tick().await;
            self.poll_once().await;
        }
    }

    /// Spawns [`CollectorTask::run`] onto the current Tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use prometheus::Opts;

    use crate::error::SourceError;

    /// Returns the queued readings in order, then keeps failing.
    struct Scripted {
        readings: Vec<Result<f64, &'static str>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(readings: Vec<Result<f64, &'static str>>) -> Arc<Self> {
            Arc::new(Self {
                readings,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Source for Scripted {
        async fn fetch(&self) -> Result<f64, SourceError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.readings.get(i) {
                Some(Ok(v)) => Ok(*v),
                Some(Err(msg)) => Err(SourceError::Transport(msg.to_string())),
                None => Err(SourceError::Transport("exhausted".to_string())),
            }
        }
    }

    fn gauge() -> Gauge {
        Gauge::with_opts(Opts::new("test_gauge", "test gauge")).expect("gauge")
    }

    fn task(source: Arc<Scripted>, policy: FailurePolicy) -> (CollectorTask, Gauge) {
        let g = gauge();
        let task = CollectorTask::new(
            "test_gauge",
            g.clone(),
            Duration::from_secs(120),
            source,
            policy,
        );
        (task, g)
    }

    #[tokio::test]
    async fn keep_last_leaves_gauge_on_failure() {
        let source = Scripted::new(vec![Ok(42.0), Err("node down")]);
        let (task, g) = task(source, FailurePolicy::KeepLast);

        assert_eq!(task.poll_once().await, PollOutcome::Updated(42.0));
        assert_eq!(g.get(), 42.0);

        assert_eq!(task.poll_once().await, PollOutcome::Kept);
        assert_eq!(g.get(), 42.0);
    }

    #[tokio::test]
    async fn fallback_overwrites_gauge_on_failure() {
        let source = Scripted::new(vec![Ok(2.0), Err("api down"), Ok(0.0)]);
        let (task, g) = task(source, FailurePolicy::Fallback(10_000.0));

        task.poll_once().await;
        assert_eq!(g.get(), 2.0);

        assert_eq!(task.poll_once().await, PollOutcome::FellBack(10_000.0));
        assert_eq!(g.get(), 10_000.0);

        task.poll_once().await;
        assert_eq!(g.get(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn first_poll_waits_one_full_interval() {
        let source = Scripted::new(vec![Ok(7.0), Ok(8.0)]);
        let (task, g) = task(source.clone(), FailurePolicy::KeepLast);
        let handle = task.spawn();

        tokio::time::sleep(Duration::from_secs(119)).await;
        assert_eq!(source.calls(), 0);
        assert_eq!(g.get(), 0.0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(source.calls(), 1);
        assert_eq!(g.get(), 7.0);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(source.calls(), 2);
        assert_eq!(g.get(), 8.0);

        handle.abort();
    }
}
