//! Single-flight polling of the snapshot source.
//!
//! At most one build runs at a time. Timer ticks, user refreshes and
//! post-termination re-polls all go through [`PollingScheduler::trigger`];
//! triggers that arrive while a build is running are coalesced into it.
//! Builds run on the blocking pool and results are published through a
//! `watch` cell (latest snapshot) and a `broadcast` channel (events).

use crate::port::SharedSnapshot;
use crate::snapshot::SnapshotSource;
use anyhow::{Result, anyhow};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);
const EVENT_CAPACITY: usize = 16;

/// What asked for a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Timer,
    Demand,
    Repoll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    Coalesced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
}

#[derive(Debug, Clone)]
pub enum PollEvent {
    Updated(SharedSnapshot),
    Failed(String),
}

/// Something that can schedule a deferred poll
pub trait RepollRequester: Send + Sync {
    fn request_repoll(&self, delay: Duration);
}

#[derive(Clone)]
pub struct PollingScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn SnapshotSource>,
    interval: Duration,
    handle: Handle,
    polling: AtomicBool,
    current: watch::Sender<Option<SharedSnapshot>>,
    events: broadcast::Sender<PollEvent>,
}

impl PollingScheduler {
    /// Must be called from within a tokio runtime; tasks are spawned on it.
    pub fn new(source: Arc<dyn SnapshotSource>, poll_interval: Duration) -> Self {
        let interval = if poll_interval < MIN_POLL_INTERVAL {
            log::warn!(
                "Poll interval {:?} too short, using {:?}",
                poll_interval,
                MIN_POLL_INTERVAL
            );
            MIN_POLL_INTERVAL
        } else {
            poll_interval
        };

        let (current, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                source,
                interval,
                handle: Handle::current(),
                polling: AtomicBool::new(false),
                current,
                events,
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    pub fn state(&self) -> PollState {
        if self.inner.polling.load(Ordering::Acquire) {
            PollState::Polling
        } else {
            PollState::Idle
        }
    }

    /// Latest successfully built snapshot
    pub fn current(&self) -> Option<SharedSnapshot> {
        self.inner.current.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.inner.events.subscribe()
    }

    pub fn trigger(&self, source: TriggerSource) -> TriggerOutcome {
        if self
            .inner
            .polling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("{:?} trigger coalesced into running poll", source);
            return TriggerOutcome::Coalesced;
        }

        log::trace!("Poll started by {:?}", source);
        let inner = Arc::clone(&self.inner);
        self.inner.handle.spawn(inner.run_poll(source));
        TriggerOutcome::Started
    }

    /// Trigger a poll (or join the running one) and wait for its result
    pub async fn refresh(&self) -> Result<SharedSnapshot> {
        let mut events = self.subscribe();
        self.trigger(TriggerSource::Demand);

        loop {
            match events.recv().await {
                Ok(PollEvent::Updated(snapshot)) => return Ok(snapshot),
                Ok(PollEvent::Failed(message)) => return Err(anyhow!(message)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!("Refresh waiter skipped {} event(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(anyhow!("scheduler event channel closed"));
                }
            }
        }
    }

    /// Start the interval timer. The first tick fires immediately.
    pub fn start(&self) -> TimerHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let scheduler = self.clone();
        let period = self.inner.interval;

        let task = self.inner.handle.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        scheduler.trigger(TriggerSource::Timer);
                    }
                    _ = &mut stop_rx => break,
                }
            }
            log::debug!("Poll timer stopped");
        });

        log::info!("Polling every {:?}", period);
        TimerHandle {
            stop: Some(stop_tx),
            _task: task,
        }
    }
}

impl Inner {
    async fn run_poll(self: Arc<Self>, trigger: TriggerSource) {
        let source = Arc::clone(&self.source);
        let result = tokio::task::spawn_blocking(move || source.build()).await;

        let event = match result {
            Ok(Ok(snapshot)) => {
                let snapshot = Arc::new(snapshot);
                self.current.send_replace(Some(Arc::clone(&snapshot)));
                PollEvent::Updated(snapshot)
            }
            Ok(Err(e)) => {
                log::warn!("Poll ({:?}) failed: {}", trigger, e);
                PollEvent::Failed(e.to_string())
            }
            Err(e) => {
                log::error!("Snapshot build aborted: {}", e);
                PollEvent::Failed(format!("snapshot build aborted: {}", e))
            }
        };

        self.polling.store(false, Ordering::Release);
        // No receivers is not an error
        let _ = self.events.send(event);
    }
}

impl RepollRequester for PollingScheduler {
    fn request_repoll(&self, delay: Duration) {
        log::debug!("Re-poll requested in {:?}", delay);
        let scheduler = self.clone();
        self.inner.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.trigger(TriggerSource::Repoll);
        });
    }
}

/// Keeps the poll timer alive. Dropping it stops the timer as well.
pub struct TimerHandle {
    stop: Option<oneshot::Sender<()>>,
    _task: JoinHandle<()>,
}

impl TimerHandle {
    /// Stop ticking. A build that is already running still completes.
    pub fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AcquisitionError, EnumerationError};
    use crate::port::Snapshot;
    use crate::testing::record;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::{sleep, timeout};

    #[derive(Default)]
    struct CountingSource {
        builds: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
        delay: Duration,
        fail_on: Option<usize>,
        panic_on: Option<usize>,
    }

    impl CountingSource {
        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }

        fn builds(&self) -> usize {
            self.builds.load(Ordering::SeqCst)
        }
    }

    impl SnapshotSource for CountingSource {
        fn build(&self) -> Result<Snapshot, AcquisitionError> {
            let n = self.builds.fetch_add(1, Ordering::SeqCst) + 1;
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.panic_on == Some(n) {
                panic!("build {} blew up", n);
            }
            if self.fail_on == Some(n) {
                return Err(EnumerationError::Unavailable("table vanished".into()).into());
            }
            Ok(Snapshot::new(
                n as u64,
                vec![record(n as u32, "svc", "127.0.0.1:8080", None)],
            ))
        }
    }

    fn scheduler(source: &Arc<CountingSource>) -> PollingScheduler {
        PollingScheduler::new(source.clone(), DEFAULT_POLL_INTERVAL)
    }

    async fn next_event(events: &mut broadcast::Receiver<PollEvent>) -> PollEvent {
        timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_refresh_publishes_snapshot() {
        let source = Arc::new(CountingSource::default());
        let scheduler = scheduler(&source);
        assert!(scheduler.current().is_none());

        let snapshot = scheduler.refresh().await.unwrap();
        assert_eq!(snapshot.generation, 1);
        assert_eq!(scheduler.current().unwrap().generation, 1);
        assert_eq!(scheduler.state(), PollState::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_triggers_during_poll_are_coalesced() {
        let source = Arc::new(CountingSource::slow(Duration::from_millis(200)));
        let scheduler = scheduler(&source);
        let mut events = scheduler.subscribe();

        assert_eq!(
            scheduler.trigger(TriggerSource::Demand),
            TriggerOutcome::Started
        );
        assert_eq!(scheduler.state(), PollState::Polling);
        assert_eq!(
            scheduler.trigger(TriggerSource::Timer),
            TriggerOutcome::Coalesced
        );
        assert_eq!(
            scheduler.trigger(TriggerSource::Repoll),
            TriggerOutcome::Coalesced
        );

        assert!(matches!(next_event(&mut events).await, PollEvent::Updated(_)));
        assert_eq!(source.builds(), 1);
        assert_eq!(source.max_active.load(Ordering::SeqCst), 1);

        assert_eq!(scheduler.state(), PollState::Idle);
        assert_eq!(
            scheduler.trigger(TriggerSource::Demand),
            TriggerOutcome::Started
        );
        next_event(&mut events).await;
        assert_eq!(source.builds(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_refreshes_never_overlap() {
        let source = Arc::new(CountingSource::slow(Duration::from_millis(20)));
        let scheduler = scheduler(&source);

        let mut waiters = Vec::new();
        for _ in 0..8 {
            let scheduler = scheduler.clone();
            waiters.push(tokio::spawn(async move { scheduler.refresh().await }));
        }
        for waiter in waiters {
            assert!(waiter.await.unwrap().is_ok());
        }

        assert_eq!(source.max_active.load(Ordering::SeqCst), 1);
        assert!(source.builds() <= 8);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_snapshot() {
        let source = Arc::new(CountingSource {
            fail_on: Some(2),
            ..Default::default()
        });
        let scheduler = scheduler(&source);

        scheduler.refresh().await.unwrap();
        let err = scheduler.refresh().await.unwrap_err();
        assert!(err.to_string().contains("table vanished"));

        assert_eq!(scheduler.current().unwrap().generation, 1);
        assert_eq!(scheduler.state(), PollState::Idle);

        // Next cycle recovers
        assert_eq!(scheduler.refresh().await.unwrap().generation, 3);
    }

    #[tokio::test]
    async fn test_panicking_build_reports_failure() {
        let source = Arc::new(CountingSource {
            panic_on: Some(1),
            ..Default::default()
        });
        let scheduler = scheduler(&source);

        assert!(scheduler.refresh().await.is_err());
        assert_eq!(scheduler.state(), PollState::Idle);
        assert!(scheduler.current().is_none());
        assert!(scheduler.refresh().await.is_ok());
    }

    #[tokio::test]
    async fn test_repoll_is_deferred() {
        let source = Arc::new(CountingSource::default());
        let scheduler = scheduler(&source);
        let mut events = scheduler.subscribe();

        scheduler.request_repoll(Duration::from_millis(150));
        sleep(Duration::from_millis(30)).await;
        assert_eq!(source.builds(), 0);

        assert!(matches!(next_event(&mut events).await, PollEvent::Updated(_)));
        assert_eq!(source.builds(), 1);
    }

    #[tokio::test]
    async fn test_timer_fires_immediately() {
        let source = Arc::new(CountingSource::default());
        let scheduler = PollingScheduler::new(source.clone(), Duration::from_secs(60));
        let mut events = scheduler.subscribe();

        let timer = scheduler.start();
        assert!(matches!(next_event(&mut events).await, PollEvent::Updated(_)));
        assert_eq!(source.builds(), 1);
        timer.stop();
    }

    #[tokio::test]
    async fn test_stopped_timer_stops_polling() {
        let source = Arc::new(CountingSource::default());
        let scheduler = PollingScheduler::new(source.clone(), Duration::from_millis(30));

        let timer = scheduler.start();
        sleep(Duration::from_millis(100)).await;
        timer.stop();

        sleep(Duration::from_millis(40)).await;
        let after_stop = source.builds();
        assert!(after_stop >= 1);

        sleep(Duration::from_millis(150)).await;
        assert_eq!(source.builds(), after_stop);
    }

    #[tokio::test]
    async fn test_short_interval_is_clamped() {
        let source = Arc::new(CountingSource::default());
        let scheduler = PollingScheduler::new(source, Duration::ZERO);
        assert_eq!(scheduler.interval(), MIN_POLL_INTERVAL);
    }
}
