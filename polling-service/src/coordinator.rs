use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use usage_client::{month_period_key, FetchError, UsageFetcher, UsageSnapshot};

/// Receives the shared snapshot synchronously after each successful refresh.
///
/// Listeners are invoked in no guaranteed order and must not block; heavy
/// work belongs on the listener's own tasks.
pub trait SnapshotListener: Send + Sync {
    fn on_refreshed(&self, snapshot: &Arc<UsageSnapshot>);
}

/// Observable slice of the coordinator's state, for status endpoints and
/// diagnostics. The snapshot itself is read via [`PollingCoordinator::get_latest`].
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CoordinatorStatus {
    #[serde(with = "time::serde::iso8601::option")]
    pub last_refresh: Option<OffsetDateTime>,
    pub last_error: Option<String>,
    pub in_flight: bool,
}

type FetchOutcome = Result<Arc<UsageSnapshot>, FetchError>;

#[derive(Default)]
struct StatusInner {
    last_refresh: Option<OffsetDateTime>,
    last_error: Option<String>,
}

struct Shared {
    name: String,
    fetcher: Arc<dyn UsageFetcher>,
    fetch_timeout: Duration,
    latest: RwLock<Option<Arc<UsageSnapshot>>>,
    status: RwLock<StatusInner>,
    // In-flight guard: `Some` holds the receiver every overlapping caller
    // joins, so at most one fetch runs per coordinator at any time.
    in_flight: AsyncMutex<Option<watch::Receiver<Option<FetchOutcome>>>>,
    in_flight_flag: AtomicBool,
    listeners: Mutex<Vec<(u64, Arc<dyn SnapshotListener>)>>,
    next_listener_id: AtomicU64,
    closed: AtomicBool,
}

impl Shared {
    fn listener_count(&self) -> usize {
        self.listeners.lock().expect("listeners lock poisoned").len()
    }

    fn notify_listeners(&self, snapshot: &Arc<UsageSnapshot>) {
        let listeners: Vec<Arc<dyn SnapshotListener>> = self
            .listeners
            .lock()
            .expect("listeners lock poisoned")
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener.on_refreshed(snapshot);
        }
    }
}

/// Owns the latest usage snapshot for one account and keeps it fresh.
///
/// All consumers share the snapshot this coordinator fetches; none of them
/// talk to the provider directly. Overlapping refresh requests coalesce onto
/// a single underlying fetch, and the scheduled tick only fetches while at
/// least one subscriber is attached, so an idle process stops hitting the
/// metered provider API.
pub struct PollingCoordinator {
    shared: Arc<Shared>,
    refresh_interval: Duration,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

/// Registration handle returned by [`PollingCoordinator::subscribe`].
/// Dropping it detaches the listener.
pub struct Subscription {
    shared: Arc<Shared>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shared
            .listeners
            .lock()
            .expect("listeners lock poisoned")
            .retain(|(id, _)| *id != self.id);
    }
}

impl PollingCoordinator {
    pub fn new(
        name: impl Into<String>,
        fetcher: Arc<dyn UsageFetcher>,
        refresh_interval: Duration,
        fetch_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            shared: Arc::new(Shared {
                name: name.into(),
                fetcher,
                fetch_timeout,
                latest: RwLock::new(None),
                status: RwLock::new(StatusInner::default()),
                in_flight: AsyncMutex::new(None),
                in_flight_flag: AtomicBool::new(false),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
            refresh_interval,
            poll_task: Mutex::new(None),
        })
    }

    /// Most recently stored successful snapshot, `None` before the first
    /// successful fetch. Non-blocking; the returned `Arc` is never mutated
    /// by later refreshes.
    pub fn get_latest(&self) -> Option<Arc<UsageSnapshot>> {
        self.shared
            .latest
            .read()
            .expect("latest lock poisoned")
            .clone()
    }

    pub fn status(&self) -> CoordinatorStatus {
        let status = self.shared.status.read().expect("status lock poisoned");
        CoordinatorStatus {
            last_refresh: status.last_refresh,
            last_error: status.last_error.clone(),
            in_flight: self.shared.in_flight_flag.load(Ordering::SeqCst),
        }
    }

    pub fn subscribe(&self, listener: Arc<dyn SnapshotListener>) -> Subscription {
        let id = self.shared.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.shared
            .listeners
            .lock()
            .expect("listeners lock poisoned")
            .push((id, listener));
        Subscription {
            shared: Arc::clone(&self.shared),
            id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.listener_count()
    }

    /// Fetch now, or join the fetch already in flight, and wait for its
    /// outcome. On success the shared snapshot has already been replaced and
    /// listeners notified by the time this returns.
    pub async fn request_refresh(&self) -> FetchOutcome {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(FetchError::Transport(
                "refresh abandoned: coordinator shut down".to_string(),
            ));
        }
        let mut rx = self.join_or_begin_fetch().await;
        loop {
            if let Some(outcome) = rx.borrow_and_update().as_ref() {
                return outcome.clone();
            }
            if rx.changed().await.is_err() {
                return Err(FetchError::Transport(
                    "refresh abandoned: coordinator shut down".to_string(),
                ));
            }
        }
    }

    async fn join_or_begin_fetch(&self) -> watch::Receiver<Option<FetchOutcome>> {
        let mut guard = self.shared.in_flight.lock().await;
        if let Some(rx) = guard.as_ref() {
            metrics::counter!("refresh_coalesced_total").increment(1);
            return rx.clone();
        }

        let (tx, rx) = watch::channel(None);
        *guard = Some(rx.clone());
        self.shared.in_flight_flag.store(true, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let outcome = fetch_once(&shared).await;
            // Clear the guard before publishing the outcome so a caller woken
            // by it can immediately start a fresh fetch.
            *shared.in_flight.lock().await = None;
            shared.in_flight_flag.store(false, Ordering::SeqCst);
            let _ = tx.send(Some(outcome));
        });

        rx
    }

    /// Spawns the scheduled refresh task. A tick with zero subscribers skips
    /// the fetch entirely; a failed tick logs and waits for the next one.
    pub fn start(self: &Arc<Self>) {
        if self.shared.closed.load(Ordering::SeqCst) {
            return;
        }
        let mut task = self.poll_task.lock().expect("poll task lock poisoned");
        if task.is_some() {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = self.refresh_interval;
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the initial refresh is the
            // owner's call to make, not the timer's.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                if coordinator.subscriber_count() == 0 {
                    tracing::debug!(
                        coordinator = %coordinator.shared.name,
                        "no subscribers attached, skipping scheduled refresh"
                    );
                    continue;
                }
                if let Err(e) = coordinator.request_refresh().await {
                    tracing::warn!(
                        coordinator = %coordinator.shared.name,
                        error = %e,
                        "scheduled usage refresh failed"
                    );
                }
            }
        }));
    }

    /// Stops scheduled polling and marks the coordinator closed. The outcome
    /// of a fetch still in flight is discarded: it is neither stored nor
    /// fanned out, and its waiters get a transport error.
    pub fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        if let Some(task) = self
            .poll_task
            .lock()
            .expect("poll task lock poisoned")
            .take()
        {
            task.abort();
        }
    }
}

impl Drop for PollingCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn fetch_once(shared: &Arc<Shared>) -> FetchOutcome {
    let period_key = month_period_key(OffsetDateTime::now_utc());
    let started = std::time::Instant::now();

    let outcome = match tokio::time::timeout(
        shared.fetch_timeout,
        shared.fetcher.daily_usage(&period_key),
    )
    .await
    {
        Ok(Ok(snapshot)) => Ok(Arc::new(snapshot)),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(FetchError::Transport(format!(
            "usage fetch timed out after {:?}",
            shared.fetch_timeout
        ))),
    };

    metrics::histogram!("usage_fetch_duration_seconds").record(started.elapsed().as_secs_f64());

    if shared.closed.load(Ordering::SeqCst) {
        return Err(FetchError::Transport(
            "refresh abandoned: coordinator shut down".to_string(),
        ));
    }

    match &outcome {
        Ok(snapshot) => {
            *shared.latest.write().expect("latest lock poisoned") = Some(Arc::clone(snapshot));
            {
                let mut status = shared.status.write().expect("status lock poisoned");
                status.last_refresh = Some(OffsetDateTime::now_utc());
                status.last_error = None;
            }
            metrics::counter!("usage_fetch_success_total").increment(1);
            tracing::debug!(coordinator = %shared.name, period = %period_key, "usage snapshot refreshed");
            shared.notify_listeners(snapshot);
        }
        Err(e) => {
            // A failed refresh records the error but keeps the previous
            // snapshot available to readers.
            shared
                .status
                .write()
                .expect("status lock poisoned")
                .last_error = Some(e.to_string());
            metrics::counter!("usage_fetch_failed_total").increment(1);
        }
    }

    outcome
}
