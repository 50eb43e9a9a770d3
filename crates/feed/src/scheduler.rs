//! Periodic refresh with per-feed request coalescing.
//!
//! Every fetch, scheduled or manual, goes through `request`. While a fetch
//! for a feed is outstanding, later requests for the same feed await that
//! fetch instead of starting another one. Fetches for different feeds share
//! one network permit, so at most one of them is on the network at a time.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{Error, FeedKind, Result, SeismicEvent};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::client::FeedClient;

type SharedFetch = Shared<BoxFuture<'static, Result<Vec<SeismicEvent>>>>;

/// Outcome of a fetch, broadcast to observers.
#[derive(Debug, Clone)]
pub enum PollEvent {
    Updated {
        kind: FeedKind,
        events: Vec<SeismicEvent>,
        fetched_at: Option<DateTime<Utc>>,
    },
    Failed {
        kind: FeedKind,
        error: Error,
    },
}

impl PollEvent {
    pub fn kind(&self) -> FeedKind {
        match self {
            PollEvent::Updated { kind, .. } | PollEvent::Failed { kind, .. } => *kind,
        }
    }
}

/// Cheap to clone; clones share the timer, in-flight slots and observers.
#[derive(Clone)]
pub struct PollingScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    clients: Vec<Arc<FeedClient>>,
    in_flight: Mutex<HashMap<FeedKind, SharedFetch>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<PollEvent>,
}

impl fmt::Debug for PollingScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingScheduler")
            .field("kinds", &self.kinds())
            .field("running", &self.is_running())
            .finish()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PollingScheduler {
    /// One client per feed kind; later duplicates of a kind are ignored.
    pub fn new(clients: Vec<FeedClient>) -> Self {
        let gate = Arc::new(Semaphore::new(1));
        let mut unique: Vec<Arc<FeedClient>> = Vec::with_capacity(clients.len());
        for client in clients {
            if unique.iter().any(|c| c.kind() == client.kind()) {
                warn!("Duplicate client for {} feed ignored", client.kind());
                continue;
            }
            unique.push(Arc::new(client.with_network_gate(gate.clone())));
        }

        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                clients: unique,
                in_flight: Mutex::new(HashMap::new()),
                timer: Mutex::new(None),
                events,
            }),
        }
    }

    pub fn client(&self, kind: FeedKind) -> Option<&Arc<FeedClient>> {
        self.inner.clients.iter().find(|c| c.kind() == kind)
    }

    pub fn kinds(&self) -> Vec<FeedKind> {
        self.inner.clients.iter().map(|c| c.kind()).collect()
    }

    /// Observers receive every fetch outcome from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.inner.events.subscribe()
    }

    /// Fetch `kind`, joining an outstanding fetch for the same feed if
    /// there is one.
    ///
    /// The fetch runs on its own task, so it completes and updates the
    /// cache even if every caller stops waiting.
    pub async fn request(&self, kind: FeedKind, force_refresh: bool) -> Result<Vec<SeismicEvent>> {
        let fetch = self.join_or_spawn(kind, force_refresh)?;
        fetch.await
    }

    pub fn is_in_flight(&self, kind: FeedKind) -> bool {
        lock(&self.inner.in_flight).contains_key(&kind)
    }

    fn join_or_spawn(&self, kind: FeedKind, force_refresh: bool) -> Result<SharedFetch> {
        let client = self
            .client(kind)
            .cloned()
            .ok_or_else(|| Error::Other(format!("no client registered for {kind} feed")))?;

        let mut slots = lock(&self.inner.in_flight);
        if let Some(outstanding) = slots.get(&kind) {
            debug!("{} fetch already in flight, joining it", kind);
            return Ok(outstanding.clone());
        }

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let result = client.fetch(force_refresh).await;
            lock(&inner.in_flight).remove(&kind);

            let event = match &result {
                Ok(events) => PollEvent::Updated {
                    kind,
                    events: events.clone(),
                    fetched_at: client.last_fetched_at().await,
                },
                Err(error) => PollEvent::Failed {
                    kind,
                    error: error.clone(),
                },
            };
            // No receivers is fine.
            let _ = inner.events.send(event);
            result
        });

        let shared = async move {
            task.await
                .unwrap_or_else(|e| Err(Error::Other(format!("{kind} fetch task failed: {e}"))))
        }
        .boxed()
        .shared();
        slots.insert(kind, shared.clone());
        Ok(shared)
    }

    /// Refresh every registered feed once, in registration order.
    pub async fn tick(&self) {
        for kind in self.kinds() {
            match self.request(kind, false).await {
                Ok(events) => debug!("Tick: {} feed has {} events", kind, events.len()),
                Err(e) => warn!("Tick: {} feed refresh failed: {}", kind, e),
            }
        }
    }

    /// Start the repeating timer. The first tick fires immediately.
    ///
    /// Returns `Ok(false)` if a timer is already running.
    pub fn start(&self, interval: Duration) -> Result<bool> {
        if interval.is_zero() {
            return Err(Error::Config("poll interval must be positive".into()));
        }

        let mut timer = lock(&self.inner.timer);
        if timer.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("Polling already running, start ignored");
            return Ok(false);
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                PollingScheduler { inner }.tick().await;
            }
        });
        *timer = Some(handle);

        info!("Polling started (every {}s)", interval.as_secs_f64());
        Ok(true)
    }

    /// Cancel future ticks. A fetch already in flight still completes and
    /// updates the cache. Returns `false` if nothing was running.
    pub fn stop(&self) -> bool {
        match lock(&self.inner.timer).take() {
            Some(handle) => {
                handle.abort();
                info!("Polling stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.timer)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}
