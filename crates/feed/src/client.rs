//! Fetch one feed with cache check and primary -> secondary fallback.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use common::{Error, FeedKind, FeedSource, Result, SeismicEvent};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CachePayload, DataCache};

pub type EventCache = DataCache<Vec<SeismicEvent>>;

impl CachePayload for Vec<SeismicEvent> {
    /// Persisted records get the same validation as fetched ones.
    fn sanitize(mut self, key: &str) -> Result<Self> {
        let before = self.len();
        self.retain(|e| e.validate().is_ok());
        if self.len() < before {
            warn!("{}: dropped {} invalid persisted events", key, before - self.len());
        }
        Ok(self)
    }
}

/// Fetcher for a single feed kind.
///
/// Not safe against duplicate concurrent fetches on its own; the polling
/// scheduler is the only caller that should invoke `fetch`. The network
/// phase runs under `network_gate`, which the scheduler shares between all
/// of its clients.
#[derive(Debug, Clone)]
pub struct FeedClient {
    kind: FeedKind,
    primary: Arc<dyn FeedSource>,
    secondary: Option<Arc<dyn FeedSource>>,
    cache: Arc<EventCache>,
    ttl_ms: u64,
    source_timeout: Duration,
    network_gate: Arc<Semaphore>,
}

impl FeedClient {
    pub fn new(
        kind: FeedKind,
        primary: Arc<dyn FeedSource>,
        secondary: Option<Arc<dyn FeedSource>>,
        cache: Arc<EventCache>,
        ttl_ms: u64,
        source_timeout: Duration,
    ) -> Self {
        Self {
            kind,
            primary,
            secondary,
            cache,
            ttl_ms,
            source_timeout,
            network_gate: Arc::new(Semaphore::new(1)),
        }
    }

    /// Share a network permit with other clients.
    pub fn with_network_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.network_gate = gate;
        self
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    pub fn cache(&self) -> &Arc<EventCache> {
        &self.cache
    }

    /// Current cache entry, fresh or stale.
    pub async fn cached(&self) -> Option<CacheEntry<Vec<SeismicEvent>>> {
        self.cache.get(self.kind.cache_key()).await
    }

    /// When the cached snapshot was fetched, even if later refreshes failed.
    pub async fn last_fetched_at(&self) -> Option<DateTime<Utc>> {
        self.cached()
            .await
            .and_then(|e| Utc.timestamp_millis_opt(e.fetched_at_ms).single())
    }

    /// Return the feed's events.
    ///
    /// A fresh cache entry is returned without touching the network unless
    /// `force_refresh` is set. Otherwise the primary source is tried, then
    /// the secondary. If both fail the cache is left as it was and the
    /// error is returned.
    pub async fn fetch(&self, force_refresh: bool) -> Result<Vec<SeismicEvent>> {
        let key = self.kind.cache_key();

        if !force_refresh {
            if let Some(entry) = self.cache.get(key).await {
                if self.cache.is_fresh(&entry) {
                    debug!("{} feed served from cache ({} events)", self.kind, entry.payload.len());
                    return Ok(entry.payload);
                }
            }
        }

        let permit = self
            .network_gate
            .acquire()
            .await
            .map_err(|_| Error::Other("network gate closed".into()))?;

        let mut events = match self.call(self.primary.as_ref()).await {
            Ok(events) => events,
            Err(primary_err) => {
                warn!(
                    "{} feed: primary source {} failed: {}",
                    self.kind,
                    self.primary.name(),
                    primary_err
                );
                let Some(secondary) = self.secondary.as_deref() else {
                    return Err(primary_err);
                };
                match self.call(secondary).await {
                    Ok(events) => {
                        info!("{} feed: served by fallback source {}", self.kind, secondary.name());
                        events
                    }
                    Err(secondary_err) => {
                        warn!(
                            "{} feed: fallback source {} failed: {}",
                            self.kind,
                            secondary.name(),
                            secondary_err
                        );
                        return Err(combine_errors(primary_err, secondary_err));
                    }
                }
            }
        };

        drop(permit);

        events.retain(|e| match e.validate() {
            Ok(()) => true,
            Err(err) => {
                debug!("{} feed: dropping record: {}", self.kind, err);
                false
            }
        });

        self.cache.set(key, events.clone(), self.ttl_ms).await;
        debug!("{} feed cached {} events", self.kind, events.len());
        Ok(events)
    }

    async fn call(&self, source: &dyn FeedSource) -> Result<Vec<SeismicEvent>> {
        match tokio::time::timeout(self.source_timeout, source.fetch_events(self.kind)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Network(format!(
                "{} timed out after {:?}",
                source.name(),
                self.source_timeout
            ))),
        }
    }
}

/// Parse only when both sources returned something unrecognizable;
/// anything involving transport or timeout is a network failure.
fn combine_errors(primary: Error, secondary: Error) -> Error {
    if primary.is_parse() && secondary.is_parse() {
        Error::Parse(format!("primary: {primary}; secondary: {secondary}"))
    } else {
        Error::Network(format!("all sources failed (primary: {primary}; secondary: {secondary})"))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use common::{Coordinate, EventSource, ManualClock};

    use super::*;
    use crate::cache::{MemoryStore, PersistedRecord};

    /// Source that replays scripted responses and counts calls.
    #[derive(Debug)]
    pub(crate) struct ScriptedSource {
        name: &'static str,
        responses: Mutex<VecDeque<Result<Vec<SeismicEvent>>>>,
        fallback: Result<Vec<SeismicEvent>>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        pub(crate) fn always(name: &'static str, result: Result<Vec<SeismicEvent>>) -> Self {
            Self {
                name,
                responses: Mutex::new(VecDeque::new()),
                fallback: result,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn then(self, result: Result<Vec<SeismicEvent>>) -> Self {
            self.responses.lock().unwrap().push_back(result);
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FeedSource for ScriptedSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch_events(&self, _kind: FeedKind) -> Result<Vec<SeismicEvent>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.responses.lock().unwrap().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }

    pub(crate) fn sample_events(n: usize, source: EventSource) -> Vec<SeismicEvent> {
        (0..n)
            .map(|i| SeismicEvent {
                id: format!("evt-{i}"),
                occurred_at: Utc.timestamp_opt(1_700_000_000 + i as i64 * 60, 0).unwrap(),
                coordinates: Coordinate::new(-2.0 - i as f64 * 0.1, 118.0),
                magnitude: 4.0 + i as f64 * 0.1,
                depth_km: Some(10.0),
                region: format!("region {i}"),
                tsunami_potential: false,
                source,
                felt_report: None,
            })
            .collect()
    }

    pub(crate) fn feed_client(
        primary: Arc<ScriptedSource>,
        secondary: Option<Arc<ScriptedSource>>,
        clock: &ManualClock,
    ) -> FeedClient {
        let cache = Arc::new(EventCache::new(
            Arc::new(MemoryStore::new()),
            Arc::new(clock.clone()),
            300_000,
        ));
        FeedClient::new(
            FeedKind::Felt,
            primary,
            secondary.map(|s| s as Arc<dyn FeedSource>),
            cache,
            300_000,
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn test_fresh_cache_makes_no_network_calls() {
        let clock = ManualClock::new(1_000_000);
        let primary = Arc::new(ScriptedSource::always(
            "primary",
            Ok(sample_events(3, EventSource::Primary)),
        ));
        let secondary = Arc::new(ScriptedSource::always("secondary", Ok(vec![])));
        let client = feed_client(primary.clone(), Some(secondary.clone()), &clock);

        assert_eq!(client.fetch(false).await.expect("first fetch").len(), 3);
        assert_eq!(primary.calls(), 1);

        clock.advance_ms(1_000);
        assert_eq!(client.fetch(false).await.expect("cached fetch").len(), 3);
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 0);

        client.fetch(true).await.expect("forced fetch");
        assert_eq!(primary.calls(), 2);
    }

    #[tokio::test]
    async fn test_stale_cache_refetches() {
        let clock = ManualClock::new(0);
        let primary = Arc::new(ScriptedSource::always(
            "primary",
            Ok(sample_events(2, EventSource::Primary)),
        ));
        let client = feed_client(primary.clone(), None, &clock);

        client.fetch(false).await.expect("first fetch");
        clock.advance_ms(300_001);
        client.fetch(false).await.expect("second fetch");
        assert_eq!(primary.calls(), 2);
    }

    #[tokio::test]
    async fn test_primary_failure_falls_back_to_secondary() {
        let clock = ManualClock::new(0);
        let primary = Arc::new(ScriptedSource::always(
            "primary",
            Err(Error::Network("connection refused".into())),
        ));
        let secondary = Arc::new(ScriptedSource::always(
            "secondary",
            Ok(sample_events(4, EventSource::Secondary)),
        ));
        let client = feed_client(primary.clone(), Some(secondary.clone()), &clock);

        let events = client.fetch(false).await.expect("fallback succeeds");
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|e| e.source == EventSource::Secondary));
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);

        let cached = client.cached().await.expect("cache updated");
        assert_eq!(cached.payload, events);
    }

    #[tokio::test]
    async fn test_both_failing_leaves_cache_untouched() {
        let clock = ManualClock::new(0);
        let primary = Arc::new(
            ScriptedSource::always("primary", Err(Error::Network("down".into())))
                .then(Ok(sample_events(2, EventSource::Primary))),
        );
        let secondary = Arc::new(ScriptedSource::always(
            "secondary",
            Err(Error::Network("also down".into())),
        ));
        let client = feed_client(primary.clone(), Some(secondary.clone()), &clock);

        let original = client.fetch(false).await.expect("seed cache");
        let fetched_at = client.last_fetched_at().await;

        clock.advance_ms(400_000);
        let err = client.fetch(false).await.unwrap_err();
        assert!(err.is_network());

        let cached = client.cached().await.expect("entry survives");
        assert_eq!(cached.payload, original);
        assert_eq!(client.last_fetched_at().await, fetched_at);
        assert_eq!(cached.fetched_at_ms, 0);
    }

    #[tokio::test]
    async fn test_error_choice_when_both_fail() {
        let clock = ManualClock::new(0);

        let both_parse = feed_client(
            Arc::new(ScriptedSource::always("p", Err(Error::Parse("html".into())))),
            Some(Arc::new(ScriptedSource::always("s", Err(Error::Parse("html".into()))))),
            &clock,
        );
        assert!(both_parse.fetch(false).await.unwrap_err().is_parse());

        let mixed = feed_client(
            Arc::new(ScriptedSource::always("p", Err(Error::Parse("html".into())))),
            Some(Arc::new(ScriptedSource::always("s", Err(Error::Network("503".into()))))),
            &clock,
        );
        assert!(mixed.fetch(false).await.unwrap_err().is_network());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_primary_times_out_to_secondary() {
        let clock = ManualClock::new(0);
        let primary = Arc::new(
            ScriptedSource::always("slow", Ok(sample_events(1, EventSource::Primary)))
                .with_delay(Duration::from_secs(60)),
        );
        let secondary = Arc::new(ScriptedSource::always(
            "secondary",
            Ok(sample_events(2, EventSource::Secondary)),
        ));
        let client = feed_client(primary.clone(), Some(secondary.clone()), &clock);

        let events = client.fetch(false).await.expect("secondary answers");
        assert_eq!(events.len(), 2);
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_records_never_reach_cache() {
        let clock = ManualClock::new(0);
        let mut events = sample_events(3, EventSource::Primary);
        events[1].coordinates = Coordinate::new(f64::NAN, 118.0);
        let client = feed_client(
            Arc::new(ScriptedSource::always("primary", Ok(events))),
            None,
            &clock,
        );

        let fetched = client.fetch(false).await.expect("fetch");
        assert_eq!(fetched.len(), 2);
        assert_eq!(client.cached().await.map(|e| e.payload.len()), Some(2));
    }

    #[tokio::test]
    async fn test_empty_snapshot_replaces_previous() {
        let clock = ManualClock::new(0);
        let primary = Arc::new(
            ScriptedSource::always("primary", Ok(vec![]))
                .then(Ok(sample_events(3, EventSource::Primary))),
        );
        let client = feed_client(primary, None, &clock);

        assert_eq!(client.fetch(false).await.expect("first").len(), 3);
        assert!(client.fetch(true).await.expect("second").is_empty());
        assert_eq!(client.cached().await.map(|e| e.payload.len()), Some(0));
    }

    #[tokio::test]
    async fn test_invalid_persisted_events_never_served() {
        let clock = ManualClock::new(1_000);
        let mut events = sample_events(3, EventSource::Primary);
        events[1].coordinates = Coordinate::new(500.0, 118.0);
        events[1].magnitude = -3.0;
        let record = PersistedRecord {
            data: &events,
            timestamp: 0,
        };
        let store = MemoryStore::new();
        store.put_raw(
            FeedKind::Felt.cache_key(),
            &serde_json::to_string(&record).expect("serialize"),
        );

        let primary = Arc::new(ScriptedSource::always("primary", Ok(vec![])));
        let cache = Arc::new(EventCache::new(
            Arc::new(store),
            Arc::new(clock.clone()),
            300_000,
        ));
        let client = FeedClient::new(
            FeedKind::Felt,
            primary.clone(),
            None,
            cache,
            300_000,
            Duration::from_secs(10),
        );

        let served = client.fetch(false).await.expect("served from disk");
        assert_eq!(primary.calls(), 0);
        let ids: Vec<&str> = served.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["evt-0", "evt-2"]);
        assert!(served.iter().all(|e| e.validate().is_ok()));
    }
}
