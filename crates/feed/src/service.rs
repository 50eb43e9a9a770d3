//! Consumer-facing API: feed reads, nearby correlation, location details,
//! risk badges and viewport focus handling.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use common::config::{AppConfig, NearbyConfig, ViewportConfig};
use common::{Clock, Coordinate, Error, FeedKind, FeedSource, Geocoder, Result, SeismicEvent};
use geo::{
    classify_event, location_details, nearby_events, nearest_locality, LocationDetails,
    NearbyEvent, NearbyQuery, RiskLevel, ViewportCommand, ViewportController, ViewportState,
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::client::{EventCache, FeedClient};
use crate::scheduler::{PollEvent, PollingScheduler};

/// A feed's events as handed to views.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSnapshot {
    pub kind: FeedKind,
    pub events: Vec<SeismicEvent>,
    pub fetched_at: Option<DateTime<Utc>>,
    /// True when the latest refresh failed and these are older events.
    pub stale: bool,
}

/// Per-call overrides for a nearby search. Unset fields use the
/// configured defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NearbyOptions {
    pub radius_km: Option<f64>,
    pub max_age_days: Option<i64>,
    pub max_results: Option<usize>,
}

#[derive(Debug)]
pub struct SeismicService {
    scheduler: PollingScheduler,
    viewport: Mutex<ViewportController>,
    nearby_defaults: NearbyConfig,
    geocoder: Option<Arc<dyn Geocoder>>,
    clock: Arc<dyn Clock>,
}

impl SeismicService {
    pub fn new(
        scheduler: PollingScheduler,
        viewport: ViewportConfig,
        nearby_defaults: NearbyConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            scheduler,
            viewport: Mutex::new(ViewportController::new(viewport, clock.clone())),
            nearby_defaults,
            geocoder: None,
            clock,
        }
    }

    /// Enable `describe_location`.
    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    /// Wire one shared cache, a client per feed kind and the scheduler.
    pub fn from_config(
        config: &AppConfig,
        primary: Arc<dyn FeedSource>,
        secondary: Option<Arc<dyn FeedSource>>,
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Arc::new(EventCache::new(store, clock.clone(), config.cache.ttl_ms));
        let timeout = Duration::from_secs(config.timing.source_timeout_secs);
        let clients = FeedKind::ALL
            .iter()
            .map(|&kind| {
                FeedClient::new(
                    kind,
                    primary.clone(),
                    secondary.clone(),
                    cache.clone(),
                    config.cache.ttl_ms,
                    timeout,
                )
            })
            .collect();

        Self::new(
            PollingScheduler::new(clients),
            config.viewport.clone(),
            config.nearby.clone(),
            clock,
        )
    }

    pub fn scheduler(&self) -> &PollingScheduler {
        &self.scheduler
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.scheduler.subscribe()
    }

    /// Events for `kind`, fetched only if the cache is not fresh.
    ///
    /// If that fetch fails but an older snapshot exists, the older snapshot
    /// is returned marked `stale`. Fails only when there is nothing cached.
    pub async fn get_events(&self, kind: FeedKind) -> Result<FeedSnapshot> {
        match self.scheduler.request(kind, false).await {
            Ok(events) => Ok(FeedSnapshot {
                kind,
                events,
                fetched_at: self.last_fetched_at(kind).await,
                stale: false,
            }),
            Err(e) => {
                let cached = match self.scheduler.client(kind) {
                    Some(client) => client.cached().await,
                    None => None,
                };
                match cached {
                    Some(entry) => {
                        warn!("{} feed refresh failed, serving cached events: {}", kind, e);
                        Ok(FeedSnapshot {
                            kind,
                            events: entry.payload,
                            fetched_at: Utc.timestamp_millis_opt(entry.fetched_at_ms).single(),
                            stale: true,
                        })
                    }
                    None => Err(e),
                }
            }
        }
    }

    /// Force a refresh of `kind`. Joins a fetch already in flight.
    pub async fn refresh(&self, kind: FeedKind) -> Result<Vec<SeismicEvent>> {
        self.scheduler.request(kind, true).await
    }

    pub async fn last_fetched_at(&self, kind: FeedKind) -> Option<DateTime<Utc>> {
        match self.scheduler.client(kind) {
            Some(client) => client.last_fetched_at().await,
            None => None,
        }
    }

    /// Historical events near `origin`, drawn from the recent feed.
    pub async fn nearby(&self, origin: Coordinate, opts: NearbyOptions) -> Result<Vec<NearbyEvent>> {
        let snapshot = self.get_events(FeedKind::Recent).await?;
        let mut query = NearbyQuery::from_config(origin, &self.nearby_defaults);
        if let Some(radius) = opts.radius_km {
            query.radius_km = radius;
        }
        if let Some(days) = opts.max_age_days {
            query.max_age_days = days;
        }
        if let Some(n) = opts.max_results {
            query.max_results = n;
        }

        let matches = nearby_events(&query, &snapshot.events, self.clock.now());
        debug!(
            "Nearby {}: {} of {} events within {} km",
            origin,
            matches.len(),
            snapshot.events.len(),
            query.radius_km
        );
        Ok(matches)
    }

    /// Province, nearest locality and area description for `point`.
    ///
    /// Failing to locate the nearest locality only drops the distance; a
    /// failed reverse lookup is returned as the error.
    pub async fn describe_location(&self, point: Coordinate) -> Result<LocationDetails> {
        if !point.is_valid() {
            return Err(Error::Validation(format!("{point} is not a valid coordinate")));
        }
        let geocoder = self
            .geocoder
            .as_ref()
            .ok_or_else(|| Error::Config("no geocoder configured".into()))?;

        let place = geocoder.reverse(point).await?;
        let city_at = match place.address.as_ref().and_then(nearest_locality) {
            Some(name) => match geocoder.locate(name).await {
                Ok(found) => found,
                Err(e) => {
                    warn!("{}: could not locate {}: {}", geocoder.name(), name, e);
                    None
                }
            },
            None => None,
        };
        Ok(location_details(point, &place, city_at))
    }

    pub fn classify(&self, event: &SeismicEvent) -> RiskLevel {
        classify_event(event)
    }

    // ── Viewport ──────────────────────────────────────────────────────

    fn viewport(&self) -> MutexGuard<'_, ViewportController> {
        self.viewport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn viewport_state(&self) -> ViewportState {
        self.viewport().state().clone()
    }

    pub fn focus(&self, point: Coordinate) -> Option<ViewportCommand> {
        self.viewport().select_point(point)
    }

    pub fn clear_focus(&self) -> Option<ViewportCommand> {
        self.viewport().clear_focus()
    }

    pub fn resize(&self, width_px: u32, height_px: u32) -> Option<ViewportCommand> {
        self.viewport().on_resize(width_px, height_px)
    }

    pub fn user_moved(&self, center: Coordinate, zoom: f64) {
        self.viewport().on_user_move(center, zoom)
    }
}
