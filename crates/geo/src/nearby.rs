//! Ranking of historical events around a selected point.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use common::config::NearbyConfig;
use common::{Coordinate, SeismicEvent};
use serde::Serialize;
use tracing::debug;

use crate::distance::distance_km;

/// Parameters of a nearby search. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearbyQuery {
    pub origin: Coordinate,
    pub radius_km: f64,
    pub max_age_days: i64,
    pub max_results: usize,
}

impl NearbyQuery {
    /// Query around `origin` with the configured radius, age and limit.
    pub fn from_config(origin: Coordinate, cfg: &NearbyConfig) -> Self {
        Self {
            origin,
            radius_km: cfg.radius_km,
            max_age_days: cfg.max_age_days,
            max_results: cfg.max_results,
        }
    }
}

/// An event that matched a query, with its distance from the origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyEvent {
    pub event: SeismicEvent,
    pub distance_km: f64,
}

/// Events within `radius_km` of the origin and no older than
/// `max_age_days`, newest first (ties: larger magnitude first), at most
/// `max_results` long.
///
/// Events with invalid coordinates or magnitudes are skipped. An invalid
/// origin or a negative radius yields an empty result. An age limit too
/// large to represent as a duration does not filter anything.
pub fn nearby_events(
    query: &NearbyQuery,
    events: &[SeismicEvent],
    now: DateTime<Utc>,
) -> Vec<NearbyEvent> {
    if !query.origin.is_valid() || !query.radius_km.is_finite() || query.radius_km < 0.0 {
        debug!("Nearby query rejected: origin={} radius={}", query.origin, query.radius_km);
        return Vec::new();
    }
    if query.max_results == 0 || query.max_age_days < 0 {
        return Vec::new();
    }

    let max_age = Duration::try_days(query.max_age_days);

    let mut matches: Vec<NearbyEvent> = events
        .iter()
        .filter(|e| e.coordinates.is_valid() && e.magnitude.is_finite())
        .filter(|e| {
            max_age.map_or(true, |max| now.signed_duration_since(e.occurred_at) <= max)
        })
        .filter_map(|e| {
            let d = distance_km(query.origin, e.coordinates);
            (d.is_finite() && d <= query.radius_km).then(|| NearbyEvent {
                event: e.clone(),
                distance_km: d,
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.event
            .occurred_at
            .cmp(&a.event.occurred_at)
            .then_with(|| {
                b.event
                    .magnitude
                    .partial_cmp(&a.event.magnitude)
                    .unwrap_or(Ordering::Equal)
            })
    });
    matches.truncate(query.max_results);
    matches
}
