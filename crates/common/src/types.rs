//! Domain types shared across the workspace.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Geography ─────────────────────────────────────────────────────────

/// A point on the globe in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Finite and inside lat ∈ [-90, 90], lon ∈ [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4},{:.4}", self.lat, self.lon)
    }
}

// ── Events ────────────────────────────────────────────────────────────

/// Which upstream produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Primary,
    Secondary,
}

/// Canonical seismic event, produced by a source normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeismicEvent {
    /// Source-derived composite id.
    pub id: String,
    pub occurred_at: DateTime<Utc>,
    pub coordinates: Coordinate,
    /// Always >= 0.
    pub magnitude: f64,
    /// `None` when the source does not report depth.
    pub depth_km: Option<f64>,
    pub region: String,
    pub tsunami_potential: bool,
    pub source: EventSource,
    /// Free-text felt report (intensity and places) when the source has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub felt_report: Option<String>,
}

impl SeismicEvent {
    /// Check the record invariants. Normalizers drop events that fail this.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.coordinates.is_valid() {
            return Err(crate::Error::Validation(format!(
                "{}: coordinates out of range ({}, {})",
                self.id, self.coordinates.lat, self.coordinates.lon
            )));
        }
        if !self.magnitude.is_finite() || self.magnitude < 0.0 {
            return Err(crate::Error::Validation(format!(
                "{}: magnitude {} out of range",
                self.id, self.magnitude
            )));
        }
        if let Some(depth) = self.depth_km {
            if !depth.is_finite() || depth < 0.0 {
                return Err(crate::Error::Validation(format!(
                    "{}: depth {} out of range",
                    self.id, depth
                )));
            }
        }
        Ok(())
    }
}

// ── Feed kinds ────────────────────────────────────────────────────────

/// The well-known feeds. Each gets exactly one cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    /// Recently felt events; what map and table views render.
    Felt,
    /// Recent significant events; the history used for nearby correlation.
    Recent,
}

impl FeedKind {
    pub const ALL: [FeedKind; 2] = [FeedKind::Felt, FeedKind::Recent];

    /// Fixed key of this feed's cache slot.
    pub fn cache_key(&self) -> &'static str {
        match self {
            FeedKind::Felt => "earthquakes_felt",
            FeedKind::Recent => "earthquakes_recent",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedKind::Felt => write!(f, "felt"),
            FeedKind::Recent => write!(f, "recent"),
        }
    }
}

// ── Places ────────────────────────────────────────────────────────────

/// Address parts of a reverse-geocoded point. Field names follow the
/// OpenStreetMap address keys; blank values count as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceAddress {
    pub state: Option<String>,
    pub province: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub town: Option<String>,
    pub village: Option<String>,
    pub hamlet: Option<String>,
    pub county: Option<String>,
    pub district: Option<String>,
    pub island: Option<String>,
    pub sea: Option<String>,
    pub ocean: Option<String>,
    pub mountain: Option<String>,
    pub peak: Option<String>,
    pub volcano: Option<String>,
}

/// What a geocoder knows about a point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Place {
    pub display_name: Option<String>,
    pub address: Option<PlaceAddress>,
}
