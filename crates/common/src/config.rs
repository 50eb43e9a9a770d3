//! Application configuration types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Coordinate, FeedKind};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upstream endpoints.
    #[serde(default)]
    pub feeds: FeedsConfig,

    /// Local cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Polling and timeout settings.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Map viewport behaviour.
    #[serde(default)]
    pub viewport: ViewportConfig,

    /// Nearby-event correlation defaults.
    #[serde(default)]
    pub nearby: NearbyConfig,

    /// Reverse geocoding for location details.
    #[serde(default)]
    pub geocoder: GeocoderConfig,
}

/// Upstream feed endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedsConfig {
    /// Primary feed of recently felt events.
    #[serde(default = "default_primary_felt_url")]
    pub primary_felt_url: String,

    /// Primary feed of recent significant events.
    #[serde(default = "default_primary_recent_url")]
    pub primary_recent_url: String,

    /// Secondary GeoJSON event query endpoint.
    #[serde(default = "default_secondary_url")]
    pub secondary_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Secondary query parameters for the felt feed.
    #[serde(default = "default_secondary_felt")]
    pub secondary_felt: SecondaryQueryConfig,

    /// Secondary query parameters for the recent feed.
    #[serde(default = "default_secondary_recent")]
    pub secondary_recent: SecondaryQueryConfig,
}

impl FeedsConfig {
    pub fn primary_url(&self, kind: FeedKind) -> &str {
        match kind {
            FeedKind::Felt => &self.primary_felt_url,
            FeedKind::Recent => &self.primary_recent_url,
        }
    }

    pub fn secondary_query(&self, kind: FeedKind) -> &SecondaryQueryConfig {
        match kind {
            FeedKind::Felt => &self.secondary_felt,
            FeedKind::Recent => &self.secondary_recent,
        }
    }
}

/// Per-feed secondary query parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondaryQueryConfig {
    /// Minimum magnitude requested from the secondary source.
    pub min_magnitude: f64,
    /// How many days back the query reaches.
    pub lookback_days: i64,
    /// Maximum number of features requested.
    pub limit: u32,
}

impl SecondaryQueryConfig {
    /// Start of the query window, or `None` if `lookback_days` does not
    /// fit in a date.
    pub fn lookback_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        chrono::Duration::try_days(self.lookback_days).and_then(|d| now.checked_sub_signed(d))
    }
}

/// Nominatim-compatible geocoding endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    /// Set to false to skip location details entirely.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL; `/reverse` and `/search` are appended.
    #[serde(default = "default_geocoder_url")]
    pub base_url: String,

    /// `accept-language` sent with every request.
    #[serde(default = "default_geocoder_language")]
    pub language: String,

    /// Reverse lookup detail level (10 = city).
    #[serde(default = "default_geocoder_zoom")]
    pub zoom: u8,
}

/// Local cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding one JSON record per feed.
    #[serde(default = "default_cache_dir")]
    pub dir: String,

    /// Freshness window for a fetched snapshot.
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
}

/// Timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Refresh interval of the polling scheduler.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Upper bound for a single source call.
    #[serde(default = "default_source_timeout")]
    pub source_timeout_secs: u64,
}

/// Geographic box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundsConfig {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

/// Map viewport behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewportConfig {
    /// Home position.
    #[serde(default = "default_center")]
    pub default_center: Coordinate,

    #[serde(default = "default_zoom")]
    pub default_zoom: f64,

    #[serde(default = "default_min_zoom")]
    pub min_zoom: f64,

    #[serde(default = "default_max_zoom")]
    pub max_zoom: f64,

    /// Region the viewport may never leave.
    #[serde(default = "default_bounds")]
    pub bounds: BoundsConfig,

    /// Fraction of the viewport extent treated as the edge band (0..0.5).
    #[serde(default = "default_edge_margin")]
    pub edge_margin: f64,

    /// Idle viewports farther than this from home snap back on clear.
    #[serde(default = "default_reset_distance_km")]
    pub reset_distance_km: f64,

    /// Re-center animation length.
    #[serde(default = "default_animation_ms")]
    pub animation_ms: u64,

    /// Initial container size in pixels.
    #[serde(default = "default_container_width")]
    pub container_width_px: u32,

    #[serde(default = "default_container_height")]
    pub container_height_px: u32,
}

/// Nearby-event correlation defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearbyConfig {
    #[serde(default = "default_radius_km")]
    pub radius_km: f64,

    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,

    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_primary_felt_url() -> String {
    "https://data.bmkg.go.id/DataMKG/TEWS/gempadirasakan.json".into()
}
fn default_primary_recent_url() -> String {
    "https://data.bmkg.go.id/DataMKG/TEWS/gempaterkini.json".into()
}
fn default_secondary_url() -> String {
    "https://earthquake.usgs.gov/fdsnws/event/1/query".into()
}
fn default_user_agent() -> String {
    "quake-watch/0.1 (seismic feed monitor)".into()
}
fn default_secondary_felt() -> SecondaryQueryConfig {
    SecondaryQueryConfig {
        min_magnitude: 2.5,
        lookback_days: 7,
        limit: 50,
    }
}
fn default_secondary_recent() -> SecondaryQueryConfig {
    SecondaryQueryConfig {
        min_magnitude: 5.0,
        lookback_days: 365,
        limit: 200,
    }
}

fn default_true() -> bool {
    true
}
fn default_geocoder_url() -> String {
    "https://nominatim.openstreetmap.org".into()
}
fn default_geocoder_language() -> String {
    "id".into()
}
fn default_geocoder_zoom() -> u8 {
    10
}

fn default_cache_dir() -> String {
    ".quake-cache".into()
}
fn default_ttl_ms() -> u64 {
    300_000
}

fn default_poll_interval() -> u64 {
    60
}
fn default_source_timeout() -> u64 {
    10
}

fn default_center() -> Coordinate {
    Coordinate::new(-2.5489, 118.0149)
}
fn default_zoom() -> f64 {
    5.0
}
fn default_min_zoom() -> f64 {
    5.0
}
fn default_max_zoom() -> f64 {
    15.0
}
fn default_bounds() -> BoundsConfig {
    BoundsConfig {
        south: -16.0,
        west: 87.0,
        north: 16.0,
        east: 150.0,
    }
}
fn default_edge_margin() -> f64 {
    0.25
}
fn default_reset_distance_km() -> f64 {
    1000.0
}
fn default_animation_ms() -> u64 {
    500
}
fn default_container_width() -> u32 {
    1024
}
fn default_container_height() -> u32 {
    500
}

fn default_radius_km() -> f64 {
    100.0
}
fn default_max_age_days() -> i64 {
    365
}
fn default_max_results() -> usize {
    5
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            primary_felt_url: default_primary_felt_url(),
            primary_recent_url: default_primary_recent_url(),
            secondary_url: default_secondary_url(),
            user_agent: default_user_agent(),
            secondary_felt: default_secondary_felt(),
            secondary_recent: default_secondary_recent(),
        }
    }
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            base_url: default_geocoder_url(),
            language: default_geocoder_language(),
            zoom: default_geocoder_zoom(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            ttl_ms: default_ttl_ms(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            source_timeout_secs: default_source_timeout(),
        }
    }
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            default_center: default_center(),
            default_zoom: default_zoom(),
            min_zoom: default_min_zoom(),
            max_zoom: default_max_zoom(),
            bounds: default_bounds(),
            edge_margin: default_edge_margin(),
            reset_distance_km: default_reset_distance_km(),
            animation_ms: default_animation_ms(),
            container_width_px: default_container_width(),
            container_height_px: default_container_height(),
        }
    }
}

impl Default for NearbyConfig {
    fn default() -> Self {
        Self {
            radius_km: default_radius_km(),
            max_age_days: default_max_age_days(),
            max_results: default_max_results(),
        }
    }
}
