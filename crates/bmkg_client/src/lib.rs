//! BMKG open-data client.
//!
//! Fetches the `Infogempa` JSON feeds and normalizes each `gempa` record
//! into a `SeismicEvent`. Records that cannot be normalized are dropped
//! one by one; only an unrecognizable document fails the fetch.

pub mod normalize;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::config::FeedsConfig;
use common::{Coordinate, Error, EventSource, FeedKind, FeedSource, SeismicEvent};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::normalize::{
    parse_coordinate_pair, parse_datetime, parse_depth, parse_latitude, parse_longitude,
    parse_magnitude, parse_split_datetime, parse_tsunami_flag,
};

/// BMKG client with connection pooling and User-Agent header.
#[derive(Debug, Clone)]
pub struct BmkgClient {
    client: reqwest::Client,
    feeds: FeedsConfig,
}

// ── BMKG response types ───────────────────────────────────────────────

/// Top-level document: `{"Infogempa": {"gempa": [...]}}`.
#[derive(Debug, Deserialize)]
pub struct InfogempaResponse {
    #[serde(rename = "Infogempa")]
    pub infogempa: Infogempa,
}

#[derive(Debug, Deserialize)]
pub struct Infogempa {
    /// A list of records, or a single object for the latest-event feed.
    #[serde(default)]
    pub gempa: Option<Value>,
}

/// One raw record. Every field is optional; BMKG feeds differ in which
/// ones they carry.
#[derive(Debug, Default, Deserialize)]
pub struct GempaRecord {
    #[serde(rename = "Tanggal", default)]
    pub tanggal: Option<String>,
    #[serde(rename = "Jam", default)]
    pub jam: Option<String>,
    #[serde(rename = "DateTime", default)]
    pub date_time: Option<String>,
    #[serde(rename = "Coordinates", default)]
    pub coordinates: Option<String>,
    #[serde(rename = "Lintang", default)]
    pub lintang: Option<String>,
    #[serde(rename = "Bujur", default)]
    pub bujur: Option<String>,
    #[serde(rename = "Magnitude", default)]
    pub magnitude: Option<Value>, // string or number
    #[serde(rename = "Kedalaman", default)]
    pub kedalaman: Option<Value>, // "10 km" or number
    #[serde(rename = "Wilayah", default)]
    pub wilayah: Option<String>,
    #[serde(rename = "Potensi", default)]
    pub potensi: Option<String>,
    #[serde(rename = "Dirasakan", default)]
    pub dirasakan: Option<String>,
}

// ── Implementation ────────────────────────────────────────────────────

impl BmkgClient {
    pub fn new(feeds: &FeedsConfig, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(feeds.user_agent.as_str())
            .pool_max_idle_per_host(4)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build BMKG HTTP client: {}", e)))?;

        Ok(Self {
            client,
            feeds: feeds.clone(),
        })
    }

    /// Fetch the raw body of one feed.
    pub async fn fetch_raw(&self, kind: FeedKind) -> Result<String, Error> {
        let url = self.feeds.primary_url(kind);
        debug!("Fetching BMKG {} feed: {}", kind, url);

        let resp = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::Network(format!("BMKG HTTP error for {} feed: {}", kind, e)))?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Network(format!(
                "BMKG returned {} for {} feed: {}",
                status,
                kind,
                truncate(&body, 500)
            )));
        }

        resp.text()
            .await
            .map_err(|e| Error::Network(format!("BMKG body read error for {} feed: {}", kind, e)))
    }
}

#[async_trait]
impl FeedSource for BmkgClient {
    fn name(&self) -> &str {
        "bmkg"
    }

    async fn fetch_events(&self, kind: FeedKind) -> Result<Vec<SeismicEvent>, Error> {
        let body = self.fetch_raw(kind).await?;
        let events = normalize_response(&body)?;
        debug!("Got {} BMKG events for {} feed", events.len(), kind);
        Ok(events)
    }
}

// ── Normalization ─────────────────────────────────────────────────────

/// Parse a whole `Infogempa` document.
///
/// Fails with `Error::Parse` only when the document itself is not JSON or
/// lacks `Infogempa.gempa`. An empty list is a valid, empty snapshot.
pub fn normalize_response(body: &str) -> Result<Vec<SeismicEvent>, Error> {
    let doc: InfogempaResponse = serde_json::from_str(body)
        .map_err(|e| Error::Parse(format!("BMKG document: {}", e)))?;

    let raw_records = match doc.infogempa.gempa {
        Some(Value::Array(items)) => items,
        Some(obj @ Value::Object(_)) => vec![obj],
        Some(other) => {
            return Err(Error::Parse(format!(
                "BMKG gempa has unexpected type: {}",
                json_type(&other)
            )))
        }
        None => return Err(Error::Parse("BMKG document has no gempa field".into())),
    };

    let total = raw_records.len();
    let events: Vec<SeismicEvent> = raw_records
        .into_iter()
        .enumerate()
        .filter_map(|(idx, raw)| {
            let record: GempaRecord = match serde_json::from_value(raw) {
                Ok(r) => r,
                Err(e) => {
                    debug!("Dropping BMKG record {}: {}", idx, e);
                    return None;
                }
            };
            match normalize_record(&record) {
                Ok(event) => Some(event),
                Err(e) => {
                    debug!("Dropping BMKG record {}: {}", idx, e);
                    None
                }
            }
        })
        .collect();

    if events.len() < total {
        warn!("BMKG: kept {} of {} records", events.len(), total);
    }
    Ok(events)
}

/// Normalize a single record into the canonical event.
pub fn normalize_record(record: &GempaRecord) -> Result<SeismicEvent, Error> {
    let occurred_at = record_time(record)?;
    let coordinates = record_coordinates(record)?;

    let magnitude = record
        .magnitude
        .as_ref()
        .and_then(parse_magnitude)
        .ok_or_else(|| Error::Validation(format!("unparsable magnitude {:?}", record.magnitude)))?;

    let depth_km = record.kedalaman.as_ref().and_then(parse_depth);

    let event = SeismicEvent {
        id: event_id(occurred_at, coordinates),
        occurred_at,
        coordinates,
        magnitude,
        depth_km,
        region: record.wilayah.clone().unwrap_or_default().trim().to_string(),
        tsunami_potential: record.potensi.as_deref().map(parse_tsunami_flag).unwrap_or(false),
        source: EventSource::Primary,
        felt_report: record
            .dirasakan
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != "-")
            .map(str::to_string),
    };
    event.validate()?;
    Ok(event)
}

fn record_time(record: &GempaRecord) -> Result<DateTime<Utc>, Error> {
    if let Some(ts) = record.date_time.as_deref().and_then(parse_datetime) {
        return Ok(ts);
    }
    match (record.tanggal.as_deref(), record.jam.as_deref()) {
        (Some(tanggal), Some(jam)) => parse_split_datetime(tanggal, jam).ok_or_else(|| {
            Error::Validation(format!("unparsable time '{}' '{}'", tanggal, jam))
        }),
        _ => Err(Error::Validation("record has no timestamp".into())),
    }
}

fn record_coordinates(record: &GempaRecord) -> Result<Coordinate, Error> {
    if let Some(c) = record.coordinates.as_deref().and_then(parse_coordinate_pair) {
        return Ok(c);
    }
    let lat = record.lintang.as_deref().and_then(parse_latitude);
    let lon = record.bujur.as_deref().and_then(parse_longitude);
    match (lat, lon) {
        (Some(lat), Some(lon)) => Ok(Coordinate::new(lat, lon)),
        _ => Err(Error::Validation(format!(
            "unparsable coordinates {:?} / {:?} {:?}",
            record.coordinates, record.lintang, record.bujur
        ))),
    }
}

/// `bmkg-<unix seconds>-<lat 2dp>-<lon 2dp>`.
pub fn event_id(occurred_at: DateTime<Utc>, at: Coordinate) -> String {
    format!("bmkg-{}-{:.2}-{:.2}", occurred_at.timestamp(), at.lat, at.lon)
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
