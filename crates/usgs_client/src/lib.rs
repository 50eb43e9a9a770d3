//! USGS FDSN event query client.
//!
//! Used as the fallback source. Queries a GeoJSON FeatureCollection over the
//! configured region and converts each feature to a `SeismicEvent`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use common::config::{BoundsConfig, FeedsConfig};
use common::{Coordinate, Error, EventSource, FeedKind, FeedSource, SeismicEvent};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

/// USGS client.
#[derive(Debug, Clone)]
pub struct UsgsClient {
    client: reqwest::Client,
    feeds: FeedsConfig,
    bounds: BoundsConfig,
}

/// GeoJSON FeatureCollection returned with `format=geojson`.
#[derive(Debug, Deserialize)]
pub struct FeatureCollection {
    pub features: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct Feature {
    pub id: String,
    pub properties: FeatureProperties,
    pub geometry: Geometry,
}

#[derive(Debug, Deserialize)]
pub struct FeatureProperties {
    #[serde(default)]
    pub mag: Option<f64>,
    #[serde(default)]
    pub place: Option<String>,
    /// Epoch milliseconds, or an ISO-8601 string when requested that way.
    #[serde(default)]
    pub time: Value,
    #[serde(default)]
    pub tsunami: Option<Value>,
    #[serde(default)]
    pub felt: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct Geometry {
    /// `[lon, lat, depth]`.
    #[serde(default)]
    pub coordinates: Vec<Option<f64>>,
}

impl UsgsClient {
    pub fn new(feeds: &FeedsConfig, bounds: BoundsConfig, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(feeds.user_agent.as_str())
            .pool_max_idle_per_host(4)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build USGS HTTP client: {e}")))?;

        Ok(Self {
            client,
            feeds: feeds.clone(),
            bounds,
        })
    }

    /// Query-string parameters for `kind` as of `now`.
    ///
    /// A look-back that does not fit in a date leaves `starttime` out, so
    /// the server applies its own default window.
    pub fn query_params(&self, kind: FeedKind, now: DateTime<Utc>) -> Vec<(&'static str, String)> {
        let q = self.feeds.secondary_query(kind);
        let mut params = vec![("format", "geojson".to_string())];
        match q.lookback_start(now) {
            Some(start) => {
                params.push(("starttime", start.format("%Y-%m-%dT%H:%M:%S").to_string()))
            }
            None => warn!(
                "{kind} look-back of {} days out of range, starttime omitted",
                q.lookback_days
            ),
        }
        params.extend([
            ("minmagnitude", q.min_magnitude.to_string()),
            ("minlatitude", self.bounds.south.to_string()),
            ("maxlatitude", self.bounds.north.to_string()),
            ("minlongitude", self.bounds.west.to_string()),
            ("maxlongitude", self.bounds.east.to_string()),
            ("limit", q.limit.to_string()),
            ("orderby", "time".to_string()),
        ]);
        params
    }

    /// Fetch the raw GeoJSON body for one feed.
    pub async fn fetch_raw(&self, kind: FeedKind) -> Result<String, Error> {
        let query = self.query_params(kind, Utc::now());

        let url = self.feeds.secondary_url.as_str();
        debug!("Fetching USGS {kind} events: {} {:?}", url, query);

        let resp = self
            .client
            .get(url)
            .query(&query)
            .send()
            .await
            .map_err(|e| Error::Network(format!("USGS HTTP error for {kind} feed: {e}")))?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(500).collect();
            return Err(Error::Network(format!(
                "USGS returned {status} for {kind} feed: {snippet}"
            )));
        }

        resp.text()
            .await
            .map_err(|e| Error::Network(format!("USGS body read error for {kind} feed: {e}")))
    }
}

#[async_trait]
impl FeedSource for UsgsClient {
    fn name(&self) -> &str {
        "usgs"
    }

    async fn fetch_events(&self, kind: FeedKind) -> Result<Vec<SeismicEvent>, Error> {
        let body = self.fetch_raw(kind).await?;
        let events = normalize_feature_collection(&body)?;
        debug!("Got {} USGS events for {kind} feed", events.len());
        Ok(events)
    }
}

/// Parse a FeatureCollection, dropping features that fail normalization.
pub fn normalize_feature_collection(body: &str) -> Result<Vec<SeismicEvent>, Error> {
    let collection: FeatureCollection = serde_json::from_str(body)
        .map_err(|e| Error::Parse(format!("USGS FeatureCollection: {e}")))?;

    let total = collection.features.len();
    let events: Vec<SeismicEvent> = collection
        .features
        .into_iter()
        .filter_map(|raw| {
            let feature: Feature = match serde_json::from_value(raw) {
                Ok(f) => f,
                Err(e) => {
                    debug!("Dropping USGS feature: {e}");
                    return None;
                }
            };
            normalize_feature(&feature)
                .map_err(|e| debug!("Dropping USGS feature {}: {e}", feature.id))
                .ok()
        })
        .collect();

    if events.len() < total {
        warn!("USGS: kept {} of {} features", events.len(), total);
    }
    Ok(events)
}

/// Convert one feature to the canonical event.
pub fn normalize_feature(feature: &Feature) -> Result<SeismicEvent, Error> {
    let coords = &feature.geometry.coordinates;
    let (lon, lat) = match (coords.first().copied().flatten(), coords.get(1).copied().flatten()) {
        (Some(lon), Some(lat)) => (lon, lat),
        _ => {
            return Err(Error::Validation(format!(
                "{}: missing coordinates {:?}",
                feature.id, coords
            )))
        }
    };
    // Very shallow events can come back slightly above sea level.
    let depth_km = coords
        .get(2)
        .copied()
        .flatten()
        .map(|d| if d < 0.0 { 0.0 } else { d });

    let occurred_at = parse_time(&feature.properties.time).ok_or_else(|| {
        Error::Validation(format!("{}: unparsable time {}", feature.id, feature.properties.time))
    })?;

    let magnitude = feature
        .properties
        .mag
        .ok_or_else(|| Error::Validation(format!("{}: missing magnitude", feature.id)))?;

    let tsunami_potential = match &feature.properties.tsunami {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        Some(Value::Bool(b)) => *b,
        _ => false,
    };

    let event = SeismicEvent {
        id: format!("usgs-{}", feature.id),
        occurred_at,
        coordinates: Coordinate::new(lat, lon),
        magnitude,
        depth_km,
        region: feature.properties.place.clone().unwrap_or_default(),
        tsunami_potential,
        source: EventSource::Secondary,
        felt_report: feature
            .properties
            .felt
            .filter(|n| *n > 0)
            .map(|n| format!("{n} felt reports")),
    };
    event.validate()?;
    Ok(event)
}

/// Epoch milliseconds or an ISO-8601 string.
fn parse_time(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY_RESPONSE: &str = r#"{
        "type": "FeatureCollection",
        "metadata": {"generated": 1718000000000, "count": 4},
        "features": [
            {
                "type": "Feature",
                "id": "us7000k1ab",
                "properties": {
                    "mag": 5.6,
                    "place": "98 km SW of Mamuju, Indonesia",
                    "time": 1687239296000,
                    "tsunami": 1,
                    "felt": 12
                },
                "geometry": {"type": "Point", "coordinates": [118.01, -2.55, 10.0]}
            },
            {
                "type": "Feature",
                "id": "us7000k1cd",
                "properties": {
                    "mag": 4.7,
                    "place": "Banda Sea",
                    "time": "2023-06-21T01:00:00.000Z",
                    "tsunami": 0,
                    "felt": null
                },
                "geometry": {"type": "Point", "coordinates": [128.17, -6.5, null]}
            },
            {
                "type": "Feature",
                "id": "us7000k1ef",
                "properties": {"mag": null, "place": "no magnitude", "time": 1687239296000},
                "geometry": {"type": "Point", "coordinates": [118.0, -2.0, 5.0]}
            },
            {
                "type": "Feature",
                "id": "us7000k1gh",
                "properties": {"mag": 5.0, "place": "bad longitude", "time": 1687239296000},
                "geometry": {"type": "Point", "coordinates": [218.0, -2.0, 5.0]}
            }
        ]
    }"#;

    #[test]
    fn test_normalize_feature_collection() {
        let events = normalize_feature_collection(QUERY_RESPONSE).expect("collection parses");
        assert_eq!(events.len(), 2);

        let first = &events[0];
        assert_eq!(first.id, "usgs-us7000k1ab");
        assert_eq!(first.occurred_at.to_rfc3339(), "2023-06-20T05:34:56+00:00");
        assert_eq!(first.coordinates, Coordinate::new(-2.55, 118.01));
        assert_eq!(first.depth_km, Some(10.0));
        assert_eq!(first.magnitude, 5.6);
        assert!(first.tsunami_potential);
        assert_eq!(first.source, EventSource::Secondary);
        assert_eq!(first.felt_report.as_deref(), Some("12 felt reports"));

        let second = &events[1];
        assert_eq!(second.occurred_at.to_rfc3339(), "2023-06-21T01:00:00+00:00");
        assert_eq!(second.depth_km, None);
        assert!(!second.tsunami_potential);
        assert_eq!(second.region, "Banda Sea");
    }

    #[test]
    fn test_empty_collection_is_empty_snapshot() {
        let events = normalize_feature_collection(r#"{"type": "FeatureCollection", "features": []}"#)
            .expect("collection parses");
        assert!(events.is_empty());
    }

    #[test]
    fn test_wrong_shape_is_parse_error() {
        let err = normalize_feature_collection(r#"{"Infogempa": {"gempa": []}}"#).unwrap_err();
        assert!(err.is_parse());

        let err = normalize_feature_collection("not json").unwrap_err();
        assert!(err.is_parse());

        let err = normalize_feature_collection(r#"{"features": "nope"}"#).unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_query_params_follow_kind_and_bounds() {
        let feeds = FeedsConfig::default();
        let bounds = BoundsConfig {
            south: -16.0,
            west: 87.0,
            north: 16.0,
            east: 150.0,
        };
        let client = UsgsClient::new(&feeds, bounds, Duration::from_secs(5)).expect("client");
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid date");

        let felt = client.query_params(FeedKind::Felt, now);
        let get = |params: &[(&'static str, String)], key: &str| {
            params
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        };
        assert_eq!(get(&felt, "format"), "geojson");
        assert_eq!(get(&felt, "starttime"), "2026-02-22T12:00:00");
        assert_eq!(get(&felt, "minmagnitude"), "2.5");
        assert_eq!(get(&felt, "minlatitude"), "-16");
        assert_eq!(get(&felt, "maxlongitude"), "150");
        assert_eq!(get(&felt, "limit"), "50");

        let recent = client.query_params(FeedKind::Recent, now);
        assert_eq!(get(&recent, "minmagnitude"), "5");
        assert_eq!(get(&recent, "starttime"), "2025-03-01T12:00:00");
    }

    #[test]
    fn test_negative_depth_clamps_to_surface() {
        let body = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "id": "us7000shal",
                "properties": {"mag": 3.1, "place": "near Bandung", "time": 1687239296000},
                "geometry": {"type": "Point", "coordinates": [107.6, -6.9, -1.2]}
            }]
        }"#;
        let events = normalize_feature_collection(body).expect("collection parses");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].depth_km, Some(0.0));
    }

    #[test]
    fn test_oversized_lookback_omits_starttime() {
        let mut feeds = FeedsConfig::default();
        feeds.secondary_recent.lookback_days = i64::MAX;
        let bounds = BoundsConfig {
            south: -16.0,
            west: 87.0,
            north: 16.0,
            east: 150.0,
        };
        let client = UsgsClient::new(&feeds, bounds, Duration::from_secs(5)).expect("client");
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid date");

        let recent = client.query_params(FeedKind::Recent, now);
        assert!(recent.iter().all(|(k, _)| *k != "starttime"));
        assert!(recent.iter().any(|(k, v)| *k == "minmagnitude" && v == "5"));

        let felt = client.query_params(FeedKind::Felt, now);
        assert!(felt.iter().any(|(k, _)| *k == "starttime"));
    }
}
