//! Nominatim (OpenStreetMap) geocoding client.
//!
//! `reverse` turns a selected point into an address; `search` finds the
//! coordinates of the nearest named locality so its distance can be shown.

use std::time::Duration;

use async_trait::async_trait;
use common::config::GeocoderConfig;
use common::{Coordinate, Error, Geocoder, Place, PlaceAddress};
use serde::Deserialize;
use tracing::debug;

/// Nominatim client with connection pooling and User-Agent header.
#[derive(Debug, Clone)]
pub struct NominatimClient {
    client: reqwest::Client,
    config: GeocoderConfig,
}

// ── Nominatim response types ──────────────────────────────────────────

/// `/reverse?format=json` body. Points with no match come back as
/// `{"error": "Unable to geocode"}` with a 200 status.
#[derive(Debug, Deserialize)]
pub struct ReverseResponse {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub address: Option<PlaceAddress>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One `/search?format=json` hit. Coordinates are decimal strings.
#[derive(Debug, Deserialize)]
pub struct SearchHit {
    pub lat: String,
    pub lon: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

// ── Implementation ────────────────────────────────────────────────────

impl NominatimClient {
    pub fn new(config: &GeocoderConfig, user_agent: &str, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .pool_max_idle_per_host(2)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build Nominatim HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<String, Error> {
        let url = self.endpoint(path);
        debug!("Nominatim {}: {:?}", url, query);

        let resp = self
            .client
            .get(&url)
            .query(query)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::Network(format!("Nominatim HTTP error: {e}")))?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(300).collect();
            return Err(Error::Network(format!("Nominatim returned {status}: {snippet}")));
        }

        resp.text()
            .await
            .map_err(|e| Error::Network(format!("Nominatim body read error: {e}")))
    }

    /// Query-string parameters for a reverse lookup of `point`.
    pub fn reverse_params(&self, point: Coordinate) -> Vec<(&'static str, String)> {
        vec![
            ("format", "json".to_string()),
            ("lat", point.lat.to_string()),
            ("lon", point.lon.to_string()),
            ("zoom", self.config.zoom.to_string()),
            ("addressdetails", "1".to_string()),
            ("accept-language", self.config.language.clone()),
        ]
    }

    /// Query-string parameters for a locality search.
    pub fn search_params(&self, name: &str) -> Vec<(&'static str, String)> {
        vec![
            ("city", name.to_string()),
            ("format", "json".to_string()),
            ("limit", "1".to_string()),
            ("accept-language", self.config.language.clone()),
        ]
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    fn name(&self) -> &str {
        "nominatim"
    }

    async fn reverse(&self, point: Coordinate) -> Result<Place, Error> {
        let body = self.get_text("reverse", &self.reverse_params(point)).await?;
        parse_reverse(&body)
    }

    async fn locate(&self, name: &str) -> Result<Option<Coordinate>, Error> {
        let body = self.get_text("search", &self.search_params(name)).await?;
        parse_search(&body)
    }
}

// ── Parsing ───────────────────────────────────────────────────────────

/// Parse a reverse-lookup body. An "unable to geocode" answer is an empty
/// place, not an error.
pub fn parse_reverse(body: &str) -> Result<Place, Error> {
    let resp: ReverseResponse = serde_json::from_str(body)
        .map_err(|e| Error::Parse(format!("Nominatim reverse: {e}")))?;

    if let Some(reason) = resp.error {
        debug!("Nominatim has no place here: {}", reason);
        return Ok(Place::default());
    }
    Ok(Place {
        display_name: resp.display_name,
        address: resp.address,
    })
}

/// First hit with usable coordinates, if any.
pub fn parse_search(body: &str) -> Result<Option<Coordinate>, Error> {
    let hits: Vec<SearchHit> = serde_json::from_str(body)
        .map_err(|e| Error::Parse(format!("Nominatim search: {e}")))?;

    let Some(hit) = hits.first() else {
        return Ok(None);
    };
    let point = match (hit.lat.trim().parse::<f64>(), hit.lon.trim().parse::<f64>()) {
        (Ok(lat), Ok(lon)) => Coordinate::new(lat, lon),
        _ => {
            debug!("Unusable search hit {:?} ({}, {})", hit.display_name, hit.lat, hit.lon);
            return Ok(None);
        }
    };
    Ok(point.is_valid().then_some(point))
}
