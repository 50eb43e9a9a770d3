//! Configuration loader: merges .env, config.toml and QUAKE_* env vars.

use std::path::Path;

use chrono::Utc;
use common::config::AppConfig;
use common::Error;

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    let parsed = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn parse_positive_f64(raw: &str, env_name: &str) -> Result<f64, Error> {
    let parsed = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::Config(format!("{env_name} must be a number > 0")))?;
    if !parsed.is_finite() || parsed <= 0.0 {
        return Err(Error::Config(format!("{env_name} must be a number > 0")));
    }
    Ok(parsed)
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Apply `QUAKE_*` overrides. `lookup` is `std::env::var` in production.
fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), Error>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("QUAKE_PRIMARY_FELT_URL").and_then(non_empty) {
        config.feeds.primary_felt_url = url;
    }
    if let Some(url) = lookup("QUAKE_PRIMARY_RECENT_URL").and_then(non_empty) {
        config.feeds.primary_recent_url = url;
    }
    if let Some(url) = lookup("QUAKE_SECONDARY_URL").and_then(non_empty) {
        config.feeds.secondary_url = url;
    }
    if let Some(dir) = lookup("QUAKE_CACHE_DIR").and_then(non_empty) {
        config.cache.dir = dir;
    }
    if let Some(raw) = lookup("QUAKE_CACHE_TTL_MS") {
        config.cache.ttl_ms = parse_positive_u64(&raw, "QUAKE_CACHE_TTL_MS")?;
    }
    if let Some(raw) = lookup("QUAKE_POLL_INTERVAL_SECS") {
        config.timing.poll_interval_secs = parse_positive_u64(&raw, "QUAKE_POLL_INTERVAL_SECS")?;
    }
    if let Some(raw) = lookup("QUAKE_SOURCE_TIMEOUT_SECS") {
        config.timing.source_timeout_secs =
            parse_positive_u64(&raw, "QUAKE_SOURCE_TIMEOUT_SECS")?;
    }
    if let Some(url) = lookup("QUAKE_GEOCODER_URL").and_then(non_empty) {
        config.geocoder.base_url = url;
    }
    if let Some(raw) = lookup("QUAKE_GEOCODER_ENABLED") {
        config.geocoder.enabled = match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                return Err(Error::Config(
                    "QUAKE_GEOCODER_ENABLED must be true or false".into(),
                ))
            }
        };
    }
    if let Some(raw) = lookup("QUAKE_NEARBY_RADIUS_KM") {
        config.nearby.radius_km = parse_positive_f64(&raw, "QUAKE_NEARBY_RADIUS_KM")?;
    }
    Ok(())
}

fn validate_config(config: &AppConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    for (name, url) in [
        ("feeds.primary_felt_url", &config.feeds.primary_felt_url),
        ("feeds.primary_recent_url", &config.feeds.primary_recent_url),
        ("feeds.secondary_url", &config.feeds.secondary_url),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            issues.push(format!("{name} must be an http(s) URL"));
        }
    }
    for (name, q) in [
        ("feeds.secondary_felt", &config.feeds.secondary_felt),
        ("feeds.secondary_recent", &config.feeds.secondary_recent),
    ] {
        if !(q.min_magnitude >= 0.0) {
            issues.push(format!("{name}.min_magnitude must be >= 0"));
        }
        if q.lookback_days <= 0 {
            issues.push(format!("{name}.lookback_days must be > 0"));
        } else if q.lookback_start(Utc::now()).is_none() {
            issues.push(format!("{name}.lookback_days is too large"));
        }
        if q.limit == 0 {
            issues.push(format!("{name}.limit must be > 0"));
        }
    }

    if config.cache.dir.trim().is_empty() {
        issues.push("cache.dir must not be empty".into());
    }
    if config.cache.ttl_ms == 0 {
        issues.push("cache.ttl_ms must be > 0".into());
    }

    if config.timing.poll_interval_secs == 0 {
        issues.push("timing.poll_interval_secs must be > 0".into());
    }
    if config.timing.source_timeout_secs == 0 {
        issues.push("timing.source_timeout_secs must be > 0".into());
    }

    let vp = &config.viewport;
    let b = &vp.bounds;
    if !(b.south < b.north) || !(b.west < b.east) {
        issues.push("viewport.bounds must have south < north and west < east".into());
    }
    if b.south < -90.0 || b.north > 90.0 || b.west < -180.0 || b.east > 180.0 {
        issues.push("viewport.bounds must lie within [-90,90] x [-180,180]".into());
    }
    if !vp.default_center.is_valid()
        || vp.default_center.lat < b.south
        || vp.default_center.lat > b.north
        || vp.default_center.lon < b.west
        || vp.default_center.lon > b.east
    {
        issues.push("viewport.default_center must be a valid point inside viewport.bounds".into());
    }
    if !(vp.min_zoom <= vp.max_zoom) {
        issues.push("viewport.min_zoom must be <= viewport.max_zoom".into());
    }
    if !(vp.default_zoom >= vp.min_zoom && vp.default_zoom <= vp.max_zoom) {
        issues.push("viewport.default_zoom must be within [min_zoom, max_zoom]".into());
    }
    if !(vp.edge_margin >= 0.0 && vp.edge_margin < 0.5) {
        issues.push("viewport.edge_margin must be in [0, 0.5)".into());
    }
    if !(vp.reset_distance_km >= 0.0) {
        issues.push("viewport.reset_distance_km must be >= 0".into());
    }
    if vp.container_width_px == 0 || vp.container_height_px == 0 {
        issues.push("viewport container size must be > 0".into());
    }

    if !(config.nearby.radius_km > 0.0) {
        issues.push("nearby.radius_km must be > 0".into());
    }
    if config.nearby.max_age_days < 0 {
        issues.push("nearby.max_age_days must be >= 0".into());
    }
    if config.nearby.max_results == 0 {
        issues.push("nearby.max_results must be > 0".into());
    }

    if config.geocoder.enabled {
        let url = &config.geocoder.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            issues.push("geocoder.base_url must be an http(s) URL".into());
        }
        if config.geocoder.zoom > 18 {
            issues.push("geocoder.zoom must be in [0, 18]".into());
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Load configuration from defaults, optional config file and environment.
pub fn load_config() -> Result<AppConfig, Error> {
    // 1. Load .env file from the working directory or its parents.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults.
    let mut config = AppConfig::default();

    // 3. Try loading config.toml if it exists.
    let config_path = Path::new("config.toml");
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read config.toml: {}", e)))?;
        config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config.toml: {}", e)))?;
    }

    // 4. Override with environment variables (highest priority).
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    validate_config(&config)?;

    Ok(config)
}
