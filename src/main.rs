//! quake-watch: near-real-time seismic feed monitor.
//!
//! Single-binary Tokio application that:
//! 1. Polls the BMKG felt and recent feeds, falling back to USGS
//! 2. Keeps the last good snapshot of each feed in a local cache
//! 3. Logs updates, failures and a periodic heartbeat
//! 4. Answers one-shot summary and nearby-event queries, with location
//!    details for the queried point

mod config;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use bmkg_client::BmkgClient;
use common::{Coordinate, FeedKind, FeedSource, Geocoder, SeismicEvent, SystemClock};
use feed::{FileStore, NearbyOptions, PollEvent, SeismicService};
use geo::{magnitude_band, RiskLevel};
use nominatim_client::NominatimClient;
use usgs_client::UsgsClient;

/// Seismic feed monitor
#[derive(Parser)]
#[command(name = "quake-watch", about = "Seismic event feed monitor")]
struct Cli {
    /// Fetch the felt feed once, log a summary and exit.
    #[arg(long)]
    once: bool,

    /// With --once, bypass a fresh cache entry.
    #[arg(long, requires = "once")]
    force: bool,

    /// Rank recent events near a point ("LAT,LON") and exit.
    #[arg(long, value_name = "LAT,LON", value_parser = parse_coordinate, allow_hyphen_values = true)]
    nearby: Option<Coordinate>,

    /// Search radius for --nearby, in km.
    #[arg(long, requires = "nearby")]
    radius_km: Option<f64>,
}

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

fn parse_coordinate(raw: &str) -> Result<Coordinate, String> {
    let (lat, lon) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got '{raw}'"))?;
    let lat: f64 = lat.trim().parse().map_err(|_| format!("bad latitude '{lat}'"))?;
    let lon: f64 = lon.trim().parse().map_err(|_| format!("bad longitude '{lon}'"))?;
    let point = Coordinate::new(lat, lon);
    if !point.is_valid() {
        return Err(format!("{point} is outside [-90,90] x [-180,180]"));
    }
    Ok(point)
}

fn fmt_time(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| "never".into())
}

fn fmt_depth(depth_km: Option<f64>) -> String {
    depth_km
        .map(|d| format!("{d:.0} km"))
        .unwrap_or_else(|| "?".into())
}

fn log_event_row(service: &SeismicService, event: &SeismicEvent) {
    info!(
        "  {}  M{:<4.1} {:<7} depth={:<7} risk={:<9} {}{}",
        event.occurred_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        event.magnitude,
        format!("{:?}", magnitude_band(event.magnitude)).to_lowercase(),
        fmt_depth(event.depth_km),
        service.classify(event).label(),
        event.region,
        if event.tsunami_potential { "  [TSUNAMI]" } else { "" },
    );
}

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "quake_watch=info,feed=info,bmkg_client=info,usgs_client=info,\
                 nominatim_client=info,geo=info"
                    .into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    info!("quake-watch starting up...");

    // Load configuration.
    let cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Feeds: felt={} recent={} fallback={}",
        cfg.feeds.primary_felt_url, cfg.feeds.primary_recent_url, cfg.feeds.secondary_url
    );
    info!(
        "Cache: dir={} ttl={}ms | poll={}s timeout={}s",
        cfg.cache.dir, cfg.cache.ttl_ms, cfg.timing.poll_interval_secs, cfg.timing.source_timeout_secs
    );

    let source_timeout = Duration::from_secs(cfg.timing.source_timeout_secs);
    let primary: Arc<dyn FeedSource> = match BmkgClient::new(&cfg.feeds, source_timeout) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Failed to build primary client: {}", e);
            std::process::exit(1);
        }
    };
    let secondary: Arc<dyn FeedSource> =
        match UsgsClient::new(&cfg.feeds, cfg.viewport.bounds, source_timeout) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                error!("Failed to build fallback client: {}", e);
                std::process::exit(1);
            }
        };

    let mut service = SeismicService::from_config(
        &cfg,
        primary,
        Some(secondary),
        Arc::new(FileStore::new(&cfg.cache.dir)),
        Arc::new(SystemClock),
    );
    if cfg.geocoder.enabled {
        match NominatimClient::new(&cfg.geocoder, &cfg.feeds.user_agent, source_timeout) {
            Ok(c) => {
                let geocoder: Arc<dyn Geocoder> = Arc::new(c);
                service = service.with_geocoder(geocoder);
            }
            Err(e) => warn!("Location details disabled: {}", e),
        }
    }
    let service = Arc::new(service);

    // ── One-shot modes ───────────────────────────────────────────────
    if let Some(origin) = cli.nearby {
        let opts = NearbyOptions {
            radius_km: cli.radius_km,
            ..Default::default()
        };
        if let Err(e) = run_nearby(&service, origin, opts).await {
            error!("Nearby query failed: {}", e);
            std::process::exit(1);
        }
        return;
    }

    if cli.once {
        if let Err(e) = run_once(&service, cli.force).await {
            error!("Fetch failed: {}", e);
            std::process::exit(1);
        }
        return;
    }

    // ── Long-running mode ────────────────────────────────────────────
    info!("Spawning tasks...");

    let mut updates = service.subscribe();
    let observer_handle = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(PollEvent::Updated { kind, events, fetched_at }) => {
                    let alerts = events
                        .iter()
                        .filter(|e| geo::classify_event(e) >= RiskLevel::High)
                        .count();
                    info!(
                        "{} feed updated: {} events ({} high risk) fetched_at={}",
                        kind,
                        events.len(),
                        alerts,
                        fmt_time(fetched_at)
                    );
                }
                Ok(PollEvent::Failed { kind, error }) => {
                    warn!("{} feed refresh failed: {}", kind, error);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Observer lagged, {} updates skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let poll_interval = Duration::from_secs(cfg.timing.poll_interval_secs);
    if let Err(e) = service.scheduler().start(poll_interval) {
        error!("Failed to start polling: {}", e);
        std::process::exit(1);
    }

    let hb_service = service.clone();
    let heartbeat_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let mut parts = Vec::with_capacity(FeedKind::ALL.len());
            for kind in FeedKind::ALL {
                let cached = match hb_service.scheduler().client(kind) {
                    Some(client) => client.cached().await,
                    None => None,
                };
                let count = cached.as_ref().map(|e| e.payload.len()).unwrap_or(0);
                parts.push(format!(
                    "{}={} (at {})",
                    kind,
                    count,
                    fmt_time(hb_service.last_fetched_at(kind).await)
                ));
            }
            info!(
                "HEARTBEAT: {} polling={}",
                parts.join(" "),
                hb_service.scheduler().is_running()
            );
        }
    });

    // ── Wait for shutdown ────────────────────────────────────────────
    info!("quake-watch is running. Press Ctrl+C to stop.");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        r = observer_handle => {
            error!("Observer task exited: {:?}", r);
        }
        r = heartbeat_handle => {
            error!("Heartbeat task exited: {:?}", r);
        }
    }

    service.scheduler().stop();
    info!("quake-watch shut down.");
}

// ── One-shot implementations ────────────────────────────────────────

async fn run_once(service: &SeismicService, force: bool) -> common::Result<()> {
    let (events, stale) = if force {
        (service.refresh(FeedKind::Felt).await?, false)
    } else {
        let snapshot = service.get_events(FeedKind::Felt).await?;
        (snapshot.events, snapshot.stale)
    };

    info!(
        "Felt feed: {} events, fetched_at={}{}",
        events.len(),
        fmt_time(service.last_fetched_at(FeedKind::Felt).await),
        if stale { " (stale)" } else { "" }
    );
    for event in &events {
        log_event_row(service, event);
    }
    Ok(())
}

async fn run_nearby(
    service: &SeismicService,
    origin: Coordinate,
    opts: NearbyOptions,
) -> common::Result<()> {
    match service.describe_location(origin).await {
        Ok(details) => {
            info!("Location {}: {}", origin, details.description);
            info!(
                "  province={} nearest={}{}",
                details.province.as_deref().unwrap_or("?"),
                details.nearest_city.as_deref().unwrap_or("?"),
                details
                    .city_distance_km
                    .map(|d| format!(" ({d:.0} km)"))
                    .unwrap_or_default()
            );
        }
        Err(e) => warn!("No location details for {}: {}", origin, e),
    }

    let matches = service.nearby(origin, opts).await?;
    if matches.is_empty() {
        info!("No recent events near {}", origin);
        return Ok(());
    }

    info!("{} recent events near {}:", matches.len(), origin);
    for m in &matches {
        info!("  {:>6.1} km away", m.distance_km);
        log_event_row(service, &m.event);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coordinate() {
        assert_eq!(
            parse_coordinate("-6.2088, 106.8456"),
            Ok(Coordinate::new(-6.2088, 106.8456))
        );
        assert!(parse_coordinate("-6.2").is_err());
        assert!(parse_coordinate("north,east").is_err());
        assert!(parse_coordinate("95,10").is_err());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from(["quake-watch", "--once", "--force"]).expect("parses");
        assert!(cli.once && cli.force);

        let cli = Cli::try_parse_from(["quake-watch", "--nearby", "-2.5,118.0", "--radius-km", "50"])
            .expect("parses");
        assert_eq!(cli.nearby, Some(Coordinate::new(-2.5, 118.0)));
        assert_eq!(cli.radius_km, Some(50.0));

        assert!(Cli::try_parse_from(["quake-watch", "--force"]).is_err());
    }
}
