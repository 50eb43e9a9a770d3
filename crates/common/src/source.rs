//! The seam between the feed client and the upstream data providers.

use std::fmt;

use async_trait::async_trait;

use crate::types::{Coordinate, FeedKind, Place, SeismicEvent};
use crate::Error;

/// An upstream event provider with its own schema and normalizer.
///
/// Implementations return `Error::Network` for transport failures and
/// `Error::Parse` when the response shape is unrecognized. Individual
/// malformed records are dropped, not reported.
#[async_trait]
pub trait FeedSource: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn fetch_events(&self, kind: FeedKind) -> Result<Vec<SeismicEvent>, Error>;
}

/// Reverse and forward geocoding for location details.
#[async_trait]
pub trait Geocoder: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Address of the area around `point`.
    async fn reverse(&self, point: Coordinate) -> Result<Place, Error>;

    /// Coordinates of a named locality, `Ok(None)` when nothing matches.
    async fn locate(&self, name: &str) -> Result<Option<Coordinate>, Error>;
}
