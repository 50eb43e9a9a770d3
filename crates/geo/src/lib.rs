//! Geospatial engine and viewport state machine.
//!
//! Nothing here does I/O. Malformed inputs are filtered out of results
//! instead of being raised.

pub mod distance;
pub mod nearby;
pub mod place;
pub mod risk;
pub mod viewport;

pub use distance::{distance_km, haversine_km, within_bounds, BoundingBox, EARTH_RADIUS_KM};
pub use nearby::{nearby_events, NearbyEvent, NearbyQuery};
pub use place::{
    geographic_description, location_details, nearest_locality, province, LocationDetails,
};
pub use risk::{classify_event, classify_risk, magnitude_band, MagnitudeBand, RiskLevel};
pub use viewport::{ContainerSize, FocusState, ViewportCommand, ViewportController, ViewportState};
