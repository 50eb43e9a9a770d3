//! Location details for a selected point: province, nearest locality and
//! a short description of the terrain.

use common::{Coordinate, Place, PlaceAddress};
use serde::Serialize;

use crate::distance::distance_km;

/// What the detail view shows for a selected point.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationDetails {
    pub coordinate: Coordinate,
    pub province: Option<String>,
    pub nearest_city: Option<String>,
    /// Rounded to whole kilometres.
    pub city_distance_km: Option<f64>,
    pub description: String,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn first_present<'a>(values: &[&'a Option<String>]) -> Option<&'a str> {
    values.iter().copied().find_map(present)
}

/// State, else province, else region.
pub fn province(address: &PlaceAddress) -> Option<&str> {
    first_present(&[&address.state, &address.province, &address.region])
}

/// Most specific named settlement: city, town, village, then hamlet.
pub fn nearest_locality(address: &PlaceAddress) -> Option<&str> {
    first_present(&[&address.city, &address.town, &address.village, &address.hamlet])
}

/// One-line description of the area, most distinctive feature first:
/// water, island, mountain, volcano, then administrative area.
pub fn geographic_description(place: &Place) -> String {
    let display_name = present(&place.display_name);
    let Some(address) = place.address.as_ref() else {
        return match display_name {
            Some(name) => format!("Area: {name}"),
            None => "No geographic information available".to_string(),
        };
    };

    let state = present(&address.state);
    if let Some(water) = first_present(&[&address.sea, &address.ocean]) {
        format!("Waters of {water}")
    } else if let Some(island) = present(&address.island) {
        match state {
            Some(state) => format!("{island} island, {state}"),
            None => format!("{island} island"),
        }
    } else if let Some(mountain) = first_present(&[&address.mountain, &address.peak]) {
        format!("Mountain area of {mountain}")
    } else if let Some(volcano) = present(&address.volcano) {
        format!("Near the volcano {volcano}")
    } else if let Some(state) = state {
        match present(&address.city) {
            Some(city) => format!("{state}, near {city}"),
            None => state.to_string(),
        }
    } else if let Some(area) = first_present(&[&address.county, &address.district]) {
        format!("{area} area")
    } else {
        display_name
            .unwrap_or("Area not specifically identified")
            .to_string()
    }
}

/// Combine a reverse lookup with the located nearest city.
///
/// `city_at` is where the nearest locality was found, if it was.
pub fn location_details(
    point: Coordinate,
    place: &Place,
    city_at: Option<Coordinate>,
) -> LocationDetails {
    let address = place.address.as_ref();
    let nearest_city = address.and_then(nearest_locality).map(str::to_string);
    let city_distance_km = nearest_city
        .as_ref()
        .and(city_at)
        .filter(|c| c.is_valid() && point.is_valid())
        .map(|c| distance_km(point, c).round());

    LocationDetails {
        coordinate: point,
        province: address.and_then(province).map(str::to_string),
        nearest_city,
        city_distance_km,
        description: geographic_description(place),
    }
}
