//! Display heuristics: risk ladder and magnitude colour bands.
//!
//! These drive badges and legends only. They are not a hazard model.

use std::fmt;

use common::SeismicEvent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskLevel {
    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::VeryHigh => "very high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Deterministic risk ladder over magnitude and depth.
///
/// Unknown depth counts as 0 km (shallow). A non-finite magnitude is Low.
pub fn classify_risk(magnitude: f64, depth_km: Option<f64>) -> RiskLevel {
    if !magnitude.is_finite() {
        return RiskLevel::Low;
    }
    let depth = depth_km.filter(|d| d.is_finite()).unwrap_or(0.0);

    if magnitude >= 7.0 {
        RiskLevel::VeryHigh
    } else if magnitude >= 6.0 || (magnitude >= 5.0 && depth < 60.0) {
        RiskLevel::High
    } else if magnitude >= 5.0 || (magnitude >= 4.0 && depth < 30.0) {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// `classify_risk` for a whole event.
pub fn classify_event(event: &SeismicEvent) -> RiskLevel {
    classify_risk(event.magnitude, event.depth_km)
}

/// Colour band used by map markers, table badges and the legend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MagnitudeBand {
    Blue,
    Green,
    Yellow,
    Orange,
    Red,
}

impl MagnitudeBand {
    /// Legend caption for the band.
    pub fn legend(&self) -> &'static str {
        match self {
            MagnitudeBand::Red => "7.0+",
            MagnitudeBand::Orange => "6.0-6.9",
            MagnitudeBand::Yellow => "5.5-5.9",
            MagnitudeBand::Green => "4.5-5.4",
            MagnitudeBand::Blue => "< 4.5",
        }
    }
}

pub fn magnitude_band(magnitude: f64) -> MagnitudeBand {
    if magnitude >= 7.0 {
        MagnitudeBand::Red
    } else if magnitude >= 6.0 {
        MagnitudeBand::Orange
    } else if magnitude >= 5.5 {
        MagnitudeBand::Yellow
    } else if magnitude >= 4.5 {
        MagnitudeBand::Green
    } else {
        MagnitudeBand::Blue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_ladder_points() {
        assert_eq!(classify_risk(7.5, Some(10.0)), RiskLevel::VeryHigh);
        assert_eq!(classify_risk(4.0, Some(50.0)), RiskLevel::Low);
        assert_eq!(classify_risk(6.2, Some(40.0)), RiskLevel::High);
    }

    #[test]
    fn test_depth_moves_moderate_events() {
        assert_eq!(classify_risk(5.2, Some(59.9)), RiskLevel::High);
        assert_eq!(classify_risk(5.2, Some(60.0)), RiskLevel::Medium);
        assert_eq!(classify_risk(4.3, Some(29.0)), RiskLevel::Medium);
        assert_eq!(classify_risk(4.3, Some(30.0)), RiskLevel::Low);
        assert_eq!(classify_risk(3.9, Some(1.0)), RiskLevel::Low);
    }

    #[test]
    fn test_unknown_depth_is_shallow() {
        assert_eq!(classify_risk(5.0, None), RiskLevel::High);
        assert_eq!(classify_risk(4.0, None), RiskLevel::Medium);
        assert_eq!(classify_risk(4.0, Some(f64::NAN)), RiskLevel::Medium);
    }

    #[test]
    fn test_nan_magnitude_is_low() {
        assert_eq!(classify_risk(f64::NAN, Some(5.0)), RiskLevel::Low);
    }

    #[test]
    fn test_levels_are_ordered() {
        assert!(RiskLevel::VeryHigh > RiskLevel::High);
        assert!(RiskLevel::Medium > RiskLevel::Low);
    }

    #[test]
    fn test_magnitude_bands() {
        assert_eq!(magnitude_band(7.0), MagnitudeBand::Red);
        assert_eq!(magnitude_band(6.5), MagnitudeBand::Orange);
        assert_eq!(magnitude_band(5.5), MagnitudeBand::Yellow);
        assert_eq!(magnitude_band(4.5), MagnitudeBand::Green);
        assert_eq!(magnitude_band(3.1), MagnitudeBand::Blue);
        assert_eq!(magnitude_band(5.4).legend(), "4.5-5.4");
    }
}
