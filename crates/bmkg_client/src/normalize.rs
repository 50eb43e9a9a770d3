//! Field parsers for the primary feed's locale-specific encodings.
//!
//! Every parser returns `None` on malformed input; the caller turns that
//! into a dropped record.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use common::Coordinate;
use serde_json::Value;

/// Combined ISO-8601 timestamp (`2023-06-20T05:34:56+00:00`).
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Split date (`20 Jun 2023`, `5 Mei 2024`, `2023-06-20`) plus local
/// time with zone suffix (`12:34:56 WIB`).
pub fn parse_split_datetime(tanggal: &str, jam: &str) -> Option<DateTime<Utc>> {
    let date = parse_date(tanggal)?;
    let (time, offset) = parse_time(jam)?;
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }

    let mut parts = raw.split(|c: char| c.is_whitespace() || c == '-').filter(|p| !p.is_empty());
    let day: u32 = parts.next()?.parse().ok()?;
    let month = month_number(parts.next()?)?;
    let year: i32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Indonesian and English month names or abbreviations.
fn month_number(name: &str) -> Option<u32> {
    let lowered = name.trim_end_matches('.').to_lowercase();
    let prefix: String = lowered.chars().take(3).collect();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" | "peb" => 2,
        "mar" => 3,
        "apr" => 4,
        "mei" | "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "agu" | "agt" | "aug" => 8,
        "sep" => 9,
        "okt" | "oct" => 10,
        "nov" | "nop" => 11,
        "des" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// `HH:MM:SS ZONE` where ZONE is one of the Indonesian time zones or UTC.
/// A missing zone means UTC.
pub fn parse_time(raw: &str) -> Option<(NaiveTime, FixedOffset)> {
    let mut parts = raw.split_whitespace();
    let clock = parts.next()?;
    let time = NaiveTime::parse_from_str(clock, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(clock, "%H:%M"))
        .ok()?;

    let hours = match parts.next().map(|z| z.to_uppercase()) {
        None => 0,
        Some(zone) => match zone.as_str() {
            "WIB" => 7,
            "WITA" => 8,
            "WIT" => 9,
            "UTC" | "GMT" | "Z" => 0,
            _ => return None,
        },
    };
    Some((time, FixedOffset::east_opt(hours * 3600)?))
}

/// Delimited `"lat,lon"` string.
pub fn parse_coordinate_pair(raw: &str) -> Option<Coordinate> {
    let mut parts = raw.split(',');
    let lat = parts.next()?.trim().parse::<f64>().ok()?;
    let lon = parts.next()?.trim().parse::<f64>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(Coordinate::new(lat, lon))
}

/// Latitude with hemisphere suffix: `2.55 LS` (south) or `3.10 LU` (north).
pub fn parse_latitude(raw: &str) -> Option<f64> {
    let (value, hemisphere) = split_hemisphere(raw)?;
    match hemisphere.as_str() {
        "LS" | "S" => Some(-value.abs()),
        "LU" | "N" | "" => Some(value),
        _ => None,
    }
}

/// Longitude with hemisphere suffix: `118.01 BT` (east) or `BB` (west).
pub fn parse_longitude(raw: &str) -> Option<f64> {
    let (value, hemisphere) = split_hemisphere(raw)?;
    match hemisphere.as_str() {
        "BB" | "W" => Some(-value.abs()),
        "BT" | "E" | "" => Some(value),
        _ => None,
    }
}

fn split_hemisphere(raw: &str) -> Option<(f64, String)> {
    let cleaned = raw.replace('°', " ");
    let cleaned = cleaned.trim();
    let split_at = cleaned
        .find(|c: char| c.is_alphabetic())
        .unwrap_or(cleaned.len());
    let value = cleaned[..split_at].trim().parse::<f64>().ok()?;
    let hemisphere = cleaned[split_at..].trim().to_uppercase();
    Some((value, hemisphere))
}

/// Magnitude encoded as a number or a string (`"5.5"`, `"5,5"`).
pub fn parse_magnitude(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    }
}

/// Depth encoded as `"10 km"`, `"10"` or a number.
pub fn parse_depth(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            let end = s
                .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
                .unwrap_or(s.len());
            s[..end].replace(',', ".").parse::<f64>().ok()
        }
        _ => None,
    }
}

/// True when the advisory mentions a tsunami and is not negated.
pub fn parse_tsunami_flag(potensi: &str) -> bool {
    let lowered = potensi.to_lowercase();
    lowered.contains("tsunami") && !lowered.contains("tidak")
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;

    use super::*;

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 6, 20);
        assert_eq!(parse_date("20 Jun 2023"), expected);
        assert_eq!(parse_date("2023-06-20"), expected);
        assert_eq!(parse_date("20-Jun-23"), NaiveDate::from_ymd_opt(23, 6, 20));
        assert_eq!(parse_date("5 Mei 2024"), NaiveDate::from_ymd_opt(2024, 5, 5));
        assert_eq!(parse_date("14 Agu 2024"), NaiveDate::from_ymd_opt(2024, 8, 14));
        assert_eq!(parse_date("1 Okt 2024"), NaiveDate::from_ymd_opt(2024, 10, 1));
        assert_eq!(parse_date("31 Des 2024"), NaiveDate::from_ymd_opt(2024, 12, 31));
        assert_eq!(parse_date("31 Feb 2024"), None);
        assert_eq!(parse_date("kemarin"), None);
    }

    #[test]
    fn test_split_datetime_applies_zone() {
        let wib = parse_split_datetime("20 Jun 2023", "12:34:56 WIB").expect("parses");
        assert_eq!(wib.to_rfc3339(), "2023-06-20T05:34:56+00:00");

        let wita = parse_split_datetime("20 Jun 2023", "12:00:00 WITA").expect("parses");
        assert_eq!(wita.hour(), 4);

        let wit = parse_split_datetime("2023-06-20", "08:00 WIT").expect("parses");
        assert_eq!(wit.to_rfc3339(), "2023-06-19T23:00:00+00:00");

        let bare = parse_split_datetime("2023-06-20", "08:00:00").expect("parses");
        assert_eq!(bare.hour(), 8);

        assert!(parse_split_datetime("20 Jun 2023", "12:34:56 PST").is_none());
        assert!(parse_split_datetime("20 Jun 2023", "noon").is_none());
    }

    #[test]
    fn test_coordinate_encodings() {
        assert_eq!(
            parse_coordinate_pair("-2.5489,118.0149"),
            Some(Coordinate::new(-2.5489, 118.0149))
        );
        assert_eq!(parse_coordinate_pair(" 3.1 , 97.2 "), Some(Coordinate::new(3.1, 97.2)));
        assert_eq!(parse_coordinate_pair("abc"), None);
        assert_eq!(parse_coordinate_pair("1,2,3"), None);

        assert_eq!(parse_latitude("2.55 LS"), Some(-2.55));
        assert_eq!(parse_latitude("3.10 LU"), Some(3.10));
        assert_eq!(parse_latitude("7.2°LS"), Some(-7.2));
        assert_eq!(parse_longitude("118.01 BT"), Some(118.01));
        assert_eq!(parse_longitude("10.5 BB"), Some(-10.5));
        assert_eq!(parse_longitude("118.01 XX"), None);
    }

    #[test]
    fn test_magnitude_and_depth_encodings() {
        assert_eq!(parse_magnitude(&Value::from("5.5")), Some(5.5));
        assert_eq!(parse_magnitude(&Value::from("4,8")), Some(4.8));
        assert_eq!(parse_magnitude(&serde_json::json!(6.1)), Some(6.1));
        assert_eq!(parse_magnitude(&Value::from("big")), None);
        assert_eq!(parse_magnitude(&Value::Null), None);

        assert_eq!(parse_depth(&Value::from("10 km")), Some(10.0));
        assert_eq!(parse_depth(&Value::from("112km")), Some(112.0));
        assert_eq!(parse_depth(&serde_json::json!(33)), Some(33.0));
        assert_eq!(parse_depth(&Value::from("dangkal")), None);
    }

    #[test]
    fn test_tsunami_flag() {
        assert!(!parse_tsunami_flag("Tidak berpotensi tsunami"));
        assert!(parse_tsunami_flag("Berpotensi TSUNAMI"));
        assert!(!parse_tsunami_flag("Gempa ini dirasakan untuk diteruskan pada masyarakat"));
    }
}
