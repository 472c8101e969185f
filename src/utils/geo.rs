use std::fmt;
use std::str::FromStr;

use serde::Serialize;

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

pub const BASE_FARE: f64 = 5.0;
pub const PER_KM_RATE: f64 = 2.5;
/// Charged when the route length is unknown
pub const DEFAULT_FARE: f64 = 15.0;

fn central_angle(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Calculate distance between two coordinates using Haversine formula
/// Returns distance in kilometers
pub fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    EARTH_RADIUS_KM * central_angle(lat1, lng1, lat2, lng2)
}

/// Same as [`haversine_distance`] but in meters, used by location fraud checks
pub fn haversine_distance_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    EARTH_RADIUS_M * central_angle(lat1, lng1, lat2, lng2)
}

/// Base fare plus a per-kilometer rate
pub fn estimate_fare(distance_km: f64) -> f64 {
    BASE_FARE + distance_km * PER_KM_RATE
}

pub fn fare_for_distance(distance_km: Option<f64>) -> f64 {
    distance_km.map(estimate_fare).unwrap_or(DEFAULT_FARE)
}

/// A WGS84 position. Persisted as `"lat,lng"` text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self { latitude, longitude })
    }

    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_distance(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        haversine_distance_m(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

impl FromStr for GeoPoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| format!("Invalid location '{}'", s))?;
        let lat: f64 = lat.trim().parse().map_err(|_| format!("Invalid latitude in '{}'", s))?;
        let lng: f64 = lng.trim().parse().map_err(|_| format!("Invalid longitude in '{}'", s))?;
        GeoPoint::new(lat, lng).ok_or_else(|| format!("Location out of range '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_degree_of_longitude_at_equator() {
        let distance = haversine_distance(0.0, 0.0, 0.0, 1.0);
        assert!((distance - 111.2).abs() / 111.2 < 0.01, "got {}", distance);
    }

    #[test]
    fn test_meters_variant_matches_kilometers() {
        let km = haversine_distance(10.0, 10.0, 10.02, 10.02);
        let m = haversine_distance_m(10.0, 10.0, 10.02, 10.02);
        assert!((km * 1000.0 - m).abs() < 1e-6);
        // roughly 3.1 km apart
        assert!(m > 3000.0 && m < 3200.0, "got {}", m);
    }

    #[test]
    fn test_fare_estimates() {
        assert_eq!(estimate_fare(0.0), 5.0);
        assert_eq!(estimate_fare(10.0), 30.0);
        assert_eq!(fare_for_distance(None), 15.0);
        assert_eq!(fare_for_distance(Some(2.0)), 10.0);
    }

    #[test]
    fn test_geo_point_text_round_trip() {
        let point: GeoPoint = "10.5, -20.25".parse().unwrap();
        assert_eq!(point, GeoPoint { latitude: 10.5, longitude: -20.25 });
        assert_eq!(point.to_string(), "10.5,-20.25");

        assert!("10.5".parse::<GeoPoint>().is_err());
        assert!("abc,1".parse::<GeoPoint>().is_err());
        assert!("91,0".parse::<GeoPoint>().is_err());
    }
}
