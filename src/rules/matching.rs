use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::utils::geo::GeoPoint;

pub const DEFAULT_SEARCH_RADIUS_KM: f64 = 5.0;
/// Assumed average approach speed (30 km/h)
pub const APPROACH_KM_PER_MINUTE: f64 = 0.5;

/// A driver with no accepted or started trip
#[derive(Debug, Clone)]
pub struct Candidate {
    pub driver_id: Uuid,
    pub license_number: String,
    pub phone_number: Option<String>,
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyDriver {
    pub driver_id: Uuid,
    pub license_number: String,
    pub phone_number: Option<String>,
    pub distance_km: f64,
    pub estimated_arrival_minutes: i64,
}

pub fn validate_radius(radius_km: Option<f64>) -> AppResult<f64> {
    let radius = radius_km.unwrap_or(DEFAULT_SEARCH_RADIUS_KM);
    if !radius.is_finite() || radius <= 0.0 {
        return Err(AppError::BadRequest("radius must be a positive number".to_string()));
    }
    Ok(radius)
}

pub fn eta_minutes(distance_km: f64) -> i64 {
    (distance_km / APPROACH_KM_PER_MINUTE).ceil() as i64
}

/// Candidates within `radius_km` of the pickup, nearest first.
/// Drivers that never reported a location cannot be ranked and are skipped.
pub fn rank_nearby(
    pickup: GeoPoint,
    radius_km: f64,
    candidates: impl IntoIterator<Item = Candidate>,
) -> Vec<NearbyDriver> {
    let mut nearby: Vec<NearbyDriver> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let distance_km = pickup.distance_km(&candidate.location?);
            (distance_km <= radius_km).then(|| NearbyDriver {
                driver_id: candidate.driver_id,
                license_number: candidate.license_number,
                phone_number: candidate.phone_number,
                distance_km: (distance_km * 100.0).round() / 100.0,
                estimated_arrival_minutes: eta_minutes(distance_km),
            })
        })
        .collect();

    nearby.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    nearby
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(lat: f64, lng: f64) -> Candidate {
        Candidate {
            driver_id: Uuid::new_v4(),
            license_number: "DL-1".into(),
            phone_number: None,
            location: GeoPoint::new(lat, lng),
        }
    }

    #[test]
    fn test_filters_by_radius_and_sorts_ascending() {
        let pickup = GeoPoint::new(0.0, 0.0).unwrap();
        // 0.01 degrees of longitude at the equator is ~1.11 km, so 0.045 is just past 5 km
        let candidates = vec![
            candidate(0.0, 0.03),
            candidate(0.0, 0.1),
            candidate(0.0, 0.01),
            candidate(0.0, 0.02),
            candidate(0.0, 0.045),
        ];

        let ranked = rank_nearby(pickup, 5.0, candidates);
        assert_eq!(ranked.len(), 3);
        assert!(ranked.iter().all(|d| d.distance_km <= 5.0));
        assert!(ranked.windows(2).all(|w| w[0].distance_km <= w[1].distance_km));
    }

    #[test]
    fn test_drivers_without_location_are_skipped() {
        let pickup = GeoPoint::new(0.0, 0.0).unwrap();
        let mut unknown = candidate(0.0, 0.0);
        unknown.location = None;

        assert!(rank_nearby(pickup, 5.0, vec![unknown]).is_empty());
    }

    #[test]
    fn test_empty_result_is_valid() {
        let pickup = GeoPoint::new(0.0, 0.0).unwrap();
        assert!(rank_nearby(pickup, 5.0, Vec::new()).is_empty());
    }

    #[test]
    fn test_eta_is_two_minutes_per_km_rounded_up() {
        assert_eq!(eta_minutes(0.0), 0);
        assert_eq!(eta_minutes(1.0), 2);
        assert_eq!(eta_minutes(1.2), 3);
        assert_eq!(eta_minutes(4.99), 10);
    }

    #[test]
    fn test_radius_defaults_and_validation() {
        assert_eq!(validate_radius(None).unwrap(), 5.0);
        assert_eq!(validate_radius(Some(2.5)).unwrap(), 2.5);
        assert!(validate_radius(Some(0.0)).is_err());
        assert!(validate_radius(Some(-1.0)).is_err());
    }
}
