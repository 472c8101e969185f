use chrono::{DateTime, Duration, Utc};

use crate::error::{AppError, AppResult};
use crate::utils::geo::GeoPoint;

/// Fixes reported with a worse accuracy (meters) are refused
pub const MAX_ACCURACY_M: f64 = 100.0;
pub const JUMP_WINDOW_SECS: i64 = 60;
pub const JUMP_DISTANCE_M: f64 = 2000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationSample {
    pub point: GeoPoint,
    pub accuracy_m: f64,
}

impl LocationSample {
    pub fn parse(
        latitude: Option<f64>,
        longitude: Option<f64>,
        accuracy: Option<f64>,
    ) -> AppResult<Self> {
        let (Some(latitude), Some(longitude), Some(accuracy)) = (latitude, longitude, accuracy)
        else {
            return Err(AppError::BadRequest(
                "latitude, longitude, and accuracy are required and must be numbers".to_string(),
            ));
        };

        if !accuracy.is_finite() || accuracy < 0.0 {
            return Err(AppError::BadRequest(
                "accuracy must be a non-negative number".to_string(),
            ));
        }
        if accuracy > MAX_ACCURACY_M {
            return Err(AppError::BadRequest("Location accuracy too low".to_string()));
        }

        let point = GeoPoint::new(latitude, longitude).ok_or_else(|| {
            AppError::BadRequest("latitude or longitude out of range".to_string())
        })?;

        Ok(Self {
            point,
            accuracy_m: accuracy,
        })
    }
}

/// Last position stored for a driver
#[derive(Debug, Clone, Copy)]
pub struct LastFix {
    pub point: GeoPoint,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl LastFix {
    /// `None` when nothing usable is stored
    pub fn from_stored(location: Option<&str>, recorded_at: Option<DateTime<Utc>>) -> Option<Self> {
        let point = location?.parse().ok()?;
        Some(Self { point, recorded_at })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JumpAssessment {
    pub suspicious: bool,
    pub distance_m: Option<f64>,
    pub elapsed: Option<Duration>,
}

/// Flags a fix that lies more than 2 km from the previous one reported less
/// than a minute earlier. Flagged fixes are still stored.
pub fn assess_jump(last: Option<&LastFix>, next: GeoPoint, now: DateTime<Utc>) -> JumpAssessment {
    let Some(last) = last else {
        return JumpAssessment {
            suspicious: false,
            distance_m: None,
            elapsed: None,
        };
    };

    let distance_m = last.point.distance_m(&next);
    let elapsed = last.recorded_at.map(|at| now - at);
    let window = Duration::seconds(JUMP_WINDOW_SECS);
    let suspicious = elapsed.is_some_and(|elapsed| elapsed < window) && distance_m > JUMP_DISTANCE_M;

    JumpAssessment {
        suspicious,
        distance_m: Some(distance_m),
        elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn point(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint::new(lat, lng).unwrap()
    }

    fn last_fix_at(t: DateTime<Utc>) -> LastFix {
        LastFix {
            point: point(10.0, 10.0),
            recorded_at: Some(t),
        }
    }

    #[test]
    fn test_far_jump_within_a_minute_is_suspicious() {
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let last = last_fix_at(t);

        let assessment = assess_jump(Some(&last), point(10.02, 10.02), t + Duration::seconds(30));
        assert!(assessment.suspicious);
        assert!(assessment.distance_m.unwrap() > 3000.0);
    }

    #[test]
    fn test_same_jump_after_two_minutes_is_fine() {
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let last = last_fix_at(t);

        let assessment = assess_jump(Some(&last), point(10.02, 10.02), t + Duration::seconds(120));
        assert!(!assessment.suspicious);
    }

    #[test]
    fn test_short_hop_within_a_minute_is_fine() {
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let last = last_fix_at(t);

        let assessment = assess_jump(Some(&last), point(10.001, 10.001), t + Duration::seconds(5));
        assert!(!assessment.suspicious);
    }

    #[test]
    fn test_first_fix_and_missing_timestamp_are_not_suspicious() {
        let now = Utc::now();
        assert!(!assess_jump(None, point(10.02, 10.02), now).suspicious);

        let untimed = LastFix {
            point: point(10.0, 10.0),
            recorded_at: None,
        };
        assert!(!assess_jump(Some(&untimed), point(40.0, 40.0), now).suspicious);
    }

    #[test]
    fn test_low_accuracy_is_rejected_outright() {
        let err = LocationSample::parse(Some(10.0), Some(10.0), Some(150.0)).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m == "Location accuracy too low"));

        // even when the coordinates are bogus too
        assert!(LocationSample::parse(Some(999.0), None, Some(150.0)).is_err());
    }

    #[test]
    fn test_sample_requires_all_fields() {
        assert!(LocationSample::parse(None, Some(10.0), Some(5.0)).is_err());
        assert!(LocationSample::parse(Some(10.0), Some(10.0), None).is_err());

        let sample = LocationSample::parse(Some(10.0), Some(10.0), Some(100.0)).unwrap();
        assert_eq!(sample.point, point(10.0, 10.0));
    }

    #[test]
    fn test_stored_fix_parsing() {
        let fix = LastFix::from_stored(Some("10,10"), None).unwrap();
        assert_eq!(fix.point, point(10.0, 10.0));
        assert!(LastFix::from_stored(Some("garbage"), None).is_none());
        assert!(LastFix::from_stored(None, Some(Utc::now())).is_none());
    }
}
