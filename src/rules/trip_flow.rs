use chrono::{DateTime, FixedOffset};
use uuid::Uuid;

use crate::entities::trip::{self, TripStatus};
use crate::error::{AppError, AppResult};
use crate::utils::geo::{fare_for_distance, GeoPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripAction {
    Accept,
    Start,
    Complete,
    Cancel,
}

impl TripAction {
    /// Statuses the action may be applied to
    pub fn allowed_from(self) -> &'static [TripStatus] {
        match self {
            TripAction::Accept => &[TripStatus::Requested],
            TripAction::Start => &[TripStatus::Accepted],
            TripAction::Complete => &[TripStatus::Started],
            TripAction::Cancel => &[
                TripStatus::Requested,
                TripStatus::Accepted,
                TripStatus::Started,
            ],
        }
    }

    pub fn target(self) -> TripStatus {
        match self {
            TripAction::Accept => TripStatus::Accepted,
            TripAction::Start => TripStatus::Started,
            TripAction::Complete => TripStatus::Completed,
            TripAction::Cancel => TripStatus::Cancelled,
        }
    }

    /// Next status, or `InvalidState` when `from` does not permit the action
    pub fn transition(self, from: TripStatus) -> AppResult<TripStatus> {
        if self.allowed_from().contains(&from) {
            Ok(self.target())
        } else {
            Err(self.invalid_state())
        }
    }

    pub fn invalid_state(self) -> AppError {
        let message = match self {
            TripAction::Accept => "Trip is not available for acceptance",
            TripAction::Start => "Trip must be accepted before it can be started",
            TripAction::Complete => "Trip must be started before it can be completed",
            TripAction::Cancel => "Trip cannot be cancelled in its current status",
        };
        AppError::InvalidState(message.to_string())
    }
}

/// Role check for actions on an existing trip.
///
/// Accept is not covered here: any driver may accept a requested trip, which
/// the caller establishes by loading the driver record.
pub fn authorize(trip: &trip::Model, caller: Uuid, action: TripAction) -> AppResult<()> {
    let is_driver = trip.driver_id == Some(caller);
    let is_passenger = trip.passenger_id == caller;

    match action {
        TripAction::Accept => Ok(()),
        TripAction::Start if !is_driver => Err(AppError::Forbidden(
            "Only the assigned driver can start the trip".to_string(),
        )),
        TripAction::Complete if !is_driver => Err(AppError::Forbidden(
            "Only the assigned driver can complete the trip".to_string(),
        )),
        TripAction::Cancel if !is_driver && !is_passenger => Err(AppError::Forbidden(
            "Not authorized to cancel this trip".to_string(),
        )),
        _ => Ok(()),
    }
}

pub fn is_participant(trip: &trip::Model, caller: Uuid) -> bool {
    trip.passenger_id == caller || trip.driver_id == Some(caller)
}

/// A requested trip has no driver; accepted, started and completed trips do.
/// Cancelled trips keep whatever assignment they had.
pub fn driver_assignment_consistent(status: TripStatus, driver_id: Option<Uuid>) -> bool {
    match status {
        TripStatus::Requested => driver_id.is_none(),
        TripStatus::Accepted | TripStatus::Started | TripStatus::Completed => driver_id.is_some(),
        TripStatus::Cancelled => true,
    }
}

/// Optional pickup/dropoff coordinates supplied with a trip request
#[derive(Debug, Default, Clone, Copy)]
pub struct RouteCoordinates {
    pub pickup_lat: Option<f64>,
    pub pickup_lng: Option<f64>,
    pub dropoff_lat: Option<f64>,
    pub dropoff_lng: Option<f64>,
}

impl RouteCoordinates {
    /// Both endpoints, when all four values are present
    pub fn endpoints(&self) -> AppResult<Option<(GeoPoint, GeoPoint)>> {
        let (Some(plat), Some(plng), Some(dlat), Some(dlng)) = (
            self.pickup_lat,
            self.pickup_lng,
            self.dropoff_lat,
            self.dropoff_lng,
        ) else {
            return Ok(None);
        };

        let pickup = GeoPoint::new(plat, plng)
            .ok_or_else(|| AppError::BadRequest("Invalid pickup coordinates".to_string()))?;
        let dropoff = GeoPoint::new(dlat, dlng)
            .ok_or_else(|| AppError::BadRequest("Invalid dropoff coordinates".to_string()))?;
        Ok(Some((pickup, dropoff)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TripPlan {
    pub pickup_location: String,
    pub dropoff_location: String,
    pub distance_km: Option<f64>,
    pub fare: f64,
}

/// Validate a trip request and price it
pub fn plan_trip(
    pickup_location: &str,
    dropoff_location: &str,
    coordinates: &RouteCoordinates,
) -> AppResult<TripPlan> {
    let pickup_location = pickup_location.trim();
    let dropoff_location = dropoff_location.trim();
    if pickup_location.is_empty() || dropoff_location.is_empty() {
        return Err(AppError::BadRequest(
            "Pickup and dropoff locations are required".to_string(),
        ));
    }

    let distance_km = coordinates
        .endpoints()?
        .map(|(pickup, dropoff)| pickup.distance_km(&dropoff));

    Ok(TripPlan {
        pickup_location: pickup_location.to_string(),
        dropoff_location: dropoff_location.to_string(),
        distance_km,
        fare: fare_for_distance(distance_km),
    })
}

/// Final distance and fare for a completed trip, preferring measured values
pub fn settle(
    trip: &trip::Model,
    actual_distance: Option<f64>,
    actual_fare: Option<f64>,
) -> AppResult<(Option<f64>, f64)> {
    if actual_distance.is_some_and(|d| !d.is_finite() || d < 0.0) {
        return Err(AppError::BadRequest(
            "actual_distance must be a non-negative number".to_string(),
        ));
    }
    if actual_fare.is_some_and(|f| !f.is_finite() || f < 0.0) {
        return Err(AppError::BadRequest(
            "actual_fare must be a non-negative number".to_string(),
        ));
    }

    Ok((
        actual_distance.or(trip.distance),
        actual_fare.unwrap_or(trip.fare),
    ))
}

pub fn duration_seconds(
    start: Option<DateTime<FixedOffset>>,
    end: DateTime<FixedOffset>,
) -> Option<i64> {
    start.map(|start| (end - start).num_seconds().max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn trip(status: TripStatus, driver_id: Option<Uuid>) -> trip::Model {
        trip::Model {
            id: Uuid::new_v4(),
            passenger_id: Uuid::new_v4(),
            driver_id,
            pickup_location: "A".into(),
            dropoff_location: "B".into(),
            pickup_lat: None,
            pickup_lng: None,
            dropoff_lat: None,
            dropoff_lng: None,
            fare: 15.0,
            distance: None,
            duration_seconds: None,
            status,
            cancellation_reason: None,
            start_time: None,
            end_time: None,
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut status = TripStatus::Requested;
        for action in [TripAction::Accept, TripAction::Start, TripAction::Complete] {
            status = action.transition(status).unwrap();
        }
        assert_eq!(status, TripStatus::Completed);
    }

    #[test]
    fn test_cancel_from_every_non_terminal_status() {
        for from in [TripStatus::Requested, TripStatus::Accepted, TripStatus::Started] {
            assert_eq!(
                TripAction::Cancel.transition(from).unwrap(),
                TripStatus::Cancelled
            );
        }
    }

    #[test]
    fn test_terminal_statuses_reject_everything() {
        for from in [TripStatus::Completed, TripStatus::Cancelled] {
            for action in [
                TripAction::Accept,
                TripAction::Start,
                TripAction::Complete,
                TripAction::Cancel,
            ] {
                let err = action.transition(from).unwrap_err();
                assert!(matches!(err, AppError::InvalidState(_)), "{:?} from {:?}", action, from);
            }
        }
    }

    #[test]
    fn test_no_skipping_steps() {
        assert!(TripAction::Start.transition(TripStatus::Requested).is_err());
        assert!(TripAction::Complete.transition(TripStatus::Accepted).is_err());
        assert!(TripAction::Accept.transition(TripStatus::Accepted).is_err());
    }

    #[test]
    fn test_only_assigned_driver_starts_and_completes() {
        let driver = Uuid::new_v4();
        let t = trip(TripStatus::Accepted, Some(driver));

        assert!(authorize(&t, driver, TripAction::Start).is_ok());
        assert!(matches!(
            authorize(&t, Uuid::new_v4(), TripAction::Start),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            authorize(&t, t.passenger_id, TripAction::Complete),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_either_party_may_cancel() {
        let driver = Uuid::new_v4();
        let t = trip(TripStatus::Accepted, Some(driver));

        assert!(authorize(&t, driver, TripAction::Cancel).is_ok());
        assert!(authorize(&t, t.passenger_id, TripAction::Cancel).is_ok());
        assert!(authorize(&t, Uuid::new_v4(), TripAction::Cancel).is_err());
    }

    #[test]
    fn test_driver_assignment_invariant() {
        let driver = Some(Uuid::new_v4());
        assert!(driver_assignment_consistent(TripStatus::Requested, None));
        assert!(!driver_assignment_consistent(TripStatus::Requested, driver));
        assert!(driver_assignment_consistent(TripStatus::Accepted, driver));
        assert!(!driver_assignment_consistent(TripStatus::Started, None));
        assert!(driver_assignment_consistent(TripStatus::Cancelled, None));
        assert!(driver_assignment_consistent(TripStatus::Cancelled, driver));
    }

    #[test]
    fn test_plan_without_coordinates_uses_default_fare() {
        let plan = plan_trip("Home", "Office", &RouteCoordinates::default()).unwrap();
        assert_eq!(plan.fare, 15.0);
        assert_eq!(plan.distance_km, None);
    }

    #[test]
    fn test_plan_with_partial_coordinates_uses_default_fare() {
        let coordinates = RouteCoordinates {
            pickup_lat: Some(0.0),
            pickup_lng: Some(0.0),
            dropoff_lat: Some(0.0),
            dropoff_lng: None,
        };
        let plan = plan_trip("Home", "Office", &coordinates).unwrap();
        assert_eq!(plan.fare, 15.0);
    }

    #[test]
    fn test_plan_with_coordinates_prices_distance() {
        let coordinates = RouteCoordinates {
            pickup_lat: Some(0.0),
            pickup_lng: Some(0.0),
            dropoff_lat: Some(0.0),
            dropoff_lng: Some(1.0),
        };
        let plan = plan_trip(" Home ", "Office", &coordinates).unwrap();
        let distance = plan.distance_km.unwrap();
        assert!((distance - 111.19).abs() < 0.1);
        assert!((plan.fare - (5.0 + distance * 2.5)).abs() < 1e-9);
        assert_eq!(plan.pickup_location, "Home");
    }

    #[test]
    fn test_plan_requires_locations() {
        let err = plan_trip("  ", "Office", &RouteCoordinates::default()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_settle_prefers_actual_values() {
        let mut t = trip(TripStatus::Started, Some(Uuid::new_v4()));
        t.distance = Some(4.0);
        t.fare = 15.0;

        assert_eq!(settle(&t, None, None).unwrap(), (Some(4.0), 15.0));
        assert_eq!(settle(&t, Some(6.5), Some(21.25)).unwrap(), (Some(6.5), 21.25));
        assert!(settle(&t, Some(-1.0), None).is_err());
    }

    #[test]
    fn test_duration_from_start_to_end() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 1, 10, 25, 30).unwrap();
        assert_eq!(duration_seconds(Some(start.into()), end.into()), Some(1530));
        assert_eq!(duration_seconds(None, end.into()), None);
    }
}
