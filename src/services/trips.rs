use chrono::Utc;
use sea_orm::{
    prelude::DateTimeWithTimeZone, sea_query::SelectStatement, ActiveModelTrait, ColumnTrait,
    DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, QueryTrait, Select, Set,
    TransactionTrait,
};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::trip::{self, TripStatus};
use crate::entities::{driver, passenger, rating, user};
use crate::error::{AppError, AppResult};
use crate::rules::matching::{self, Candidate, NearbyDriver};
use crate::rules::trip_flow::{self, RouteCoordinates, TripAction};
use crate::utils::geo::GeoPoint;

#[derive(Debug, Clone)]
pub struct NewTrip {
    pub pickup_location: String,
    pub dropoff_location: String,
    pub coordinates: RouteCoordinates,
}

#[derive(Debug, Serialize)]
pub struct TripCreated {
    pub trip_id: Uuid,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub estimated_fare: f64,
    pub distance: Option<f64>,
    pub status: TripStatus,
}

#[derive(Debug, Serialize)]
pub struct PartyInfo {
    pub id: Uuid,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AssignedDriver {
    pub id: Uuid,
    pub license: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TripDetail {
    pub trip_id: Uuid,
    pub passenger: PartyInfo,
    pub driver: Option<AssignedDriver>,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub start_time: Option<DateTimeWithTimeZone>,
    pub end_time: Option<DateTimeWithTimeZone>,
    pub fare: f64,
    pub distance: Option<f64>,
    pub duration_seconds: Option<i64>,
    pub status: TripStatus,
    pub cancellation_reason: Option<String>,
}

/// Outcome of accept/start
#[derive(Debug, Serialize)]
pub struct TripTransition {
    pub trip_id: Uuid,
    pub status: TripStatus,
    pub driver_id: Option<Uuid>,
    pub start_time: Option<DateTimeWithTimeZone>,
}

#[derive(Debug, Serialize)]
pub struct CompletedTrip {
    pub trip_id: Uuid,
    pub final_fare: f64,
    pub final_distance: Option<f64>,
    pub duration_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CancelledTrip {
    pub trip_id: Uuid,
    pub status: TripStatus,
    pub cancellation_reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NearbyDrivers {
    pub location: GeoPoint,
    pub search_radius_km: f64,
    pub available_drivers: Vec<NearbyDriver>,
    pub total_count: usize,
}

#[derive(Debug, Clone)]
pub struct NewRating {
    pub score: Option<i16>,
    pub comment: Option<String>,
}

/// Ids of drivers holding an accepted or started trip
pub(crate) fn active_driver_ids() -> SelectStatement {
    trip::Entity::find()
        .select_only()
        .column(trip::Column::DriverId)
        .filter(trip::Column::Status.is_in(TripStatus::ACTIVE))
        .filter(trip::Column::DriverId.is_not_null())
        .into_query()
}

async fn find_trip(db: &DatabaseConnection, trip_id: Uuid) -> AppResult<trip::Model> {
    trip::Entity::find_by_id(trip_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Trip not found".to_string()))
}

/// Create a trip request on behalf of a passenger
pub async fn create(db: &DatabaseConnection, caller: Uuid, request: NewTrip) -> AppResult<TripCreated> {
    let plan = trip_flow::plan_trip(
        &request.pickup_location,
        &request.dropoff_location,
        &request.coordinates,
    )?;

    passenger::Entity::find_by_id(caller)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Forbidden("Only passengers can create trip requests".to_string()))?;

    // Coordinates are kept only when the route could be priced from them
    let endpoints = request.coordinates.endpoints()?;
    let (pickup, dropoff) = match endpoints {
        Some((pickup, dropoff)) => (Some(pickup), Some(dropoff)),
        None => (None, None),
    };

    let new_trip = trip::ActiveModel {
        id: Set(Uuid::new_v4()),
        passenger_id: Set(caller),
        driver_id: Set(None),
        pickup_location: Set(plan.pickup_location),
        dropoff_location: Set(plan.dropoff_location),
        pickup_lat: Set(pickup.map(|p| p.latitude)),
        pickup_lng: Set(pickup.map(|p| p.longitude)),
        dropoff_lat: Set(dropoff.map(|p| p.latitude)),
        dropoff_lng: Set(dropoff.map(|p| p.longitude)),
        fare: Set(plan.fare),
        distance: Set(plan.distance_km),
        status: Set(TripStatus::Requested),
        created_at: Set(Utc::now().into()),
        ..Default::default()
    };
    let trip = new_trip.insert(db).await?;

    tracing::info!(trip_id = %trip.id, passenger_id = %caller, fare = trip.fare, "Trip requested");

    Ok(TripCreated {
        trip_id: trip.id,
        pickup_location: trip.pickup_location,
        dropoff_location: trip.dropoff_location,
        estimated_fare: trip.fare,
        distance: trip.distance,
        status: trip.status,
    })
}

/// Trip detail, visible to its passenger and assigned driver only
pub async fn get_detail(db: &DatabaseConnection, caller: Uuid, trip_id: Uuid) -> AppResult<TripDetail> {
    let (trip, passenger) = trip::Entity::find_by_id(trip_id)
        .find_also_related(passenger::Entity)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Trip not found".to_string()))?;

    if !trip_flow::is_participant(&trip, caller) {
        return Err(AppError::Forbidden("Not authorized to view this trip".to_string()));
    }

    let driver = match trip.driver_id {
        Some(driver_id) => {
            let license = driver::Entity::find_by_id(driver_id)
                .one(db)
                .await?
                .map(|d| d.license_number);
            Some(AssignedDriver { id: driver_id, license })
        }
        None => None,
    };

    Ok(TripDetail {
        trip_id: trip.id,
        passenger: PartyInfo {
            id: trip.passenger_id,
            name: passenger.map(|p| p.full_name()),
        },
        driver,
        pickup_location: trip.pickup_location,
        dropoff_location: trip.dropoff_location,
        start_time: trip.start_time,
        end_time: trip.end_time,
        fare: trip.fare,
        distance: trip.distance,
        duration_seconds: trip.duration_seconds,
        status: trip.status,
        cancellation_reason: trip.cancellation_reason,
    })
}

/// Assign a requested trip to the calling driver.
///
/// The status check is repeated in the UPDATE's WHERE clause so that of two
/// drivers racing for the same trip exactly one sees an affected row.
pub async fn accept(db: &DatabaseConnection, caller: Uuid, trip_id: Uuid) -> AppResult<TripTransition> {
    let driver = driver::Entity::find_by_id(caller)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Forbidden("Only drivers can accept trip requests".to_string()))?;

    let trip = find_trip(db, trip_id).await?;
    trip_flow::authorize(&trip, caller, TripAction::Accept)?;
    let status = TripAction::Accept.transition(trip.status)?;

    let busy = trip::Entity::find()
        .filter(trip::Column::DriverId.eq(driver.user_id))
        .filter(trip::Column::Status.is_in(TripStatus::ACTIVE))
        .one(db)
        .await?;
    if busy.is_some() {
        return Err(AppError::Conflict(
            "Driver is already assigned to an active trip".to_string(),
        ));
    }

    let result = trip::Entity::update_many()
        .set(trip::ActiveModel {
            driver_id: Set(Some(driver.user_id)),
            status: Set(status),
            ..Default::default()
        })
        .filter(trip::Column::Id.eq(trip.id))
        .filter(trip::Column::Status.eq(TripStatus::Requested))
        .filter(trip::Column::DriverId.is_null())
        .exec(db)
        .await
        // uq_trip_one_active_per_driver catches a driver accepting two trips at once
        .map_err(|e| AppError::conflict_on_unique(e, "Driver is already assigned to an active trip"))?;

    if result.rows_affected == 0 {
        tracing::info!(trip_id = %trip.id, driver_id = %caller, "Lost accept race");
        return Err(AppError::Conflict(
            "Trip is no longer available for acceptance".to_string(),
        ));
    }

    tracing::info!(trip_id = %trip.id, driver_id = %caller, "Trip accepted");

    Ok(TripTransition {
        trip_id: trip.id,
        status,
        driver_id: Some(driver.user_id),
        start_time: None,
    })
}

pub async fn start(db: &DatabaseConnection, caller: Uuid, trip_id: Uuid) -> AppResult<TripTransition> {
    let trip = find_trip(db, trip_id).await?;
    trip_flow::authorize(&trip, caller, TripAction::Start)?;
    let status = TripAction::Start.transition(trip.status)?;

    let now: DateTimeWithTimeZone = Utc::now().into();
    let result = trip::Entity::update_many()
        .set(trip::ActiveModel {
            status: Set(status),
            start_time: Set(Some(now)),
            ..Default::default()
        })
        .filter(trip::Column::Id.eq(trip.id))
        .filter(trip::Column::DriverId.eq(caller))
        .filter(trip::Column::Status.eq(TripStatus::Accepted))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(TripAction::Start.invalid_state());
    }

    tracing::info!(trip_id = %trip.id, driver_id = %caller, "Trip started");

    Ok(TripTransition {
        trip_id: trip.id,
        status,
        driver_id: trip.driver_id,
        start_time: Some(now),
    })
}

pub async fn complete(
    db: &DatabaseConnection,
    caller: Uuid,
    trip_id: Uuid,
    actual_distance: Option<f64>,
    actual_fare: Option<f64>,
) -> AppResult<CompletedTrip> {
    let trip = find_trip(db, trip_id).await?;
    trip_flow::authorize(&trip, caller, TripAction::Complete)?;
    let status = TripAction::Complete.transition(trip.status)?;
    let (final_distance, final_fare) = trip_flow::settle(&trip, actual_distance, actual_fare)?;

    let now: DateTimeWithTimeZone = Utc::now().into();
    let duration_seconds = trip_flow::duration_seconds(trip.start_time, now);

    let result = trip::Entity::update_many()
        .set(trip::ActiveModel {
            status: Set(status),
            end_time: Set(Some(now)),
            duration_seconds: Set(duration_seconds),
            distance: Set(final_distance),
            fare: Set(final_fare),
            ..Default::default()
        })
        .filter(trip::Column::Id.eq(trip.id))
        .filter(trip::Column::DriverId.eq(caller))
        .filter(trip::Column::Status.eq(TripStatus::Started))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(TripAction::Complete.invalid_state());
    }

    tracing::info!(
        trip_id = %trip.id,
        driver_id = %caller,
        fare = final_fare,
        duration_seconds = ?duration_seconds,
        "Trip completed"
    );

    Ok(CompletedTrip {
        trip_id: trip.id,
        final_fare,
        final_distance,
        duration_seconds,
    })
}

pub async fn cancel(
    db: &DatabaseConnection,
    caller: Uuid,
    trip_id: Uuid,
    reason: Option<String>,
) -> AppResult<CancelledTrip> {
    let trip = find_trip(db, trip_id).await?;
    trip_flow::authorize(&trip, caller, TripAction::Cancel)?;
    let status = TripAction::Cancel.transition(trip.status)?;

    let reason = reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());

    let result = trip::Entity::update_many()
        .set(trip::ActiveModel {
            status: Set(status),
            cancellation_reason: Set(reason.clone()),
            ..Default::default()
        })
        .filter(trip::Column::Id.eq(trip.id))
        .filter(trip::Column::Status.is_in(TripAction::Cancel.allowed_from().iter().copied()))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(TripAction::Cancel.invalid_state());
    }

    tracing::info!(
        trip_id = %trip.id,
        cancelled_by = %caller,
        previous_status = ?trip.status,
        "Trip cancelled"
    );

    Ok(CancelledTrip {
        trip_id: trip.id,
        status,
        cancellation_reason: reason,
    })
}

/// One participant rates the other once the trip is completed.
/// A passenger's rating also refreshes the driver's average.
pub async fn rate(
    db: &DatabaseConnection,
    caller: Uuid,
    trip_id: Uuid,
    request: NewRating,
) -> AppResult<rating::Model> {
    let score = request
        .score
        .filter(|s| (1..=5).contains(s))
        .ok_or_else(|| AppError::BadRequest("score must be an integer from 1 to 5".to_string()))?;

    let trip = find_trip(db, trip_id).await?;
    if !trip_flow::is_participant(&trip, caller) {
        return Err(AppError::Forbidden("Not authorized to rate this trip".to_string()));
    }
    if trip.status != TripStatus::Completed {
        return Err(AppError::InvalidState(
            "Only completed trips can be rated".to_string(),
        ));
    }

    let rated_user_id = if caller == trip.passenger_id {
        trip.driver_id
            .ok_or_else(|| AppError::Internal(format!("Completed trip {} has no driver", trip.id)))?
    } else {
        trip.passenger_id
    };

    let txn = db.begin().await?;

    let saved = rating::ActiveModel {
        id: Set(Uuid::new_v4()),
        trip_id: Set(trip.id),
        rater_id: Set(caller),
        rated_user_id: Set(rated_user_id),
        score: Set(score),
        comment: Set(request.comment.filter(|c| !c.trim().is_empty())),
        created_at: Set(Utc::now().into()),
    }
    .insert(&txn)
    .await
    .map_err(|e| AppError::conflict_on_unique(e, "Trip already rated"))?;

    if Some(rated_user_id) == trip.driver_id {
        let scores: Vec<i16> = rating::Entity::find()
            .filter(rating::Column::RatedUserId.eq(rated_user_id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|r| r.score)
            .collect();
        let average = average_score(&scores);

        driver::Entity::update_many()
            .set(driver::ActiveModel {
                rating: Set(average),
                ..Default::default()
            })
            .filter(driver::Column::UserId.eq(rated_user_id))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;

    tracing::info!(trip_id = %trip.id, rater_id = %caller, score, "Trip rated");
    Ok(saved)
}

fn average_score(scores: &[i16]) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    let sum: f64 = scores.iter().map(|&s| f64::from(s)).sum();
    Some((sum / scores.len() as f64 * 100.0).round() / 100.0)
}

/// Drivers with a known position and no accepted or started trip
pub(crate) fn available_drivers() -> Select<driver::Entity> {
    driver::Entity::find()
        .filter(driver::Column::UserId.not_in_subquery(active_driver_ids()))
        .filter(driver::Column::CurrentLocation.is_not_null())
}

pub async fn nearby_drivers(
    db: &DatabaseConnection,
    latitude: Option<f64>,
    longitude: Option<f64>,
    radius_km: Option<f64>,
) -> AppResult<NearbyDrivers> {
    let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
        return Err(AppError::BadRequest(
            "Latitude and longitude are required".to_string(),
        ));
    };
    let pickup = GeoPoint::new(latitude, longitude)
        .ok_or_else(|| AppError::BadRequest("latitude or longitude out of range".to_string()))?;
    let radius = matching::validate_radius(radius_km)?;

    let candidates = available_drivers()
        .find_also_related(user::Entity)
        .all(db)
        .await?
        .into_iter()
        .map(|(driver, user)| Candidate {
            driver_id: driver.user_id,
            license_number: driver.license_number,
            phone_number: user.map(|u| u.phone_number),
            location: driver.current_location.as_deref().and_then(|l| l.parse().ok()),
        });

    let available_drivers = matching::rank_nearby(pickup, radius, candidates);
    tracing::debug!(
        latitude,
        longitude,
        radius_km = radius,
        found = available_drivers.len(),
        "Nearby driver search"
    );

    Ok(NearbyDrivers {
        location: pickup,
        search_radius_km: radius,
        total_count: available_drivers.len(),
        available_drivers,
    })
}
