use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::entities::rating;
use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::rules::trip_flow::RouteCoordinates;
use crate::services::trips::{
    self, CancelledTrip, CompletedTrip, NearbyDrivers, NewRating, NewTrip, TripCreated,
    TripDetail, TripTransition,
};
use crate::utils::extract::{AppJson, AppQuery};
use crate::utils::response::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTripRequest {
    #[serde(default)]
    pub pickup_location: String,
    #[serde(default)]
    pub dropoff_location: String,
    pub pickup_lat: Option<f64>,
    #[serde(alias = "pickup_lon")]
    pub pickup_lng: Option<f64>,
    pub dropoff_lat: Option<f64>,
    #[serde(alias = "dropoff_lon")]
    pub dropoff_lng: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Kilometres
    pub radius: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteTripRequest {
    pub actual_distance: Option<f64>,
    pub actual_fare: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelTripRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RateTripRequest {
    pub score: Option<i16>,
    pub comment: Option<String>,
}

pub async fn create_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(payload): AppJson<CreateTripRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<TripCreated>>)> {
    let request = NewTrip {
        pickup_location: payload.pickup_location,
        dropoff_location: payload.dropoff_location,
        coordinates: RouteCoordinates {
            pickup_lat: payload.pickup_lat,
            pickup_lng: payload.pickup_lng,
            dropoff_lat: payload.dropoff_lat,
            dropoff_lng: payload.dropoff_lng,
        },
    };

    let created = trips::create(&state.db, user.user_id, request).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("Trip request created successfully", created),
    ))
}

pub async fn nearby_drivers(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<NearbyQuery>,
) -> AppResult<Json<ApiResponse<NearbyDrivers>>> {
    let nearby =
        trips::nearby_drivers(&state.db, query.latitude, query.longitude, query.radius).await?;
    Ok(ApiResponse::ok(nearby))
}

pub async fn get_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(trip_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<TripDetail>>> {
    let detail = trips::get_detail(&state.db, user.user_id, trip_id).await?;
    Ok(ApiResponse::ok(detail))
}

pub async fn accept_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(trip_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<TripTransition>>> {
    let accepted = trips::accept(&state.db, user.user_id, trip_id).await?;
    Ok(ApiResponse::with_message("Trip accepted successfully", accepted))
}

pub async fn start_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(trip_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<TripTransition>>> {
    let started = trips::start(&state.db, user.user_id, trip_id).await?;
    Ok(ApiResponse::with_message("Trip started successfully", started))
}

/// Body is optional; without overrides the estimated distance and fare stand
pub async fn complete_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(trip_id): Path<Uuid>,
    payload: Option<AppJson<CompleteTripRequest>>,
) -> AppResult<Json<ApiResponse<CompletedTrip>>> {
    let payload = payload.map(|AppJson(p)| p).unwrap_or_default();
    let completed = trips::complete(
        &state.db,
        user.user_id,
        trip_id,
        payload.actual_distance,
        payload.actual_fare,
    )
    .await?;
    Ok(ApiResponse::with_message("Trip completed successfully", completed))
}

pub async fn cancel_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(trip_id): Path<Uuid>,
    payload: Option<AppJson<CancelTripRequest>>,
) -> AppResult<Json<ApiResponse<CancelledTrip>>> {
    let payload = payload.map(|AppJson(p)| p).unwrap_or_default();
    let cancelled = trips::cancel(&state.db, user.user_id, trip_id, payload.reason).await?;
    Ok(ApiResponse::with_message("Trip cancelled successfully", cancelled))
}

pub async fn rate_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(trip_id): Path<Uuid>,
    AppJson(payload): AppJson<RateTripRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<rating::Model>>)> {
    let request = NewRating {
        score: payload.score,
        comment: payload.comment,
    };
    let saved = trips::rate(&state.db, user.user_id, trip_id, request).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("Rating submitted", saved),
    ))
}
