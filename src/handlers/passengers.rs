use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::entities::trip::TripStatus;
use crate::entities::{passenger, payment_method};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::rules::earnings::{DateRange, Pagination};
use crate::services::passengers::{
    self, ensure_self, NewPaymentMethod, PassengerProfile, PassengerTrips, PassengerUpdate,
    TripFilter, DEFAULT_TRIPS_PAGE_SIZE,
};
use crate::utils::extract::{AppJson, AppQuery};
use crate::utils::response::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePassengerRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TripsQuery {
    pub status: Option<TripStatus>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentMethodRequest {
    pub card_type: Option<String>,
    pub last_four_digits: Option<String>,
    pub expiration_date: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

pub async fn get_passenger(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(passenger_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PassengerProfile>>> {
    ensure_self(user.user_id, passenger_id)?;
    let profile = passengers::profile(&state.db, passenger_id).await?;
    Ok(ApiResponse::ok(profile))
}

pub async fn update_passenger(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(passenger_id): Path<Uuid>,
    AppJson(payload): AppJson<UpdatePassengerRequest>,
) -> AppResult<Json<ApiResponse<passenger::Model>>> {
    ensure_self(user.user_id, passenger_id)?;
    let changes = PassengerUpdate {
        first_name: payload.first_name,
        last_name: payload.last_name,
        email: payload.email,
    };
    let updated = passengers::update(&state.db, passenger_id, changes).await?;
    Ok(ApiResponse::with_message("Profile updated", updated))
}

pub async fn passenger_trips(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(passenger_id): Path<Uuid>,
    AppQuery(query): AppQuery<TripsQuery>,
) -> AppResult<Json<ApiResponse<PassengerTrips>>> {
    ensure_self(user.user_id, passenger_id)?;
    let pagination = Pagination::new(query.page, query.limit, DEFAULT_TRIPS_PAGE_SIZE)?;
    let filter = TripFilter {
        status: query.status,
        range: DateRange::parse(query.start_date.as_deref(), query.end_date.as_deref())?,
    };

    let trips = passengers::trips(&state.db, passenger_id, filter, pagination).await?;
    Ok(ApiResponse::ok(trips))
}

pub async fn list_payment_methods(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(passenger_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Vec<payment_method::Model>>>> {
    ensure_self(user.user_id, passenger_id)?;
    let methods = passengers::payment_methods(&state.db, passenger_id).await?;
    Ok(ApiResponse::ok(methods))
}

pub async fn add_payment_method(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(passenger_id): Path<Uuid>,
    AppJson(payload): AppJson<PaymentMethodRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<payment_method::Model>>)> {
    ensure_self(user.user_id, passenger_id)?;

    let (Some(card_type), Some(last_four_digits), Some(expiration_date)) = (
        payload.card_type,
        payload.last_four_digits,
        payload.expiration_date,
    ) else {
        return Err(AppError::BadRequest(
            "card_type, last_four_digits and expiration_date are required".to_string(),
        ));
    };

    let method = NewPaymentMethod {
        card_type,
        last_four_digits,
        expiration_date,
        is_default: payload.is_default,
    };
    let saved = passengers::add_payment_method(&state.db, passenger_id, method).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("Payment method added", saved),
    ))
}
