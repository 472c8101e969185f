use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::Deserialize;
use serde_json::Value;

use crate::entities::vehicle;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::rules::earnings::{DateRange, Pagination};
use crate::services::drivers::{
    self, DriverPatch, DriverPoints, DriverProfile, DriverTrips, LocationReceipt, NewVehicle,
    PointsFilter, ProfileUpdate, StatusReceipt, VehiclePatch, DEFAULT_POINTS_PAGE_SIZE,
};
use crate::utils::extract::{AppJson, AppQuery};
use crate::utils::response::ApiResponse;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct VehicleFields {
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub license_plate: Option<String>,
    pub color: Option<String>,
    pub capacity: Option<i32>,
}

impl From<VehicleFields> for VehiclePatch {
    fn from(fields: VehicleFields) -> Self {
        VehiclePatch {
            make: fields.make,
            model: fields.model,
            year: fields.year,
            license_plate: fields.license_plate,
            color: fields.color,
            capacity: fields.capacity,
        }
    }
}

impl TryFrom<VehicleFields> for NewVehicle {
    type Error = AppError;

    fn try_from(fields: VehicleFields) -> Result<Self, Self::Error> {
        let (Some(make), Some(model), Some(year), Some(license_plate), Some(color), Some(capacity)) = (
            fields.make,
            fields.model,
            fields.year,
            fields.license_plate,
            fields.color,
            fields.capacity,
        ) else {
            return Err(AppError::BadRequest(
                "All vehicle fields are required".to_string(),
            ));
        };

        Ok(NewVehicle {
            make,
            model,
            year,
            license_plate,
            color,
            capacity,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateDriverRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub license_number: Option<String>,
    pub vehicle: Option<VehicleFields>,
}

/// Coordinates arrive as loose JSON so a wrong type gets the same message as a missing field
#[derive(Debug, Deserialize)]
pub struct LocationRequest {
    pub latitude: Option<Value>,
    pub longitude: Option<Value>,
    pub accuracy: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PointsQuery {
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<u64>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<u64>,
}

fn number(value: Option<Value>) -> Option<f64> {
    value.as_ref().and_then(Value::as_f64)
}

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<ApiResponse<DriverProfile>>> {
    let profile = drivers::profile(&state.db, user.user_id).await?;
    Ok(ApiResponse::ok(profile))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(payload): AppJson<UpdateDriverRequest>,
) -> AppResult<Json<ApiResponse<DriverProfile>>> {
    let update = ProfileUpdate {
        driver: DriverPatch {
            first_name: payload.first_name,
            last_name: payload.last_name,
            license_number: payload.license_number,
        },
        vehicle: payload.vehicle.map(VehiclePatch::from),
    };

    let profile = drivers::update_profile(&state.db, user.user_id, update).await?;
    Ok(ApiResponse::with_message("Driver profile updated successfully", profile))
}

pub async fn add_vehicle(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(payload): AppJson<VehicleFields>,
) -> AppResult<(StatusCode, Json<ApiResponse<vehicle::Model>>)> {
    let new_vehicle = NewVehicle::try_from(payload)?;
    let vehicle = drivers::add_vehicle(&state.db, user.user_id, new_vehicle).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("Vehicle added successfully", vehicle),
    ))
}

pub async fn get_vehicle(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<ApiResponse<vehicle::Model>>> {
    let vehicle = drivers::get_vehicle(&state.db, user.user_id).await?;
    Ok(ApiResponse::ok(vehicle))
}

pub async fn update_location(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(payload): AppJson<LocationRequest>,
) -> AppResult<Json<ApiResponse<LocationReceipt>>> {
    let receipt = drivers::update_location(
        &state.db,
        user.user_id,
        number(payload.latitude),
        number(payload.longitude),
        number(payload.accuracy),
    )
    .await?;
    Ok(ApiResponse::with_message("Location updated", receipt))
}

pub async fn update_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(payload): AppJson<StatusRequest>,
) -> AppResult<Json<ApiResponse<StatusReceipt>>> {
    let receipt = drivers::update_status(&state.db, user.user_id, payload.status.as_deref()).await?;
    Ok(ApiResponse::with_message("Driver status updated successfully", receipt))
}

pub async fn trip_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<ApiResponse<DriverTrips>>> {
    let history = drivers::trip_history(&state.db, user.user_id).await?;
    Ok(ApiResponse::ok(history))
}

pub async fn points(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppQuery(query): AppQuery<PointsQuery>,
) -> AppResult<Json<ApiResponse<DriverPoints>>> {
    let pagination = Pagination::new(query.page, query.page_size, DEFAULT_POINTS_PAGE_SIZE)?;
    let filter = PointsFilter {
        transaction_type: query.transaction_type.filter(|t| !t.is_empty()),
        range: DateRange::parse(query.start_date.as_deref(), query.end_date.as_deref())?,
    };

    let points = drivers::points(&state.db, user.user_id, filter, pagination).await?;
    Ok(ApiResponse::ok(points))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_vehicle_needs_every_field() {
        let partial = VehicleFields {
            make: Some("Toyota".into()),
            model: Some("Corolla".into()),
            ..Default::default()
        };
        assert!(NewVehicle::try_from(partial).is_err());

        let complete = VehicleFields {
            make: Some("Toyota".into()),
            model: Some("Corolla".into()),
            year: Some(2019),
            license_plate: Some("GT-1234-19".into()),
            color: Some("silver".into()),
            capacity: Some(4),
        };
        assert_eq!(NewVehicle::try_from(complete).unwrap().capacity, 4);
    }

    #[test]
    fn test_non_numeric_coordinates_read_as_missing() {
        assert_eq!(number(Some(serde_json::json!(10.5))), Some(10.5));
        assert_eq!(number(Some(serde_json::json!(3))), Some(3.0));
        assert_eq!(number(Some(serde_json::json!("10.5"))), None);
        assert_eq!(number(None), None);
    }
}
