use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    prelude::DateTimeWithTimeZone, ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait, Select, Set, SqlErr,
    TransactionTrait,
};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::driver::{self, DriverStatus};
use crate::entities::trip::{self, TripStatus};
use crate::entities::{passenger, points_transaction, rating, vehicle};
use crate::error::{AppError, AppResult};
use crate::rules::earnings::{
    self, DateRange, EarningsSummary, PageInfo, Pagination, TripEarning, TRIP_HISTORY_LIMIT,
};
use crate::rules::location_check::{self, LastFix, LocationSample};
use crate::services::trips::active_driver_ids;

pub const DEFAULT_POINTS_PAGE_SIZE: u64 = 20;

#[derive(Debug, Serialize)]
pub struct DriverProfile {
    #[serde(flatten)]
    pub driver: driver::Model,
    pub vehicle: Option<vehicle::Model>,
}

/// Present fields are written, absent ones left alone
#[derive(Debug, Default, Clone)]
pub struct DriverPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub license_number: Option<String>,
}

impl DriverPatch {
    fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.license_number.is_none()
    }

    fn apply(self, driver: &mut driver::ActiveModel) -> AppResult<()> {
        if let Some(first_name) = self.first_name {
            driver.first_name = Set(Some(first_name));
        }
        if let Some(last_name) = self.last_name {
            driver.last_name = Set(Some(last_name));
        }
        if let Some(license_number) = self.license_number {
            driver.license_number = Set(required("license_number", license_number)?);
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct VehiclePatch {
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub license_plate: Option<String>,
    pub color: Option<String>,
    pub capacity: Option<i32>,
}

impl VehiclePatch {
    fn is_empty(&self) -> bool {
        self.make.is_none()
            && self.model.is_none()
            && self.year.is_none()
            && self.license_plate.is_none()
            && self.color.is_none()
            && self.capacity.is_none()
    }

    fn apply(self, vehicle: &mut vehicle::ActiveModel) -> AppResult<()> {
        if let Some(make) = self.make {
            vehicle.make = Set(required("make", make)?);
        }
        if let Some(model) = self.model {
            vehicle.model = Set(required("model", model)?);
        }
        if let Some(year) = self.year {
            vehicle.year = Set(valid_year(year)?);
        }
        if let Some(plate) = self.license_plate {
            vehicle.license_plate = Set(required("license_plate", plate)?);
        }
        if let Some(color) = self.color {
            vehicle.color = Set(required("color", color)?);
        }
        if let Some(capacity) = self.capacity {
            vehicle.capacity = Set(valid_capacity(capacity)?);
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ProfileUpdate {
    pub driver: DriverPatch,
    pub vehicle: Option<VehiclePatch>,
}

#[derive(Debug, Clone)]
pub struct NewVehicle {
    pub make: String,
    pub model: String,
    pub year: i32,
    pub license_plate: String,
    pub color: String,
    pub capacity: i32,
}

#[derive(Debug, Serialize)]
pub struct LocationReceipt {
    pub suspicious: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatusReceipt {
    pub driver_status: DriverStatus,
}

#[derive(Debug, Serialize)]
pub struct DriverTrip {
    pub trip_id: Uuid,
    pub start_time: Option<DateTimeWithTimeZone>,
    pub end_time: Option<DateTimeWithTimeZone>,
    pub status: TripStatus,
    pub fare: f64,
    pub distance: Option<f64>,
    pub duration_seconds: Option<i64>,
    pub passenger_id: Uuid,
    pub passenger_name: Option<String>,
    pub passenger_rating: Option<i16>,
    pub passenger_feedback: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DriverTrips {
    pub trips: Vec<DriverTrip>,
    pub metrics: EarningsSummary,
}

#[derive(Debug, Default, Clone)]
pub struct PointsFilter {
    pub transaction_type: Option<String>,
    pub range: DateRange,
}

#[derive(Debug, Serialize)]
pub struct DriverPoints {
    pub points_balance: i32,
    pub transactions: Vec<points_transaction::Model>,
    pub pagination: PageInfo,
}

fn required(field: &str, value: String) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(value.to_string())
}

fn valid_year(year: i32) -> AppResult<i32> {
    if !(1950..=2100).contains(&year) {
        return Err(AppError::BadRequest("year is out of range".to_string()));
    }
    Ok(year)
}

fn valid_capacity(capacity: i32) -> AppResult<i32> {
    if !(1..=50).contains(&capacity) {
        return Err(AppError::BadRequest("capacity must be between 1 and 50".to_string()));
    }
    Ok(capacity)
}

/// Either unique key on `vehicle` may fire; the plate one names its column
fn vehicle_conflict(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) if detail.contains("license_plate") => {
            AppError::Conflict("License plate already exists".to_string())
        }
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::Conflict("Driver already has a vehicle".to_string())
        }
        _ => AppError::Database(err),
    }
}

fn driver_not_found() -> AppError {
    AppError::NotFound("Driver not found".to_string())
}

pub async fn profile(db: &DatabaseConnection, driver_id: Uuid) -> AppResult<DriverProfile> {
    let (driver, vehicle) = driver::Entity::find_by_id(driver_id)
        .find_also_related(vehicle::Entity)
        .one(db)
        .await?
        .ok_or_else(driver_not_found)?;

    Ok(DriverProfile { driver, vehicle })
}

/// Apply driver and vehicle changes together or not at all
pub async fn update_profile(
    db: &DatabaseConnection,
    driver_id: Uuid,
    update: ProfileUpdate,
) -> AppResult<DriverProfile> {
    let vehicle_patch = update.vehicle.filter(|v| !v.is_empty());
    if update.driver.is_empty() && vehicle_patch.is_none() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let txn = db.begin().await?;

    let current = driver::Entity::find_by_id(driver_id)
        .one(&txn)
        .await?
        .ok_or_else(driver_not_found)?;

    let driver = if update.driver.is_empty() {
        current
    } else {
        let mut active: driver::ActiveModel = current.into();
        update.driver.apply(&mut active)?;
        active.update(&txn).await?
    };

    let vehicle = match vehicle_patch {
        Some(patch) => {
            let current = vehicle::Entity::find()
                .filter(vehicle::Column::DriverId.eq(driver_id))
                .one(&txn)
                .await?
                .ok_or_else(|| AppError::NotFound("Vehicle not found for this driver".to_string()))?;
            let mut active: vehicle::ActiveModel = current.into();
            patch.apply(&mut active)?;
            Some(active.update(&txn).await.map_err(vehicle_conflict)?)
        }
        None => {
            vehicle::Entity::find()
                .filter(vehicle::Column::DriverId.eq(driver_id))
                .one(&txn)
                .await?
        }
    };

    txn.commit().await?;

    tracing::info!(driver_id = %driver_id, "Driver profile updated");
    Ok(DriverProfile { driver, vehicle })
}

pub async fn add_vehicle(
    db: &DatabaseConnection,
    driver_id: Uuid,
    new_vehicle: NewVehicle,
) -> AppResult<vehicle::Model> {
    let active = vehicle::ActiveModel {
        id: Set(Uuid::new_v4()),
        driver_id: Set(driver_id),
        make: Set(required("make", new_vehicle.make)?),
        model: Set(required("model", new_vehicle.model)?),
        year: Set(valid_year(new_vehicle.year)?),
        license_plate: Set(required("license_plate", new_vehicle.license_plate)?),
        color: Set(required("color", new_vehicle.color)?),
        capacity: Set(valid_capacity(new_vehicle.capacity)?),
    };

    let txn = db.begin().await?;

    driver::Entity::find_by_id(driver_id)
        .one(&txn)
        .await?
        .ok_or_else(driver_not_found)?;

    let vehicle = active.insert(&txn).await.map_err(vehicle_conflict)?;

    driver::Entity::update_many()
        .set(driver::ActiveModel {
            vehicle_id: Set(Some(vehicle.id)),
            ..Default::default()
        })
        .filter(driver::Column::UserId.eq(driver_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    tracing::info!(driver_id = %driver_id, vehicle_id = %vehicle.id, "Vehicle registered");
    Ok(vehicle)
}

pub async fn get_vehicle(db: &DatabaseConnection, driver_id: Uuid) -> AppResult<vehicle::Model> {
    vehicle::Entity::find()
        .filter(vehicle::Column::DriverId.eq(driver_id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Vehicle not found for this driver".to_string()))
}

/// Store a location fix, flagging implausible jumps.
///
/// The fix is written even when flagged; concurrent updates from the same
/// driver are last-write-wins.
pub async fn update_location(
    db: &DatabaseConnection,
    driver_id: Uuid,
    latitude: Option<f64>,
    longitude: Option<f64>,
    accuracy: Option<f64>,
) -> AppResult<LocationReceipt> {
    let sample = LocationSample::parse(latitude, longitude, accuracy)?;

    let driver = driver::Entity::find_by_id(driver_id)
        .one(db)
        .await?
        .ok_or_else(driver_not_found)?;

    let now = Utc::now();
    let last = LastFix::from_stored(
        driver.current_location.as_deref(),
        driver.last_location_update.map(|t| t.with_timezone(&Utc)),
    );
    let assessment = location_check::assess_jump(last.as_ref(), sample.point, now);

    if assessment.suspicious {
        tracing::warn!(
            driver_id = %driver_id,
            distance_m = ?assessment.distance_m,
            elapsed_secs = ?assessment.elapsed.map(|e| e.num_seconds()),
            "Suspicious location jump"
        );
    }

    driver::Entity::update_many()
        .set(driver::ActiveModel {
            current_location: Set(Some(sample.point.to_string())),
            last_location_update: Set(Some(now.into())),
            ..Default::default()
        })
        .filter(driver::Column::UserId.eq(driver_id))
        .exec(db)
        .await?;

    Ok(LocationReceipt {
        suspicious: assessment.suspicious,
        timestamp: now,
    })
}

/// Change availability. Going offline is refused while the driver holds an
/// accepted or started trip; the check runs inside the UPDATE.
pub async fn update_status(
    db: &DatabaseConnection,
    driver_id: Uuid,
    status: Option<&str>,
) -> AppResult<StatusReceipt> {
    let status: DriverStatus = status
        .unwrap_or_default()
        .parse()
        .map_err(AppError::BadRequest)?;

    let mut update = driver::Entity::update_many()
        .set(driver::ActiveModel {
            driver_status: Set(status),
            ..Default::default()
        })
        .filter(driver::Column::UserId.eq(driver_id));
    if status == DriverStatus::Offline {
        update = update.filter(driver::Column::UserId.not_in_subquery(active_driver_ids()));
    }
    let result = update.exec(db).await?;

    if result.rows_affected == 0 {
        let exists = driver::Entity::find_by_id(driver_id).one(db).await?.is_some();
        if !exists {
            return Err(driver_not_found());
        }
        return Err(AppError::Conflict(
            "Cannot go offline while on an active trip".to_string(),
        ));
    }

    tracing::info!(driver_id = %driver_id, status = %status, "Driver status changed");
    Ok(StatusReceipt {
        driver_status: status,
    })
}

/// Most recent trips with the passenger's rating of the driver, plus totals
pub async fn trip_history(db: &DatabaseConnection, driver_id: Uuid) -> AppResult<DriverTrips> {
    driver::Entity::find_by_id(driver_id)
        .one(db)
        .await?
        .ok_or_else(driver_not_found)?;

    let rows = trip::Entity::find()
        .filter(trip::Column::DriverId.eq(driver_id))
        .order_by_desc(trip::Column::CreatedAt)
        .limit(TRIP_HISTORY_LIMIT)
        .find_also_related(passenger::Entity)
        .all(db)
        .await?;

    let trip_ids: Vec<Uuid> = rows.iter().map(|(t, _)| t.id).collect();
    let mut ratings: HashMap<Uuid, rating::Model> = if trip_ids.is_empty() {
        HashMap::new()
    } else {
        rating::Entity::find()
            .filter(rating::Column::RatedUserId.eq(driver_id))
            .filter(rating::Column::TripId.is_in(trip_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|r| (r.trip_id, r))
            .collect()
    };

    let trips: Vec<DriverTrip> = rows
        .into_iter()
        .map(|(trip, passenger)| {
            let rating = ratings.remove(&trip.id);
            DriverTrip {
                trip_id: trip.id,
                start_time: trip.start_time,
                end_time: trip.end_time,
                status: trip.status,
                fare: trip.fare,
                distance: trip.distance,
                duration_seconds: trip.duration_seconds,
                passenger_id: trip.passenger_id,
                passenger_name: passenger.map(|p| p.full_name()),
                passenger_rating: rating.as_ref().map(|r| r.score),
                passenger_feedback: rating.and_then(|r| r.comment),
            }
        })
        .collect();

    let metrics = earnings::summarize(trips.iter().map(|t| TripEarning {
        fare: t.fare,
        rating: t.passenger_rating,
    }));

    Ok(DriverTrips { trips, metrics })
}

/// Page of a driver's ledger, newest first
pub fn transactions_query(
    driver_id: Uuid,
    filter: &PointsFilter,
    pagination: &Pagination,
) -> Select<points_transaction::Entity> {
    points_transaction::Entity::find()
        .filter(points_transaction::Column::DriverId.eq(driver_id))
        .apply_if(filter.transaction_type.clone(), |query, kind| {
            query.filter(points_transaction::Column::TransactionType.eq(kind))
        })
        .apply_if(filter.range.start, |query, start| {
            query.filter(points_transaction::Column::CreatedAt.gte(start))
        })
        .apply_if(filter.range.end, |query, end| {
            query.filter(points_transaction::Column::CreatedAt.lte(end))
        })
        .order_by_desc(points_transaction::Column::CreatedAt)
        .offset(pagination.offset())
        .limit(pagination.page_size)
}

pub async fn points(
    db: &DatabaseConnection,
    driver_id: Uuid,
    filter: PointsFilter,
    pagination: Pagination,
) -> AppResult<DriverPoints> {
    let driver = driver::Entity::find_by_id(driver_id)
        .one(db)
        .await?
        .ok_or_else(driver_not_found)?;

    let transactions = transactions_query(driver_id, &filter, &pagination)
        .all(db)
        .await?;

    Ok(DriverPoints {
        points_balance: driver.points_balance,
        pagination: pagination.info(transactions.len()),
        transactions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn driver_model(user_id: Uuid) -> driver::Model {
        driver::Model {
            user_id,
            license_number: "DL-7781".into(),
            first_name: Some("Ama".into()),
            last_name: Some("Owusu".into()),
            driver_status: DriverStatus::Online,
            current_location: None,
            last_location_update: None,
            rating: None,
            points_balance: 120,
            vehicle_id: None,
        }
    }

    fn exec(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    #[tokio::test]
    async fn test_offline_refused_during_active_trip() {
        let driver = driver_model(Uuid::new_v4());
        // The guarded UPDATE matches nothing, but the driver exists
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec(0)])
            .append_query_results([vec![driver.clone()]])
            .into_connection();

        let err = update_status(&db, driver.user_id, Some("offline")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m == "Cannot go offline while on an active trip"));

        let update = db
            .into_transaction_log()
            .iter()
            .flat_map(|txn| txn.statements().iter().map(|stmt| stmt.to_string()))
            .find(|sql| sql.starts_with("UPDATE"))
            .unwrap();
        assert!(update.contains("NOT IN (SELECT \"trip\".\"driver_id\""), "{}", update);
        assert!(update.contains("'accepted'") && update.contains("'started'"), "{}", update);
    }

    #[tokio::test]
    async fn test_status_change_for_unknown_driver() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec(0)])
            .append_query_results([Vec::<driver::Model>::new()])
            .into_connection();

        let err = update_status(&db, Uuid::new_v4(), Some("busy")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_status_change_succeeds() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec(1)])
            .into_connection();

        let receipt = update_status(&db, Uuid::new_v4(), Some("offline")).await.unwrap();
        assert_eq!(receipt.driver_status, DriverStatus::Offline);
    }

    #[tokio::test]
    async fn test_unknown_status_is_rejected() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let err = update_status(&db, Uuid::new_v4(), Some("sleeping")).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m.starts_with("Status must be one of")));
        assert!(update_status(&db, Uuid::new_v4(), None).await.is_err());
    }

    #[tokio::test]
    async fn test_location_jump_is_flagged_but_stored() {
        let mut driver = driver_model(Uuid::new_v4());
        driver.current_location = Some("10,10".into());
        driver.last_location_update = Some((Utc::now() - Duration::seconds(30)).into());

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![driver.clone()]])
            .append_exec_results([exec(1)])
            .into_connection();

        let receipt = update_location(&db, driver.user_id, Some(10.02), Some(10.02), Some(20.0))
            .await
            .unwrap();
        assert!(receipt.suspicious);

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 2, "lookup then update");
    }

    #[tokio::test]
    async fn test_first_location_is_not_suspicious() {
        let driver = driver_model(Uuid::new_v4());
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![driver.clone()]])
            .append_exec_results([exec(1)])
            .into_connection();

        let receipt = update_location(&db, driver.user_id, Some(10.0), Some(10.0), Some(5.0))
            .await
            .unwrap();
        assert!(!receipt.suspicious);
    }

    #[tokio::test]
    async fn test_low_accuracy_never_reaches_the_store() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let err = update_location(&db, Uuid::new_v4(), Some(10.0), Some(10.0), Some(150.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(db.into_transaction_log().is_empty());
    }

    #[tokio::test]
    async fn test_location_for_unknown_driver() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<driver::Model>::new()])
            .into_connection();

        let err = update_location(&db, Uuid::new_v4(), Some(10.0), Some(10.0), Some(5.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_second_points_page_query() {
        let pagination = Pagination::new(Some(2), Some(10), DEFAULT_POINTS_PAGE_SIZE).unwrap();
        let sql = transactions_query(Uuid::new_v4(), &PointsFilter::default(), &pagination)
            .build(DatabaseBackend::Postgres)
            .to_string();

        assert!(sql.contains("ORDER BY \"points_transaction\".\"created_at\" DESC"), "{}", sql);
        assert!(sql.contains("LIMIT 10 OFFSET 10"), "{}", sql);
    }

    #[test]
    fn test_points_filters_are_applied() {
        let filter = PointsFilter {
            transaction_type: Some("trip_bonus".into()),
            range: DateRange::parse(Some("2025-03-01"), Some("2025-03-31")).unwrap(),
        };
        let pagination = Pagination::new(None, None, DEFAULT_POINTS_PAGE_SIZE).unwrap();
        let sql = transactions_query(Uuid::new_v4(), &filter, &pagination)
            .build(DatabaseBackend::Postgres)
            .to_string();

        assert!(sql.contains("\"transaction_type\" = 'trip_bonus'"), "{}", sql);
        assert!(sql.contains("\"created_at\" >="), "{}", sql);
        assert!(sql.contains("\"created_at\" <="), "{}", sql);
        assert!(sql.contains("LIMIT 20"), "{}", sql);
    }

    #[tokio::test]
    async fn test_points_page_echoes_pagination() {
        let driver = driver_model(Uuid::new_v4());
        let now = Utc::now();
        let page: Vec<points_transaction::Model> = (0..10)
            .map(|i| points_transaction::Model {
                id: Uuid::new_v4(),
                driver_id: driver.user_id,
                amount: 10,
                transaction_type: "trip_bonus".into(),
                trip_id: None,
                description: (i == 0).then(|| "Completed trip bonus".to_string()),
                created_at: (now - Duration::hours(10 + i)).into(),
            })
            .collect();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![driver.clone()]])
            .append_query_results([page])
            .into_connection();

        let pagination = Pagination::new(Some(2), Some(10), DEFAULT_POINTS_PAGE_SIZE).unwrap();
        let result = points(&db, driver.user_id, PointsFilter::default(), pagination)
            .await
            .unwrap();

        assert_eq!(result.points_balance, 120);
        assert_eq!(result.transactions.len(), 10);
        assert_eq!(result.pagination, PageInfo { page: 2, page_size: 10, count: 10 });
        assert!(result
            .transactions
            .windows(2)
            .all(|w| w[0].created_at >= w[1].created_at));

        let listed = serde_json::to_value(&result.transactions).unwrap();
        assert_eq!(listed[0]["description"], "Completed trip bonus");
        assert!(listed[1]["description"].is_null());
    }

    #[tokio::test]
    async fn test_empty_profile_update_is_rejected() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let update = ProfileUpdate {
            driver: DriverPatch::default(),
            vehicle: Some(VehiclePatch::default()),
        };

        let err = update_profile(&db, Uuid::new_v4(), update).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m == "No fields to update"));
    }

    #[test]
    fn test_vehicle_fields_are_validated() {
        assert!(valid_year(1949).is_err());
        assert_eq!(valid_year(2021).unwrap(), 2021);
        assert!(valid_capacity(0).is_err());
        assert_eq!(required("make", "  Toyota ".into()).unwrap(), "Toyota");
        assert!(required("make", "   ".into()).is_err());
    }

    #[test]
    fn test_non_unique_vehicle_errors_pass_through() {
        let err = DbErr::Custom("connection reset".into());
        assert!(matches!(vehicle_conflict(err), AppError::Database(_)));
    }
}
