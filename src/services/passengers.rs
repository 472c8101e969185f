use chrono::Utc;
use sea_orm::{
    prelude::DateTimeWithTimeZone, ActiveModelTrait, ActiveValue::Unchanged, ColumnTrait,
    DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait,
    Select, Set, TransactionTrait,
};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::trip::{self, TripStatus};
use crate::entities::{passenger, payment_method, user};
use crate::error::{AppError, AppResult};
use crate::rules::earnings::{DateRange, PageInfo, Pagination};

pub const DEFAULT_TRIPS_PAGE_SIZE: u64 = 10;

#[derive(Debug, Serialize)]
pub struct PassengerProfile {
    #[serde(flatten)]
    pub passenger: passenger::Model,
    pub phone_number: Option<String>,
    pub is_verified: Option<bool>,
    pub created_at: Option<DateTimeWithTimeZone>,
}

#[derive(Debug, Clone)]
pub struct PassengerUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct TripFilter {
    pub status: Option<TripStatus>,
    pub range: DateRange,
}

#[derive(Debug, Serialize)]
pub struct PassengerTrips {
    pub trips: Vec<trip::Model>,
    pub pagination: PageInfo,
}

#[derive(Debug, Clone)]
pub struct NewPaymentMethod {
    pub card_type: String,
    pub last_four_digits: String,
    pub expiration_date: String,
    pub is_default: bool,
}

impl NewPaymentMethod {
    fn validate(&self) -> AppResult<()> {
        if self.card_type.trim().is_empty() {
            return Err(AppError::BadRequest("card_type is required".to_string()));
        }
        if self.last_four_digits.len() != 4
            || !self.last_four_digits.chars().all(|c| c.is_ascii_digit())
        {
            return Err(AppError::BadRequest(
                "last_four_digits must be exactly 4 digits".to_string(),
            ));
        }
        if !valid_expiration(&self.expiration_date) {
            return Err(AppError::BadRequest(
                "expiration_date must be MM/YY or MM/YYYY".to_string(),
            ));
        }
        Ok(())
    }
}

fn valid_expiration(value: &str) -> bool {
    let Some((month, year)) = value.split_once('/') else {
        return false;
    };
    let month_ok = month.len() == 2 && month.parse::<u8>().is_ok_and(|m| (1..=12).contains(&m));
    let year_ok = matches!(year.len(), 2 | 4) && year.chars().all(|c| c.is_ascii_digit());
    month_ok && year_ok
}

/// Passenger resources are private to their owner
pub fn ensure_self(caller: Uuid, passenger_id: Uuid) -> AppResult<()> {
    if caller != passenger_id {
        return Err(AppError::Forbidden(
            "Not authorized to access this passenger".to_string(),
        ));
    }
    Ok(())
}

fn passenger_not_found() -> AppError {
    AppError::NotFound("Passenger not found".to_string())
}

pub async fn profile(db: &DatabaseConnection, passenger_id: Uuid) -> AppResult<PassengerProfile> {
    let (passenger, account) = passenger::Entity::find_by_id(passenger_id)
        .find_also_related(user::Entity)
        .one(db)
        .await?
        .ok_or_else(passenger_not_found)?;

    Ok(PassengerProfile {
        passenger,
        phone_number: account.as_ref().map(|u| u.phone_number.clone()),
        is_verified: account.as_ref().map(|u| u.is_verified),
        created_at: account.map(|u| u.created_at),
    })
}

pub async fn update(
    db: &DatabaseConnection,
    passenger_id: Uuid,
    changes: PassengerUpdate,
) -> AppResult<passenger::Model> {
    let first_name = changes.first_name.map(|s| s.trim().to_string()).unwrap_or_default();
    let last_name = changes.last_name.map(|s| s.trim().to_string()).unwrap_or_default();
    if first_name.is_empty() || last_name.is_empty() {
        return Err(AppError::BadRequest("First and last name required".to_string()));
    }

    let updated = passenger::ActiveModel {
        user_id: Unchanged(passenger_id),
        first_name: Set(first_name),
        last_name: Set(last_name),
        email: Set(changes.email.filter(|e| !e.trim().is_empty())),
    }
    .update(db)
    .await
    .map_err(|e| match e {
        DbErr::RecordNotUpdated => passenger_not_found(),
        other => AppError::Database(other),
    })?;

    tracing::info!(passenger_id = %passenger_id, "Passenger profile updated");
    Ok(updated)
}

pub fn trips_query(
    passenger_id: Uuid,
    filter: &TripFilter,
    pagination: &Pagination,
) -> Select<trip::Entity> {
    trip::Entity::find()
        .filter(trip::Column::PassengerId.eq(passenger_id))
        .apply_if(filter.status, |query, status| {
            query.filter(trip::Column::Status.eq(status))
        })
        .apply_if(filter.range.start, |query, start| {
            query.filter(trip::Column::CreatedAt.gte(start))
        })
        .apply_if(filter.range.end, |query, end| {
            query.filter(trip::Column::CreatedAt.lte(end))
        })
        .order_by_desc(trip::Column::CreatedAt)
        .offset(pagination.offset())
        .limit(pagination.page_size)
}

pub async fn trips(
    db: &DatabaseConnection,
    passenger_id: Uuid,
    filter: TripFilter,
    pagination: Pagination,
) -> AppResult<PassengerTrips> {
    let trips = trips_query(passenger_id, &filter, &pagination).all(db).await?;

    Ok(PassengerTrips {
        pagination: pagination.info(trips.len()),
        trips,
    })
}

pub async fn payment_methods(
    db: &DatabaseConnection,
    passenger_id: Uuid,
) -> AppResult<Vec<payment_method::Model>> {
    let methods = payment_method::Entity::find()
        .filter(payment_method::Column::UserId.eq(passenger_id))
        .order_by_desc(payment_method::Column::IsDefault)
        .order_by_desc(payment_method::Column::CreatedAt)
        .all(db)
        .await?;
    Ok(methods)
}

/// Store a card; a new default replaces the previous one atomically
pub async fn add_payment_method(
    db: &DatabaseConnection,
    passenger_id: Uuid,
    method: NewPaymentMethod,
) -> AppResult<payment_method::Model> {
    method.validate()?;

    let txn = db.begin().await?;

    passenger::Entity::find_by_id(passenger_id)
        .one(&txn)
        .await?
        .ok_or_else(passenger_not_found)?;

    if method.is_default {
        payment_method::Entity::update_many()
            .set(payment_method::ActiveModel {
                is_default: Set(false),
                ..Default::default()
            })
            .filter(payment_method::Column::UserId.eq(passenger_id))
            .filter(payment_method::Column::IsDefault.eq(true))
            .exec(&txn)
            .await?;
    }

    let saved = payment_method::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(passenger_id),
        card_type: Set(method.card_type.trim().to_string()),
        last_four_digits: Set(method.last_four_digits),
        expiration_date: Set(method.expiration_date),
        is_default: Set(method.is_default),
        created_at: Set(Utc::now().into()),
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    tracing::info!(passenger_id = %passenger_id, payment_method_id = %saved.id, "Payment method added");
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn card(last_four: &str, expiration: &str) -> NewPaymentMethod {
        NewPaymentMethod {
            card_type: "visa".into(),
            last_four_digits: last_four.into(),
            expiration_date: expiration.into(),
            is_default: false,
        }
    }

    #[test]
    fn test_only_owner_may_access() {
        let id = Uuid::new_v4();
        assert!(ensure_self(id, id).is_ok());
        assert!(matches!(ensure_self(Uuid::new_v4(), id), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn test_card_validation() {
        assert!(card("4242", "08/27").validate().is_ok());
        assert!(card("4242", "08/2027").validate().is_ok());
        assert!(card("424", "08/27").validate().is_err());
        assert!(card("42a2", "08/27").validate().is_err());
        assert!(card("4242", "13/27").validate().is_err());
        assert!(card("4242", "0827").validate().is_err());
    }

    #[test]
    fn test_trip_history_filters() {
        let filter = TripFilter {
            status: Some(TripStatus::Completed),
            range: DateRange::default(),
        };
        let pagination = Pagination::new(Some(3), None, DEFAULT_TRIPS_PAGE_SIZE).unwrap();
        let sql = trips_query(Uuid::new_v4(), &filter, &pagination)
            .build(DatabaseBackend::Postgres)
            .to_string();

        assert!(sql.contains("completed"), "{}", sql);
        assert!(sql.contains("ORDER BY \"trip\".\"created_at\" DESC"), "{}", sql);
        assert!(sql.contains("LIMIT 10 OFFSET 20"), "{}", sql);
    }

    #[tokio::test]
    async fn test_update_requires_names() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let changes = PassengerUpdate {
            first_name: Some("Kofi".into()),
            last_name: None,
            email: None,
        };

        let err = update(&db, Uuid::new_v4(), changes).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_payment_method_for_unknown_passenger() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<passenger::Model>::new()])
            .into_connection();

        let err = add_payment_method(&db, Uuid::new_v4(), card("4242", "08/27"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
