use sea_orm_migration::{
    prelude::*,
    schema::*,
    sea_orm::{sea_query::extension::postgres::Type, ConnectionTrait},
};

use super::m20250301_000002_create_profiles::{Driver, Passenger};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(TripStatus::Enum)
                    .values([
                        TripStatus::Requested,
                        TripStatus::Accepted,
                        TripStatus::Started,
                        TripStatus::Completed,
                        TripStatus::Cancelled,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Trip::Table)
                    .if_not_exists()
                    .col(uuid(Trip::Id).primary_key())
                    .col(uuid(Trip::PassengerId).not_null())
                    .col(uuid_null(Trip::DriverId))
                    .col(string_len(Trip::PickupLocation, 255).not_null())
                    .col(string_len(Trip::DropoffLocation, 255).not_null())
                    .col(double_null(Trip::PickupLat))
                    .col(double_null(Trip::PickupLng))
                    .col(double_null(Trip::DropoffLat))
                    .col(double_null(Trip::DropoffLng))
                    .col(double(Trip::Fare).not_null())
                    .col(double_null(Trip::Distance))
                    .col(big_integer_null(Trip::DurationSeconds))
                    .col(
                        ColumnDef::new(Trip::TripStatus)
                            .custom(TripStatus::Enum)
                            .not_null(),
                    )
                    .col(text_null(Trip::CancellationReason))
                    .col(timestamp_with_time_zone_null(Trip::StartTime))
                    .col(timestamp_with_time_zone_null(Trip::EndTime))
                    .col(
                        timestamp_with_time_zone(Trip::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_trip_passenger")
                            .from(Trip::Table, Trip::PassengerId)
                            .to(Passenger::Table, Passenger::UserId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_trip_driver")
                            .from(Trip::Table, Trip::DriverId)
                            .to(Driver::Table, Driver::UserId)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // A driver holds at most one accepted/started trip, even across server instances
        manager
            .get_connection()
            .execute_unprepared(
                r#"CREATE UNIQUE INDEX uq_trip_one_active_per_driver
                   ON trip (driver_id)
                   WHERE trip_status IN ('accepted', 'started')"#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Trip::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(TripStatus::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Trip {
    Table,
    Id,
    PassengerId,
    DriverId,
    PickupLocation,
    DropoffLocation,
    PickupLat,
    PickupLng,
    DropoffLat,
    DropoffLng,
    Fare,
    Distance,
    DurationSeconds,
    TripStatus,
    CancellationReason,
    StartTime,
    EndTime,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum TripStatus {
    #[sea_orm(iden = "trip_status")]
    Enum,
    #[sea_orm(iden = "requested")]
    Requested,
    #[sea_orm(iden = "accepted")]
    Accepted,
    #[sea_orm(iden = "started")]
    Started,
    #[sea_orm(iden = "completed")]
    Completed,
    #[sea_orm(iden = "cancelled")]
    Cancelled,
}
