use sea_orm_migration::{prelude::*, schema::*, sea_orm::sea_query::extension::postgres::Type};

use super::m20250301_000001_create_users::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(DriverStatus::Enum)
                    .values([
                        DriverStatus::Online,
                        DriverStatus::Offline,
                        DriverStatus::Busy,
                        DriverStatus::Away,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Passenger::Table)
                    .if_not_exists()
                    .col(uuid(Passenger::UserId).primary_key())
                    .col(string_len(Passenger::FirstName, 100).not_null())
                    .col(string_len(Passenger::LastName, 100).not_null())
                    .col(string_len_null(Passenger::Email, 255))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_passenger_user")
                            .from(Passenger::Table, Passenger::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Driver::Table)
                    .if_not_exists()
                    .col(uuid(Driver::UserId).primary_key())
                    .col(string_len(Driver::LicenseNumber, 64).not_null())
                    .col(string_len_null(Driver::FirstName, 100))
                    .col(string_len_null(Driver::LastName, 100))
                    .col(
                        ColumnDef::new(Driver::DriverStatus)
                            .custom(DriverStatus::Enum)
                            .not_null()
                            .default("offline"),
                    )
                    .col(string_len_null(Driver::CurrentLocation, 64))
                    .col(timestamp_with_time_zone_null(Driver::LastLocationUpdate))
                    .col(double_null(Driver::Rating))
                    .col(integer(Driver::PointsBalance).not_null().default(0))
                    .col(uuid_null(Driver::VehicleId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_driver_user")
                            .from(Driver::Table, Driver::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Buyer::Table)
                    .if_not_exists()
                    .col(uuid(Buyer::UserId).primary_key())
                    .col(string_len(Buyer::CompanyName, 255).not_null())
                    .col(string_len(Buyer::ContactPerson, 255).not_null())
                    .col(string_len(Buyer::Email, 255).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_buyer_user")
                            .from(Buyer::Table, Buyer::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One vehicle per driver, one driver per plate
        manager
            .create_table(
                Table::create()
                    .table(Vehicle::Table)
                    .if_not_exists()
                    .col(uuid(Vehicle::Id).primary_key())
                    .col(uuid(Vehicle::DriverId).not_null().unique_key())
                    .col(string_len(Vehicle::Make, 64).not_null())
                    .col(string_len(Vehicle::Model, 64).not_null())
                    .col(integer(Vehicle::Year).not_null())
                    .col(string_len(Vehicle::LicensePlate, 32).not_null().unique_key())
                    .col(string_len(Vehicle::Color, 32).not_null())
                    .col(integer(Vehicle::Capacity).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vehicle_driver")
                            .from(Vehicle::Table, Vehicle::DriverId)
                            .to(Driver::Table, Driver::UserId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_foreign_key(
                ForeignKey::create()
                    .name("fk_driver_vehicle")
                    .from(Driver::Table, Driver::VehicleId)
                    .to(Vehicle::Table, Vehicle::Id)
                    .on_delete(ForeignKeyAction::SetNull)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_foreign_key(
                ForeignKey::drop()
                    .name("fk_driver_vehicle")
                    .table(Driver::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Vehicle::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Buyer::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Driver::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Passenger::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(DriverStatus::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Passenger {
    Table,
    UserId,
    FirstName,
    LastName,
    Email,
}

#[derive(DeriveIden)]
pub enum Driver {
    Table,
    UserId,
    LicenseNumber,
    FirstName,
    LastName,
    DriverStatus,
    CurrentLocation,
    LastLocationUpdate,
    Rating,
    PointsBalance,
    VehicleId,
}

#[derive(DeriveIden)]
enum Buyer {
    Table,
    UserId,
    CompanyName,
    ContactPerson,
    Email,
}

#[derive(DeriveIden)]
enum Vehicle {
    Table,
    Id,
    DriverId,
    Make,
    Model,
    Year,
    LicensePlate,
    Color,
    Capacity,
}

#[derive(DeriveIden)]
pub enum DriverStatus {
    #[sea_orm(iden = "driver_status")]
    Enum,
    #[sea_orm(iden = "online")]
    Online,
    #[sea_orm(iden = "offline")]
    Offline,
    #[sea_orm(iden = "busy")]
    Busy,
    #[sea_orm(iden = "away")]
    Away,
}
