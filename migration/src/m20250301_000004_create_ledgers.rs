use sea_orm_migration::{prelude::*, schema::*};

use super::m20250301_000002_create_profiles::{Driver, Passenger};
use super::m20250301_000003_create_trips::Trip;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Append-only; rows are never updated or deleted by the application
        manager
            .create_table(
                Table::create()
                    .table(PointsTransaction::Table)
                    .if_not_exists()
                    .col(uuid(PointsTransaction::Id).primary_key())
                    .col(uuid(PointsTransaction::DriverId).not_null())
                    .col(integer(PointsTransaction::Amount).not_null())
                    .col(string_len(PointsTransaction::TransactionType, 32).not_null())
                    .col(uuid_null(PointsTransaction::TripId))
                    .col(text_null(PointsTransaction::Description))
                    .col(
                        timestamp_with_time_zone(PointsTransaction::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_points_transaction_driver")
                            .from(PointsTransaction::Table, PointsTransaction::DriverId)
                            .to(Driver::Table, Driver::UserId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_points_transaction_trip")
                            .from(PointsTransaction::Table, PointsTransaction::TripId)
                            .to(Trip::Table, Trip::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_points_transaction_driver_created")
                    .table(PointsTransaction::Table)
                    .col(PointsTransaction::DriverId)
                    .col(PointsTransaction::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Rating::Table)
                    .if_not_exists()
                    .col(uuid(Rating::Id).primary_key())
                    .col(uuid(Rating::TripId).not_null())
                    .col(uuid(Rating::RaterId).not_null())
                    .col(uuid(Rating::RatedUserId).not_null())
                    .col(small_integer(Rating::Score).not_null())
                    .col(text_null(Rating::Comment))
                    .col(
                        timestamp_with_time_zone(Rating::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_rating_trip")
                            .from(Rating::Table, Rating::TripId)
                            .to(Trip::Table, Trip::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Each participant rates a trip once
        manager
            .create_index(
                Index::create()
                    .name("uq_rating_trip_rater")
                    .table(Rating::Table)
                    .col(Rating::TripId)
                    .col(Rating::RaterId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PaymentMethod::Table)
                    .if_not_exists()
                    .col(uuid(PaymentMethod::Id).primary_key())
                    .col(uuid(PaymentMethod::UserId).not_null())
                    .col(string_len(PaymentMethod::CardType, 32).not_null())
                    .col(string_len(PaymentMethod::LastFourDigits, 4).not_null())
                    .col(string_len(PaymentMethod::ExpirationDate, 7).not_null())
                    .col(boolean(PaymentMethod::IsDefault).not_null().default(false))
                    .col(
                        timestamp_with_time_zone(PaymentMethod::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payment_method_passenger")
                            .from(PaymentMethod::Table, PaymentMethod::UserId)
                            .to(Passenger::Table, Passenger::UserId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PaymentMethod::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Rating::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PointsTransaction::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PointsTransaction {
    Table,
    Id,
    DriverId,
    Amount,
    TransactionType,
    TripId,
    Description,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Rating {
    Table,
    Id,
    TripId,
    RaterId,
    RatedUserId,
    Score,
    Comment,
    CreatedAt,
}

#[derive(DeriveIden)]
enum PaymentMethod {
    Table,
    Id,
    UserId,
    CardType,
    LastFourDigits,
    ExpirationDate,
    IsDefault,
    CreatedAt,
}
