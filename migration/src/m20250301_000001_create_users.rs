use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(uuid(User::Id).primary_key())
                    .col(string_len(User::PhoneNumber, 32).not_null().unique_key())
                    .col(string_len(User::PasswordHash, 255).not_null())
                    .col(boolean(User::IsVerified).not_null().default(false))
                    .col(
                        timestamp_with_time_zone(User::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // OTP codes are keyed by phone number so a code can be issued before verification
        manager
            .create_table(
                Table::create()
                    .table(Otp::Table)
                    .if_not_exists()
                    .col(uuid(Otp::Id).primary_key())
                    .col(string_len(Otp::PhoneNumber, 32).not_null())
                    .col(string_len(Otp::Code, 6).not_null())
                    .col(timestamp_with_time_zone(Otp::ExpiresAt).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_otp_phone_number")
                    .table(Otp::Table)
                    .col(Otp::PhoneNumber)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Otp::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum User {
    Table,
    Id,
    PhoneNumber,
    PasswordHash,
    IsVerified,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Otp {
    Table,
    Id,
    PhoneNumber,
    Code,
    ExpiresAt,
}
