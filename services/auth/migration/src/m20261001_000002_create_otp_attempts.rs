use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OtpAttempts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OtpAttempts::Phone)
                            .string_len(16)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OtpAttempts::CodeHash).string().not_null())
                    .col(
                        ColumnDef::new(OtpAttempts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OtpAttempts::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OtpAttempts::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OtpAttempts::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum OtpAttempts {
    Table,
    Phone,
    CodeHash,
    CreatedAt,
    ExpiresAt,
    Attempts,
}
