use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OtpRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OtpRequests::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OtpRequests::Phone).string_len(16).not_null())
                    .col(
                        ColumnDef::new(OtpRequests::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Window counts scan (phone, created_at > since).
        manager
            .create_index(
                Index::create()
                    .table(OtpRequests::Table)
                    .col(OtpRequests::Phone)
                    .col(OtpRequests::CreatedAt)
                    .name("idx_otp_requests_phone_created_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OtpRequests::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum OtpRequests {
    Table,
    Id,
    Phone,
    CreatedAt,
}
