//! Create event table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Event::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Event::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(Event::Title).string_len(200).not_null())
                    .col(ColumnDef::new(Event::Description).text().not_null())
                    .col(ColumnDef::new(Event::Location).string_len(300).not_null())
                    .col(
                        ColumnDef::new(Event::StartDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Event::EndDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Event::MaxParticipants).integer().not_null())
                    .col(
                        ColumnDef::new(Event::CurrentParticipants)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Event::Tags)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(ColumnDef::new(Event::ImageUrl).string_len(1024))
                    .col(
                        ColumnDef::new(Event::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Event::CreatedBy).string_len(32).not_null())
                    .col(ColumnDef::new(Event::ChannelId).string_len(32))
                    .col(ColumnDef::new(Event::ApprovalRequestId).string_len(32))
                    .col(ColumnDef::new(Event::CancellationReason).text())
                    .col(
                        ColumnDef::new(Event::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Event::UpdatedAt).timestamp_with_time_zone())
                    .check(
                        Expr::col(Event::CurrentParticipants)
                            .lte(Expr::col(Event::MaxParticipants))
                            .and(Expr::col(Event::CurrentParticipants).gte(0)),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_event_created_by")
                            .from(Event::Table, Event::CreatedBy)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (status, start_date) for the public listing
        manager
            .create_index(
                Index::create()
                    .name("idx_event_status_start_date")
                    .table(Event::Table)
                    .col(Event::Status)
                    .col(Event::StartDate)
                    .to_owned(),
            )
            .await?;

        // Index: created_by (manager's own events)
        manager
            .create_index(
                Index::create()
                    .name("idx_event_created_by")
                    .table(Event::Table)
                    .col(Event::CreatedBy)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Event::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Event {
    Table,
    Id,
    Title,
    Description,
    Location,
    StartDate,
    EndDate,
    MaxParticipants,
    CurrentParticipants,
    Tags,
    ImageUrl,
    Status,
    CreatedBy,
    ChannelId,
    ApprovalRequestId,
    CancellationReason,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
