//! Create approval request table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ApprovalRequest::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ApprovalRequest::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ApprovalRequest::RequestType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ApprovalRequest::RequesterId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ApprovalRequest::EventId).string_len(32))
                    .col(ColumnDef::new(ApprovalRequest::Payload).json_binary().not_null())
                    .col(
                        ColumnDef::new(ApprovalRequest::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(ApprovalRequest::ReviewedBy).string_len(32))
                    .col(ColumnDef::new(ApprovalRequest::ReviewNote).text())
                    .col(
                        ColumnDef::new(ApprovalRequest::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(ApprovalRequest::ReviewedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_approval_request_requester")
                            .from(ApprovalRequest::Table, ApprovalRequest::RequesterId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_approval_request_reviewer")
                            .from(ApprovalRequest::Table, ApprovalRequest::ReviewedBy)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_approval_request_event")
                            .from(ApprovalRequest::Table, ApprovalRequest::EventId)
                            .to(Event::Table, Event::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (status, created_at) for the admin queue
        manager
            .create_index(
                Index::create()
                    .name("idx_approval_request_status_created_at")
                    .table(ApprovalRequest::Table)
                    .col(ApprovalRequest::Status)
                    .col(ApprovalRequest::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Index: (requester_id, request_type, status) for the one-pending-promotion rule
        manager
            .create_index(
                Index::create()
                    .name("idx_approval_request_requester")
                    .table(ApprovalRequest::Table)
                    .col(ApprovalRequest::RequesterId)
                    .col(ApprovalRequest::RequestType)
                    .col(ApprovalRequest::Status)
                    .to_owned(),
            )
            .await?;

        // Index: (event_id, request_type, status) for the one-pending-cancellation rule
        manager
            .create_index(
                Index::create()
                    .name("idx_approval_request_event")
                    .table(ApprovalRequest::Table)
                    .col(ApprovalRequest::EventId)
                    .col(ApprovalRequest::RequestType)
                    .col(ApprovalRequest::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ApprovalRequest::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ApprovalRequest {
    Table,
    Id,
    RequestType,
    RequesterId,
    EventId,
    Payload,
    Status,
    ReviewedBy,
    ReviewNote,
    CreatedAt,
    ReviewedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}

#[derive(Iden)]
enum Event {
    Table,
    Id,
}
