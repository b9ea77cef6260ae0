//! Create registration and attendance tables migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Registration::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Registration::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Registration::UserId).string_len(32).not_null())
                    .col(ColumnDef::new(Registration::EventId).string_len(32).not_null())
                    .col(ColumnDef::new(Registration::Status).string_len(16).not_null())
                    .col(ColumnDef::new(Registration::QrToken).string_len(64))
                    .col(
                        ColumnDef::new(Registration::RegisteredAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Registration::CancelledAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Registration::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_registration_user")
                            .from(Registration::Table, Registration::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_registration_event")
                            .from(Registration::Table, Registration::EventId)
                            .to(Event::Table, Event::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: (user_id, event_id) - one registration per user per event
        manager
            .create_index(
                Index::create()
                    .name("idx_registration_user_event")
                    .table(Registration::Table)
                    .col(Registration::UserId)
                    .col(Registration::EventId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: (event_id, status, registered_at) for participant lists and FIFO waitlist
        manager
            .create_index(
                Index::create()
                    .name("idx_registration_event_status")
                    .table(Registration::Table)
                    .col(Registration::EventId)
                    .col(Registration::Status)
                    .col(Registration::RegisteredAt)
                    .to_owned(),
            )
            .await?;

        // Unique index: qr_token
        manager
            .create_index(
                Index::create()
                    .name("idx_registration_qr_token")
                    .table(Registration::Table)
                    .col(Registration::QrToken)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Attendance::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Attendance::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Attendance::RegistrationId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Attendance::EventId).string_len(32).not_null())
                    .col(ColumnDef::new(Attendance::UserId).string_len(32).not_null())
                    .col(ColumnDef::new(Attendance::CheckInAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Attendance::CheckOutAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Attendance::CheckedInBy).string_len(32))
                    .col(ColumnDef::new(Attendance::FeedbackRating).small_integer())
                    .col(ColumnDef::new(Attendance::FeedbackComment).text())
                    .col(ColumnDef::new(Attendance::FeedbackAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Attendance::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_attendance_registration")
                            .from(Attendance::Table, Attendance::RegistrationId)
                            .to(Registration::Table, Registration::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_attendance_event")
                            .from(Attendance::Table, Attendance::EventId)
                            .to(Event::Table, Event::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: registration_id - one attendance per registration
        manager
            .create_index(
                Index::create()
                    .name("idx_attendance_registration_id")
                    .table(Attendance::Table)
                    .col(Attendance::RegistrationId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_attendance_event_id")
                    .table(Attendance::Table)
                    .col(Attendance::EventId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_attendance_user_id")
                    .table(Attendance::Table)
                    .col(Attendance::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Attendance::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Registration::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Registration {
    Table,
    Id,
    UserId,
    EventId,
    Status,
    QrToken,
    RegisteredAt,
    CancelledAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Attendance {
    Table,
    Id,
    RegistrationId,
    EventId,
    UserId,
    CheckInAt,
    CheckOutAt,
    CheckedInBy,
    FeedbackRating,
    FeedbackComment,
    FeedbackAt,
    CreatedAt,
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
