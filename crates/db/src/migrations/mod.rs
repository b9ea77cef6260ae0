//! Database migrations.
//!
//! Schema migrations for the database.

#![allow(missing_docs)]

use sea_orm_migration::prelude::*;

mod m20250601_000001_create_user_table;
mod m20250601_000002_create_event_table;
mod m20250601_000003_create_registration_tables;
mod m20250601_000004_create_approval_request_table;
mod m20250601_000005_create_social_tables;
mod m20250601_000006_create_notification_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_user_table::Migration),
            Box::new(m20250601_000002_create_event_table::Migration),
            Box::new(m20250601_000003_create_registration_tables::Migration),
            Box::new(m20250601_000004_create_approval_request_table::Migration),
            Box::new(m20250601_000005_create_social_tables::Migration),
            Box::new(m20250601_000006_create_notification_tables::Migration),
        ]
    }
}
