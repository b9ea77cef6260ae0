//! Attendance entity (check-in/check-out plus feedback).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "attendance")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// One attendance record per registration
    #[sea_orm(unique)]
    pub registration_id: String,

    #[sea_orm(indexed)]
    pub event_id: String,

    #[sea_orm(indexed)]
    pub user_id: String,

    #[sea_orm(nullable)]
    pub check_in_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub check_out_at: Option<DateTimeWithTimeZone>,

    /// Staff member who scanned the QR code
    #[sea_orm(nullable)]
    pub checked_in_by: Option<String>,

    /// Feedback rating (1-5)
    #[sea_orm(nullable)]
    pub feedback_rating: Option<i16>,

    #[sea_orm(column_type = "Text", nullable)]
    pub feedback_comment: Option<String>,

    #[sea_orm(nullable)]
    pub feedback_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Hours between check-in and check-out, if both are recorded.
    #[must_use]
    pub fn hours(&self) -> Option<f64> {
        match (self.check_in_at, self.check_out_at) {
            (Some(check_in), Some(check_out)) => {
                let seconds = (check_out - check_in).num_seconds().max(0);
                Some(seconds as f64 / 3600.0)
            }
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::registration::Entity",
        from = "Column::RegistrationId",
        to = "super::registration::Column::Id",
        on_delete = "Cascade"
    )]
    Registration,
    #[sea_orm(
        belongs_to = "super::event::Entity",
        from = "Column::EventId",
        to = "super::event::Column::Id",
        on_delete = "Cascade"
    )]
    Event,
}

impl Related<super::registration::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Registration.def()
    }
}

impl Related<super::event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Event.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(check_in: Option<i64>, check_out: Option<i64>) -> Model {
        let base = Utc::now();
        Model {
            id: "a1".to_string(),
            registration_id: "r1".to_string(),
            event_id: "e1".to_string(),
            user_id: "u1".to_string(),
            check_in_at: check_in.map(|m| (base + Duration::minutes(m)).into()),
            check_out_at: check_out.map(|m| (base + Duration::minutes(m)).into()),
            checked_in_by: None,
            feedback_rating: None,
            feedback_comment: None,
            feedback_at: None,
            created_at: base.into(),
        }
    }

    #[test]
    fn test_hours_completed() {
        let hours = record(Some(0), Some(150)).hours();
        assert_eq!(hours, Some(2.5));
    }

    #[test]
    fn test_hours_incomplete() {
        assert_eq!(record(Some(0), None).hours(), None);
        assert_eq!(record(None, None).hours(), None);
    }
}
