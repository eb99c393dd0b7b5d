//! Review entity - A rating and comment tied to a completed booking.
//!
//! The `(booking_id, reviewer_id)` pair is unique; the index is created
//! alongside the table in `config::database`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Review database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reviews")]
pub struct Model {
    /// Unique identifier for the review
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Reviewed booking
    pub booking_id: i64,
    /// Client who wrote the review
    pub reviewer_id: String,
    /// Provider being reviewed
    pub provider_id: String,
    /// 1 to 5
    pub rating: i32,
    /// Optional free text
    pub comment: Option<String>,
    /// When the review was written
    pub created_at: DateTimeUtc,
}

/// Defines relationships between reviews and bookings
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each review belongs to one booking
    #[sea_orm(
        belongs_to = "super::booking::Entity",
        from = "Column::BookingId",
        to = "super::booking::Column::Id"
    )]
    Booking,
}

impl Related<super::booking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Booking.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
