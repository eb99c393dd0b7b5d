//! Payment attempt entity - Idempotency claim and outbox record for booking payments.
//!
//! `booking_id` is unique: a second concurrent attempt for the same booking fails
//! on insert. Attempts the provider declined are removed so the booking can be
//! paid again. Attempts whose provider outcome is unknown are never removed.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Progress of a payment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Provider call in progress
    #[sea_orm(string_value = "in_flight")]
    InFlight,
    /// Provider accepted the payment, booking not updated yet
    #[sea_orm(string_value = "succeeded")]
    Succeeded,
    /// Booking updated to paid
    #[sea_orm(string_value = "applied")]
    Applied,
    /// Provider accepted the payment after the booking stopped being payable;
    /// the amount went back to the client's wallet
    #[sea_orm(string_value = "refunded")]
    Refunded,
    /// Provider call never resolved; someone has to check with the provider
    #[sea_orm(string_value = "needs_review")]
    NeedsReview,
}

/// Payment attempt database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_attempts")]
pub struct Model {
    /// Unique identifier for the attempt
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Booking being paid; at most one attempt per booking
    #[sea_orm(unique)]
    pub booking_id: i64,
    /// Amount requested from the provider
    pub amount: f64,
    /// Currency of `amount`
    pub currency: String,
    /// Progress of the attempt
    pub status: AttemptStatus,
    /// Provider reference once the provider accepted the payment
    pub reference: Option<String>,
    /// When the attempt was claimed
    pub created_at: DateTimeUtc,
    /// Last status change; used to find stale attempts
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between payment attempts and bookings
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each attempt pays for one booking
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
