//! Booking entity - One scheduled consultation between a provider and a client.
//!
//! A booking carries two independent state axes: the lifecycle `status` and the
//! `payment_status`. Bookings are never deleted; cancellation is a status change.

use sea_orm::FromJsonQueryResult;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Requested by the client, not yet paid
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Paid and scheduled
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    /// Session took place
    #[sea_orm(string_value = "completed")]
    Completed,
    /// Cancelled by either party (terminal)
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    /// Client did not attend
    #[sea_orm(string_value = "no_show")]
    NoShow,
}

impl BookingStatus {
    /// Database/string representation of the status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }

    /// Whether no further lifecycle transitions are allowed
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoShow)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment state of a booking, independent from [`BookingStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Not paid yet
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Charged, or confirmed through the free tier
    #[sea_orm(string_value = "paid")]
    Paid,
    /// Returned to the client's wallet
    #[sea_orm(string_value = "refunded")]
    Refunded,
    /// Payment could not be completed
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// A document shared between the two parties of a booking
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedDocument {
    /// Display name of the document
    pub name: String,
    /// Storage URL of the document
    pub url: String,
}

/// Ordered list of shared documents, stored as a JSON column
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct SharedDocuments(pub Vec<SharedDocument>);

/// Booking database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bookings")]
pub struct Model {
    /// Unique identifier for the booking
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User id of the researcher or research-aid delivering the service
    pub provider_id: String,
    /// User id of the student buying the service
    pub client_id: String,
    /// Booked service
    pub service_id: i64,
    /// Academic level of the client (e.g. "masters")
    pub academic_level: String,
    /// Day of the session
    pub scheduled_date: Date,
    /// Start time of the session
    pub scheduled_time: Time,
    /// Length of the session in minutes
    pub duration_minutes: i32,
    /// Price of the service itself
    pub base_price: f64,
    /// Sum of the add-on prices captured at booking time
    pub addon_price: f64,
    /// `base_price + addon_price`
    pub total_price: f64,
    /// ISO currency code, e.g. `"XAF"`
    pub currency: String,
    /// Lifecycle state
    pub status: BookingStatus,
    /// Payment state
    pub payment_status: PaymentStatus,
    /// Provider reference of the payment, `"Free"` for the free tier
    pub payment_id: Option<String>,
    /// Video meeting URL, set once the booking is paid
    pub meeting_link: Option<String>,
    /// Notes left by the client when booking
    pub client_notes: Option<String>,
    /// Notes left by the provider
    pub provider_notes: Option<String>,
    /// Documents shared by either party, in upload order
    #[sea_orm(column_type = "Json")]
    pub shared_documents: SharedDocuments,
    /// Whether the client has reviewed the booking
    pub has_review: bool,
    /// Reason given by whoever cancelled
    pub cancellation_reason: Option<String>,
    /// When the booking was requested
    pub created_at: DateTimeUtc,
    /// Last change, also the version checked when sharing documents
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Booking and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each booking is for one service
    #[sea_orm(
        belongs_to = "super::service::Entity",
        from = "Column::ServiceId",
        to = "super::service::Column::Id"
    )]
    Service,
    /// One booking has many captured add-ons
    #[sea_orm(has_many = "super::booking_addon::Entity")]
    Addons,
    /// One booking has at most one review per reviewer
    #[sea_orm(has_many = "super::review::Entity")]
    Reviews,
}

impl Related<super::service::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Service.def()
    }
}

impl Related<super::booking_addon::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Addons.def()
    }
}

impl Related<super::review::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reviews.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
