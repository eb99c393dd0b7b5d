//! Booking add-on entity - An add-on attached to a booking with its price captured
//! at booking time, so later catalog changes do not alter historical bookings.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Booking add-on database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "booking_addons")]
pub struct Model {
    /// Unique identifier for the booking add-on
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Booking this add-on belongs to
    pub booking_id: i64,
    /// Catalog entry the add-on was priced from
    pub addon_id: i64,
    /// Catalog name at booking time
    pub name: String,
    /// Catalog price at booking time
    pub price: f64,
}

/// Each row links one booking to one catalog add-on
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Booking the add-on was captured on
    #[sea_orm(
        belongs_to = "super::booking::Entity",
        from = "Column::BookingId",
        to = "super::booking::Column::Id"
    )]
    Booking,
    /// Catalog entry it was priced from
    #[sea_orm(
        belongs_to = "super::service_addon::Entity",
        from = "Column::AddonId",
        to = "super::service_addon::Column::Id"
    )]
    ServiceAddon,
}

impl Related<super::booking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Booking.def()
    }
}

impl Related<super::service_addon::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ServiceAddon.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
