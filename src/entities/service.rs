//! Service entity - A consultation offered by a provider.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Service database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "services")]
pub struct Model {
    /// Unique identifier for the service
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Provider offering the service
    pub provider_id: String,
    /// Title shown to clients
    pub title: String,
    /// Price before add-ons
    pub base_price: f64,
    /// Currency of the prices
    pub currency: String,
    /// Inactive services cannot be booked
    pub is_active: bool,
}

/// Defines relationships between services, add-ons and bookings
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One service has many catalog add-ons
    #[sea_orm(has_many = "super::service_addon::Entity")]
    Addons,
    /// One service has many bookings
    #[sea_orm(has_many = "super::booking::Entity")]
    Bookings,
}

impl Related<super::service_addon::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Addons.def()
    }
}

impl Related<super::booking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bookings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
