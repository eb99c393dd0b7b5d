//! Service add-on entity - Catalog of optional extras for a service.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Service add-on database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "service_addons")]
pub struct Model {
    /// Unique identifier for the add-on
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Service the add-on extends
    pub service_id: i64,
    /// Name shown to clients
    pub name: String,
    /// Current catalog price
    pub price: f64,
    /// Inactive add-ons cannot be booked
    pub is_active: bool,
}

/// Defines relationships between add-ons and services
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each add-on belongs to one service
    #[sea_orm(
        belongs_to = "super::service::Entity",
        from = "Column::ServiceId",
        to = "super::service::Column::Id"
    )]
    Service,
}

impl Related<super::service::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Service.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
