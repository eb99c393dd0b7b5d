//! Profile entity - Display data and role of an authenticated user.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Marketplace role of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Books consultations
    #[sea_orm(string_value = "student")]
    Student,
    /// Offers consultations
    #[sea_orm(string_value = "researcher")]
    Researcher,
    /// Offers research assistance
    #[sea_orm(string_value = "research_aid")]
    ResearchAid,
    /// Platform administrator
    #[sea_orm(string_value = "admin")]
    Admin,
}

impl Role {
    /// Researchers and research-aids render services and receive earnings
    #[must_use]
    pub const fn is_provider(self) -> bool {
        matches!(self, Self::Researcher | Self::ResearchAid)
    }
}

/// Profile database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "profiles")]
pub struct Model {
    /// Authentication user id
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Display name
    pub full_name: String,
    /// Marketplace role
    pub role: Role,
    /// Contact email
    pub email: Option<String>,
    /// When the profile was created
    pub created_at: DateTimeUtc,
}

/// Profiles are referenced by id from other tables
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
