//! Earning entity - A credit to a provider's balance.
//!
//! Earnings are created when a booking is paid (or recorded directly for a job)
//! and only count towards the available balance once `completed`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Settlement state of an earning
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum EarningStatus {
    /// Paid but the engagement is not finished yet
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Counts towards the available balance; immutable
    #[sea_orm(string_value = "completed")]
    Completed,
}

/// Earning database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "earnings")]
pub struct Model {
    /// Unique identifier for the earning
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Provider credited by this earning
    pub provider_id: String,
    /// Originating booking, `None` for job earnings
    pub booking_id: Option<i64>,
    /// Amount earned; zero for free-tier bookings
    pub amount: f64,
    /// Currency code, upper-cased
    pub currency: String,
    /// What the earning was for (service title, job title)
    pub project_label: String,
    /// Who paid (client display name)
    pub client_label: String,
    /// Only completed earnings are withdrawable
    pub status: EarningStatus,
    /// When the earning was recorded
    pub date: DateTimeUtc,
}

/// Earnings are standalone ledger entries
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
