//! Withdrawal entity - A provider-initiated debit against their available balance.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Settlement state of a withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    /// Payout provider accepted the transfer
    #[sea_orm(string_value = "requested")]
    Requested,
    /// Reserved; the payout outcome is not known yet
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Settled
    #[sea_orm(string_value = "completed")]
    Completed,
    /// Settlement failed; the amount is available again
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl WithdrawalStatus {
    /// Whether the withdrawal still reserves part of the balance
    #[must_use]
    pub const fn is_outstanding(self) -> bool {
        matches!(self, Self::Requested | Self::Pending)
    }
}

/// Withdrawal database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "withdrawals")]
pub struct Model {
    /// Unique identifier for the withdrawal
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Provider being paid out
    pub provider_id: String,
    /// Amount paid out
    pub amount: f64,
    /// Currency of `amount`
    pub currency: String,
    /// Settlement state
    pub status: WithdrawalStatus,
    /// When the amount was reserved
    pub requested_at: DateTimeUtc,
    /// Set by the settlement process
    pub processed_at: Option<DateTimeUtc>,
    /// Payout channel and destination, e.g. `"MTN Mobile Money: 677000000"`
    pub notes: Option<String>,
    /// Reference returned by the payout provider
    pub payout_reference: Option<String>,
}

/// Withdrawals are standalone ledger entries
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
