//! Wallet entity - Client balance credited by refunds.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Wallet database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "wallets")]
pub struct Model {
    /// Owner of the wallet
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    /// Current balance
    pub balance: f64,
    /// Last credit
    pub updated_at: DateTimeUtc,
}

/// Wallets are keyed by user id only
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
