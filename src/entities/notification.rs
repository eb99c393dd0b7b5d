//! Notification entity - In-app notifications written by the database notifier.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Visual severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Neutral information
    #[sea_orm(string_value = "info")]
    Info,
    /// Something the user asked for went through
    #[sea_orm(string_value = "success")]
    Success,
    /// Needs the user's attention
    #[sea_orm(string_value = "warning")]
    Warning,
    /// Something failed
    #[sea_orm(string_value = "error")]
    Error,
}

/// Area of the product the notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    /// Booking lifecycle
    #[sea_orm(string_value = "booking")]
    Booking,
    /// Payments and refunds
    #[sea_orm(string_value = "payment")]
    Payment,
    /// Reviews received
    #[sea_orm(string_value = "review")]
    Review,
    /// Payouts
    #[sea_orm(string_value = "withdrawal")]
    Withdrawal,
    /// Shared documents
    #[sea_orm(string_value = "document")]
    Document,
}

/// Notification database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    /// Unique identifier for the notification
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Recipient
    pub user_id: String,
    /// Short headline
    pub title: String,
    /// Body text
    pub message: String,
    /// Severity
    pub kind: NotificationKind,
    /// What the notification is about
    pub category: NotificationCategory,
    /// Where the call to action leads
    pub action_url: Option<String>,
    /// Label of the call to action
    pub action_label: Option<String>,
    /// Set once the recipient has seen it
    pub is_read: bool,
    /// When it was delivered
    pub created_at: DateTimeUtc,
}

/// Notifications reference users only by id
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
