//! Earnings/withdrawal ledger.
//!
//! The available balance is always derived from the ledger rows on read; nothing
//! is cached, because a settlement process can change withdrawals at any time:
//!
//! ```text
//! available = completed earnings - (completed withdrawals + requested/pending withdrawals)
//! ```
//!
//! Balances are per currency; rows in other currencies are ignored.

use crate::{
    entities::{
        Earning, Profile, Service, Withdrawal, booking, earning, earning::EarningStatus,
        withdrawal,
    },
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, prelude::*};

/// Snapshot of a provider's ledger
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSummary {
    /// Sum of completed earnings
    pub total_earnings: f64,
    /// Sum of earnings not yet completed (not withdrawable)
    pub pending_earnings: f64,
    /// Sum of completed withdrawals
    pub total_withdrawn: f64,
    /// Sum of requested and pending withdrawals
    pub pending_withdrawals: f64,
    /// `total_earnings - (total_withdrawn + pending_withdrawals)`
    pub available_balance: f64,
}

/// Input for recording an earning that does not come from a booking payment
#[derive(Debug, Clone)]
pub struct NewEarning {
    /// Provider receiving the earning
    pub provider_id: String,
    /// Amount earned, greater than zero
    pub amount: f64,
    /// Currency code, stored upper-cased
    pub currency: String,
    /// What the earning was for, e.g. a job title
    pub project_label: String,
    /// Who paid
    pub client_label: String,
    /// Pending earnings are not withdrawable yet
    pub status: EarningStatus,
}

/// Computes a provider's ledger in `currency` from fresh queries.
pub async fn compute_ledger<C>(db: &C, provider_id: &str, currency: &str) -> Result<LedgerSummary>
where
    C: ConnectionTrait,
{
    let currency = currency.trim().to_uppercase();
    let earnings = Earning::find()
        .filter(earning::Column::ProviderId.eq(provider_id))
        .filter(earning::Column::Currency.eq(currency.as_str()))
        .all(db)
        .await?;
    let withdrawals = Withdrawal::find()
        .filter(withdrawal::Column::ProviderId.eq(provider_id))
        .filter(withdrawal::Column::Currency.eq(currency.as_str()))
        .all(db)
        .await?;

    let sum_earnings = |status: EarningStatus| -> f64 {
        earnings
            .iter()
            .filter(|e| e.status == status)
            .map(|e| e.amount)
            .sum()
    };
    let total_earnings = sum_earnings(EarningStatus::Completed);
    let pending_earnings = sum_earnings(EarningStatus::Pending);

    let total_withdrawn: f64 = withdrawals
        .iter()
        .filter(|w| w.status == withdrawal::WithdrawalStatus::Completed)
        .map(|w| w.amount)
        .sum();
    let pending_withdrawals: f64 = withdrawals
        .iter()
        .filter(|w| w.status.is_outstanding())
        .map(|w| w.amount)
        .sum();

    Ok(LedgerSummary {
        total_earnings,
        pending_earnings,
        total_withdrawn,
        pending_withdrawals,
        available_balance: total_earnings - (total_withdrawn + pending_withdrawals),
    })
}

/// Balance a provider can withdraw in `currency` right now.
pub async fn compute_available_balance<C>(db: &C, provider_id: &str, currency: &str) -> Result<f64>
where
    C: ConnectionTrait,
{
    Ok(compute_ledger(db, provider_id, currency)
        .await?
        .available_balance)
}

/// Records an earning directly, e.g. for a completed freelance job.
pub async fn record_earning(db: &DatabaseConnection, input: NewEarning) -> Result<earning::Model> {
    if !input.amount.is_finite() || input.amount <= 0.0 {
        return Err(Error::InvalidAmount {
            amount: input.amount,
        });
    }
    if input.provider_id.trim().is_empty() {
        return Err(Error::validation("An earning needs a provider"));
    }
    if input.currency.trim().is_empty() {
        return Err(Error::validation("An earning needs a currency"));
    }

    earning::ActiveModel {
        provider_id: Set(input.provider_id),
        booking_id: Set(None),
        amount: Set(input.amount),
        currency: Set(input.currency.trim().to_uppercase()),
        project_label: Set(input.project_label),
        client_label: Set(input.client_label),
        status: Set(input.status),
        date: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Records the pending earning for a booking that just became paid.
///
/// `amount` is what actually moved; the free tier records zero.
pub(crate) async fn record_booking_earning<C>(
    db: &C,
    booking: &booking::Model,
    amount: f64,
) -> Result<earning::Model>
where
    C: ConnectionTrait,
{
    let project_label = Service::find_by_id(booking.service_id)
        .one(db)
        .await?
        .map_or_else(|| format!("Booking #{}", booking.id), |s| s.title);
    let client_label = Profile::find_by_id(booking.client_id.clone())
        .one(db)
        .await?
        .map_or_else(|| booking.client_id.clone(), |p| p.full_name);

    earning::ActiveModel {
        provider_id: Set(booking.provider_id.clone()),
        booking_id: Set(Some(booking.id)),
        amount: Set(amount),
        currency: Set(booking.currency.clone()),
        project_label: Set(project_label),
        client_label: Set(client_label),
        status: Set(EarningStatus::Pending),
        date: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Moves the pending earnings of a booking to completed. Completed earnings are
/// never touched again.
pub(crate) async fn complete_booking_earnings<C>(db: &C, booking_id: i64) -> Result<u64>
where
    C: ConnectionTrait,
{
    let result = Earning::update_many()
        .set(earning::ActiveModel {
            status: Set(EarningStatus::Completed),
            ..Default::default()
        })
        .filter(earning::Column::BookingId.eq(booking_id))
        .filter(earning::Column::Status.eq(EarningStatus::Pending))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Removes the still-pending earnings of a refunded booking.
pub(crate) async fn void_booking_earnings<C>(db: &C, booking_id: i64) -> Result<u64>
where
    C: ConnectionTrait,
{
    let result = Earning::delete_many()
        .filter(earning::Column::BookingId.eq(booking_id))
        .filter(earning::Column::Status.eq(EarningStatus::Pending))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Lists a provider's earnings, newest first.
pub async fn list_earnings(
    db: &DatabaseConnection,
    provider_id: &str,
) -> Result<Vec<earning::Model>> {
    Earning::find()
        .filter(earning::Column::ProviderId.eq(provider_id))
        .order_by_desc(earning::Column::Date)
        .order_by_desc(earning::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}
