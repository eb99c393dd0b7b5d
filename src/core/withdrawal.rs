//! Provider payout requests and their settlement.

use crate::{
    context::{Actor, AppContext},
    core::{
        ledger,
        notification::{NewNotification, dispatch},
    },
    entities::{
        Withdrawal,
        notification::{NotificationCategory, NotificationKind},
        withdrawal,
        withdrawal::WithdrawalStatus,
    },
    errors::{Error, Result},
    providers::payment::{MobileMoneyOperator, PayoutRequest},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::{error, info, instrument, warn};

/// A provider's request to move part of their available balance to mobile money
#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalRequest {
    /// Amount to pay out, at most the available balance in `currency`
    pub amount: f64,
    /// Currency of the payout; blank means the configured default
    pub currency: String,
    /// Mobile-money number receiving the payout
    pub destination_phone: String,
    /// Mobile-money network of `destination_phone`
    pub operator: MobileMoneyOperator,
}

fn validate_request(request: &WithdrawalRequest) -> Result<()> {
    if !request.amount.is_finite() || request.amount <= 0.0 {
        return Err(Error::InvalidAmount {
            amount: request.amount,
        });
    }
    if request.destination_phone.trim().is_empty() {
        return Err(Error::validation("A destination phone number is required"));
    }
    Ok(())
}

/// Writes a `pending` withdrawal if the balance covers it, in one transaction.
///
/// The pending row counts against the available balance straight away, so a
/// concurrent request sees the reduced balance.
async fn reserve_withdrawal(
    db: &DatabaseConnection,
    provider_id: &str,
    amount: f64,
    currency: &str,
    notes: String,
) -> Result<withdrawal::Model> {
    let txn = db.begin().await?;
    let available = ledger::compute_available_balance(&txn, provider_id, currency).await?;
    if amount > available {
        txn.rollback().await?;
        return Err(Error::InsufficientBalance {
            available,
            requested: amount,
        });
    }

    let reserved = withdrawal::ActiveModel {
        provider_id: Set(provider_id.to_string()),
        amount: Set(amount),
        currency: Set(currency.to_string()),
        status: Set(WithdrawalStatus::Pending),
        requested_at: Set(Utc::now()),
        processed_at: Set(None),
        notes: Set(Some(notes)),
        payout_reference: Set(None),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;
    Ok(reserved)
}

/// Drops a reservation the payout provider declined.
async fn release_reservation(db: &DatabaseConnection, withdrawal_id: i64) {
    let released = Withdrawal::delete_many()
        .filter(withdrawal::Column::Id.eq(withdrawal_id))
        .filter(withdrawal::Column::Status.eq(WithdrawalStatus::Pending))
        .exec(db)
        .await;
    if let Err(e) = released {
        // Settlement can still fail it
        warn!("Failed to release withdrawal reservation {withdrawal_id}: {e}");
    }
}

/// Requests a payout for the acting provider.
///
/// The amount is reserved against the available balance before the payout
/// provider is contacted; an amount above the balance never reaches the
/// provider. When the provider reports both success flags the reservation
/// becomes a `requested` withdrawal. A declined payout removes it. If the
/// provider never answers the outcome is unknown, so the reservation stays
/// `pending` until [`settle_withdrawal`] resolves it.
#[instrument(skip(ctx, request), fields(user_id = %actor.user_id, amount = request.amount))]
pub async fn process_withdrawal(
    ctx: &AppContext,
    actor: &Actor,
    request: &WithdrawalRequest,
) -> Result<withdrawal::Model> {
    validate_request(request)?;
    if !actor.role.is_provider() {
        return Err(Error::forbidden("Only providers can request withdrawals"));
    }

    let db = &ctx.database;
    let currency = ctx.currency_or_default(&request.currency);
    let phone = request.destination_phone.trim().to_string();
    let reserved = reserve_withdrawal(
        db,
        &actor.user_id,
        request.amount,
        &currency,
        format!("{}: {}", request.operator.channel_name(), phone),
    )
    .await?;

    let payout = PayoutRequest {
        amount: request.amount,
        currency,
        service: request.operator,
        receiver: phone,
        requester_id: actor.user_id.clone(),
    };

    let response = match tokio::time::timeout(ctx.payment_timeout, ctx.payments.deposit(&payout))
        .await
    {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            error!(
                "Payout call for withdrawal {} failed, keeping it pending: {e}",
                reserved.id
            );
            return Err(Error::PayoutFailed {
                reason: format!("{e}. The amount stays reserved until the payout is settled"),
            });
        }
        Err(_) => {
            error!(
                "Payout provider did not answer within {:?}, withdrawal {} stays pending",
                ctx.payment_timeout, reserved.id
            );
            return Err(Error::PayoutFailed {
                reason: "the payout provider did not respond in time. The amount stays reserved until the payout is settled".to_string(),
            });
        }
    };
    if !response.is_success() {
        release_reservation(db, reserved.id).await;
        let reason = response
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "the payout provider did not confirm the transfer".to_string());
        error!("Payout for {} declined: {reason}", actor.user_id);
        return Err(Error::PayoutFailed { reason });
    }

    Withdrawal::update_many()
        .set(withdrawal::ActiveModel {
            status: Set(WithdrawalStatus::Requested),
            payout_reference: Set(response.reference.clone()),
            ..Default::default()
        })
        .filter(withdrawal::Column::Id.eq(reserved.id))
        .filter(withdrawal::Column::Status.eq(WithdrawalStatus::Pending))
        .exec(db)
        .await
        .inspect_err(|e| {
            error!(
                "Payout {:?} for withdrawal {} went through but was not recorded: {e}",
                response.reference, reserved.id
            );
        })?;
    let created = Withdrawal::find_by_id(reserved.id)
        .one(db)
        .await?
        .ok_or(Error::WithdrawalNotFound { id: reserved.id })?;
    info!(
        "Withdrawal {} of {:.2} {} requested",
        created.id, created.amount, created.currency
    );

    dispatch(
        ctx.notifier.as_ref(),
        NewNotification::new(
            &actor.user_id,
            "Withdrawal requested",
            format!(
                "Your withdrawal of {:.0} {} to {} is being processed",
                created.amount,
                created.currency,
                request.operator.channel_name()
            ),
            NotificationCategory::Withdrawal,
        )
        .with_kind(NotificationKind::Success)
        .with_action("/earnings", "View earnings"),
    )
    .await;

    Ok(created)
}

/// Records the final outcome of an outstanding withdrawal.
///
/// Only `completed` and `failed` are accepted, and only while the withdrawal is
/// still requested or pending.
pub async fn settle_withdrawal(
    db: &DatabaseConnection,
    withdrawal_id: i64,
    outcome: WithdrawalStatus,
) -> Result<withdrawal::Model> {
    if outcome.is_outstanding() {
        return Err(Error::validation(
            "A withdrawal can only be settled as completed or failed",
        ));
    }

    let updated = Withdrawal::update_many()
        .set(withdrawal::ActiveModel {
            status: Set(outcome),
            processed_at: Set(Some(Utc::now())),
            ..Default::default()
        })
        .filter(withdrawal::Column::Id.eq(withdrawal_id))
        .filter(
            withdrawal::Column::Status
                .is_in([WithdrawalStatus::Requested, WithdrawalStatus::Pending]),
        )
        .exec(db)
        .await?;

    let current = Withdrawal::find_by_id(withdrawal_id)
        .one(db)
        .await?
        .ok_or(Error::WithdrawalNotFound { id: withdrawal_id })?;
    if updated.rows_affected == 0 {
        return Err(Error::WithdrawalSettled { id: withdrawal_id });
    }
    info!("Withdrawal {withdrawal_id} settled as {outcome:?}");
    Ok(current)
}

/// Lists a provider's withdrawals, newest first.
pub async fn list_withdrawals(
    db: &DatabaseConnection,
    provider_id: &str,
) -> Result<Vec<withdrawal::Model>> {
    Withdrawal::find()
        .filter(withdrawal::Column::ProviderId.eq(provider_id))
        .order_by_desc(withdrawal::Column::RequestedAt)
        .order_by_desc(withdrawal::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::entities::earning::EarningStatus;
    use crate::entities::profile::Role;
    use crate::errors::ErrorKind;
    use crate::providers::ProviderResponse;
    use crate::test_utils::*;
    use std::time::Duration;

    fn request(amount: f64) -> WithdrawalRequest {
        WithdrawalRequest {
            amount,
            currency: "XAF".to_string(),
            destination_phone: "699000000".to_string(),
            operator: MobileMoneyOperator::Orange,
        }
    }

    fn payout_ok(reference: &str) -> ProviderResponse {
        ProviderResponse {
            operation_success: true,
            transaction_success: true,
            reference: Some(reference.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_insufficient_balance_never_calls_provider() -> Result<()> {
        let harness = setup_harness().await?;
        let db = &harness.ctx.database;
        seed_earning(db, PROVIDER_ID, 50000.0, EarningStatus::Completed).await?;
        seed_withdrawal(db, PROVIDER_ID, 10000.0, WithdrawalStatus::Pending).await?;
        assert_eq!(ledger::compute_available_balance(db, PROVIDER_ID, "XAF").await?, 40000.0);

        let err = process_withdrawal(&harness.ctx, &provider(), &request(45000.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientBalance {
                available,
                requested
            } if available == 40000.0 && requested == 45000.0
        ));
        assert_eq!(err.kind(), ErrorKind::Constraint);
        assert!(harness.payments.deposit_calls().is_empty());
        assert_eq!(list_withdrawals(db, PROVIDER_ID).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_successful_withdrawal_reserves_balance() -> Result<()> {
        let harness = setup_harness().await?;
        let db = &harness.ctx.database;
        seed_earning(db, PROVIDER_ID, 50000.0, EarningStatus::Completed).await?;
        harness.payments.push_deposit(Ok(payout_ok("po_1")));

        let created = process_withdrawal(&harness.ctx, &provider(), &request(30000.0)).await?;
        assert_eq!(created.status, WithdrawalStatus::Requested);
        assert_eq!(created.amount, 30000.0);
        assert_eq!(created.notes.as_deref(), Some("Orange Money: 699000000"));
        assert_eq!(created.payout_reference.as_deref(), Some("po_1"));

        let calls = harness.payments.deposit_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].receiver, "699000000");
        assert_eq!(calls[0].service, MobileMoneyOperator::Orange);
        assert_eq!(calls[0].requester_id, PROVIDER_ID);

        assert_eq!(ledger::compute_available_balance(db, PROVIDER_ID, "XAF").await?, 20000.0);

        // The remaining balance no longer covers the same amount
        let err = process_withdrawal(&harness.ctx, &provider(), &request(30000.0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));
        assert_eq!(harness.payments.deposit_calls().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_declined_payout_records_nothing() -> Result<()> {
        let harness = setup_harness().await?;
        let db = &harness.ctx.database;
        seed_earning(db, PROVIDER_ID, 50000.0, EarningStatus::Completed).await?;
        harness.payments.push_deposit(Ok(ProviderResponse {
            operation_success: true,
            transaction_success: false,
            message: Some("Receiver account locked".to_string()),
            ..Default::default()
        }));

        let err = process_withdrawal(&harness.ctx, &provider(), &request(10000.0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PayoutFailed { ref reason } if reason == "Receiver account locked"));
        assert!(list_withdrawals(db, PROVIDER_ID).await?.is_empty());
        assert_eq!(ledger::compute_available_balance(db, PROVIDER_ID, "XAF").await?, 50000.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_withdrawals_cannot_overdraw() -> Result<()> {
        let harness = setup_harness().await?;
        let db = &harness.ctx.database;
        seed_earning(db, PROVIDER_ID, 50000.0, EarningStatus::Completed).await?;
        harness.payments.set_delay(Duration::from_millis(100));
        harness.payments.push_deposit(Ok(payout_ok("po_a")));
        harness.payments.push_deposit(Ok(payout_ok("po_b")));

        let owner = provider();
        let first_request = request(30000.0);
        let second_request = request(30000.0);
        let (first, second) = tokio::join!(
            process_withdrawal(&harness.ctx, &owner, &first_request),
            process_withdrawal(&harness.ctx, &owner, &second_request),
        );

        assert_eq!(usize::from(first.is_ok()) + usize::from(second.is_ok()), 1);
        let rejected = first.err().or(second.err()).unwrap();
        assert!(matches!(
            rejected,
            Error::InsufficientBalance { available, .. } if available == 20000.0
        ));
        assert_eq!(harness.payments.deposit_calls().len(), 1);
        assert_eq!(list_withdrawals(db, PROVIDER_ID).await?.len(), 1);
        assert_eq!(ledger::compute_available_balance(db, PROVIDER_ID, "XAF").await?, 20000.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_unanswered_payout_stays_reserved() -> Result<()> {
        let harness = setup_harness_with_timeout(Duration::from_millis(50)).await?;
        let db = &harness.ctx.database;
        seed_earning(db, PROVIDER_ID, 50000.0, EarningStatus::Completed).await?;
        harness.payments.set_delay(Duration::from_secs(5));
        harness.payments.push_deposit(Ok(payout_ok("po_late")));

        let err = process_withdrawal(&harness.ctx, &provider(), &request(10000.0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);

        // The money may have left, so the amount stays reserved for settlement
        let withdrawals = list_withdrawals(db, PROVIDER_ID).await?;
        assert_eq!(withdrawals.len(), 1);
        assert_eq!(withdrawals[0].status, WithdrawalStatus::Pending);
        assert_eq!(ledger::compute_available_balance(db, PROVIDER_ID, "XAF").await?, 40000.0);

        settle_withdrawal(db, withdrawals[0].id, WithdrawalStatus::Failed).await?;
        assert_eq!(ledger::compute_available_balance(db, PROVIDER_ID, "XAF").await?, 50000.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_withdrawal_only_spends_matching_currency() -> Result<()> {
        let harness = setup_harness().await?;
        let db = &harness.ctx.database;
        seed_earning(db, PROVIDER_ID, 50000.0, EarningStatus::Completed).await?;

        let mut in_euros = request(100.0);
        in_euros.currency = "EUR".to_string();
        let err = process_withdrawal(&harness.ctx, &provider(), &in_euros)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientBalance { available, .. } if available == 0.0
        ));
        assert!(harness.payments.deposit_calls().is_empty());

        // A blank currency falls back to the configured default
        let mut unspecified = request(1000.0);
        unspecified.currency = String::new();
        harness.payments.push_deposit(Ok(payout_ok("po_3")));
        let created = process_withdrawal(&harness.ctx, &provider(), &unspecified).await?;
        assert_eq!(created.currency, "XAF");
        assert_eq!(harness.payments.deposit_calls()[0].currency, "XAF");
        Ok(())
    }

    #[tokio::test]
    async fn test_withdrawal_validation() -> Result<()> {
        let harness = setup_harness().await?;
        seed_earning(&harness.ctx.database, PROVIDER_ID, 50000.0, EarningStatus::Completed).await?;

        let err = process_withdrawal(&harness.ctx, &provider(), &request(0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount { .. }));

        let mut no_phone = request(1000.0);
        no_phone.destination_phone = " ".to_string();
        let err = process_withdrawal(&harness.ctx, &provider(), &no_phone)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = process_withdrawal(&harness.ctx, &student(), &request(1000.0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let researcher = Actor::new(PROVIDER_ID, Role::Researcher);
        harness.payments.push_deposit(Ok(payout_ok("po_2")));
        assert!(process_withdrawal(&harness.ctx, &researcher, &request(1000.0)).await.is_ok());

        assert_eq!(harness.payments.deposit_calls().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_settle_withdrawal() -> Result<()> {
        let db = setup_test_db().await?;
        seed_earning(&db, PROVIDER_ID, 50000.0, EarningStatus::Completed).await?;
        let first = seed_withdrawal(&db, PROVIDER_ID, 10000.0, WithdrawalStatus::Requested).await?;
        let second = seed_withdrawal(&db, PROVIDER_ID, 5000.0, WithdrawalStatus::Pending).await?;

        let completed = settle_withdrawal(&db, first.id, WithdrawalStatus::Completed).await?;
        assert_eq!(completed.status, WithdrawalStatus::Completed);
        assert!(completed.processed_at.is_some());

        let failed = settle_withdrawal(&db, second.id, WithdrawalStatus::Failed).await?;
        assert_eq!(failed.status, WithdrawalStatus::Failed);

        // Completed 10000 stays withdrawn; the failed 5000 is released
        assert_eq!(ledger::compute_available_balance(&db, PROVIDER_ID, "XAF").await?, 40000.0);

        assert!(matches!(
            settle_withdrawal(&db, first.id, WithdrawalStatus::Failed).await,
            Err(Error::WithdrawalSettled { .. })
        ));
        assert!(matches!(
            settle_withdrawal(&db, 9999, WithdrawalStatus::Completed).await,
            Err(Error::WithdrawalNotFound { id: 9999 })
        ));
        assert!(matches!(
            settle_withdrawal(&db, second.id, WithdrawalStatus::Pending).await,
            Err(Error::Validation { .. })
        ));
        Ok(())
    }
}
