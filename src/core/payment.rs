//! Payment orchestration for bookings.
//!
//! A payment goes through three persisted steps:
//!
//! 1. a `payment_attempts` row is claimed for the booking (unique on
//!    `booking_id`), rejecting a concurrent second submit;
//! 2. after the provider accepts, the attempt is marked `succeeded` with the
//!    provider reference;
//! 3. the booking and its earning are updated in one transaction and the attempt
//!    is marked `applied`.
//!
//! If step 3 fails the money has moved but the booking is still pending.
//! [`reconcile_payments`] finds those attempts and applies them later. A
//! succeeded attempt whose booking can no longer be paid (it was cancelled while
//! the provider call ran) is refunded to the client's wallet instead, so every
//! charge ends up either on a paid booking or back with the client.

use crate::{
    context::{Actor, AppContext},
    core::{
        booking::{prices_match, require_booking},
        ledger,
        notification::{NewNotification, dispatch},
        wallet,
    },
    entities::{
        Booking, BookingAddon, PaymentAttempt, Service, booking,
        booking::{BookingStatus, PaymentStatus},
        booking_addon,
        notification::{NotificationCategory, NotificationKind},
        payment_attempt,
        payment_attempt::AttemptStatus,
    },
    errors::{Error, Result, is_unique_violation},
    providers::payment::{
        CollectRequest, CustomerInfo, FREE_PAYMENT_REFERENCE, PayerDetails, PaymentOutcome,
        ProductLine,
    },
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Result of a successful [`process_payment`]
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    /// The booking after payment
    pub booking: booking::Model,
    /// Provider reference, or `"Free"` for the free tier
    pub reference: String,
    /// Whether the free tier was applied and no money moved
    pub free: bool,
    /// Meeting link, if provisioning succeeded
    pub meeting_link: Option<String>,
    /// Why provisioning the meeting link failed. The payment itself succeeded.
    pub meeting_link_warning: Option<String>,
}

/// What a reconciliation pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    /// Succeeded attempts applied to their booking
    pub applied: u64,
    /// Succeeded attempts refunded because their booking can no longer be paid
    pub refunded: u64,
    /// Stale in-flight attempts flagged for manual review
    pub flagged: u64,
}

/// What became of a succeeded attempt
#[derive(Debug)]
enum Resolution {
    /// The booking is now confirmed and paid
    Applied(booking::Model),
    /// The booking could not be paid; `amount` went to the client's wallet
    Refunded {
        booking: booking::Model,
        amount: f64,
    },
    /// Someone else resolved the attempt first
    AlreadyResolved,
}

fn validate_payment_input(amount: f64, currency: &str, payer: &PayerDetails) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::InvalidAmount { amount });
    }
    if currency.trim().is_empty() {
        return Err(Error::validation("A currency is required"));
    }
    if payer.phone.trim().is_empty() {
        return Err(Error::validation("A payer phone number is required"));
    }
    Ok(())
}

/// Claims the payment slot of a booking. Fails if another attempt holds it.
async fn claim_attempt(
    db: &DatabaseConnection,
    booking_id: i64,
    amount: f64,
    currency: &str,
) -> Result<payment_attempt::Model> {
    let now = Utc::now();
    let claimed = payment_attempt::ActiveModel {
        booking_id: Set(booking_id),
        amount: Set(amount),
        currency: Set(currency.to_string()),
        status: Set(AttemptStatus::InFlight),
        reference: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await;

    match claimed {
        Ok(attempt) => Ok(attempt),
        Err(e) if is_unique_violation(&e) => {
            let existing = PaymentAttempt::find()
                .filter(payment_attempt::Column::BookingId.eq(booking_id))
                .one(db)
                .await?;
            match existing.map(|a| a.status) {
                Some(AttemptStatus::InFlight) | None => {
                    Err(Error::PaymentInProgress { id: booking_id })
                }
                Some(AttemptStatus::NeedsReview) => {
                    Err(Error::PaymentUnderReview { id: booking_id })
                }
                Some(
                    AttemptStatus::Succeeded | AttemptStatus::Applied | AttemptStatus::Refunded,
                ) => Err(Error::AlreadyPaid { id: booking_id }),
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Releases an in-flight claim so the booking can be paid again. Only called
/// once the provider has declined or was never reached.
async fn release_attempt(db: &DatabaseConnection, attempt_id: i64) {
    let released = PaymentAttempt::delete_many()
        .filter(payment_attempt::Column::Id.eq(attempt_id))
        .filter(payment_attempt::Column::Status.eq(AttemptStatus::InFlight))
        .exec(db)
        .await;
    if let Err(e) = released {
        // Reconciliation releases it once it goes stale
        warn!("Failed to release payment attempt {attempt_id}: {e}");
    }
}

async fn collect_request(
    db: &DatabaseConnection,
    actor: &Actor,
    booking: &booking::Model,
    payer: &PayerDetails,
) -> Result<CollectRequest> {
    let title = Service::find_by_id(booking.service_id)
        .one(db)
        .await?
        .map_or_else(|| "Consultation".to_string(), |s| s.title);

    let mut products = vec![ProductLine {
        name: title,
        category: "consultation".to_string(),
        quantity: 1,
        amount: booking.base_price,
    }];
    products.extend(
        BookingAddon::find()
            .filter(booking_addon::Column::BookingId.eq(booking.id))
            .order_by_asc(booking_addon::Column::Id)
            .all(db)
            .await?
            .into_iter()
            .map(|addon| ProductLine {
                name: addon.name,
                category: "addon".to_string(),
                quantity: 1,
                amount: addon.price,
            }),
    );

    Ok(CollectRequest {
        amount: booking.total_price,
        currency: booking.currency.clone(),
        service: payer.operator,
        payer: payer.phone.trim().to_string(),
        customer: CustomerInfo {
            id: actor.user_id.clone(),
            name: payer.name.clone(),
            email: payer.email.clone(),
            phone: payer.phone.trim().to_string(),
        },
        products,
        reference: format!("booking-{}", booking.id),
    })
}

/// Charges the client for a pending booking and confirms it.
///
/// The provider is called once, bounded by the configured payment timeout, and
/// never retried here. A timeout, a transport error or any response other than
/// the free tier or both success flags is a [`Error::PaymentFailed`] and leaves
/// the booking unchanged, so the caller can safely retry.
#[instrument(skip(ctx, payer), fields(user_id = %actor.user_id))]
pub async fn process_payment(
    ctx: &AppContext,
    actor: &Actor,
    booking_id: i64,
    amount: f64,
    currency: &str,
    payer: &PayerDetails,
) -> Result<PaymentReceipt> {
    validate_payment_input(amount, currency, payer)?;

    let db = &ctx.database;
    let booking = require_booking(db, booking_id).await?;
    if actor.user_id != booking.client_id {
        return Err(Error::forbidden("Only the client can pay for a booking"));
    }
    if booking.payment_status == PaymentStatus::Paid {
        return Err(Error::AlreadyPaid { id: booking_id });
    }
    if booking.status != BookingStatus::Pending
        || booking.payment_status != PaymentStatus::Pending
    {
        return Err(Error::InvalidTransition {
            action: "pay for",
            status: booking.status,
        });
    }
    if !prices_match(amount, booking.total_price)
        || !currency.trim().eq_ignore_ascii_case(&booking.currency)
    {
        return Err(Error::validation(format!(
            "Payment of {:.2} {} does not match the booking total of {:.2} {}",
            amount,
            currency.trim(),
            booking.total_price,
            booking.currency
        )));
    }

    let request = collect_request(db, actor, &booking, payer).await?;
    let attempt = claim_attempt(db, booking_id, booking.total_price, &booking.currency).await?;

    // A cancel can land between the status check and the claim
    match require_booking(db, booking_id).await {
        Ok(current)
            if current.status == BookingStatus::Pending
                && current.payment_status == PaymentStatus::Pending => {}
        Ok(current) => {
            release_attempt(db, attempt.id).await;
            return Err(Error::InvalidTransition {
                action: "pay for",
                status: current.status,
            });
        }
        Err(e) => {
            release_attempt(db, attempt.id).await;
            return Err(e);
        }
    }

    let response = match tokio::time::timeout(
        ctx.payment_timeout,
        ctx.payments.collect(&request),
    )
    .await
    {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            release_attempt(db, attempt.id).await;
            error!("Payment provider call for booking {booking_id} failed: {e}");
            return Err(Error::PaymentFailed {
                reason: e.to_string(),
            });
        }
        Err(_) => {
            release_attempt(db, attempt.id).await;
            error!(
                "Payment provider did not answer within {:?} for booking {booking_id}",
                ctx.payment_timeout
            );
            return Err(Error::PaymentFailed {
                reason: "the payment provider did not respond in time".to_string(),
            });
        }
    };

    let reference = match response.outcome() {
        PaymentOutcome::Free => FREE_PAYMENT_REFERENCE.to_string(),
        PaymentOutcome::Paid { reference } => reference,
        PaymentOutcome::Declined { reason } => {
            release_attempt(db, attempt.id).await;
            error!("Payment for booking {booking_id} declined: {reason}");
            return Err(Error::PaymentFailed { reason });
        }
    };

    // From here on the money has moved; a failure below is picked up by reconciliation
    let attempt = mark_attempt_succeeded(db, attempt, &reference)
        .await
        .inspect_err(|e| {
            error!(
                "Payment {reference} for booking {booking_id} was accepted but not recorded: {e}"
            );
        })?;
    let booking = match apply_attempt(db, &attempt).await {
        Ok(Resolution::Applied(booking)) => booking,
        Ok(Resolution::Refunded { booking, amount }) => {
            error!(
                "Payment {reference} for booking {booking_id} succeeded but the booking is now {}; refunded {amount:.2}",
                booking.status
            );
            notify_refund(ctx, &booking, amount).await;
            return Err(Error::InvalidTransition {
                action: "pay for",
                status: booking.status,
            });
        }
        Ok(Resolution::AlreadyResolved) => {
            let current = require_booking(db, booking_id).await?;
            if current.payment_status != PaymentStatus::Paid
                || current.payment_id.as_deref() != Some(reference.as_str())
            {
                return Err(Error::InvalidTransition {
                    action: "pay for",
                    status: current.status,
                });
            }
            current
        }
        Err(e) => {
            error!(
                "Payment {reference} for booking {booking_id} succeeded but could not be applied: {e}"
            );
            return Err(e);
        }
    };
    let free = reference == FREE_PAYMENT_REFERENCE;
    info!("Booking {booking_id} paid (reference {reference})");

    let (booking, meeting_link, meeting_link_warning) =
        match provision_meeting_link(ctx, booking).await {
            (booking, Ok(link)) => (booking, Some(link), None),
            (booking, Err(e)) => {
                warn!("Meeting link for booking {booking_id} not provisioned: {e}");
                (booking, None, Some(e.to_string()))
            }
        };

    dispatch(
        ctx.notifier.as_ref(),
        NewNotification::new(
            &booking.client_id,
            "Payment successful",
            if free {
                format!("Booking #{} has been confirmed free of charge", booking.id)
            } else {
                format!(
                    "Your payment of {:.0} {} for booking #{} was received",
                    booking.total_price, booking.currency, booking.id
                )
            },
            NotificationCategory::Payment,
        )
        .with_kind(NotificationKind::Success)
        .with_action(format!("/bookings/{}", booking.id), "View booking"),
    )
    .await;
    dispatch(
        ctx.notifier.as_ref(),
        NewNotification::new(
            &booking.provider_id,
            "Booking confirmed",
            format!(
                "Booking #{} on {} at {} has been paid and confirmed",
                booking.id,
                booking.scheduled_date,
                booking.scheduled_time.format("%H:%M")
            ),
            NotificationCategory::Booking,
        )
        .with_kind(NotificationKind::Success)
        .with_action(format!("/bookings/{}", booking.id), "View booking"),
    )
    .await;

    Ok(PaymentReceipt {
        booking,
        reference,
        free,
        meeting_link,
        meeting_link_warning,
    })
}

async fn mark_attempt_succeeded(
    db: &DatabaseConnection,
    attempt: payment_attempt::Model,
    reference: &str,
) -> Result<payment_attempt::Model> {
    let mut model: payment_attempt::ActiveModel = attempt.into();
    model.status = Set(AttemptStatus::Succeeded);
    model.reference = Set(Some(reference.to_string()));
    model.updated_at = Set(Utc::now());
    model.update(db).await.map_err(Into::into)
}

/// Moves a succeeded attempt to `to`. False if it was no longer `succeeded`.
async fn settle_attempt<C>(db: &C, attempt_id: i64, to: AttemptStatus) -> Result<bool>
where
    C: ConnectionTrait,
{
    let result = PaymentAttempt::update_many()
        .set(payment_attempt::ActiveModel {
            status: Set(to),
            updated_at: Set(Utc::now()),
            ..Default::default()
        })
        .filter(payment_attempt::Column::Id.eq(attempt_id))
        .filter(payment_attempt::Column::Status.eq(AttemptStatus::Succeeded))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Resolves a succeeded attempt in one transaction.
///
/// If the booking is still pending/pending it becomes confirmed/paid, the
/// provider's pending earning is recorded and the attempt is marked `applied`.
/// Otherwise the charged amount is credited to the client's wallet and the
/// attempt is marked `refunded`. Both moves are conditional on the attempt
/// still being `succeeded`, so a charge is resolved exactly once.
async fn apply_attempt(
    db: &DatabaseConnection,
    attempt: &payment_attempt::Model,
) -> Result<Resolution> {
    let Some(reference) = attempt.reference.clone() else {
        return Err(Error::validation(format!(
            "Payment attempt {} has no provider reference",
            attempt.id
        )));
    };

    let txn = db.begin().await?;
    let updated = Booking::update_many()
        .set(booking::ActiveModel {
            status: Set(BookingStatus::Confirmed),
            payment_status: Set(PaymentStatus::Paid),
            payment_id: Set(Some(reference.clone())),
            updated_at: Set(Utc::now()),
            ..Default::default()
        })
        .filter(booking::Column::Id.eq(attempt.booking_id))
        .filter(booking::Column::Status.eq(BookingStatus::Pending))
        .filter(booking::Column::PaymentStatus.eq(PaymentStatus::Pending))
        .exec(&txn)
        .await?;

    if updated.rows_affected == 1 {
        if !settle_attempt(&txn, attempt.id, AttemptStatus::Applied).await? {
            txn.rollback().await?;
            return Ok(Resolution::AlreadyResolved);
        }
        let booking = require_booking(&txn, attempt.booking_id).await?;
        let earned = if reference == FREE_PAYMENT_REFERENCE {
            0.0
        } else {
            booking.total_price
        };
        ledger::record_booking_earning(&txn, &booking, earned).await?;
        txn.commit().await?;
        return Ok(Resolution::Applied(booking));
    }

    if !settle_attempt(&txn, attempt.id, AttemptStatus::Refunded).await? {
        txn.rollback().await?;
        return Ok(Resolution::AlreadyResolved);
    }
    let booking = require_booking(&txn, attempt.booking_id).await?;
    let amount = if reference == FREE_PAYMENT_REFERENCE {
        0.0
    } else {
        attempt.amount
    };
    if amount > 0.0 {
        wallet::credit_wallet(&txn, &booking.client_id, amount).await?;
    }
    // A booking cancelled before it was marked paid keeps a trace of the charge
    Booking::update_many()
        .set(booking::ActiveModel {
            payment_status: Set(PaymentStatus::Refunded),
            payment_id: Set(Some(reference)),
            updated_at: Set(Utc::now()),
            ..Default::default()
        })
        .filter(booking::Column::Id.eq(attempt.booking_id))
        .filter(booking::Column::Status.eq(BookingStatus::Cancelled))
        .filter(booking::Column::PaymentStatus.eq(PaymentStatus::Pending))
        .exec(&txn)
        .await?;
    txn.commit().await?;

    let booking = require_booking(db, attempt.booking_id).await?;
    Ok(Resolution::Refunded { booking, amount })
}

async fn notify_refund(ctx: &AppContext, booking: &booking::Model, amount: f64) {
    if amount <= 0.0 {
        return;
    }
    dispatch(
        ctx.notifier.as_ref(),
        NewNotification::new(
            &booking.client_id,
            "Payment refunded",
            format!(
                "Booking #{} was {} before your payment went through. {:.0} {} has been refunded to your wallet",
                booking.id, booking.status, amount, booking.currency
            ),
            NotificationCategory::Payment,
        )
        .with_kind(NotificationKind::Warning),
    )
    .await;
}

async fn provision_meeting_link(
    ctx: &AppContext,
    booking: booking::Model,
) -> (booking::Model, Result<String>) {
    let link = match ctx.meetings.provision(booking.id).await {
        Ok(link) => link,
        Err(e) => return (booking, Err(e)),
    };

    let mut model: booking::ActiveModel = booking.clone().into();
    model.meeting_link = Set(Some(link.clone()));
    model.updated_at = Set(Utc::now());
    match model.update(&ctx.database).await {
        Ok(updated) => (updated, Ok(link)),
        Err(e) => (booking, Err(e.into())),
    }
}

/// Resolves payments that succeeded at the provider but never reached their
/// booking, and flags in-flight attempts older than `stale_after` for manual
/// review.
///
/// A stale in-flight attempt means the provider call never came back to us, so
/// whether the client was charged is unknown. Such attempts keep holding the
/// booking's payment slot instead of being released.
#[instrument(skip(db))]
pub async fn reconcile_payments(
    db: &DatabaseConnection,
    stale_after: Duration,
) -> Result<ReconciliationReport> {
    let mut report = ReconciliationReport::default();

    let succeeded = PaymentAttempt::find()
        .filter(payment_attempt::Column::Status.eq(AttemptStatus::Succeeded))
        .order_by_asc(payment_attempt::Column::Id)
        .all(db)
        .await?;
    for attempt in succeeded {
        let reference = attempt.reference.as_deref().unwrap_or_default();
        match apply_attempt(db, &attempt).await {
            Ok(Resolution::Applied(booking)) => {
                info!("Applied payment {reference} to booking {}", booking.id);
                report.applied += 1;
            }
            Ok(Resolution::Refunded { booking, amount }) => {
                warn!(
                    "Payment {reference} for booking {} arrived after it became {}; refunded {amount:.2} to {}",
                    booking.id, booking.status, booking.client_id
                );
                report.refunded += 1;
            }
            Ok(Resolution::AlreadyResolved) => {}
            Err(e) => error!(
                "Could not resolve payment attempt {} for booking {}: {e}",
                attempt.id, attempt.booking_id
            ),
        }
    }

    let cutoff = Utc::now()
        - chrono::Duration::from_std(stale_after).map_err(|e| Error::Config {
            message: format!("Invalid stale attempt age: {e}"),
        })?;
    let flagged = PaymentAttempt::update_many()
        .set(payment_attempt::ActiveModel {
            status: Set(AttemptStatus::NeedsReview),
            updated_at: Set(Utc::now()),
            ..Default::default()
        })
        .filter(payment_attempt::Column::Status.eq(AttemptStatus::InFlight))
        .filter(payment_attempt::Column::UpdatedAt.lt(cutoff))
        .exec(db)
        .await?;
    report.flagged = flagged.rows_affected;
    if report.flagged > 0 {
        warn!(
            "{} payment attempts never resolved and need review",
            report.flagged
        );
    }

    info!(
        "Reconciliation done: {} applied, {} refunded, {} flagged",
        report.applied, report.refunded, report.flagged
    );
    Ok(report)
}
