//! Booking lifecycle - creation, cancellation with refund, rescheduling,
//! completion, no-show and document sharing.
//!
//! State transitions are conditional updates (`UPDATE .. WHERE status IN (..)`)
//! whose affected-row count decides the outcome, so two racing clients can never
//! both apply the same transition. Multi-row changes run in one transaction.

use crate::{
    context::{Actor, AppContext},
    core::{
        ledger,
        notification::{NewNotification, dispatch},
        wallet,
    },
    entities::{
        Booking, BookingAddon, Profile, Service, ServiceAddon, booking,
        booking::{BookingStatus, PaymentStatus, SharedDocument, SharedDocuments},
        PaymentAttempt, booking_addon,
        notification::{NotificationCategory, NotificationKind},
        payment_attempt,
        payment_attempt::AttemptStatus,
        profile, service, service_addon,
    },
    errors::{Error, Result},
    providers::payment::FREE_PAYMENT_REFERENCE,
};
use chrono::{NaiveDate, NaiveTime, Timelike, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use std::collections::HashMap;
use tracing::{info, instrument};

/// Two prices closer than this are considered equal.
pub(crate) const PRICE_TOLERANCE: f64 = 0.005;

pub(crate) fn prices_match(a: f64, b: f64) -> bool {
    (a - b).abs() < PRICE_TOLERANCE
}

/// Input for [`create_booking`]
#[derive(Debug, Clone)]
pub struct NewBooking {
    /// Provider offering the service
    pub provider_id: String,
    /// Service being booked; must belong to `provider_id`
    pub service_id: i64,
    /// Academic level of the client
    pub academic_level: String,
    /// Day of the session
    pub scheduled_date: NaiveDate,
    /// Start time of the session
    pub scheduled_time: NaiveTime,
    /// Length of the session, greater than zero
    pub duration_minutes: i32,
    /// Price of the service itself
    pub base_price: f64,
    /// Must equal the catalog sum of `addon_ids`
    pub addon_price: f64,
    /// Must equal `base_price + addon_price`
    pub total_price: f64,
    /// Currency code; blank means the configured default
    pub currency: String,
    /// Free-form notes for the provider
    pub client_notes: Option<String>,
    /// Catalog add-ons of the service to include
    pub addon_ids: Vec<i64>,
    /// Reference of a payment authorized before the booking was created
    pub payment_reference: Option<String>,
}

/// A booking with its foreign references resolved for display
#[derive(Debug, Clone, PartialEq)]
pub struct BookingDetails {
    /// The booking row
    pub booking: booking::Model,
    /// Add-ons with the prices captured at booking time
    pub addons: Vec<booking_addon::Model>,
    /// Title of the booked service, if it still exists
    pub service_title: Option<String>,
    /// Display name of the provider
    pub provider_name: Option<String>,
    /// Display name of the client
    pub client_name: Option<String>,
}

/// Result of [`cancel_booking`]
#[derive(Debug, Clone, PartialEq)]
pub struct CancellationOutcome {
    /// The booking after cancellation
    pub booking: booking::Model,
    /// Amount credited back to the client's wallet (zero if nothing was paid)
    pub refunded_amount: f64,
}

impl CancellationOutcome {
    /// Whether the payment was refunded
    #[must_use]
    pub fn refunded(&self) -> bool {
        self.booking.payment_status == PaymentStatus::Refunded
    }
}

fn validate_new_booking(actor: &Actor, input: &NewBooking) -> Result<()> {
    if input.provider_id.trim().is_empty() {
        return Err(Error::validation("A provider is required"));
    }
    if input.provider_id == actor.user_id {
        return Err(Error::forbidden("You cannot book your own service"));
    }
    if input.academic_level.trim().is_empty() {
        return Err(Error::validation("An academic level is required"));
    }
    if input.duration_minutes <= 0 {
        return Err(Error::validation("Duration must be greater than zero"));
    }
    for amount in [input.base_price, input.addon_price, input.total_price] {
        if !amount.is_finite() || amount < 0.0 {
            return Err(Error::InvalidAmount { amount });
        }
    }
    if !prices_match(input.total_price, input.base_price + input.addon_price) {
        return Err(Error::validation(format!(
            "Total price {:.2} must equal base price {:.2} plus add-ons {:.2}",
            input.total_price, input.base_price, input.addon_price
        )));
    }
    if input
        .payment_reference
        .as_deref()
        .is_some_and(|r| r.trim().is_empty())
    {
        return Err(Error::validation("Payment reference cannot be empty"));
    }
    Ok(())
}

/// Loads the active catalog add-ons of `service_id`, in the requested order.
async fn resolve_addons<C>(
    db: &C,
    service_id: i64,
    addon_ids: &[i64],
) -> Result<Vec<service_addon::Model>>
where
    C: ConnectionTrait,
{
    let mut ids = addon_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let found: HashMap<i64, service_addon::Model> = ServiceAddon::find()
        .filter(service_addon::Column::Id.is_in(ids))
        .filter(service_addon::Column::ServiceId.eq(service_id))
        .filter(service_addon::Column::IsActive.eq(true))
        .all(db)
        .await?
        .into_iter()
        .map(|a| (a.id, a))
        .collect();

    let mut resolved = Vec::with_capacity(found.len());
    for id in addon_ids {
        if resolved.iter().any(|a: &service_addon::Model| a.id == *id) {
            continue;
        }
        let addon = found.get(id).ok_or(Error::AddonNotFound { id: *id })?;
        resolved.push(addon.clone());
    }
    Ok(resolved)
}

fn minutes_of(time: NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight() / 60)
}

/// Rejects a slot that overlaps another pending or confirmed booking of the provider.
async fn ensure_slot_available<C>(
    db: &C,
    provider_id: &str,
    exclude_booking: Option<i64>,
    date: NaiveDate,
    time: NaiveTime,
    duration_minutes: i32,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let mut query = Booking::find()
        .filter(booking::Column::ProviderId.eq(provider_id))
        .filter(booking::Column::ScheduledDate.eq(date))
        .filter(
            booking::Column::Status.is_in([BookingStatus::Pending, BookingStatus::Confirmed]),
        );
    if let Some(id) = exclude_booking {
        query = query.filter(booking::Column::Id.ne(id));
    }

    let start = minutes_of(time);
    let end = start + i64::from(duration_minutes);
    let clash = query.all(db).await?.into_iter().any(|other| {
        let other_start = minutes_of(other.scheduled_time);
        let other_end = other_start + i64::from(other.duration_minutes);
        start < other_end && other_start < end
    });

    if clash {
        return Err(Error::SlotUnavailable { date, time });
    }
    Ok(())
}

/// Creates a booking for `actor` (the client).
///
/// The booking row, its add-ons and, for pre-paid bookings, the provider's
/// pending earning are written in one transaction. Add-on prices are copied from
/// the catalog so later price changes do not alter this booking.
#[instrument(skip(ctx, input), fields(client = %actor.user_id, provider = %input.provider_id))]
pub async fn create_booking(
    ctx: &AppContext,
    actor: &Actor,
    input: NewBooking,
) -> Result<BookingDetails> {
    validate_new_booking(actor, &input)?;

    let db = &ctx.database;
    let txn = db.begin().await?;

    let service = Service::find_by_id(input.service_id)
        .one(&txn)
        .await?
        .filter(|s| s.is_active)
        .ok_or(Error::ServiceNotFound {
            id: input.service_id,
        })?;
    if service.provider_id != input.provider_id {
        return Err(Error::validation(
            "This service is not offered by the selected provider",
        ));
    }

    let addons = resolve_addons(&txn, service.id, &input.addon_ids).await?;
    let catalog_total: f64 = addons.iter().map(|a| a.price).sum();
    if !prices_match(input.addon_price, catalog_total) {
        return Err(Error::validation(format!(
            "Add-on price {:.2} does not match the current catalog total {:.2}",
            input.addon_price, catalog_total
        )));
    }

    ensure_slot_available(
        &txn,
        &input.provider_id,
        None,
        input.scheduled_date,
        input.scheduled_time,
        input.duration_minutes,
    )
    .await?;

    let prepaid = input.payment_reference.is_some();
    let (status, payment_status) = if prepaid {
        (BookingStatus::Confirmed, PaymentStatus::Paid)
    } else {
        (BookingStatus::Pending, PaymentStatus::Pending)
    };

    let now = Utc::now();
    let created = booking::ActiveModel {
        provider_id: Set(input.provider_id),
        client_id: Set(actor.user_id.clone()),
        service_id: Set(service.id),
        academic_level: Set(input.academic_level.trim().to_string()),
        scheduled_date: Set(input.scheduled_date),
        scheduled_time: Set(input.scheduled_time),
        duration_minutes: Set(input.duration_minutes),
        base_price: Set(input.base_price),
        addon_price: Set(catalog_total),
        total_price: Set(input.base_price + catalog_total),
        currency: Set(ctx.currency_or_default(&input.currency)),
        status: Set(status),
        payment_status: Set(payment_status),
        payment_id: Set(input.payment_reference.clone()),
        meeting_link: Set(None),
        client_notes: Set(input.client_notes.filter(|n| !n.trim().is_empty())),
        provider_notes: Set(None),
        shared_documents: Set(SharedDocuments::default()),
        has_review: Set(false),
        cancellation_reason: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    for addon in &addons {
        booking_addon::ActiveModel {
            booking_id: Set(created.id),
            addon_id: Set(addon.id),
            name: Set(addon.name.clone()),
            price: Set(addon.price),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }

    if prepaid {
        let amount = if created.payment_id.as_deref() == Some(FREE_PAYMENT_REFERENCE) {
            0.0
        } else {
            created.total_price
        };
        ledger::record_booking_earning(&txn, &created, amount).await?;
    }

    txn.commit().await?;
    info!(
        "Created booking {} ({}, {} add-ons)",
        created.id,
        created.status,
        addons.len()
    );

    dispatch(
        ctx.notifier.as_ref(),
        NewNotification::new(
            &created.provider_id,
            "New booking request",
            format!(
                "You have a new booking request for \"{}\" on {} at {}",
                service.title,
                created.scheduled_date,
                created.scheduled_time.format("%H:%M")
            ),
            NotificationCategory::Booking,
        )
        .with_action(format!("/bookings/{}", created.id), "View booking"),
    )
    .await;
    dispatch(
        ctx.notifier.as_ref(),
        NewNotification::new(
            &created.client_id,
            "Booking request submitted",
            format!(
                "Your booking request for \"{}\" has been submitted",
                service.title
            ),
            NotificationCategory::Booking,
        )
        .with_kind(NotificationKind::Success)
        .with_action(format!("/bookings/{}", created.id), "View booking"),
    )
    .await;

    get_booking_details(db, created.id)
        .await?
        .ok_or(Error::BookingNotFound { id: created.id })
}

/// Resolves services, add-ons and party names for a batch of bookings with one
/// query per table.
async fn hydrate(
    db: &DatabaseConnection,
    rows: Vec<(booking::Model, Option<service::Model>)>,
) -> Result<Vec<BookingDetails>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let booking_ids: Vec<i64> = rows.iter().map(|(b, _)| b.id).collect();
    let mut addons_by_booking: HashMap<i64, Vec<booking_addon::Model>> = HashMap::new();
    for addon in BookingAddon::find()
        .filter(booking_addon::Column::BookingId.is_in(booking_ids))
        .order_by_asc(booking_addon::Column::Id)
        .all(db)
        .await?
    {
        addons_by_booking
            .entry(addon.booking_id)
            .or_default()
            .push(addon);
    }

    let mut user_ids: Vec<String> = rows
        .iter()
        .flat_map(|(b, _)| [b.provider_id.clone(), b.client_id.clone()])
        .collect();
    user_ids.sort_unstable();
    user_ids.dedup();
    let names: HashMap<String, String> = Profile::find()
        .filter(profile::Column::Id.is_in(user_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|p| (p.id, p.full_name))
        .collect();

    Ok(rows
        .into_iter()
        .map(|(booking, service)| BookingDetails {
            addons: addons_by_booking.remove(&booking.id).unwrap_or_default(),
            service_title: service.map(|s| s.title),
            provider_name: names.get(&booking.provider_id).cloned(),
            client_name: names.get(&booking.client_id).cloned(),
            booking,
        })
        .collect())
}

/// Finds a booking by id.
pub async fn get_booking<C>(db: &C, booking_id: i64) -> Result<Option<booking::Model>>
where
    C: ConnectionTrait,
{
    Booking::find_by_id(booking_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds a booking by id, failing with [`Error::BookingNotFound`].
pub async fn require_booking<C>(db: &C, booking_id: i64) -> Result<booking::Model>
where
    C: ConnectionTrait,
{
    get_booking(db, booking_id)
        .await?
        .ok_or(Error::BookingNotFound { id: booking_id })
}

/// Finds a booking with its service title, add-ons and party names.
pub async fn get_booking_details(
    db: &DatabaseConnection,
    booking_id: i64,
) -> Result<Option<BookingDetails>> {
    let Some(row) = Booking::find_by_id(booking_id)
        .find_also_related(Service)
        .one(db)
        .await?
    else {
        return Ok(None);
    };
    Ok(hydrate(db, vec![row]).await?.pop())
}

/// Lists a provider's bookings in schedule order.
pub async fn list_bookings_for_provider(
    db: &DatabaseConnection,
    provider_id: &str,
) -> Result<Vec<BookingDetails>> {
    let rows = Booking::find()
        .find_also_related(Service)
        .filter(booking::Column::ProviderId.eq(provider_id))
        .order_by_asc(booking::Column::ScheduledDate)
        .order_by_asc(booking::Column::ScheduledTime)
        .all(db)
        .await?;
    hydrate(db, rows).await
}

/// Lists a client's bookings in schedule order.
pub async fn list_bookings_for_client(
    db: &DatabaseConnection,
    client_id: &str,
) -> Result<Vec<BookingDetails>> {
    let rows = Booking::find()
        .find_also_related(Service)
        .filter(booking::Column::ClientId.eq(client_id))
        .order_by_asc(booking::Column::ScheduledDate)
        .order_by_asc(booking::Column::ScheduledTime)
        .all(db)
        .await?;
    hydrate(db, rows).await
}

fn ensure_party(actor: &Actor, booking: &booking::Model) -> Result<()> {
    if actor.user_id == booking.provider_id || actor.user_id == booking.client_id {
        Ok(())
    } else {
        Err(Error::forbidden(format!(
            "You are not a party to booking {}",
            booking.id
        )))
    }
}

fn ensure_provider_or_admin(actor: &Actor, booking: &booking::Model) -> Result<()> {
    if actor.user_id == booking.provider_id || actor.is_admin() {
        Ok(())
    } else {
        Err(Error::forbidden(format!(
            "Only the provider can update booking {}",
            booking.id
        )))
    }
}

/// The other party of a booking, from `actor`'s point of view.
fn counterparty<'a>(actor: &Actor, booking: &'a booking::Model) -> &'a str {
    if actor.user_id == booking.provider_id {
        &booking.client_id
    } else {
        &booking.provider_id
    }
}

/// Builds the error for a conditional update that matched no row, using the
/// booking's state as it is now.
async fn lost_transition(
    db: &DatabaseConnection,
    booking_id: i64,
    action: &'static str,
) -> Error {
    match require_booking(db, booking_id).await {
        Ok(current) => Error::InvalidTransition {
            action,
            status: current.status,
        },
        Err(e) => e,
    }
}

/// Cancels a booking on behalf of one of its parties.
///
/// In one transaction: the status moves to `cancelled` only if it is still
/// pending or confirmed; if the booking was paid, `paid` moves to `refunded` and
/// the client's wallet is credited with the total price. Because both steps are
/// conditional, concurrent cancellations produce exactly one refund.
///
/// While a payment for the booking is in flight (or awaiting review) the
/// cancellation is refused and nothing changes.
#[instrument(skip(ctx, reason), fields(user_id = %actor.user_id))]
pub async fn cancel_booking(
    ctx: &AppContext,
    actor: &Actor,
    booking_id: i64,
    reason: &str,
) -> Result<CancellationOutcome> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(Error::validation("A cancellation reason is required"));
    }

    let db = &ctx.database;
    let current = require_booking(db, booking_id).await?;
    ensure_party(actor, &current)?;
    if current.status.is_terminal() {
        return Err(Error::InvalidTransition {
            action: "cancel",
            status: current.status,
        });
    }

    let txn = db.begin().await?;
    let now = Utc::now();
    let cancelled = Booking::update_many()
        .set(booking::ActiveModel {
            status: Set(BookingStatus::Cancelled),
            cancellation_reason: Set(Some(reason.to_string())),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(booking::Column::Id.eq(booking_id))
        .filter(
            booking::Column::Status.is_in([BookingStatus::Pending, BookingStatus::Confirmed]),
        )
        .exec(&txn)
        .await?;
    if cancelled.rows_affected == 0 {
        txn.rollback().await?;
        return Err(lost_transition(db, booking_id, "cancel").await);
    }

    // A charge that is still unresolved at the provider would never be refunded
    let unresolved = PaymentAttempt::find()
        .filter(payment_attempt::Column::BookingId.eq(booking_id))
        .filter(
            payment_attempt::Column::Status
                .is_in([AttemptStatus::InFlight, AttemptStatus::NeedsReview]),
        )
        .one(&txn)
        .await?;
    if let Some(attempt) = unresolved {
        txn.rollback().await?;
        return Err(match attempt.status {
            AttemptStatus::NeedsReview => Error::PaymentUnderReview { id: booking_id },
            _ => Error::PaymentInProgress { id: booking_id },
        });
    }

    let refund = Booking::update_many()
        .set(booking::ActiveModel {
            payment_status: Set(PaymentStatus::Refunded),
            ..Default::default()
        })
        .filter(booking::Column::Id.eq(booking_id))
        .filter(booking::Column::PaymentStatus.eq(PaymentStatus::Paid))
        .exec(&txn)
        .await?;

    let mut refunded_amount = 0.0;
    if refund.rows_affected == 1 {
        // Free-tier bookings were never charged, so nothing goes back to the wallet
        if current.payment_id.as_deref() != Some(FREE_PAYMENT_REFERENCE) {
            wallet::credit_wallet(&txn, &current.client_id, current.total_price).await?;
            refunded_amount = current.total_price;
        }
        ledger::void_booking_earnings(&txn, booking_id).await?;
    }
    txn.commit().await?;

    let booking = require_booking(db, booking_id).await?;
    info!(
        "Cancelled booking {} (refunded {:.2} {})",
        booking_id, refunded_amount, booking.currency
    );

    let mut message = format!(
        "Booking #{} on {} has been cancelled. Reason: {}",
        booking.id, booking.scheduled_date, reason
    );
    if refunded_amount > 0.0 {
        message.push_str(&format!(
            ". {:.0} {} has been refunded to the client's wallet",
            refunded_amount, booking.currency
        ));
    }
    dispatch(
        ctx.notifier.as_ref(),
        NewNotification::new(
            counterparty(actor, &booking),
            "Booking cancelled",
            message,
            NotificationCategory::Booking,
        )
        .with_kind(NotificationKind::Warning),
    )
    .await;

    Ok(CancellationOutcome {
        booking,
        refunded_amount,
    })
}

/// Moves a pending booking to a new date and time on behalf of its client.
///
/// The new slot must not overlap another pending or confirmed booking of the
/// same provider.
#[instrument(skip(ctx), fields(user_id = %actor.user_id))]
pub async fn reschedule_booking(
    ctx: &AppContext,
    actor: &Actor,
    booking_id: i64,
    new_date: NaiveDate,
    new_time: NaiveTime,
) -> Result<booking::Model> {
    let db = &ctx.database;
    let current = require_booking(db, booking_id).await?;
    if actor.user_id != current.client_id {
        return Err(Error::forbidden("Only the client can reschedule a booking"));
    }
    if current.status != BookingStatus::Pending {
        return Err(Error::InvalidTransition {
            action: "reschedule",
            status: current.status,
        });
    }

    let txn = db.begin().await?;
    ensure_slot_available(
        &txn,
        &current.provider_id,
        Some(current.id),
        new_date,
        new_time,
        current.duration_minutes,
    )
    .await?;

    let updated = Booking::update_many()
        .set(booking::ActiveModel {
            scheduled_date: Set(new_date),
            scheduled_time: Set(new_time),
            updated_at: Set(Utc::now()),
            ..Default::default()
        })
        .filter(booking::Column::Id.eq(booking_id))
        .filter(booking::Column::Status.eq(BookingStatus::Pending))
        .exec(&txn)
        .await?;
    if updated.rows_affected == 0 {
        txn.rollback().await?;
        return Err(lost_transition(db, booking_id, "reschedule").await);
    }
    txn.commit().await?;

    let booking = require_booking(db, booking_id).await?;
    info!("Rescheduled booking {booking_id} to {new_date} {new_time}");

    let when = format!(
        "{} at {}",
        booking.scheduled_date,
        booking.scheduled_time.format("%H:%M")
    );
    for user_id in [&booking.provider_id, &booking.client_id] {
        dispatch(
            ctx.notifier.as_ref(),
            NewNotification::new(
                user_id,
                "Booking rescheduled",
                format!("Booking #{} has been moved to {when}", booking.id),
                NotificationCategory::Booking,
            )
            .with_action(format!("/bookings/{}", booking.id), "View booking"),
        )
        .await;
    }

    Ok(booking)
}

/// Marks a confirmed, paid booking as completed and completes its earning.
#[instrument(skip(ctx), fields(user_id = %actor.user_id))]
pub async fn complete_booking(
    ctx: &AppContext,
    actor: &Actor,
    booking_id: i64,
) -> Result<booking::Model> {
    let db = &ctx.database;
    let current = require_booking(db, booking_id).await?;
    ensure_provider_or_admin(actor, &current)?;
    if current.status != BookingStatus::Confirmed
        || current.payment_status != PaymentStatus::Paid
    {
        return Err(Error::InvalidTransition {
            action: "complete",
            status: current.status,
        });
    }

    let txn = db.begin().await?;
    let completed = Booking::update_many()
        .set(booking::ActiveModel {
            status: Set(BookingStatus::Completed),
            updated_at: Set(Utc::now()),
            ..Default::default()
        })
        .filter(booking::Column::Id.eq(booking_id))
        .filter(booking::Column::Status.eq(BookingStatus::Confirmed))
        .filter(booking::Column::PaymentStatus.eq(PaymentStatus::Paid))
        .exec(&txn)
        .await?;
    if completed.rows_affected == 0 {
        txn.rollback().await?;
        return Err(lost_transition(db, booking_id, "complete").await);
    }
    let earnings = ledger::complete_booking_earnings(&txn, booking_id).await?;
    txn.commit().await?;
    info!("Completed booking {booking_id} ({earnings} earnings settled)");

    let booking = require_booking(db, booking_id).await?;
    dispatch(
        ctx.notifier.as_ref(),
        NewNotification::new(
            &booking.client_id,
            "Session completed",
            format!(
                "Booking #{} is complete. Tell others how it went!",
                booking.id
            ),
            NotificationCategory::Review,
        )
        .with_kind(NotificationKind::Success)
        .with_action(format!("/bookings/{}/review", booking.id), "Leave a review"),
    )
    .await;

    Ok(booking)
}

/// Marks a confirmed booking as a no-show.
#[instrument(skip(ctx), fields(user_id = %actor.user_id))]
pub async fn mark_no_show(
    ctx: &AppContext,
    actor: &Actor,
    booking_id: i64,
) -> Result<booking::Model> {
    let db = &ctx.database;
    let current = require_booking(db, booking_id).await?;
    ensure_provider_or_admin(actor, &current)?;
    if current.status != BookingStatus::Confirmed {
        return Err(Error::InvalidTransition {
            action: "mark as no-show",
            status: current.status,
        });
    }

    let updated = Booking::update_many()
        .set(booking::ActiveModel {
            status: Set(BookingStatus::NoShow),
            updated_at: Set(Utc::now()),
            ..Default::default()
        })
        .filter(booking::Column::Id.eq(booking_id))
        .filter(booking::Column::Status.eq(BookingStatus::Confirmed))
        .exec(db)
        .await?;
    if updated.rows_affected == 0 {
        return Err(lost_transition(db, booking_id, "mark as no-show").await);
    }

    let booking = require_booking(db, booking_id).await?;
    dispatch(
        ctx.notifier.as_ref(),
        NewNotification::new(
            &booking.client_id,
            "Missed session",
            format!(
                "You were marked absent for booking #{} on {}",
                booking.id, booking.scheduled_date
            ),
            NotificationCategory::Booking,
        )
        .with_kind(NotificationKind::Warning),
    )
    .await;

    Ok(booking)
}

/// Appends a document to the booking's shared documents.
///
/// The list is replaced only if the booking was not modified since it was read.
#[instrument(skip(ctx, document), fields(user_id = %actor.user_id))]
pub async fn share_document(
    ctx: &AppContext,
    actor: &Actor,
    booking_id: i64,
    document: SharedDocument,
) -> Result<booking::Model> {
    if document.name.trim().is_empty() {
        return Err(Error::validation("A document name is required"));
    }
    if !(document.url.starts_with("https://") || document.url.starts_with("http://")) {
        return Err(Error::validation("A document URL must be an http(s) link"));
    }

    let db = &ctx.database;
    let current = require_booking(db, booking_id).await?;
    ensure_party(actor, &current)?;
    if current.status == BookingStatus::Cancelled {
        return Err(Error::InvalidTransition {
            action: "share documents on",
            status: current.status,
        });
    }

    let mut documents = current.shared_documents.clone();
    documents.0.push(document.clone());

    let updated = Booking::update_many()
        .set(booking::ActiveModel {
            shared_documents: Set(documents),
            updated_at: Set(Utc::now()),
            ..Default::default()
        })
        .filter(booking::Column::Id.eq(booking_id))
        .filter(booking::Column::UpdatedAt.eq(current.updated_at))
        .exec(db)
        .await?;
    if updated.rows_affected == 0 {
        return Err(Error::ConcurrentUpdate { id: booking_id });
    }

    let booking = require_booking(db, booking_id).await?;
    dispatch(
        ctx.notifier.as_ref(),
        NewNotification::new(
            counterparty(actor, &booking),
            "New shared document",
            format!("\"{}\" was shared on booking #{}", document.name, booking.id),
            NotificationCategory::Document,
        )
        .with_action(document.url, "Open document"),
    )
    .await;

    Ok(booking)
}
