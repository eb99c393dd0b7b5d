//! Reviews of completed bookings. One review per `(booking, reviewer)`.

use crate::{
    context::{Actor, AppContext},
    core::{
        booking::require_booking,
        notification::{NewNotification, dispatch},
    },
    entities::{
        Booking, Review, booking, booking::BookingStatus,
        notification::NotificationCategory, review,
    },
    errors::{Error, Result, is_unique_violation},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::{info, instrument, warn};

/// Aggregate rating of a provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingSummary {
    /// Mean rating, `None` without reviews
    pub average: Option<f64>,
    /// Number of reviews
    pub count: usize,
}

/// Adds the client's review of a completed booking.
///
/// The unique `(booking_id, reviewer_id)` index rejects a second review with
/// [`Error::AlreadyReviewed`]. Setting `has_review` on the booking afterwards is
/// best-effort and does not undo the review if it fails.
#[instrument(skip(ctx, comment), fields(user_id = %actor.user_id))]
pub async fn add_review(
    ctx: &AppContext,
    actor: &Actor,
    booking_id: i64,
    provider_id: &str,
    rating: i32,
    comment: Option<String>,
) -> Result<review::Model> {
    if !(1..=5).contains(&rating) {
        return Err(Error::validation("Rating must be between 1 and 5"));
    }

    let db = &ctx.database;
    let booking = require_booking(db, booking_id).await?;
    if actor.user_id != booking.client_id {
        return Err(Error::forbidden("Only the client can review a booking"));
    }
    if booking.provider_id != provider_id {
        return Err(Error::validation(
            "The reviewed provider does not match the booking",
        ));
    }
    if booking.status != BookingStatus::Completed {
        return Err(Error::InvalidTransition {
            action: "review",
            status: booking.status,
        });
    }

    let inserted = review::ActiveModel {
        booking_id: Set(booking_id),
        reviewer_id: Set(actor.user_id.clone()),
        provider_id: Set(booking.provider_id.clone()),
        rating: Set(rating),
        comment: Set(comment.filter(|c| !c.trim().is_empty())),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await;
    let created = match inserted {
        Ok(created) => created,
        Err(e) if is_unique_violation(&e) => return Err(Error::AlreadyReviewed),
        Err(e) => return Err(e.into()),
    };
    info!("Review {} added for booking {booking_id}", created.id);

    let flagged = Booking::update_many()
        .set(booking::ActiveModel {
            has_review: Set(true),
            ..Default::default()
        })
        .filter(booking::Column::Id.eq(booking_id))
        .filter(booking::Column::Status.eq(BookingStatus::Completed))
        .filter(booking::Column::HasReview.eq(false))
        .exec(db)
        .await;
    if let Err(e) = flagged {
        warn!("Review {} saved but booking {booking_id} not flagged: {e}", created.id);
    }

    dispatch(
        ctx.notifier.as_ref(),
        NewNotification::new(
            &booking.provider_id,
            "New review",
            format!("You received a {rating}-star review for booking #{booking_id}"),
            NotificationCategory::Review,
        )
        .with_action("/reviews", "View reviews"),
    )
    .await;

    Ok(created)
}

/// Lists the reviews a provider received, newest first.
pub async fn list_reviews_for_provider(
    db: &DatabaseConnection,
    provider_id: &str,
) -> Result<Vec<review::Model>> {
    Review::find()
        .filter(review::Column::ProviderId.eq(provider_id))
        .order_by_desc(review::Column::CreatedAt)
        .order_by_desc(review::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Average rating and review count of a provider.
pub async fn rating_summary(db: &DatabaseConnection, provider_id: &str) -> Result<RatingSummary> {
    let reviews = list_reviews_for_provider(db, provider_id).await?;
    let count = reviews.len();
    let average = (count > 0).then(|| {
        let total: i64 = reviews.iter().map(|r| i64::from(r.rating)).sum();
        #[allow(clippy::cast_precision_loss)]
        let mean = total as f64 / count as f64;
        mean
    });
    Ok(RatingSummary { average, count })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::booking::complete_booking;
    use crate::errors::ErrorKind;
    use crate::test_utils::*;

    async fn completed_booking(harness: &TestHarness) -> Result<booking::Model> {
        let booking = create_paid_booking(harness, "tx_123").await?;
        complete_booking(&harness.ctx, &provider(), booking.id).await
    }

    #[tokio::test]
    async fn test_add_review_flags_booking() -> Result<()> {
        let harness = setup_harness().await?;
        let booking = completed_booking(&harness).await?;
        harness.notifier.clear();

        let created = add_review(
            &harness.ctx,
            &student(),
            booking.id,
            PROVIDER_ID,
            5,
            Some("Very thorough feedback".to_string()),
        )
        .await?;
        assert_eq!(created.rating, 5);
        assert_eq!(created.provider_id, PROVIDER_ID);

        let reloaded = require_booking(&harness.ctx.database, booking.id).await?;
        assert!(reloaded.has_review);

        let sent = harness.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id, PROVIDER_ID);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_review_is_constraint_error() -> Result<()> {
        let harness = setup_harness().await?;
        let booking = completed_booking(&harness).await?;

        add_review(&harness.ctx, &student(), booking.id, PROVIDER_ID, 4, None).await?;
        let err = add_review(&harness.ctx, &student(), booking.id, PROVIDER_ID, 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyReviewed));
        assert_eq!(err.kind(), ErrorKind::Constraint);

        let reviews = list_reviews_for_provider(&harness.ctx.database, PROVIDER_ID).await?;
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].rating, 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_review_preconditions() -> Result<()> {
        let harness = setup_harness().await?;
        let pending = create_test_booking(&harness).await?;

        let err = add_review(&harness.ctx, &student(), pending.id, PROVIDER_ID, 5, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                status: BookingStatus::Pending,
                ..
            }
        ));

        let done = completed_booking(&harness).await?;
        for rating in [0, 6] {
            let err = add_review(&harness.ctx, &student(), done.id, PROVIDER_ID, rating, None)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }

        let err = add_review(&harness.ctx, &provider(), done.id, PROVIDER_ID, 5, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = add_review(&harness.ctx, &student(), done.id, "provider-2", 5, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        Ok(())
    }

    #[tokio::test]
    async fn test_rating_summary() -> Result<()> {
        let harness = setup_harness().await?;
        let db = &harness.ctx.database;

        let empty = rating_summary(db, PROVIDER_ID).await?;
        assert_eq!(empty.count, 0);
        assert!(empty.average.is_none());

        let first = completed_booking(&harness).await?;
        let second = completed_booking(&harness).await?;
        add_review(&harness.ctx, &student(), first.id, PROVIDER_ID, 5, None).await?;
        add_review(&harness.ctx, &student(), second.id, PROVIDER_ID, 4, None).await?;

        let summary = rating_summary(db, PROVIDER_ID).await?;
        assert_eq!(summary.count, 2);
        assert_eq!(summary.average, Some(4.5));
        Ok(())
    }
}
