//! Notification dispatch.
//!
//! Notifications are a side channel: [`dispatch`] never fails the operation that
//! triggered it and never retries. A failed delivery is logged and dropped.

use crate::{
    entities::{
        Notification, notification,
        notification::{NotificationCategory, NotificationKind},
    },
    errors::Result,
};
use async_trait::async_trait;
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::{debug, warn};

/// A notification about to be delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    /// Recipient
    pub user_id: String,
    /// Short headline
    pub title: String,
    /// Body text
    pub message: String,
    /// Severity, `info` unless set
    pub kind: NotificationKind,
    /// What the notification is about
    pub category: NotificationCategory,
    /// Where the call to action leads
    pub action_url: Option<String>,
    /// Label of the call to action
    pub action_label: Option<String>,
}

impl NewNotification {
    /// Informational notification without an action.
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        category: NotificationCategory,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            title: title.into(),
            message: message.into(),
            kind: NotificationKind::Info,
            category,
            action_url: None,
            action_label: None,
        }
    }

    /// Sets the severity.
    #[must_use]
    pub const fn with_kind(mut self, kind: NotificationKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attaches a call to action.
    #[must_use]
    pub fn with_action(mut self, url: impl Into<String>, label: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self.action_label = Some(label.into());
        self
    }
}

/// Delivers notifications to users.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one notification.
    async fn notify(&self, notification: &NewNotification) -> Result<()>;
}

/// Sends a notification, logging instead of propagating any failure.
pub async fn dispatch(notifier: &dyn Notifier, notification: NewNotification) {
    match notifier.notify(&notification).await {
        Ok(()) => debug!(
            "Notified {} ({:?}): {}",
            notification.user_id, notification.category, notification.title
        ),
        Err(e) => warn!(
            "Failed to notify {} about '{}': {}",
            notification.user_id, notification.title, e
        ),
    }
}

/// [`Notifier`] storing in-app notifications in the `notifications` table
#[derive(Debug, Clone)]
pub struct DatabaseNotifier {
    database: DatabaseConnection,
}

impl DatabaseNotifier {
    /// Creates a notifier writing through `database`.
    #[must_use]
    pub const fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }
}

#[async_trait]
impl Notifier for DatabaseNotifier {
    async fn notify(&self, notification: &NewNotification) -> Result<()> {
        notification::ActiveModel {
            user_id: Set(notification.user_id.clone()),
            title: Set(notification.title.clone()),
            message: Set(notification.message.clone()),
            kind: Set(notification.kind),
            category: Set(notification.category),
            action_url: Set(notification.action_url.clone()),
            action_label: Set(notification.action_label.clone()),
            is_read: Set(false),
            created_at: Set(chrono::Utc::now()),
            ..Default::default()
        }
        .insert(&self.database)
        .await?;
        Ok(())
    }
}

/// Lists a user's notifications, newest first.
pub async fn list_notifications(
    db: &DatabaseConnection,
    user_id: &str,
    unread_only: bool,
) -> Result<Vec<notification::Model>> {
    let mut query = Notification::find().filter(notification::Column::UserId.eq(user_id));
    if unread_only {
        query = query.filter(notification::Column::IsRead.eq(false));
    }
    query
        .order_by_desc(notification::Column::CreatedAt)
        .order_by_desc(notification::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Marks one of the user's notifications as read. Returns false if it was not found.
pub async fn mark_notification_read(
    db: &DatabaseConnection,
    user_id: &str,
    notification_id: i64,
) -> Result<bool> {
    let result = Notification::update_many()
        .set(notification::ActiveModel {
            is_read: Set(true),
            ..Default::default()
        })
        .filter(notification::Column::Id.eq(notification_id))
        .filter(notification::Column::UserId.eq(user_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_database_notifier_stores_notification() -> Result<()> {
        let db = setup_test_db().await?;
        let notifier = DatabaseNotifier::new(db.clone());

        let n = NewNotification::new(
            "student-1",
            "Booking confirmed",
            "Your session is confirmed",
            NotificationCategory::Booking,
        )
        .with_kind(NotificationKind::Success)
        .with_action("/bookings/1", "View booking");
        dispatch(&notifier, n).await;

        let stored = list_notifications(&db, "student-1", false).await?;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "Booking confirmed");
        assert_eq!(stored[0].kind, NotificationKind::Success);
        assert_eq!(stored[0].action_url.as_deref(), Some("/bookings/1"));
        assert!(!stored[0].is_read);

        Ok(())
    }

    #[tokio::test]
    async fn test_mark_notification_read_only_for_owner() -> Result<()> {
        let db = setup_test_db().await?;
        let notifier = DatabaseNotifier::new(db.clone());
        dispatch(
            &notifier,
            NewNotification::new("student-1", "t", "m", NotificationCategory::Payment),
        )
        .await;
        let id = list_notifications(&db, "student-1", true).await?[0].id;

        assert!(!mark_notification_read(&db, "someone-else", id).await?);
        assert!(mark_notification_read(&db, "student-1", id).await?);
        assert!(list_notifications(&db, "student-1", true).await?.is_empty());
        assert_eq!(list_notifications(&db, "student-1", false).await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failures() {
        let notifier = RecordingNotifier::failing();
        dispatch(
            &notifier,
            NewNotification::new("student-1", "t", "m", NotificationCategory::Booking),
        )
        .await;
        assert_eq!(notifier.attempts(), 1);
        assert!(notifier.sent().is_empty());
    }
}
