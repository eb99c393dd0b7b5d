//! Request-scoped identity and the shared application context.
//!
//! Every core operation receives the acting user explicitly instead of reading a
//! global "current user", and reaches its collaborators through [`AppContext`].

use crate::config::AppConfig;
use crate::core::notification::{DatabaseNotifier, Notifier};
use crate::entities::profile::Role;
use crate::errors::Result;
use crate::providers::{
    HttpMeetingLinkProvisioner, HttpPaymentGateway, MeetingLinkProvisioner, PaymentGateway,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;

/// The authenticated user performing an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Authentication user id
    pub user_id: String,
    /// Marketplace role
    pub role: Role,
}

impl Actor {
    /// Creates an actor.
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    /// Whether the actor is an administrator
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Shared state available to all core operations.
/// Holds the database connection and the external collaborators.
#[derive(Clone)]
pub struct AppContext {
    /// Database connection for all persistence
    pub database: DatabaseConnection,
    /// Mobile-money provider for payments and payouts
    pub payments: Arc<dyn PaymentGateway>,
    /// Meeting-link provisioning
    pub meetings: Arc<dyn MeetingLinkProvisioner>,
    /// Side-channel notifications
    pub notifier: Arc<dyn Notifier>,
    /// Upper bound for a single payment or payout provider call
    pub payment_timeout: Duration,
    /// Currency used when a request leaves it blank
    pub default_currency: String,
}

impl AppContext {
    /// Creates a context from explicit collaborators.
    #[must_use]
    pub fn new(
        database: DatabaseConnection,
        payments: Arc<dyn PaymentGateway>,
        meetings: Arc<dyn MeetingLinkProvisioner>,
        notifier: Arc<dyn Notifier>,
        payment_timeout: Duration,
        default_currency: &str,
    ) -> Self {
        Self {
            database,
            payments,
            meetings,
            notifier,
            payment_timeout,
            default_currency: default_currency.trim().to_uppercase(),
        }
    }

    /// Normalizes a currency code, falling back to the default when blank.
    #[must_use]
    pub fn currency_or_default(&self, currency: &str) -> String {
        match currency.trim() {
            "" => self.default_currency.clone(),
            code => code.to_uppercase(),
        }
    }

    /// Wires the HTTP collaborators and the database notifier from configuration.
    pub fn from_config(database: DatabaseConnection, config: &AppConfig) -> Result<Self> {
        let payments = HttpPaymentGateway::new(config.payments.clone())?;
        let meetings = HttpMeetingLinkProvisioner::new(config.meetings.clone())?;
        let notifier = DatabaseNotifier::new(database.clone());

        Ok(Self::new(
            database,
            Arc::new(payments),
            Arc::new(meetings),
            Arc::new(notifier),
            config.payments.timeout(),
            &config.payments.default_currency,
        ))
    }
}
