//! Unified error type for every booking, payment and ledger operation.
//!
//! Each variant's `Display` output is a human-readable reason that can be shown
//! to the person who triggered the operation. [`Error::kind`] groups variants so
//! callers can tell validation problems from provider or persistence failures.

use crate::entities::booking::BookingStatus;
use chrono::{NaiveDate, NaiveTime};
use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Broad classification of an [`Error`], used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, rejected before any network call
    Validation,
    /// The referenced record does not exist
    NotFound,
    /// The actor is not allowed to perform the operation
    Forbidden,
    /// The record is not in a state that allows the operation
    Conflict,
    /// A uniqueness or balance constraint rejected the operation
    Constraint,
    /// The external payment, payout or meeting provider failed
    Provider,
    /// Reading from or writing to the store failed
    Persistence,
    /// Configuration or environment problem
    Configuration,
}

/// All errors produced by the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or is invalid
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong
        message: String,
    },

    /// Store failure
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// Input rejected before any write or provider call
    #[error("Invalid input: {message}")]
    Validation {
        /// Which rule the input broke
        message: String,
    },

    /// Negative, zero or non-finite money amount
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: f64,
    },

    /// No booking with this id
    #[error("Booking {id} not found")]
    BookingNotFound {
        /// Requested booking id
        id: i64,
    },

    /// No active service with this id
    #[error("Service {id} not found")]
    ServiceNotFound {
        /// Requested service id
        id: i64,
    },

    /// The add-on does not belong to the booked service or is inactive
    #[error("Add-on {id} is not offered for this service")]
    AddonNotFound {
        /// Requested add-on id
        id: i64,
    },

    /// No withdrawal with this id
    #[error("Withdrawal {id} not found")]
    WithdrawalNotFound {
        /// Requested withdrawal id
        id: i64,
    },

    /// The actor may not perform the operation
    #[error("Not allowed: {message}")]
    Forbidden {
        /// Why the actor was refused
        message: String,
    },

    /// The booking's current status does not allow the operation
    #[error("Cannot {action} a booking that is {status}")]
    InvalidTransition {
        /// Attempted action, e.g. `"cancel"`
        action: &'static str,
        /// Status found when the operation ran
        status: BookingStatus,
    },

    /// Another writer changed the booking between read and write
    #[error("Booking {id} was modified concurrently, please retry")]
    ConcurrentUpdate {
        /// Booking id
        id: i64,
    },

    /// The withdrawal is already completed or failed
    #[error("Withdrawal {id} has already been settled")]
    WithdrawalSettled {
        /// Withdrawal id
        id: i64,
    },

    /// The booking is already paid
    #[error("Booking {id} has already been paid")]
    AlreadyPaid {
        /// Booking id
        id: i64,
    },

    /// A provider call for this booking's payment has not finished yet
    #[error("A payment for booking {id} is already in progress")]
    PaymentInProgress {
        /// Booking id
        id: i64,
    },

    /// A payment attempt for this booking never resolved and must be checked
    /// with the provider before the booking can be paid or cancelled
    #[error("The payment for booking {id} is awaiting review, please contact support")]
    PaymentUnderReview {
        /// Booking id
        id: i64,
    },

    /// The payment provider declined, failed or timed out
    #[error("Payment failed: {reason}. Please try again.")]
    PaymentFailed {
        /// Provider message or transport failure
        reason: String,
    },

    /// The payout provider declined, failed or timed out
    #[error("Payout failed: {reason}")]
    PayoutFailed {
        /// Provider message or transport failure
        reason: String,
    },

    /// The meeting-link service failed
    #[error("Meeting link provisioning failed: {reason}")]
    MeetingLink {
        /// Service message or transport failure
        reason: String,
    },

    /// HTTP transport failure talking to a provider
    #[error("Provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The withdrawal exceeds the available balance
    #[error("Insufficient balance: available {available:.2}, requested {requested:.2}")]
    InsufficientBalance {
        /// Balance available in the requested currency
        available: f64,
        /// Requested amount
        requested: f64,
    },

    /// The reviewer already reviewed this booking
    #[error("You have already reviewed this booking")]
    AlreadyReviewed,

    /// The provider already has a booking overlapping this slot
    #[error("The slot {date} {time} is not available for this provider")]
    SlotUnavailable {
        /// Requested date
        date: NaiveDate,
        /// Requested start time
        time: NaiveTime,
    },

    /// No email template with this name
    #[error("Email template '{name}' not found")]
    TemplateNotFound {
        /// Requested template name
        name: String,
    },

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable missing or not unicode
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),
}

impl Error {
    /// Classifies this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } | Self::Io(_) | Self::EnvVar(_) => ErrorKind::Configuration,
            Self::Database(_) => ErrorKind::Persistence,
            Self::Validation { .. } | Self::InvalidAmount { .. } => ErrorKind::Validation,
            Self::BookingNotFound { .. }
            | Self::ServiceNotFound { .. }
            | Self::AddonNotFound { .. }
            | Self::WithdrawalNotFound { .. }
            | Self::TemplateNotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::InvalidTransition { .. }
            | Self::AlreadyPaid { .. }
            | Self::ConcurrentUpdate { .. }
            | Self::WithdrawalSettled { .. }
            | Self::PaymentUnderReview { .. } => ErrorKind::Conflict,
            Self::PaymentInProgress { .. }
            | Self::InsufficientBalance { .. }
            | Self::AlreadyReviewed
            | Self::SlotUnavailable { .. } => ErrorKind::Constraint,
            Self::PaymentFailed { .. }
            | Self::PayoutFailed { .. }
            | Self::MeetingLink { .. }
            | Self::Http(_) => ErrorKind::Provider,
        }
    }

    /// Shorthand for a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for a forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }
}

/// Returns true when the database rejected a write because of a unique constraint.
#[must_use]
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
