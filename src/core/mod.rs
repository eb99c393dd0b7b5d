//! Core business logic - framework-agnostic booking, payment and ledger operations.
//!
//! Every mutating operation takes an explicit [`crate::context::Actor`] and returns
//! a `Result` whose error carries a human-readable reason.

/// Booking lifecycle: create, cancel, reschedule, complete, documents
pub mod booking;
/// Earnings and withdrawal ledger derivations
pub mod ledger;
/// Fire-and-forget notifications and the database notifier
pub mod notification;
/// Booking payments through the mobile-money provider
pub mod payment;
/// Reviews of completed bookings
pub mod review;
/// Email template rendering
pub mod template;
/// Client wallets credited by refunds
pub mod wallet;
/// Provider payout requests
pub mod withdrawal;
