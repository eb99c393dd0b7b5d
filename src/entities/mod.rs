//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

/// Scheduled consultations
pub mod booking;
/// Add-ons captured on a booking
pub mod booking_addon;
/// Provider earnings
pub mod earning;
/// In-app notifications
pub mod notification;
/// Payment idempotency claims and outbox
pub mod payment_attempt;
/// User display data and roles
pub mod profile;
/// Booking reviews
pub mod review;
/// Services offered by providers
pub mod service;
/// Add-on catalog of a service
pub mod service_addon;
/// Client wallets
pub mod wallet;
/// Provider payouts
pub mod withdrawal;

// Re-export specific types to avoid conflicts
pub use booking::{Column as BookingColumn, Entity as Booking, Model as BookingModel};
pub use booking_addon::{
    Column as BookingAddonColumn, Entity as BookingAddon, Model as BookingAddonModel,
};
pub use earning::{Column as EarningColumn, Entity as Earning, Model as EarningModel};
pub use notification::{
    Column as NotificationColumn, Entity as Notification, Model as NotificationModel,
};
pub use payment_attempt::{
    Column as PaymentAttemptColumn, Entity as PaymentAttempt, Model as PaymentAttemptModel,
};
pub use profile::{Column as ProfileColumn, Entity as Profile, Model as ProfileModel};
pub use review::{Column as ReviewColumn, Entity as Review, Model as ReviewModel};
pub use service::{Column as ServiceColumn, Entity as Service, Model as ServiceModel};
pub use service_addon::{
    Column as ServiceAddonColumn, Entity as ServiceAddon, Model as ServiceAddonModel,
};
pub use wallet::{Column as WalletColumn, Entity as Wallet, Model as WalletModel};
pub use withdrawal::{Column as WithdrawalColumn, Entity as Withdrawal, Model as WithdrawalModel};
