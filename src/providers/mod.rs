//! External collaborators reached over the network.
//!
//! Each collaborator is a trait so the booking core can be driven by the HTTP
//! implementations in production and by scripted fakes in tests.

/// Meeting-link provisioning for confirmed bookings
pub mod meeting;
/// Mobile-money collection and payout provider
pub mod payment;

pub use meeting::{HttpMeetingLinkProvisioner, MeetingLinkProvisioner};
pub use payment::{
    CollectRequest, HttpPaymentGateway, MobileMoneyOperator, PayerDetails, PaymentGateway,
    PaymentOutcome, PayoutRequest, ProductLine, ProviderResponse,
};
