//! Mobile-money payment provider contract and its HTTP implementation.
//!
//! A provider response only counts as a successful payment when both
//! `operationSuccess` and `transactionSuccess` are true, whatever the HTTP status.
//! The provider may also report the designated free tier, in which case no money
//! moves at all.

use crate::config::PaymentSettings;
use crate::errors::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Payment reference stored on bookings settled through the free tier
pub const FREE_PAYMENT_REFERENCE: &str = "Free";

/// Provider status value marking the free tier
pub const FREE_TIER_STATUS: &str = "FREE";

/// Supported mobile-money operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MobileMoneyOperator {
    /// MTN Mobile Money
    #[serde(rename = "MTN")]
    Mtn,
    /// Orange Money
    #[serde(rename = "ORANGE")]
    Orange,
}

impl MobileMoneyOperator {
    /// Provider service code
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Mtn => "MTN",
            Self::Orange => "ORANGE",
        }
    }

    /// Human-readable channel name used in withdrawal notes
    #[must_use]
    pub const fn channel_name(self) -> &'static str {
        match self {
            Self::Mtn => "MTN Mobile Money",
            Self::Orange => "Orange Money",
        }
    }
}

impl fmt::Display for MobileMoneyOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for MobileMoneyOperator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MTN" => Ok(Self::Mtn),
            "ORANGE" => Ok(Self::Orange),
            other => Err(Error::validation(format!(
                "Unsupported mobile money operator '{other}'"
            ))),
        }
    }
}

/// Who pays for a booking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayerDetails {
    /// Mobile-money phone number to charge
    pub phone: String,
    /// Network of `phone`
    pub operator: MobileMoneyOperator,
    /// Payer name forwarded to the provider
    pub name: Option<String>,
    /// Payer email forwarded to the provider
    pub email: Option<String>,
}

/// Customer identity sent with a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerInfo {
    /// Our user id
    pub id: String,
    /// Display name
    pub name: Option<String>,
    /// Contact email
    pub email: Option<String>,
    /// Mobile-money number
    pub phone: String,
}

/// One itemized line of a collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductLine {
    /// Item name
    pub name: String,
    /// `consultation` or `addon`
    pub category: String,
    /// Always one for bookings
    pub quantity: u32,
    /// Line price
    pub amount: f64,
}

/// Request to charge a payer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectRequest {
    /// Amount to charge
    pub amount: f64,
    /// Currency of `amount`
    pub currency: String,
    /// Operator code
    pub service: MobileMoneyOperator,
    /// Phone number to charge
    pub payer: String,
    /// Who is paying
    pub customer: CustomerInfo,
    /// Itemized service and add-ons
    pub products: Vec<ProductLine>,
    /// Our own reference for the charge
    pub reference: String,
}

/// Request to pay money out to a provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayoutRequest {
    /// Amount to send
    pub amount: f64,
    /// Currency of `amount`
    pub currency: String,
    /// Operator code
    pub service: MobileMoneyOperator,
    /// Phone number receiving the money
    pub receiver: String,
    /// User requesting the payout
    pub requester_id: String,
}

/// Fields of a provider response the core relies on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderResponse {
    /// The provider accepted the request
    pub operation_success: bool,
    /// The money actually moved
    pub transaction_success: bool,
    /// Provider transaction reference
    pub reference: Option<String>,
    /// Human-readable reason, mostly on failure
    #[serde(alias = "error")]
    pub message: Option<String>,
    /// `FREE` when the free tier applied
    pub status: Option<String>,
}

/// Interpretation of a [`ProviderResponse`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Free tier, no money transferred
    Free,
    /// Money transferred
    Paid {
        /// Provider transaction reference
        reference: String,
    },
    /// Anything else
    Declined {
        /// Reason reported by the provider, or a generic one
        reason: String,
    },
}

impl ProviderResponse {
    /// Free tier marker from the provider
    #[must_use]
    pub fn is_free_tier(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case(FREE_TIER_STATUS))
    }

    /// Both success flags set
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.operation_success && self.transaction_success
    }

    fn failure_reason(&self) -> String {
        self.message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "the payment provider did not confirm the transaction".to_string())
    }

    /// Partitions the response into exactly one outcome.
    #[must_use]
    pub fn outcome(&self) -> PaymentOutcome {
        if self.is_free_tier() {
            return PaymentOutcome::Free;
        }
        if !self.is_success() {
            return PaymentOutcome::Declined {
                reason: self.failure_reason(),
            };
        }
        match self.reference.as_deref().map(str::trim) {
            Some(reference) if !reference.is_empty() => PaymentOutcome::Paid {
                reference: reference.to_string(),
            },
            _ => PaymentOutcome::Declined {
                reason: "the payment provider returned no transaction reference".to_string(),
            },
        }
    }
}

/// Mobile-money provider used for booking payments and provider payouts.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charges a payer. Transport failures are errors; declines are responses.
    async fn collect(&self, request: &CollectRequest) -> Result<ProviderResponse>;

    /// Pays money out to a phone number.
    async fn deposit(&self, request: &PayoutRequest) -> Result<ProviderResponse>;
}

/// [`PaymentGateway`] talking JSON over HTTP to the provider API
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    settings: PaymentSettings,
}

impl HttpPaymentGateway {
    /// Builds the gateway with the configured timeout.
    pub fn new(settings: PaymentSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()?;
        Ok(Self { client, settings })
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<ProviderResponse> {
        let url = format!("{}/{path}", self.settings.base_url.trim_end_matches('/'));
        debug!("POST {url}");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .header("X-Application-Key", &self.settings.app_key)
            .json(body)
            .send()
            .await?;
        // The provider reports declines in the body, so the status code is not checked here
        response.json::<ProviderResponse>().await.map_err(Into::into)
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn collect(&self, request: &CollectRequest) -> Result<ProviderResponse> {
        self.post("payment/collect/", request).await
    }

    async fn deposit(&self, request: &PayoutRequest) -> Result<ProviderResponse> {
        self.post("payment/deposit/", request).await
    }
}
