//! Email template rendering.
//!
//! Templates support two constructs:
//! - `{{key}}` is replaced by the value of `key`, or nothing if it is missing;
//! - `{{#if key}}...{{/if}}` keeps its content only when `key` is present and
//!   not blank. Blocks do not nest.

use crate::errors::{Error, Result};
use std::collections::HashMap;
use std::str::FromStr;

/// Values substituted into a template
pub type TemplateVars = HashMap<String, String>;

const IF_OPEN: &str = "{{#if ";
const IF_CLOSE: &str = "{{/if}}";

fn is_set(vars: &TemplateVars, key: &str) -> bool {
    vars.get(key).is_some_and(|v| !v.trim().is_empty())
}

fn expand_conditionals(template: &str, vars: &TemplateVars) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(IF_OPEN) {
        let after_open = &rest[start + IF_OPEN.len()..];
        let Some(key_end) = after_open.find("}}") else {
            break;
        };
        let key = after_open[..key_end].trim();
        let body = &after_open[key_end + 2..];
        let Some(close) = body.find(IF_CLOSE) else {
            break;
        };

        out.push_str(&rest[..start]);
        if is_set(vars, key) {
            out.push_str(&body[..close]);
        }
        rest = &body[close + IF_CLOSE.len()..];
    }

    out.push_str(rest);
    out
}

fn substitute(template: &str, vars: &TemplateVars) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let key = rest[start + 2..start + 2 + len].trim();
        out.push_str(&rest[..start]);
        if key.starts_with('#') || key.starts_with('/') {
            // Unbalanced block markers are left as written
            out.push_str(&rest[start..start + len + 4]);
        } else if let Some(value) = vars.get(key) {
            out.push_str(value);
        }
        rest = &rest[start + len + 4..];
    }

    out.push_str(rest);
    out
}

/// Renders `template` with `vars`.
#[must_use]
pub fn render(template: &str, vars: &TemplateVars) -> String {
    substitute(&expand_conditionals(template, vars), vars)
}

/// Built-in email templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailTemplate {
    /// `booking_confirmation`, sent to the client once paid
    BookingConfirmation,
    /// `booking_cancelled`, sent to the other party
    BookingCancelled,
    /// `payment_received`, sent to the provider
    PaymentReceived,
    /// `withdrawal_requested`, sent to the provider
    WithdrawalRequested,
    /// `new_review`, sent to the reviewed provider
    NewReview,
}

impl EmailTemplate {
    /// Every built-in template
    pub const ALL: [Self; 5] = [
        Self::BookingConfirmation,
        Self::BookingCancelled,
        Self::PaymentReceived,
        Self::WithdrawalRequested,
        Self::NewReview,
    ];

    /// Name used to look the template up
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BookingConfirmation => "booking_confirmation",
            Self::BookingCancelled => "booking_cancelled",
            Self::PaymentReceived => "payment_received",
            Self::WithdrawalRequested => "withdrawal_requested",
            Self::NewReview => "new_review",
        }
    }

    const fn subject(self) -> &'static str {
        match self {
            Self::BookingConfirmation => "Your booking with {{provider_name}} is confirmed",
            Self::BookingCancelled => "Booking #{{booking_id}} has been cancelled",
            Self::PaymentReceived => "Payment received for booking #{{booking_id}}",
            Self::WithdrawalRequested => "Withdrawal of {{amount}} {{currency}} requested",
            Self::NewReview => "You received a new review",
        }
    }

    const fn body(self) -> &'static str {
        match self {
            Self::BookingConfirmation => {
                "Hello {{client_name}},\n\n\
                 Your session \"{{service_title}}\" with {{provider_name}} is confirmed for \
                 {{date}} at {{time}}.\n\
                 {{#if meeting_link}}Join the meeting: {{meeting_link}}\n{{/if}}\
                 \nThe ScholarLink team"
            }
            Self::BookingCancelled => {
                "Hello {{recipient_name}},\n\n\
                 Booking #{{booking_id}} on {{date}} has been cancelled.\n\
                 {{#if reason}}Reason: {{reason}}\n{{/if}}\
                 {{#if refund_amount}}{{refund_amount}} {{currency}} has been credited to your wallet.\n{{/if}}\
                 \nThe ScholarLink team"
            }
            Self::PaymentReceived => {
                "Hello {{client_name}},\n\n\
                 We received your payment of {{amount}} {{currency}} for booking #{{booking_id}}.\n\
                 Reference: {{reference}}\n\
                 \nThe ScholarLink team"
            }
            Self::WithdrawalRequested => {
                "Hello {{provider_name}},\n\n\
                 Your withdrawal of {{amount}} {{currency}} to {{destination}} is being processed.\n\
                 \nThe ScholarLink team"
            }
            Self::NewReview => {
                "Hello {{provider_name}},\n\n\
                 {{client_name}} rated your session {{rating}}/5.\n\
                 {{#if comment}}\"{{comment}}\"\n{{/if}}\
                 \nThe ScholarLink team"
            }
        }
    }
}

impl FromStr for EmailTemplate {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| Error::TemplateNotFound {
                name: name.to_string(),
            })
    }
}

/// A rendered email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    /// Subject line
    pub subject: String,
    /// HTML body
    pub body: String,
}

/// Renders the built-in template called `name`.
pub fn render_named(name: &str, vars: &TemplateVars) -> Result<RenderedEmail> {
    let template: EmailTemplate = name.parse()?;
    Ok(RenderedEmail {
        subject: render(template.subject(), vars),
        body: render(template.body(), vars),
    })
}
