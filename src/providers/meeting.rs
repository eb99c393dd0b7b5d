//! Meeting-link provisioning contract: `{booking_id}` in, `{meetLink}` out.

use crate::config::MeetingSettings;
use crate::errors::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Creates a video meeting for a booking and returns its link.
#[async_trait]
pub trait MeetingLinkProvisioner: Send + Sync {
    /// Returns the meeting link for `booking_id`.
    async fn provision(&self, booking_id: i64) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct MeetingRequest {
    booking_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MeetingResponse {
    #[serde(rename = "meetLink")]
    meet_link: Option<String>,
    error: Option<String>,
}

/// [`MeetingLinkProvisioner`] calling a serverless function over HTTP
#[derive(Debug, Clone)]
pub struct HttpMeetingLinkProvisioner {
    client: reqwest::Client,
    settings: MeetingSettings,
}

impl HttpMeetingLinkProvisioner {
    /// Builds the provisioner with the configured timeout.
    pub fn new(settings: MeetingSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self { client, settings })
    }
}

#[async_trait]
impl MeetingLinkProvisioner for HttpMeetingLinkProvisioner {
    async fn provision(&self, booking_id: i64) -> Result<String> {
        let response: MeetingResponse = self
            .client
            .post(&self.settings.endpoint)
            .bearer_auth(&self.settings.api_key)
            .json(&MeetingRequest { booking_id })
            .send()
            .await?
            .json()
            .await?;

        match (response.meet_link, response.error) {
            (Some(link), _) if !link.trim().is_empty() => Ok(link),
            (_, Some(reason)) => Err(Error::MeetingLink { reason }),
            _ => Err(Error::MeetingLink {
                reason: "no meeting link returned".to_string(),
            }),
        }
    }
}
