use std::str::FromStr;
use std::time::Duration;

use reqwest::StatusCode;
use time::OffsetDateTime;

use crate::error::{ConfigError, DeliveryError};
use crate::push::jwt::{VapidSigner, audience_for, authorization_header};
use crate::push::payload::{self, PushPayload};
use crate::types::push::Subscription;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The push service no longer knows this endpoint (404/410).
    Gone,
    /// Anything else: rejected, unreachable, or never sent. The subscription is kept.
    Failed(String),
}

pub(crate) fn classify_status(status: StatusCode) -> DeliveryOutcome {
    if status.is_success() {
        return DeliveryOutcome::Delivered;
    }
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => DeliveryOutcome::Gone,
        other => DeliveryOutcome::Failed(format!("push service responded {other}")),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Urgency {
    VeryLow,
    Low,
    #[default]
    Normal,
    High,
}

impl Urgency {
    pub fn as_str(self) -> &'static str {
        match self {
            Urgency::VeryLow => "very-low",
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::High => "high",
        }
    }
}

impl FromStr for Urgency {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "very-low" => Ok(Urgency::VeryLow),
            "low" => Ok(Urgency::Low),
            "normal" => Ok(Urgency::Normal),
            "high" => Ok(Urgency::High),
            _ => Err(ConfigError::InvalidUrgency(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PushRequest {
    pub endpoint: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Signs a fresh token for the endpoint's origin and encrypts the payload.
pub(crate) fn prepare_request(
    signer: &VapidSigner,
    subscription: &Subscription,
    payload: &PushPayload,
    ttl: Duration,
    urgency: Urgency,
    now: OffsetDateTime,
) -> Result<PushRequest, DeliveryError> {
    let audience = audience_for(&subscription.endpoint)?;
    let token = signer.sign(&audience, now)?;
    let encoded = payload::encode(payload, subscription)?;

    let mut headers = vec![
        (
            "Content-Type".to_string(),
            "application/octet-stream".to_string(),
        ),
        (
            "Content-Encoding".to_string(),
            encoded.content_encoding.to_string(),
        ),
        ("TTL".to_string(), ttl.as_secs().to_string()),
        ("Urgency".to_string(), urgency.as_str().to_string()),
        (
            "Authorization".to_string(),
            authorization_header(&token, signer.keys().public_key()),
        ),
    ];
    headers.extend(encoded.headers);

    Ok(PushRequest {
        endpoint: subscription.endpoint.clone(),
        headers,
        body: encoded.body,
    })
}
