use serde::{Deserialize, Serialize};

use crate::error::PayloadError;
use crate::types::push::{NotificationEvent, Subscription};

pub(crate) const CONTENT_ENCODING: &str = "aes128gcm";

/// JSON document the service worker turns into an OS notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PushPayload {
    pub title: String,
    pub body: String,
    pub tag: String,
    pub icon: String,
    pub badge: String,
    pub url: String,
}

impl PushPayload {
    pub(crate) fn for_event(event: &NotificationEvent, icon: &str, badge: &str) -> Self {
        Self {
            title: event.title.clone(),
            body: event.body.clone(),
            tag: event.tag.clone(),
            icon: icon.to_string(),
            badge: badge.to_string(),
            url: event.url.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct EncodedPayload {
    pub body: Vec<u8>,
    pub content_encoding: &'static str,
    /// Extra headers produced by the encryption scheme. Empty for `aes128gcm`,
    /// which carries its salt and key in the body.
    pub headers: Vec<(String, String)>,
}

/// Encrypts the payload to the subscription's `p256dh`/`auth` keys.
pub(crate) fn encode(
    payload: &PushPayload,
    subscription: &Subscription,
) -> Result<EncodedPayload, PayloadError> {
    let json = serde_json::to_vec(payload)?;
    let info = web_push::SubscriptionInfo::new(
        subscription.endpoint.clone(),
        subscription.p256dh.clone(),
        subscription.auth.clone(),
    );
    let mut builder = web_push::WebPushMessageBuilder::new(&info)?;
    builder.set_payload(web_push::ContentEncoding::Aes128Gcm, &json);
    let message = builder.build()?;
    let encrypted = message.payload.ok_or(PayloadError::Empty)?;

    Ok(EncodedPayload {
        body: encrypted.content,
        content_encoding: CONTENT_ENCODING,
        headers: encrypted
            .crypto_headers
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    })
}

#[cfg(test)]
pub(crate) fn test_subscription(user_id: uuid::Uuid, endpoint: &str) -> Subscription {
    use base64::{URL_SAFE_NO_PAD, encode_config};
    use rand::RngCore;
    use rand::rngs::OsRng;

    let secret = p256::SecretKey::random(&mut OsRng);
    let public = secret.public_key().to_sec1_bytes();
    let mut auth = [0u8; 16];
    OsRng.fill_bytes(&mut auth);
    Subscription {
        user_id,
        endpoint: endpoint.to_string(),
        p256dh: encode_config(public, URL_SAFE_NO_PAD),
        auth: encode_config(auth, URL_SAFE_NO_PAD),
    }
}
