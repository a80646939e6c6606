//! Production [`PushSender`] backed by the `web-push` crate.

use std::time::Duration;

use async_trait::async_trait;
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushMessageBuilder,
};

use crate::registry::PushTarget;

use super::{PushError, PushSender, VapidKeys};

/// Encrypts (aes128gcm) and VAPID-signs each message, then POSTs it to the
/// subscription endpoint.
pub struct WebPushSender {
    client: IsahcWebPushClient,
    private_key: String,
    subject: String,
    ttl_secs: u32,
}

impl WebPushSender {
    pub fn new(keys: &VapidKeys, subject: impl Into<String>, ttl: Duration) -> Result<Self, PushError> {
        Ok(Self {
            client: IsahcWebPushClient::new()?,
            private_key: keys.private_key.clone(),
            subject: subject.into(),
            ttl_secs: u32::try_from(ttl.as_secs()).unwrap_or(u32::MAX),
        })
    }
}

#[async_trait]
impl PushSender for WebPushSender {
    async fn send(&self, target: &PushTarget, payload: &[u8]) -> Result<(), PushError> {
        let info = SubscriptionInfo::new(
            target.endpoint.as_str(),
            target.keys.p256dh.as_str(),
            target.keys.auth.as_str(),
        );

        let mut signature =
            VapidSignatureBuilder::from_base64(&self.private_key, web_push::URL_SAFE_NO_PAD, &info)?;
        signature.add_claim("sub", self.subject.as_str());

        let mut builder = WebPushMessageBuilder::new(&info);
        builder.set_ttl(self.ttl_secs);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);
        builder.set_vapid_signature(signature.build()?);

        self.client.send(builder.build()?).await?;
        Ok(())
    }
}
