//! Completion notices over Web Push.
//!
//! The reconciler builds a [`Notification`] and hands its bytes to a
//! [`PushSender`]; [`WebPushSender`] is the production sender, signed with the
//! application's [`VapidKeys`].

mod vapid;
mod webpush;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::registry::PushTarget;

pub use vapid::VapidKeys;
pub use webpush::WebPushSender;

/// Delivery failure. The reconciler treats every variant as "not delivered yet".
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("encode payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("web push: {0}")]
    WebPush(#[from] web_push::WebPushError),
    #[error("{0}")]
    Rejected(String),
}

/// Payload shown by the service worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
}

impl Notification {
    /// Notice for a finished download; the icon is served next to the app.
    pub fn job_finished(name: &str, base_uri: &str) -> Self {
        Self {
            title: "Finished downloading Torrent".to_string(),
            body: format!("Name: {name}"),
            icon: format!("{}/logo.svg", base_uri.trim_end_matches('/')),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PushError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// One delivery attempt to one subscription.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, target: &PushTarget, payload: &[u8]) -> Result<(), PushError>;
}
