//! VAPID application server keys, kept in a small JSON file.

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::SecretKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// P-256 key pair, base64url without padding: the raw 32-byte private scalar
/// and the 65-byte uncompressed public point browsers subscribe with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VapidKeys {
    pub private_key: String,
    pub public_key: String,
}

impl VapidKeys {
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key().to_encoded_point(false);
        Self {
            private_key: URL_SAFE_NO_PAD.encode(secret.to_bytes()),
            public_key: URL_SAFE_NO_PAD.encode(public.as_bytes()),
        }
    }

    /// Check that the private key decodes and that the public key belongs to it.
    pub fn validate(&self) -> Result<()> {
        let raw = URL_SAFE_NO_PAD
            .decode(self.private_key.trim())
            .context("decode VAPID private key")?;
        let secret = SecretKey::from_slice(&raw).context("VAPID private key is not a P-256 scalar")?;
        let derived = URL_SAFE_NO_PAD.encode(secret.public_key().to_encoded_point(false).as_bytes());
        if derived != self.public_key.trim() {
            anyhow::bail!("VAPID public key does not match the private key");
        }
        Ok(())
    }

    /// Load keys from `path`. A missing file is `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("read VAPID keys: {}", path.display())),
        };
        let keys: VapidKeys = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse VAPID keys: {}", path.display()))?;
        Ok(Some(keys))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("serialize VAPID keys")?;
        std::fs::write(path, json)
            .with_context(|| format!("write VAPID keys: {}", path.display()))?;
        Ok(())
    }

    /// Load the key file, or generate a fresh pair and write it when there is none.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if let Some(keys) = Self::load(path)? {
            keys.validate()
                .with_context(|| format!("invalid VAPID keys in {}", path.display()))?;
            return Ok(keys);
        }
        let keys = Self::generate();
        keys.save(path)?;
        tracing::info!("generated VAPID keys at {}", path.display());
        Ok(keys)
    }
}
