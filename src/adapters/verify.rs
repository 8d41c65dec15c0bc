use {
    crate::domain::{error::BillingError, event::WebhookEvent},
    hmac::{Hmac, Mac},
    sha2::Sha256,
    std::sync::Arc,
};

type HmacSha256 = Hmac<Sha256>;

/// Signatures older or newer than this are rejected — replaying a captured
/// delivery outside the window buys an attacker nothing.
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Validates webhook authenticity over the raw request bytes, then decodes
/// the typed event. The body must stay unparsed until the tag matches:
/// re-serialization would change the byte-exact signature input.
#[derive(Clone)]
pub struct EventVerifier {
    secret: Option<Arc<str>>,
}

impl EventVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.map(Into::into),
        }
    }

    pub fn verify(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, BillingError> {
        self.verify_at(body, signature, chrono::Utc::now().timestamp())
    }

    /// `now` injected so the tolerance window is testable.
    pub fn verify_at(
        &self,
        body: &[u8],
        signature: Option<&str>,
        now: i64,
    ) -> Result<WebhookEvent, BillingError> {
        let secret = self.secret.as_deref().ok_or(BillingError::ConfigMissing)?;
        let header = signature.ok_or(BillingError::SignatureMissing)?;

        // Header shape: t=<unix>,v1=<hex>[,v0=<hex>]
        let mut timestamp: Option<i64> = None;
        let mut v1: Option<&str> = None;
        for part in header.split(',') {
            match part.split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => v1 = Some(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| BillingError::SignatureInvalid("missing timestamp".to_string()))?;
        let v1 =
            v1.ok_or_else(|| BillingError::SignatureInvalid("missing v1 signature".to_string()))?;

        if (now - timestamp).abs() > TIMESTAMP_TOLERANCE_SECS {
            return Err(BillingError::SignatureInvalid(
                "timestamp outside tolerance".to_string(),
            ));
        }

        let key = secret.strip_prefix("whsec_").unwrap_or(secret);
        let mut mac = HmacSha256::new_from_slice(key.as_bytes())
            .map_err(|_| BillingError::SignatureInvalid("invalid secret key".to_string()))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        let computed = hex::encode(mac.finalize().into_bytes());

        if computed != v1 {
            return Err(BillingError::SignatureInvalid(
                "signature mismatch".to_string(),
            ));
        }

        serde_json::from_slice(body).map_err(|e| BillingError::PayloadMalformed(e.to_string()))
    }
}
