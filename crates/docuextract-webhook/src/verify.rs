//! Signature verification for inbound payloads.
//!
//! [`AcceptAllVerifier`] is the default and accepts every payload.
//! [`HmacSha256Verifier`] performs real keyed-hash verification and must be
//! opted into explicitly.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{Error, Result, WebhookPayload};

type HmacSha256 = Hmac<Sha256>;

/// Tracing target for signature verification.
pub const TRACING_TARGET: &str = "docuextract_webhook::verify";

/// Prefix accepted in front of hex signatures.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Decides whether an inbound payload carries a valid signature.
pub trait SignatureVerifier: Send + Sync {
    /// Returns `true` if `signature` is valid for `payload`.
    fn verify(&self, payload: &WebhookPayload, signature: Option<&str>) -> bool;
}

/// Verifier that accepts every payload, signed or not.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllVerifier;

impl SignatureVerifier for AcceptAllVerifier {
    #[inline]
    fn verify(&self, _payload: &WebhookPayload, _signature: Option<&str>) -> bool {
        true
    }
}

/// HMAC-SHA256 verifier.
///
/// The signature is computed over `{timestamp}.{envelope}`, where
/// `timestamp` is the payload timestamp in Unix seconds (or the raw value when
/// it is not an RFC 3339 instant, empty when absent) and `envelope` is the
/// JSON encoding of the payload without its `signature` field. Signatures are
/// lowercase hex, optionally prefixed with `sha256=`.
#[derive(Clone)]
pub struct HmacSha256Verifier {
    secret: Vec<u8>,
}

impl std::fmt::Debug for HmacSha256Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSha256Verifier").finish_non_exhaustive()
    }
}

impl HmacSha256Verifier {
    /// Creates a verifier for the given shared secret.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl SignatureVerifier for HmacSha256Verifier {
    fn verify(&self, payload: &WebhookPayload, signature: Option<&str>) -> bool {
        let Some(signature) = signature else {
            tracing::debug!(target: TRACING_TARGET, "Missing webhook signature");
            return false;
        };

        let encoded = signature
            .strip_prefix(SIGNATURE_PREFIX)
            .unwrap_or(signature);
        let Ok(provided) = hex::decode(encoded) else {
            tracing::debug!(target: TRACING_TARGET, "Failed to decode webhook signature");
            return false;
        };

        let mac = match keyed_mac(&self.secret, payload) {
            Ok(mac) => mac,
            Err(error) => {
                tracing::debug!(target: TRACING_TARGET, error = %error, "Failed to compute webhook signature");
                return false;
            }
        };

        // verify_slice compares in constant time.
        let is_valid = mac.verify_slice(&provided).is_ok();
        if !is_valid {
            tracing::debug!(
                target: TRACING_TARGET,
                event_type = %payload.event_type,
                "Webhook signature verification failed"
            );
        }

        is_valid
    }
}

/// Signs a payload with HMAC-SHA256, returning the lowercase hex digest.
pub fn sign_payload(secret: &[u8], payload: &WebhookPayload) -> Result<String> {
    let mac = keyed_mac(secret, payload)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn keyed_mac(secret: &[u8], payload: &WebhookPayload) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|_| Error::configuration().with_message("Invalid HMAC key"))?;

    mac.update(payload.signing_timestamp().as_bytes());
    mac.update(b".");
    mac.update(&payload.signing_bytes()?);
    Ok(mac)
}
