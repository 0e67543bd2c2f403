//! The webhook envelope exchanged between the gateway and this client.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Creation time of a payload, as it arrived.
///
/// RFC 3339 strings parse into [`Timestamp`]. Anything else is kept verbatim
/// so senders with other clock formats are still dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadTimestamp {
    /// An RFC 3339 instant.
    Instant(Timestamp),
    /// A string in some other format.
    Text(String),
    /// Any other JSON value, e.g. Unix milliseconds.
    Other(serde_json::Value),
}

impl PayloadTimestamp {
    /// Stamps the current instant.
    pub fn now() -> Self {
        Self::Instant(Timestamp::now())
    }

    /// Returns the instant, if the value can be read as one.
    ///
    /// Integers are taken as Unix milliseconds.
    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match self {
            Self::Instant(timestamp) => Some(*timestamp),
            Self::Text(text) => text.parse().ok(),
            Self::Other(value) => value
                .as_i64()
                .and_then(|millis| Timestamp::from_millisecond(millis).ok()),
        }
    }

    /// Prefix of the signing input: Unix seconds when the value is an
    /// instant, the raw value otherwise.
    pub(crate) fn signing_component(&self) -> String {
        match self {
            Self::Instant(timestamp) => timestamp.as_second().to_string(),
            Self::Text(text) => text.clone(),
            Self::Other(value) => value.to_string(),
        }
    }
}

impl From<Timestamp> for PayloadTimestamp {
    fn from(timestamp: Timestamp) -> Self {
        Self::Instant(timestamp)
    }
}

/// The canonical webhook envelope.
///
/// Payloads created with [`WebhookPayload::new`] always carry a `timestamp`
/// and an `id`. Inbound payloads may omit both, and only carry a `signature`
/// when the sender signed them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct WebhookPayload {
    /// The event tag, usually one of [`EventType`](crate::EventType).
    pub event_type: String,

    /// Opaque application data for the event.
    #[serde(default)]
    pub data: serde_json::Value,

    /// Instant the payload was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "schema", schemars(with = "Option<String>"))]
    pub timestamp: Option<PayloadTimestamp>,

    /// Identifier of this payload; a UUID for payloads created here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Signature over the rest of the envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl WebhookPayload {
    /// Creates a fresh payload stamped with the current time and a random id.
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: Some(PayloadTimestamp::now()),
            id: Some(Uuid::new_v4().to_string()),
            signature: None,
        }
    }

    /// Returns the creation instant, if present and readable.
    pub fn created_at(&self) -> Option<Timestamp> {
        self.timestamp.as_ref().and_then(PayloadTimestamp::as_timestamp)
    }

    /// Sets the signature.
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Returns a copy signed with HMAC-SHA256 under `secret`.
    ///
    /// See [`HmacSha256Verifier`](crate::verify::HmacSha256Verifier) for the
    /// signing scheme.
    pub fn sign(self, secret: &str) -> crate::Result<Self> {
        let signature = crate::verify::sign_payload(secret.as_bytes(), &self)?;
        Ok(self.with_signature(format!("sha256={signature}")))
    }

    /// Timestamp part of the signing input; empty without a timestamp.
    pub(crate) fn signing_timestamp(&self) -> String {
        self.timestamp
            .as_ref()
            .map(PayloadTimestamp::signing_component)
            .unwrap_or_default()
    }

    /// Bytes covered by the signature: the envelope without its signature.
    pub(crate) fn signing_bytes(&self) -> crate::Result<Vec<u8>> {
        let unsigned = Unsigned {
            event_type: &self.event_type,
            data: &self.data,
            timestamp: self.timestamp.as_ref(),
            id: self.id.as_deref(),
        };

        Ok(serde_json::to_vec(&unsigned)?)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Unsigned<'a> {
    event_type: &'a str,
    data: &'a serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<&'a PayloadTimestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
}
