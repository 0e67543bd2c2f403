//! Event types emitted by the gateway.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};

/// The closed set of event tags the gateway knows about.
///
/// Listeners and payloads carry event tags as plain strings, so tags outside
/// this set are still accepted and dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize)]
#[derive(AsRefStr, Display, EnumString, IntoStaticStr)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub enum EventType {
    /// A document extraction finished.
    #[serde(rename = "extraction.complete")]
    #[strum(serialize = "extraction.complete")]
    ExtractionComplete,
    /// A document extraction failed.
    #[serde(rename = "extraction.failed")]
    #[strum(serialize = "extraction.failed")]
    ExtractionFailed,
    /// An extraction provider changed health status.
    #[serde(rename = "provider.health_change")]
    #[strum(serialize = "provider.health_change")]
    ProviderHealthChange,
    /// A usage threshold was crossed.
    #[serde(rename = "usage.threshold")]
    #[strum(serialize = "usage.threshold")]
    UsageThreshold,
}

impl EventType {
    /// Every recognized event type, in declaration order.
    pub const ALL: [EventType; 4] = [
        Self::ExtractionComplete,
        Self::ExtractionFailed,
        Self::ProviderHealthChange,
        Self::UsageThreshold,
    ];

    /// Returns the dotted tag for this event.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

impl From<EventType> for String {
    fn from(event: EventType) -> Self {
        event.as_str().to_owned()
    }
}
