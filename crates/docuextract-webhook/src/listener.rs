//! Listener capability and the per-client listener registry.

use std::collections::HashMap;
use std::future::Future;

use crate::BoxedError;

/// Result returned by a listener invocation.
pub type ListenerResult = std::result::Result<(), BoxedError>;

/// A unit of caller-supplied logic run when a subscribed event arrives.
///
/// Any `Fn(serde_json::Value) -> impl Future<Output = ListenerResult>`
/// closure is a listener.
///
/// # Example
///
/// ```rust,ignore
/// client.on(EventType::ExtractionComplete, |data: serde_json::Value| async move {
///     store.save(&data).await?;
///     Ok::<_, BoxedError>(())
/// });
/// ```
#[async_trait::async_trait]
pub trait WebhookListener: Send + Sync {
    /// Handles the `data` field of a dispatched payload.
    async fn call(&self, data: serde_json::Value) -> ListenerResult;
}

#[async_trait::async_trait]
impl<F, Fut> WebhookListener for F
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ListenerResult> + Send + 'static,
{
    async fn call(&self, data: serde_json::Value) -> ListenerResult {
        (self)(data).await
    }
}

/// Ordered mapping from event tag to listeners.
///
/// Listeners run in insertion order. The same listener may be registered
/// more than once and then runs once per registration.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: HashMap<String, Vec<Box<dyn WebhookListener>>>,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (event_type, listeners) in &self.listeners {
            map.entry(event_type, &listeners.len());
        }
        map.finish()
    }
}

impl ListenerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener under `event_type`.
    pub fn insert<L>(&mut self, event_type: impl Into<String>, listener: L)
    where
        L: WebhookListener + 'static,
    {
        self.listeners
            .entry(event_type.into())
            .or_default()
            .push(Box::new(listener));
    }

    /// Returns the listeners registered for `event_type`, in order.
    pub fn get(&self, event_type: &str) -> &[Box<dyn WebhookListener>] {
        self.listeners
            .get(event_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of listeners registered for `event_type`.
    #[inline]
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.get(event_type).len()
    }

    /// Number of event tags with at least one listener.
    #[inline]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns `true` if nothing has been registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
