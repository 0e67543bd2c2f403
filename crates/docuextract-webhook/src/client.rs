//! Webhook client: gateway registration, subscriptions and dispatch.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use url::Url;

use crate::gateway::GatewayClient;
use crate::listener::{ListenerRegistry, WebhookListener};
use crate::verify::{AcceptAllVerifier, HmacSha256Verifier, SignatureVerifier};
use crate::{ClientConfig, Error, ErrorKind, EventType, Result, WebhookPayload};

/// Tracing target for client operations.
pub const TRACING_TARGET: &str = "docuextract_webhook::client";

/// Outcome of dispatching one payload to its listeners.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Event tag that was dispatched.
    pub event_type: String,
    /// Number of listeners invoked.
    pub invoked: usize,
    /// Failures raised by individual listeners, in invocation order.
    pub failures: Vec<Error>,
}

impl DispatchReport {
    /// Returns `true` if every invoked listener succeeded.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Client for receiving and dispatching gateway webhooks.
///
/// When a webhook URL is configured, construction spawns a detached task that
/// registers the URL with the gateway. The outcome of that task is only
/// reported through logging.
///
/// # Examples
///
/// ```rust,ignore
/// use docuextract_webhook::{BoxedError, ClientConfig, EventType, WebhookClient};
///
/// let config = ClientConfig::default()
///     .with_webhook_url(Url::parse("https://hooks.example.com/docuextract")?);
/// let mut client = WebhookClient::new(config)?;
///
/// client.on(EventType::ExtractionComplete, |data: serde_json::Value| async move {
///     println!("extraction finished: {data}");
///     Ok::<_, BoxedError>(())
/// });
///
/// client.handle_webhook(&payload).await?;
/// ```
pub struct WebhookClient {
    config: ClientConfig,
    gateway: GatewayClient,
    listeners: ListenerRegistry,
    verifier: Box<dyn SignatureVerifier>,
    registration: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for WebhookClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookClient")
            .field("config", &self.config)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

impl WebhookClient {
    /// Creates a client and, if a webhook URL is configured, starts
    /// registering it with the gateway in the background.
    ///
    /// Background registration needs a running tokio runtime. Without one it
    /// is skipped and [`register_gateway_webhook`] can be called later.
    ///
    /// [`register_gateway_webhook`]: Self::register_gateway_webhook
    pub fn new(config: ClientConfig) -> Result<Self> {
        let gateway = GatewayClient::new(&config)?;

        let mut client = Self {
            config,
            gateway,
            listeners: ListenerRegistry::new(),
            verifier: Box::new(AcceptAllVerifier),
            registration: None,
        };

        client.registration = client.spawn_registration();

        tracing::debug!(
            target: TRACING_TARGET,
            gateway_url = %client.config.gateway_url,
            has_webhook_url = client.config.webhook_url.is_some(),
            has_secret = client.config.secret.is_some(),
            "Webhook client created"
        );

        Ok(client)
    }

    /// Replaces the signature verifier.
    ///
    /// The verifier only runs when a secret is configured.
    #[must_use]
    pub fn with_verifier(mut self, verifier: impl SignatureVerifier + 'static) -> Self {
        self.verifier = Box::new(verifier);
        self
    }

    /// Verifies inbound signatures with HMAC-SHA256 under the configured
    /// secret instead of accepting every payload.
    #[must_use]
    pub fn with_hmac_verification(self) -> Self {
        match self.config.secret.clone() {
            Some(secret) => self.with_verifier(HmacSha256Verifier::new(secret)),
            None => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    "HMAC verification requested without a secret, signatures stay unchecked"
                );
                self
            }
        }
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the gateway client.
    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    /// Returns the listener registry.
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Takes the handle of the background registration task, if one was
    /// spawned.
    pub fn take_registration(&mut self) -> Option<JoinHandle<()>> {
        self.registration.take()
    }

    fn spawn_registration(&self) -> Option<JoinHandle<()>> {
        let webhook_url = self.config.webhook_url.clone()?;

        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(
                target: TRACING_TARGET,
                webhook_url = %webhook_url,
                "No async runtime available, skipping webhook registration"
            );
            return None;
        };

        let gateway = self.gateway.clone();
        Some(runtime.spawn(async move {
            register_with(&gateway, &webhook_url).await;
        }))
    }

    /// Registers the configured webhook URL with the gateway for every
    /// [`EventType`].
    ///
    /// Failures are logged and swallowed; there is no retry.
    pub async fn register_gateway_webhook(&self) {
        match &self.config.webhook_url {
            Some(webhook_url) => register_with(&self.gateway, webhook_url).await,
            None => tracing::debug!(
                target: TRACING_TARGET,
                "No webhook URL configured, skipping registration"
            ),
        }
    }

    /// Subscribes `listener` to `event_type`.
    ///
    /// Any tag is accepted. Listeners run in the order they were added.
    pub fn on<L>(&mut self, event_type: impl Into<String>, listener: L)
    where
        L: WebhookListener + 'static,
    {
        self.listeners.insert(event_type, listener);
    }

    /// Dispatches an inbound payload to its listeners.
    ///
    /// With a secret configured the signature is verified first, and a
    /// failed check returns an [`ErrorKind::InvalidSignature`] error before
    /// any listener runs. Listeners run one after another; a failing or
    /// panicking listener is logged and does not stop the rest.
    pub async fn handle_webhook(&self, payload: &WebhookPayload) -> Result<DispatchReport> {
        let event_type = payload.event_type.as_str();

        if self.config.secret.is_some()
            && !self.verify_signature(payload, payload.signature.as_deref())
        {
            tracing::warn!(
                target: TRACING_TARGET,
                event_type,
                "Rejected webhook with invalid signature"
            );
            return Err(Error::invalid_signature().with_context(event_type.to_owned()));
        }

        let listeners = self.listeners.get(event_type);
        let mut report = DispatchReport {
            event_type: event_type.to_owned(),
            ..DispatchReport::default()
        };

        tracing::debug!(
            target: TRACING_TARGET,
            event_type,
            listeners = listeners.len(),
            "Dispatching webhook"
        );

        for (index, listener) in listeners.iter().enumerate() {
            let outcome = AssertUnwindSafe(listener.call(payload.data.clone()))
                .catch_unwind()
                .await;
            report.invoked += 1;

            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(source)) => Error::new(ErrorKind::ListenerFailure)
                    .with_message(source.to_string())
                    .with_source(source),
                Err(panic) => Error::new(ErrorKind::ListenerFailure)
                    .with_message(format!("listener panicked: {}", panic_message(&*panic))),
            };

            tracing::error!(
                target: TRACING_TARGET,
                event_type,
                listener = index,
                error = %failure,
                "Webhook handler error"
            );

            report
                .failures
                .push(failure.with_context(event_type.to_owned()));
        }

        Ok(report)
    }

    /// Parses a raw JSON body and dispatches it with [`handle_webhook`].
    ///
    /// [`handle_webhook`]: Self::handle_webhook
    pub async fn handle_webhook_json(&self, body: &[u8]) -> Result<DispatchReport> {
        let payload: WebhookPayload = serde_json::from_slice(body)?;
        self.handle_webhook(&payload).await
    }

    /// Checks the signature of an inbound payload.
    ///
    /// Accepts everything unless a real verifier was installed with
    /// [`with_verifier`](Self::with_verifier) or
    /// [`with_hmac_verification`](Self::with_hmac_verification).
    pub fn verify_signature(&self, payload: &WebhookPayload, signature: Option<&str>) -> bool {
        self.verifier.verify(payload, signature)
    }

    /// Builds a fresh payload with the current timestamp and a random id.
    pub fn create_payload(event_type: impl Into<String>, data: serde_json::Value) -> WebhookPayload {
        WebhookPayload::new(event_type, data)
    }
}

async fn register_with(gateway: &GatewayClient, webhook_url: &Url) {
    match gateway.register(webhook_url, &EventType::ALL).await {
        Ok(()) => tracing::info!(
            target: TRACING_TARGET,
            webhook_url = %webhook_url,
            "Webhook registered successfully"
        ),
        Err(error) => tracing::warn!(
            target: TRACING_TARGET,
            webhook_url = %webhook_url,
            error = %error,
            "Failed to register webhook"
        ),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;
    use serde_json::{Value, json};

    use super::*;
    use crate::BoxedError;

    type Calls = Arc<Mutex<Vec<(&'static str, Value)>>>;

    fn recorder(calls: &Calls, name: &'static str) -> impl WebhookListener + use<> {
        let calls = Arc::clone(calls);
        move |data: Value| {
            let calls = Arc::clone(&calls);
            async move {
                calls.lock().unwrap().push((name, data));
                Ok::<_, BoxedError>(())
            }
        }
    }

    /// Starts a fake gateway that answers registration with `status` and
    /// records every request body it receives.
    async fn fake_gateway(status: StatusCode) -> anyhow::Result<(Url, Arc<Mutex<Vec<Value>>>)> {
        let received = Arc::new(Mutex::new(Vec::new()));
        let handler = {
            let received = Arc::clone(&received);
            move |axum::Json(body): axum::Json<Value>| {
                let received = Arc::clone(&received);
                async move {
                    received.lock().unwrap().push(body);
                    status
                }
            }
        };

        let router = Router::new().route(crate::gateway::REGISTER_PATH, post(handler));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move { axum::serve(listener, router).await });

        Ok((Url::parse(&format!("http://{addr}"))?, received))
    }

    fn webhook_url() -> Url {
        Url::parse("https://hooks.example.com/docuextract").unwrap()
    }

    #[tokio::test]
    async fn test_listeners_run_in_order_with_same_data() -> anyhow::Result<()> {
        let mut client = WebhookClient::new(ClientConfig::default())?;
        let calls = Calls::default();

        client.on(EventType::ExtractionComplete, recorder(&calls, "first"));
        client.on(EventType::ExtractionComplete, recorder(&calls, "second"));

        let payload = WebhookClient::create_payload(
            EventType::ExtractionComplete,
            json!({"documentId": "doc_1"}),
        );
        let report = client.handle_webhook(&payload).await?;

        assert_eq!(report.invoked, 2);
        assert!(report.is_success());
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                ("first", json!({"documentId": "doc_1"})),
                ("second", json!({"documentId": "doc_1"})),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_registration_runs_twice() -> anyhow::Result<()> {
        let mut client = WebhookClient::new(ClientConfig::default())?;
        let calls = Calls::default();
        let listener = Arc::new(recorder(&calls, "dup"));

        for _ in 0..2 {
            let listener = Arc::clone(&listener);
            client.on("usage.threshold", move |data: Value| {
                let listener = Arc::clone(&listener);
                async move { listener.call(data).await }
            });
        }

        let payload = WebhookClient::create_payload(EventType::UsageThreshold, json!(42));
        client.handle_webhook(&payload).await?;

        assert_eq!(calls.lock().unwrap().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_no_secret_ignores_signature() -> anyhow::Result<()> {
        let mut client = WebhookClient::new(ClientConfig::default())?.with_hmac_verification();
        let calls = Calls::default();
        client.on("extraction.failed", recorder(&calls, "only"));

        let unsigned = WebhookClient::create_payload("extraction.failed", json!({}));
        let bogus = unsigned.clone().with_signature("not-a-signature");

        client.handle_webhook(&unsigned).await?;
        client.handle_webhook(&bogus).await?;

        assert_eq!(calls.lock().unwrap().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_secret_with_default_verifier_accepts_everything() -> anyhow::Result<()> {
        let config = ClientConfig::default().with_secret("whsec_test");
        let mut client = WebhookClient::new(config)?;
        let calls = Calls::default();
        client.on("extraction.complete", recorder(&calls, "only"));

        let payload = WebhookClient::create_payload("extraction.complete", json!({"foo": 1}))
            .with_signature("anything");
        assert!(client.verify_signature(&payload, None));

        let report = client.handle_webhook(&payload).await?;
        assert_eq!(report.invoked, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_hmac_verification_rejects_before_listeners() -> anyhow::Result<()> {
        let config = ClientConfig::default().with_secret("whsec_test");
        let mut client = WebhookClient::new(config)?.with_hmac_verification();
        let calls = Calls::default();
        client.on("extraction.complete", recorder(&calls, "only"));

        let payload = WebhookClient::create_payload("extraction.complete", json!({"foo": 1}));

        let error = client.handle_webhook(&payload).await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::InvalidSignature);

        let forged = payload.clone().sign("whsec_other")?;
        let error = client.handle_webhook(&forged).await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::InvalidSignature);
        assert!(calls.lock().unwrap().is_empty());

        let signed = payload.sign("whsec_test")?;
        let report = client.handle_webhook(&signed).await?;
        assert_eq!(report.invoked, 1);
        assert_eq!(calls.lock().unwrap().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_stop_dispatch() -> anyhow::Result<()> {
        let mut client = WebhookClient::new(ClientConfig::default())?;
        let calls = Calls::default();

        client.on("extraction.complete", |_data: Value| async move {
            Err::<(), BoxedError>("storage unavailable".into())
        });
        client.on("extraction.complete", |data: Value| async move {
            assert!(data.is_null(), "listener exploded");
            Ok::<_, BoxedError>(())
        });
        client.on("extraction.complete", recorder(&calls, "last"));

        let payload = WebhookClient::create_payload("extraction.complete", json!({"foo": 1}));
        let report = client.handle_webhook(&payload).await?;

        assert_eq!(report.invoked, 3);
        assert_eq!(report.failures.len(), 2);
        assert!(
            report
                .failures
                .iter()
                .all(|failure| failure.kind == ErrorKind::ListenerFailure)
        );
        assert_eq!(
            report.failures[1]
                .message
                .as_deref()
                .map(|m| m.contains("listener exploded")),
            Some(true)
        );
        assert_eq!(*calls.lock().unwrap(), vec![("last", json!({"foo": 1}))]);
        Ok(())
    }

    #[tokio::test]
    async fn test_unsubscribed_event_is_noop() -> anyhow::Result<()> {
        let mut client = WebhookClient::new(ClientConfig::default())?;
        let calls = Calls::default();
        client.on("extraction.complete", recorder(&calls, "other"));

        let payload = WebhookClient::create_payload("provider.health_change", json!({}));
        let report = client.handle_webhook(&payload).await?;

        assert_eq!(report.event_type, "provider.health_change");
        assert_eq!(report.invoked, 0);
        assert!(calls.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_handle_webhook_json() -> anyhow::Result<()> {
        let mut client = WebhookClient::new(ClientConfig::default())?;
        let calls = Calls::default();
        client.on("extraction.failed", recorder(&calls, "json"));

        let body = br#"{
            "eventType": "extraction.failed",
            "data": {"reason": "unsupported format"},
            "timestamp": "2024-05-01T12:00:00Z"
        }"#;
        let report = client.handle_webhook_json(body).await?;
        assert_eq!(report.invoked, 1);
        assert_eq!(
            calls.lock().unwrap()[0].1,
            json!({"reason": "unsupported format"})
        );

        let error = client.handle_webhook_json(b"not json").await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::Serialization);
        Ok(())
    }

    #[tokio::test]
    async fn test_handle_webhook_json_accepts_loose_envelopes() -> anyhow::Result<()> {
        let mut client = WebhookClient::new(ClientConfig::default())?;
        let calls = Calls::default();
        client.on("extraction.complete", recorder(&calls, "loose"));

        let bodies: [&[u8]; 4] = [
            br#"{"eventType": "extraction.complete", "data": {"foo": 1}}"#,
            br#"{"eventType": "extraction.complete", "data": {"foo": 1}, "timestamp": "2024-05-01 12:00:00"}"#,
            br#"{"eventType": "extraction.complete", "data": {"foo": 1}, "timestamp": 1714564800000}"#,
            br#"{"eventType": "extraction.complete", "data": {"foo": 1}, "timestamp": "2024-05-01T12:00:00Z", "id": "evt_123"}"#,
        ];
        for body in bodies {
            let report = client.handle_webhook_json(body).await?;
            assert_eq!(report.invoked, 1);
            assert!(report.is_success());
        }

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        assert!(calls.iter().all(|(_, data)| *data == json!({"foo": 1})));
        Ok(())
    }

    #[tokio::test]
    async fn test_hmac_verification_signs_timestamp_as_received() -> anyhow::Result<()> {
        let config = ClientConfig::default().with_secret("test_secret");
        let mut client = WebhookClient::new(config)?.with_hmac_verification();
        let calls = Calls::default();
        client.on("extraction.complete", recorder(&calls, "signed"));

        let body = br#"{"eventType": "extraction.complete", "data": {"foo": 1}, "timestamp": "2024-05-01 12:00:00", "id": "evt_123"}"#;
        let payload: WebhookPayload = serde_json::from_slice(body)?;
        let signed = serde_json::to_vec(&payload.sign("test_secret")?)?;

        let report = client.handle_webhook_json(&signed).await?;
        assert_eq!(report.invoked, 1);
        Ok(())
    }

    #[test]
    fn test_create_payload() {
        let first = WebhookClient::create_payload("extraction.complete", json!({"foo": 1}));
        let second = WebhookClient::create_payload("extraction.complete", json!({"foo": 1}));

        assert_eq!(first.event_type, "extraction.complete");
        assert_eq!(first.data, json!({"foo": 1}));
        assert!(first.signature.is_none());

        let timestamp = serde_json::to_value(&first.timestamp).unwrap();
        let timestamp = timestamp.as_str().unwrap();
        assert!(timestamp.parse::<jiff::Timestamp>().is_ok());
        assert!(first.created_at().is_some());

        assert!(first.id.is_some());
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_registration_posts_url_and_events() -> anyhow::Result<()> {
        let (gateway_url, received) = fake_gateway(StatusCode::OK).await?;
        let config = ClientConfig::new(gateway_url).with_webhook_url(webhook_url());

        let mut client = WebhookClient::new(config)?;
        client
            .take_registration()
            .expect("registration task spawned")
            .await?;

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["url"], "https://hooks.example.com/docuextract");
        assert_eq!(
            received[0]["events"],
            json!([
                "extraction.complete",
                "extraction.failed",
                "provider.health_change",
                "usage.threshold"
            ])
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_no_webhook_url_skips_registration() -> anyhow::Result<()> {
        let (gateway_url, received) = fake_gateway(StatusCode::OK).await?;

        let mut client = WebhookClient::new(ClientConfig::new(gateway_url))?;
        assert!(client.take_registration().is_none());

        client.register_gateway_webhook().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(received.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_registration_failure_is_not_fatal() -> anyhow::Result<()> {
        let (gateway_url, received) = fake_gateway(StatusCode::INTERNAL_SERVER_ERROR).await?;
        let config = ClientConfig::new(gateway_url).with_webhook_url(webhook_url());

        let mut client = WebhookClient::new(config)?;
        client
            .take_registration()
            .expect("registration task spawned")
            .await?;
        assert_eq!(received.lock().unwrap().len(), 1);

        // The client stays usable after a failed registration.
        let calls = Calls::default();
        client.on("extraction.complete", recorder(&calls, "after"));
        let payload = WebhookClient::create_payload("extraction.complete", json!(null));
        client.handle_webhook(&payload).await?;
        assert_eq!(calls.lock().unwrap().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_not_fatal() -> anyhow::Result<()> {
        let config = ClientConfig::new(Url::parse("http://127.0.0.1:1")?)
            .with_webhook_url(webhook_url())
            .with_timeout(2);

        let mut client = WebhookClient::new(config)?;
        client
            .take_registration()
            .expect("registration task spawned")
            .await?;

        client.register_gateway_webhook().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_gateway_register_reports_status() -> anyhow::Result<()> {
        let (gateway_url, _received) = fake_gateway(StatusCode::BAD_REQUEST).await?;
        let gateway = GatewayClient::new(&ClientConfig::new(gateway_url))?;

        let error = gateway
            .register(&webhook_url(), &EventType::ALL)
            .await
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::ExternalError);
        Ok(())
    }

    #[test]
    fn test_new_without_runtime_skips_registration() {
        let config = ClientConfig::default().with_webhook_url(webhook_url());
        let mut client = WebhookClient::new(config).unwrap();
        assert!(client.take_registration().is_none());
    }
}
