//! Command implementations.

use std::path::Path;

use anyhow::{Context, bail};
use docuextract_webhook::gateway::GatewayClient;
use docuextract_webhook::{
    BoxedError, ClientConfig, DispatchReport, EventType, WebhookClient, WebhookPayload,
};
use tokio::io::AsyncReadExt;

use crate::TRACING_TARGET_COMMAND;
use crate::config::Command;

/// Runs the selected command.
pub async fn run(config: ClientConfig, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Register => register(&config).await,
        Command::Payload {
            event_type,
            data,
            sign,
        } => payload(&config, event_type, data, sign),
        Command::Dispatch { input, verify_hmac } => dispatch(config, &input, verify_hmac).await,
    }
}

/// Registers the webhook URL, failing loudly instead of only logging.
async fn register(config: &ClientConfig) -> anyhow::Result<()> {
    let Some(webhook_url) = config.webhook_url.as_ref() else {
        bail!("--webhook-url is required to register with the gateway");
    };

    let gateway = GatewayClient::new(config).context("failed to create gateway client")?;
    gateway
        .register(webhook_url, &EventType::ALL)
        .await
        .context("gateway registration failed")?;

    tracing::info!(
        target: TRACING_TARGET_COMMAND,
        endpoint = %gateway.register_endpoint(),
        webhook_url = %webhook_url,
        "Webhook registered"
    );
    Ok(())
}

fn payload(
    config: &ClientConfig,
    event_type: String,
    data: serde_json::Value,
    sign: bool,
) -> anyhow::Result<()> {
    let payload = build_payload(config, event_type, data, sign)?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn build_payload(
    config: &ClientConfig,
    event_type: String,
    data: serde_json::Value,
    sign: bool,
) -> anyhow::Result<WebhookPayload> {
    let payload = WebhookClient::create_payload(event_type, data);
    if !sign {
        return Ok(payload);
    }

    let Some(secret) = config.secret.as_deref() else {
        bail!("--webhook-secret is required to sign payloads");
    };
    payload.sign(secret).context("failed to sign payload")
}

async fn dispatch(config: ClientConfig, input: &Path, verify_hmac: bool) -> anyhow::Result<()> {
    let body = read_input(input).await?;
    let report = dispatch_body(config, &body, verify_hmac).await?;

    tracing::info!(
        target: TRACING_TARGET_COMMAND,
        event_type = %report.event_type,
        invoked = report.invoked,
        failed = report.failures.len(),
        "Dispatch finished"
    );
    Ok(())
}

async fn dispatch_body(
    config: ClientConfig,
    body: &[u8],
    verify_hmac: bool,
) -> anyhow::Result<DispatchReport> {
    // Dispatching never registers with the gateway.
    let config = ClientConfig {
        webhook_url: None,
        ..config
    };

    let mut client = WebhookClient::new(config).context("failed to create webhook client")?;
    if verify_hmac {
        client = client.with_hmac_verification();
    }

    for event_type in EventType::ALL {
        client.on(event_type, move |data: serde_json::Value| async move {
            tracing::info!(
                target: TRACING_TARGET_COMMAND,
                event_type = %event_type,
                data = %data,
                "Received webhook"
            );
            Ok::<_, BoxedError>(())
        });
    }

    let payload: WebhookPayload =
        serde_json::from_slice(body).context("input is not a webhook payload")?;
    if payload.event_type.parse::<EventType>().is_err() {
        tracing::warn!(
            target: TRACING_TARGET_COMMAND,
            event_type = %payload.event_type,
            "Unknown event type, no listener will run"
        );
    }

    let report = client.handle_webhook(&payload).await?;
    Ok(report)
}

async fn read_input(input: &Path) -> anyhow::Result<Vec<u8>> {
    if input == Path::new("-") {
        let mut body = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut body)
            .await
            .context("failed to read stdin")?;
        return Ok(body);
    }

    tokio::fs::read(input)
        .await
        .with_context(|| format!("failed to read {}", input.display()))
}
