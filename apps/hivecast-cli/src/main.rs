//! Hivecast CLI Binary
//!
//! Publish to and subscribe from a pub/sub relay network.
//!
//! # Usage
//!
//! ```bash
//! hivecast subscribe
//! hivecast publish <topic> <message>
//! hivecast usage
//! ```
//!
//! # Environment Variables
//!
//! ## Optional
//! - `HIVECAST_TRANSPORT`: "websocket" | "grpc" (default: websocket)
//! - `HIVECAST_WEBSOCKET_URL`: WebSocket relay endpoint
//! - `HIVECAST_GRPC_URL`: gRPC relay endpoint
//! - `HIVECAST_TOPICS`: Comma-separated topics for subscribe
//! - `HIVECAST_TOKEN`: Bearer token presented to the relay
//! - `HIVECAST_CLAIMS_PATH`: Path to the decoded claims JSON document
//! - `HIVECAST_STATE_DIR`: Local state directory (default: ~/.hivecast)
//! - `HIVECAST_PERSIST_PATH`: File to append received messages to
//! - `HIVECAST_WEBHOOK_URL`: Forward received messages to this endpoint
//! - `HIVECAST_WEBHOOK_TEMPLATE`: "generic" | "discord" | "slack" | inline body
//! - `HIVECAST_WEBHOOK_QUEUE_CAPACITY`: Webhook queue size (default: 100)
//! - `HIVECAST_WEBHOOK_TIMEOUT_SECS`: Webhook request timeout (default: 3)
//! - `HIVECAST_DELIVERY_CAPACITY`: Sink fan-out channel size (default: 1024)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use hivecast_cli::infrastructure::{telemetry, transport};
use hivecast_cli::{
    ClientConfig, ConsoleSink, DeliveryHub, FileSink, JsonUsageStore, MessageTransport,
    PayloadTemplate, Publisher, RateLimiter, SubscribeSession, SystemClock, TokenClaims,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

const USAGE: &str = "usage: hivecast <subscribe | publish <topic> <message> | usage>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    #[allow(clippy::expect_used)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();
    telemetry::init();

    let config = ClientConfig::from_env()?;
    let claims = load_claims(&config)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("subscribe") => run_subscribe(config, &claims).await,
        Some("publish") => {
            let (topic, message) = match (args.get(1), args.get(2)) {
                (Some(topic), Some(message)) => (topic.clone(), message.clone()),
                _ => anyhow::bail!("usage: hivecast publish <topic> <message>"),
            };
            run_publish(&config, &claims, &topic, &message).await
        }
        Some("usage") => run_usage(&config, &claims),
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
}

/// Run a streaming subscription until interrupted or the stream ends.
async fn run_subscribe(config: ClientConfig, claims: &TokenClaims) -> anyhow::Result<()> {
    anyhow::ensure!(
        !config.topics.is_empty(),
        "no topics configured; set HIVECAST_TOPICS"
    );

    let limiter = build_limiter(&config, claims)?;
    if let Err(e) = limiter.record_subscribe() {
        tracing::warn!(error = %e, "failed to record subscribe start");
    }

    let hub = DeliveryHub::new(config.delivery.channel_capacity);
    let mut sink_handles = vec![hub.spawn_sink(Box::new(ConsoleSink::new()))];

    if let Some(path) = &config.delivery.persist_path {
        let sink = FileSink::open(path)
            .await
            .with_context(|| format!("failed to open persistence file {}", path.display()))?;
        sink_handles.push(hub.spawn_sink(Box::new(sink)));
        tracing::info!(path = %path.display(), "file persistence enabled");
    }

    let mut dispatcher_handle = None;
    if let Some(url) = config.webhook.url.clone() {
        let template =
            PayloadTemplate::from_config(config.webhook.template.as_deref(), client_id(claims))?;
        let (sink, dispatcher) = hivecast_cli::infrastructure::sinks::pipeline(
            url,
            template,
            config.webhook.queue_capacity,
            config.webhook.request_timeout,
        )?;
        sink_handles.push(hub.spawn_sink(Box::new(sink)));
        dispatcher_handle = Some(tokio::spawn(dispatcher.run()));
        tracing::info!("webhook forwarding enabled");
    }

    let transport = transport::build(&config, client_id(claims));
    let interrupt = CancellationToken::new();
    tokio::spawn(await_interrupt(interrupt.clone()));

    tracing::info!(
        topics = ?config.topics,
        transport = config.relay.transport.as_str(),
        "starting subscription"
    );
    let session = SubscribeSession::new(transport, hub.into_sender());
    let outcome = session.run(interrupt).await?;

    for handle in sink_handles {
        match handle.await {
            Ok(report) => tracing::info!(
                sink = report.name,
                delivered = report.delivered,
                failed = report.failed,
                "sink finished"
            ),
            Err(e) => tracing::warn!(error = %e, "sink task panicked"),
        }
    }
    if let Some(handle) = dispatcher_handle {
        match handle.await {
            Ok(report) => tracing::info!(
                succeeded = report.succeeded,
                failed = report.failed,
                "webhook dispatcher finished"
            ),
            Err(e) => tracing::warn!(error = %e, "webhook dispatcher panicked"),
        }
    }

    tracing::info!(
        reason = ?outcome.reason,
        frames = outcome.frames_delivered,
        "subscription ended"
    );
    Ok(())
}

/// Publish one message, subject to the client-side rate limits.
async fn run_publish(
    config: &ClientConfig,
    claims: &TokenClaims,
    topic: &str,
    message: &str,
) -> anyhow::Result<()> {
    let limiter = build_limiter(config, claims)?;

    let mut transport = transport::build(config, client_id(claims));
    transport.connect().await?;

    let mut publisher = Publisher::new(transport, limiter);
    let outcome = publisher.publish(topic, message.as_bytes()).await?;
    println!("{}", outcome.message_id);

    let mut transport = publisher.into_transport();
    if let Err(e) = transport.close().await {
        tracing::warn!(error = %e, "transport close failed");
    }
    Ok(())
}

/// Print current usage against the active limits as JSON.
fn run_usage(config: &ClientConfig, claims: &TokenClaims) -> anyhow::Result<()> {
    let limiter = build_limiter(config, claims)?;
    let stats = limiter.usage_stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn build_limiter(config: &ClientConfig, claims: &TokenClaims) -> anyhow::Result<Arc<RateLimiter>> {
    let store = JsonUsageStore::open(&config.state_dir, claims.identity())
        .context("failed to open usage store")?;
    Ok(Arc::new(RateLimiter::new(
        claims,
        Box::new(store),
        Arc::new(SystemClock),
    )))
}

/// Load claims from the configured document, or fall back to an active
/// account with default limits.
fn load_claims(config: &ClientConfig) -> anyhow::Result<TokenClaims> {
    match &config.claims_path {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("failed to read claims document {}", path.display()))?;
            let claims: TokenClaims = serde_json::from_slice(&bytes)
                .with_context(|| format!("invalid claims document {}", path.display()))?;
            Ok(claims)
        }
        None => Ok(TokenClaims {
            is_active: true,
            ..TokenClaims::default()
        }),
    }
}

fn client_id(claims: &TokenClaims) -> &str {
    if claims.client_id.is_empty() {
        claims.identity()
    } else {
        &claims.client_id
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for an interrupt signal (SIGTERM or SIGINT) and cancel the session.
#[allow(clippy::expect_used)]
async fn await_interrupt(interrupt: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    interrupt.cancel();
}
