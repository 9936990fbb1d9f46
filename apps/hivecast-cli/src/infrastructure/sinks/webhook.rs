//! Webhook Forwarding
//!
//! Two halves connected by a bounded queue:
//!
//! - [`WebhookSink`] runs inside the delivery fan-out. It renders the
//!   payload template and enqueues a job without ever blocking; when the
//!   queue is full the newest message is dropped and counted.
//! - [`WebhookDispatcher`] drains the queue and posts each job to the
//!   configured endpoint with a per-request timeout. Deliveries are
//!   fire-and-forget: one attempt, failures logged, never retried.
//!
//! The dispatcher finishes once the sink half is dropped and the queue is
//! drained, so shutdown naturally flushes queued jobs.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use super::template::PayloadTemplate;
use crate::application::ports::{DeliverySink, SinkError};
use crate::domain::message::InboundMessage;

/// One rendered payload awaiting HTTP delivery.
#[derive(Debug, Clone)]
pub struct WebhookJob {
    /// Rendered request body.
    pub body: String,
    /// Topic of the originating message.
    pub topic: String,
    /// Message identifier of the originating message.
    pub message_id: String,
    /// When the job entered the queue.
    pub enqueued_at: DateTime<Utc>,
}

/// Build a connected sink/dispatcher pair for `url`.
///
/// # Errors
///
/// Returns the `reqwest` error if the HTTP client cannot be constructed.
pub fn pipeline(
    url: String,
    template: PayloadTemplate,
    queue_capacity: usize,
    request_timeout: Duration,
) -> Result<(WebhookSink, WebhookDispatcher), reqwest::Error> {
    let client = reqwest::Client::builder()
        .timeout(request_timeout)
        .build()?;
    let (tx, rx) = mpsc::channel(queue_capacity);
    Ok((
        WebhookSink {
            tx,
            template,
            dropped: 0,
        },
        WebhookDispatcher { rx, client, url },
    ))
}

/// Delivery-pipeline half: renders and enqueues, never blocks.
pub struct WebhookSink {
    tx: mpsc::Sender<WebhookJob>,
    template: PayloadTemplate,
    dropped: u64,
}

impl WebhookSink {
    /// Messages dropped so far because the queue was full.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[async_trait]
impl DeliverySink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&mut self, message: &InboundMessage) -> Result<(), SinkError> {
        let body = self
            .template
            .render(message)
            .map_err(|e| SinkError::Render(e.to_string()))?;

        let job = WebhookJob {
            body,
            topic: message.topic.clone(),
            message_id: message.message_id.clone(),
            enqueued_at: Utc::now(),
        };

        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(job)) => {
                self.dropped += 1;
                tracing::warn!(
                    message_id = %job.message_id,
                    dropped_total = self.dropped,
                    "webhook queue full, dropping message"
                );
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SinkError::DispatcherStopped),
        }
    }
}

/// Delivery totals for a finished dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherReport {
    /// Requests that got a 2xx response.
    pub succeeded: u64,
    /// Requests that failed or got a non-2xx response.
    pub failed: u64,
}

/// HTTP half: drains the queue and posts each job.
pub struct WebhookDispatcher {
    rx: mpsc::Receiver<WebhookJob>,
    client: reqwest::Client,
    url: String,
}

impl WebhookDispatcher {
    /// Run until the sink half is dropped and the queue is drained.
    ///
    /// Each dequeued job gets its own delivery task so a slow endpoint does
    /// not serialize the queue.
    pub async fn run(mut self) -> DispatcherReport {
        let tracker = TaskTracker::new();
        let succeeded = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicU64::new(0));

        while let Some(job) = self.rx.recv().await {
            let client = self.client.clone();
            let url = self.url.clone();
            let succeeded = Arc::clone(&succeeded);
            let failed = Arc::clone(&failed);
            tracker.spawn(async move {
                if deliver_job(&client, &url, job).await {
                    succeeded.fetch_add(1, Ordering::Relaxed);
                } else {
                    failed.fetch_add(1, Ordering::Relaxed);
                }
            });
        }

        tracker.close();
        tracker.wait().await;
        DispatcherReport {
            succeeded: succeeded.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
        }
    }
}

async fn deliver_job(client: &reqwest::Client, url: &str, job: WebhookJob) -> bool {
    let result = client
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .body(job.body)
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => {
            tracing::debug!(message_id = %job.message_id, status = %response.status(), "webhook delivered");
            true
        }
        Ok(response) => {
            tracing::warn!(
                message_id = %job.message_id,
                status = %response.status(),
                "webhook endpoint rejected delivery"
            );
            false
        }
        Err(e) if e.is_timeout() => {
            tracing::warn!(message_id = %job.message_id, "webhook delivery timed out");
            false
        }
        Err(e) => {
            tracing::warn!(message_id = %job.message_id, error = %e, "webhook delivery failed");
            false
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
