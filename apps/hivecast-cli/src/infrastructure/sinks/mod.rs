//! Delivery Sink Adapters
//!
//! Concrete [`DeliverySink`] implementations fed by the fan-out hub:
//! console output, file persistence, and webhook forwarding.

mod file;
mod template;
mod webhook;

pub use file::FileSink;
pub use template::{PayloadTemplate, TemplateError};
pub use webhook::{DispatcherReport, WebhookDispatcher, WebhookJob, WebhookSink, pipeline};

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::application::ports::{DeliverySink, SinkError};
use crate::domain::message::InboundMessage;

/// Sink that prints message payloads to stdout, one line per message.
///
/// Stdout is the delivery surface; logs go to stderr. Generic over the
/// writer so tests can capture the rendered output.
pub struct ConsoleSink<W = tokio::io::Stdout> {
    out: W,
}

impl ConsoleSink {
    /// Create a console sink over the process stdout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            out: tokio::io::stdout(),
        }
    }
}

impl<W: AsyncWrite + Unpin + Send> ConsoleSink<W> {
    /// Create a console sink over an arbitrary writer.
    pub const fn with_writer(out: W) -> Self {
        Self { out }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> DeliverySink for ConsoleSink<W> {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn deliver(&mut self, message: &InboundMessage) -> Result<(), SinkError> {
        let line = format!("[{}] {}\n", message.topic, message.payload_text());
        self.out.write_all(line.as_bytes()).await?;
        self.out.flush().await?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
