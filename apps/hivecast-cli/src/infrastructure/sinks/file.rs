//! File Persistence Sink
//!
//! Appends every received message to a local file, one line per message:
//! RFC 3339 receive time, topic, and payload text, tab-separated. The file
//! handle is held open for the whole session and flushed per write so a
//! crash loses at most the in-flight line.

use std::path::Path;

use async_trait::async_trait;
use chrono::SecondsFormat;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::application::ports::{DeliverySink, SinkError};
use crate::domain::message::InboundMessage;

/// Sink that appends received messages to a file.
pub struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    /// Open `path` for appending, creating it and its parent directory if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the file cannot be opened.
    pub async fn open(path: &Path) -> Result<Self, std::io::Error> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

#[async_trait]
impl DeliverySink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn deliver(&mut self, message: &InboundMessage) -> Result<(), SinkError> {
        let line = format!(
            "{}\t{}\t{}\n",
            message
                .received_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            message.topic,
            message.payload_text()
        );
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::TempDir;

    use super::*;

    fn message(sequence: u64, payload: &str) -> InboundMessage {
        InboundMessage {
            sequence,
            topic: "alerts".to_string(),
            message_id: format!("m-{sequence}"),
            payload: payload.as_bytes().to_vec(),
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn appends_one_line_per_message() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messages.log");
        let mut sink = FileSink::open(&path).await.unwrap();

        sink.deliver(&message(1, "first")).await.unwrap();
        sink.deliver(&message(2, "second")).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("\talerts\tfirst"));
        assert!(lines[1].ends_with("\talerts\tsecond"));
    }

    #[tokio::test]
    async fn creates_missing_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/messages.log");
        let mut sink = FileSink::open(&path).await.unwrap();
        sink.deliver(&message(1, "hi")).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn reopening_appends_rather_than_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("messages.log");

        let mut sink = FileSink::open(&path).await.unwrap();
        sink.deliver(&message(1, "first")).await.unwrap();
        drop(sink);

        let mut sink = FileSink::open(&path).await.unwrap();
        sink.deliver(&message(2, "second")).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
