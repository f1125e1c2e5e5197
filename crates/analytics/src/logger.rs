//! Asynchronous analytics logger that batches events and appends them to a
//! JSON-lines file. Uses a channel-based architecture so emitting from the
//! engine never blocks or fails the caller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use splitline_core::config::AnalyticsConfig;
use splitline_core::event_bus::EventSink;
use splitline_core::types::AnalyticsEvent;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

enum Command {
    Event(AnalyticsEvent),
    Flush(oneshot::Sender<()>),
}

/// Analytics logger with background batch writer.
pub struct AnalyticsLogger {
    sender: mpsc::Sender<Command>,
}

impl AnalyticsLogger {
    /// Create a new analytics logger and spawn the background writer.
    /// Must be called from within a tokio runtime.
    pub async fn new(config: &AnalyticsConfig) -> anyhow::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Command>(config.channel_capacity.max(1));

        let writer = BatchWriter::new(&config.output_path).await?;
        let batch_size = config.batch_size.max(1);
        let flush_interval = Duration::from_millis(config.flush_interval_ms.max(1));

        // Spawn background batch writer
        tokio::spawn(async move {
            writer.run(receiver, batch_size, flush_interval).await;
        });

        info!(path = %config.output_path.display(), "Analytics logger initialized");

        Ok(Self { sender })
    }

    /// Write out everything queued so far and wait for it to land.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Command::Flush(tx)).await.is_err() {
            warn!("Analytics writer stopped, nothing flushed");
            return;
        }
        let _ = rx.await;
    }
}

impl EventSink for AnalyticsLogger {
    fn emit(&self, event: AnalyticsEvent) {
        if let Err(e) = self.sender.try_send(Command::Event(event)) {
            metrics::counter!("analytics.dropped").increment(1);
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "writer stopped",
            };
            warn!(reason, "Analytics event dropped");
        } else {
            metrics::counter!("analytics.queued").increment(1);
        }
    }
}

/// Background writer that batches events and appends them to disk.
struct BatchWriter {
    path: PathBuf,
}

impl BatchWriter {
    async fn new(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    async fn run(
        self,
        mut receiver: mpsc::Receiver<Command>,
        batch_size: usize,
        flush_interval: Duration,
    ) {
        let mut buffer: Vec<AnalyticsEvent> = Vec::with_capacity(batch_size);
        let mut interval = tokio::time::interval(flush_interval);

        loop {
            tokio::select! {
                command = receiver.recv() => match command {
                    Some(Command::Event(event)) => {
                        buffer.push(event);
                        if buffer.len() >= batch_size {
                            self.flush(&mut buffer).await;
                        }
                    }
                    Some(Command::Flush(done)) => {
                        self.flush(&mut buffer).await;
                        let _ = done.send(());
                    }
                    None => {
                        self.flush(&mut buffer).await;
                        debug!("Analytics channel closed, writer exiting");
                        return;
                    }
                },
                _ = interval.tick() => {
                    if !buffer.is_empty() {
                        self.flush(&mut buffer).await;
                    }
                }
            }
        }
    }

    async fn flush(&self, buffer: &mut Vec<AnalyticsEvent>) {
        let count = buffer.len();
        if count == 0 {
            return;
        }
        debug!(count = count, "Flushing analytics batch");

        let mut payload = String::new();
        for e in buffer.iter() {
            if let Ok(json) = serde_json::to_string(e) {
                payload.push_str(&json);
                payload.push('\n');
            }
        }
        buffer.clear();

        match self.append(payload.as_bytes()).await {
            Ok(()) => {
                metrics::counter!("analytics.flushed").increment(count as u64);
                debug!(count = count, "Analytics batch flushed successfully");
            }
            Err(e) => {
                metrics::counter!("analytics.flush_errors").increment(1);
                error!(error = %e, count = count, "Failed to flush analytics batch");
            }
        }
    }

    async fn append(&self, data: &[u8]) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(data).await?;
        file.flush().await
    }
}
