use mailarchive_common::{Signal, SyslogLine, internal, tracing};
use tokio::sync::{broadcast, mpsc};

use crate::{CorrelationEngine, CorrelationError};

/// Handle for the syslog listener; sending waits while the worker is behind.
pub type SyslogSender = mpsc::Sender<SyslogLine>;

/// Bounded channel feeding a [`CorrelationWorker`]
#[must_use]
pub fn channel(capacity: usize) -> (SyslogSender, mpsc::Receiver<SyslogLine>) {
    mpsc::channel(capacity.max(1))
}

/// Runs the engine over incoming lines, one at a time.
#[derive(Debug)]
pub struct CorrelationWorker {
    engine: CorrelationEngine,
    lines: mpsc::Receiver<SyslogLine>,
}

impl CorrelationWorker {
    #[must_use]
    pub const fn new(engine: CorrelationEngine, lines: mpsc::Receiver<SyslogLine>) -> Self {
        Self { engine, lines }
    }

    /// Process lines until shutdown or until every sender is gone.
    ///
    /// A line that fails to record is logged and skipped. Lines still queued
    /// at shutdown are dropped along with the connection state.
    ///
    /// # Errors
    ///
    /// Currently never fails.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn serve(
        mut self,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<(), CorrelationError> {
        internal!("Correlation worker starting");

        loop {
            tokio::select! {
                line = self.lines.recv() => {
                    let Some(line) = line else {
                        internal!("Syslog channel closed");
                        break;
                    };

                    if let Err(e) = self.engine.correlate(&line).await {
                        tracing::error!("Unable to correlate line from {}: {e}", line.hostname);
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!("Correlation worker received shutdown signal");
                        }
                        Err(e) => {
                            tracing::error!("Correlation worker shutdown channel error: {e}");
                        }
                    }
                    break;
                }
            }
        }

        internal!("Correlation worker shutdown complete");
        Ok(())
    }
}
