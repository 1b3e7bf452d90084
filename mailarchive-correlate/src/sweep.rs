use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use mailarchive_common::{
    Event, Message, MessageCounter, NotificationSink, Signal, internal, tracing,
};
use mailarchive_store::{CorrelationStore, MessageStore};
use tokio::sync::broadcast;

use crate::{CorrelationError, RetentionConfig};

/// Result of one retention pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Messages at or past the cutoff
    pub expired: usize,
    pub removed: usize,
    /// Messages left in place after an error, tried again next pass
    pub failed: usize,
}

/// Removes messages older than the retention period.
#[derive(Debug, Clone)]
pub struct Sweeper {
    store: Arc<dyn CorrelationStore>,
    messages: Arc<dyn MessageStore>,
    sink: Arc<dyn NotificationSink>,
    counter: MessageCounter,
    max_age: TimeDelta,
    interval: Duration,
}

impl Sweeper {
    /// # Errors
    /// If the retention period does not fit a timestamp difference.
    pub fn new(
        config: &RetentionConfig,
        store: Arc<dyn CorrelationStore>,
        messages: Arc<dyn MessageStore>,
        sink: Arc<dyn NotificationSink>,
        counter: MessageCounter,
    ) -> Result<Self, CorrelationError> {
        let max_age = i64::try_from(config.max_age_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| CorrelationError::InvalidConfiguration {
                field: "retention.max_age_secs",
                reason: format!("{} is too large", config.max_age_secs),
            })?;

        Ok(Self {
            store,
            messages,
            sink,
            counter,
            max_age,
            interval: Duration::from_secs(config.interval_secs.max(1)),
        })
    }

    /// # Errors
    /// If the expired messages cannot be listed.
    pub async fn sweep(&self) -> Result<SweepReport, CorrelationError> {
        self.sweep_at(Utc::now()).await
    }

    /// Remove every message received at or before `now - max_age`.
    ///
    /// A message that fails to be removed is left for the next pass.
    /// Subscribers get one [`Event::UpdateMessageCount`] after the pass, and
    /// only when at least one message was removed; a pass that removes
    /// nothing publishes nothing.
    ///
    /// # Errors
    /// If the expired messages cannot be listed.
    #[tracing::instrument(level = "trace", skip(self))]
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, CorrelationError> {
        let cutoff = now
            .checked_sub_signed(self.max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let expired = self.store.messages_received_before(cutoff).await?;

        let mut report = SweepReport {
            expired: expired.len(),
            ..SweepReport::default()
        };

        for message in &expired {
            match self.remove(message).await {
                Ok(()) => {
                    self.counter.decrement();
                    report.removed += 1;
                }
                Err(e) => {
                    tracing::warn!("Unable to remove expired message {}: {e}", message.uuid);
                    report.failed += 1;
                }
            }
        }

        if report.removed > 0 {
            internal!(
                level = INFO,
                "Removed {} messages received before {cutoff}",
                report.removed
            );
            self.sink.publish(Event::UpdateMessageCount(self.counter.get()));
        }

        Ok(report)
    }

    /// Trail first, then the raw bytes, then the metadata. The metadata is
    /// what finds the message again, so it goes last.
    async fn remove(&self, message: &Message) -> Result<(), CorrelationError> {
        if !message.message_id.is_empty() {
            for record in self
                .store
                .queue_records_by_message_id(&message.message_id)
                .await?
            {
                let key = record.key();
                let lines = self.store.delete_log_lines(&key).await?;
                self.store.delete_queue_record(&key).await?;
                internal!(level = DEBUG, "Removed {key} and {lines} log lines");
            }
        }

        self.messages.delete(message.uuid).await?;
        self.store.delete_message(message.uuid).await?;

        Ok(())
    }

    /// Sweep on every interval tick until shutdown.
    ///
    /// # Errors
    ///
    /// Currently never fails.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn serve(
        &self,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<(), CorrelationError> {
        internal!("Retention sweeper starting");

        let mut timer = tokio::time::interval(self.interval);
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if let Err(e) = self.sweep().await {
                        tracing::error!("Retention sweep failed: {e}");
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!("Retention sweeper received shutdown signal");
                        }
                        Err(e) => {
                            tracing::error!("Retention sweeper shutdown channel error: {e}");
                        }
                    }
                    break;
                }
            }
        }

        internal!("Retention sweeper shutdown complete");
        Ok(())
    }
}
