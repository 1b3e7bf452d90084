use std::{sync::Arc, time::Duration};

use mailarchive_common::{Event, NotificationSink, QueueKey, Signal, internal, tracing};
use mailarchive_store::CorrelationStore;
use tokio::sync::broadcast;

use crate::{CorrelationError, PendingUpdates, ReconcilerConfig};

/// Result of one reconciliation pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Queue IDs taken from the pending set
    pub examined: usize,
    /// Messages whose status was changed
    pub updated: usize,
    /// Lookups or writes that failed; their queue IDs are pending again
    pub failed: usize,
}

/// Copies queue record statuses onto the messages they belong to.
#[derive(Debug, Clone)]
pub struct Reconciler {
    store: Arc<dyn CorrelationStore>,
    pending: PendingUpdates,
    sink: Arc<dyn NotificationSink>,
    interval: Duration,
}

impl Reconciler {
    pub fn new(
        config: &ReconcilerConfig,
        store: Arc<dyn CorrelationStore>,
        pending: PendingUpdates,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            pending,
            sink,
            interval: Duration::from_secs(config.interval_secs.max(1)),
        }
    }

    /// Apply everything marked since the last pass.
    ///
    /// Ignored and unknown queue IDs are skipped. Every message with the
    /// record's `Message-ID` gets its status. Subscribers hear about it once
    /// per pass, and only if something changed.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn reconcile(&self) -> ReconcileReport {
        let batch = self.pending.take();
        let mut report = ReconcileReport {
            examined: batch.len(),
            ..ReconcileReport::default()
        };

        for key in batch {
            let (updated, failed) = self.reconcile_key(&key).await;
            report.updated += updated;
            report.failed += failed;

            if failed > 0 {
                self.pending.mark(key);
            }
        }

        if report.updated > 0 {
            internal!(
                level = DEBUG,
                "Reconciled {} queue IDs, {} messages updated",
                report.examined,
                report.updated
            );
            self.sink.publish(Event::MessageStatusesUpdated);
        }

        report
    }

    /// Returns `(updated, failed)` for one queue ID
    async fn reconcile_key(&self, key: &QueueKey) -> (usize, usize) {
        let record = match self.store.queue_record(key).await {
            Ok(Some(record)) if !record.ignore && !record.message_id.is_empty() => record,
            Ok(_) => return (0, 0),
            Err(e) => {
                tracing::warn!("Unable to read queue record {key}: {e}");
                return (0, 1);
            }
        };

        let messages = match self.store.messages_by_message_id(&record.message_id).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!("Unable to find messages for <{}>: {e}", record.message_id);
                return (0, 1);
            }
        };

        let mut updated = 0;
        let mut failed = 0;

        for message in messages.iter().filter(|m| m.status != record.status) {
            match self
                .store
                .set_message_status(message.uuid, record.status)
                .await
            {
                Ok(()) => {
                    internal!(
                        level = DEBUG,
                        "Message {} is now {} ({key})",
                        message.uuid,
                        record.status
                    );
                    updated += 1;
                }
                Err(e) => {
                    tracing::warn!("Unable to update status of {}: {e}", message.uuid);
                    failed += 1;
                }
            }
        }

        (updated, failed)
    }

    /// Reconcile on every interval tick until shutdown.
    ///
    /// # Errors
    ///
    /// Currently never fails.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn serve(
        &self,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<(), CorrelationError> {
        internal!("Status reconciler starting");

        let mut timer = tokio::time::interval(self.interval);
        // Skip the first tick to avoid immediate execution
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let report = self.reconcile().await;
                    if report.failed > 0 {
                        tracing::warn!("{} status updates failed, retrying next pass", report.failed);
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!("Status reconciler received shutdown signal");
                        }
                        Err(e) => {
                            tracing::error!("Status reconciler shutdown channel error: {e}");
                        }
                    }
                    break;
                }
            }
        }

        internal!("Status reconciler shutdown complete");
        Ok(())
    }
}
