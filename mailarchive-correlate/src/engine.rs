use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use mailarchive_common::{
    DeliveryLogLine, MessageStatus, QueueKey, QueueRecord, SyslogLine, incoming, internal,
    tracing,
};
use mailarchive_store::CorrelationStore;
use regex::Regex;

use crate::{
    CorrelationConfig, CorrelationError, PendingUpdates,
    rules::{Classification, Classifier, status_from_line},
    state::ConnectionState,
};

/// What the engine did with a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// The tag is not one of the transport daemon's
    Filtered,
    /// A queue ID was tied to a `Message-ID`
    Associated,
    /// The line was attributed to the queue ID it names
    Recorded,
    /// A connection became pending on the line's host
    Opened,
    /// A disconnect closed this many in-flight connections
    Closed(usize),
    /// Kept for the pending connection of the line's host
    Buffered,
    /// Nothing to attribute it to
    Discarded,
}

/// Turns the syslog stream into queue records, delivery trails and pending
/// status updates.
///
/// Lines must be fed one at a time, in arrival order. The connection state
/// lives here and nowhere else, hence `&mut self`.
#[derive(Debug)]
pub struct CorrelationEngine {
    classifier: Classifier,
    transport_tags: Regex,
    ignore_containing: Vec<String>,
    connection_timeout: Duration,
    state: ConnectionState,
    store: Arc<dyn CorrelationStore>,
    pending: PendingUpdates,
}

impl CorrelationEngine {
    /// # Errors
    /// If the transport tag pattern does not compile.
    pub fn new(
        config: &CorrelationConfig,
        store: Arc<dyn CorrelationStore>,
        pending: PendingUpdates,
    ) -> Result<Self, CorrelationError> {
        Ok(Self {
            classifier: Classifier::standard(),
            transport_tags: Regex::new(&config.transport_tags)?,
            ignore_containing: config
                .ignore_containing
                .iter()
                .filter(|needle| !needle.is_empty())
                .cloned()
                .collect(),
            connection_timeout: Duration::from_secs(config.connection_timeout_secs),
            state: ConnectionState::new(),
            store,
            pending,
        })
    }

    #[must_use]
    pub const fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Process one line against the current time.
    ///
    /// # Errors
    /// If the correlation store fails. The line may be partly recorded.
    pub async fn correlate(&mut self, line: &SyslogLine) -> Result<LineOutcome, CorrelationError> {
        self.correlate_at(line, Utc::now()).await
    }

    /// Process one line, taking `now` as the time for connection ageing.
    ///
    /// # Errors
    /// If the correlation store fails. The line may be partly recorded.
    #[tracing::instrument(level = "trace", skip_all, fields(host = %line.hostname, tag = %line.tag))]
    pub async fn correlate_at(
        &mut self,
        line: &SyslogLine,
        now: DateTime<Utc>,
    ) -> Result<LineOutcome, CorrelationError> {
        if !self.transport_tags.is_match(&line.tag) {
            return Ok(LineOutcome::Filtered);
        }

        incoming!("{}: {}", line.hostname, line.content);

        match self.classifier.classify(&line.content) {
            Classification::Association {
                queue_id,
                message_id,
            } => {
                let record = QueueRecord::queued(&line.hostname, queue_id, message_id);
                self.store.save_queue_record(&record).await?;
                self.pending.mark(record.key());

                internal!(
                    level = DEBUG,
                    "{} belongs to <{message_id}>",
                    record.key()
                );

                self.attribute(line, queue_id, now).await?;
                Ok(LineOutcome::Associated)
            }
            Classification::QueueReference { queue_id }
            | Classification::Completion { queue_id } => {
                self.attribute(line, queue_id, now).await?;
                Ok(LineOutcome::Recorded)
            }
            Classification::Connect { source } => {
                self.state.open(&line.hostname, source);
                Ok(LineOutcome::Opened)
            }
            Classification::Disconnect { source } => {
                let closed = self.state.close(source, now, self.connection_timeout);
                for queue_id in &closed {
                    self.record(line, queue_id).await?;
                }
                Ok(LineOutcome::Closed(closed.len()))
            }
            Classification::Unmatched => {
                if self.state.buffer(line) {
                    Ok(LineOutcome::Buffered)
                } else {
                    Ok(LineOutcome::Discarded)
                }
            }
        }
    }

    /// Record `line` against `queue_id`, after whatever the host's pending
    /// connection buffered
    async fn attribute(
        &mut self,
        line: &SyslogLine,
        queue_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CorrelationError> {
        // The buffer is gone once adopted, so a failed line does not stop the
        // rest from being recorded.
        let mut first_error = None;
        let mut failed = 0;
        for buffered in self.state.adopt(&line.hostname, queue_id, now) {
            if let Err(e) = self.record(&buffered, queue_id).await {
                failed += 1;
                first_error.get_or_insert(e);
            }
        }

        let recorded = self.record(line, queue_id).await;

        match first_error {
            Some(e) => {
                tracing::warn!(
                    "{failed} buffered lines for {queue_id} on {} were not recorded",
                    line.hostname
                );
                Err(e)
            }
            None => recorded,
        }
    }

    async fn record(&self, line: &SyslogLine, queue_id: &str) -> Result<(), CorrelationError> {
        self.store
            .append_log_line(&DeliveryLogLine::attribute(line, queue_id))
            .await?;

        let key = QueueKey::new(&line.hostname, queue_id);
        let Some(mut record) = self.store.queue_record(&key).await? else {
            return Ok(());
        };

        let before = record.clone();

        if self
            .ignore_containing
            .iter()
            .any(|needle| line.content.contains(needle.as_str()))
        {
            record.ignore = true;
        }

        let next = status_from_line(&line.content, record.status);
        if let Some(status) = next {
            if status == MessageStatus::Quarantined {
                record.ignore = false;
            }
            record.status = status;
        }

        if record != before {
            self.store.save_queue_record(&record).await?;
        }

        if let Some(status) = next {
            internal!(level = DEBUG, "{key} is now {status}");
            self.pending.mark(key);
        }

        Ok(())
    }
}
