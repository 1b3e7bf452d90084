use std::sync::Arc;

use chrono::Utc;
use mailarchive_common::{
    Event, Message, MessageCounter, MessageStatus, NotificationSink, incoming, internal,
};
use mailarchive_store::{CorrelationStore, MessageStore, StoreError};
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::IngestError, headers::summarise};

fn default_spam_header() -> String {
    String::from("X-Spam-Level")
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Header carrying the spam filter's `Spam detection results: N` verdict
    #[serde(default = "default_spam_header")]
    pub spam_header: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            spam_header: default_spam_header(),
        }
    }
}

/// One accepted SMTP transmission
#[derive(Debug, Clone)]
pub struct Submission {
    /// Address of the connecting client
    pub remote_addr: String,
    /// Envelope sender
    pub from: String,
    /// Envelope recipient
    pub to: String,
    /// The complete message as received after DATA
    pub data: Vec<u8>,
}

/// Archives submissions.
///
/// Cheap to clone; every SMTP session can hold its own copy and ingest
/// concurrently. The only state shared between submissions is the counter.
#[derive(Debug, Clone)]
pub struct Ingestor {
    config: IngestConfig,
    messages: Arc<dyn MessageStore>,
    store: Arc<dyn CorrelationStore>,
    sink: Arc<dyn NotificationSink>,
    counter: MessageCounter,
}

impl Ingestor {
    pub fn new(
        config: IngestConfig,
        messages: Arc<dyn MessageStore>,
        store: Arc<dyn CorrelationStore>,
        sink: Arc<dyn NotificationSink>,
        counter: MessageCounter,
    ) -> Self {
        Self {
            config,
            messages,
            store,
            sink,
            counter,
        }
    }

    /// Archive one submission and announce it.
    ///
    /// The message is parsed before anything is written, so a malformed
    /// submission leaves no trace. The raw bytes are stored first; if the
    /// metadata cannot be written afterwards they are removed again.
    ///
    /// # Errors
    ///
    /// - [`IngestError::Parse`] if the message is malformed
    /// - [`IngestError::DuplicateId`] if the generated UUID is already taken
    /// - [`IngestError::Store`] if either store fails
    #[tracing::instrument(level = "debug", skip_all, fields(remote = %submission.remote_addr, size = submission.data.len()))]
    pub async fn ingest(&self, submission: Submission) -> Result<Message, IngestError> {
        let summary = summarise(&submission.data, &self.config.spam_header)?;
        let uuid = Uuid::new_v4();

        self.messages
            .put(uuid, &submission.data)
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists(_) => IngestError::DuplicateId(uuid),
                other => IngestError::Store(other),
            })?;

        let message = Message {
            uuid,
            message_id: summary.message_id,
            from: summary.from.unwrap_or(submission.from),
            to: summary.to.unwrap_or(submission.to),
            subject: summary.subject,
            has_plain_text: summary.has_plain_text,
            has_html: summary.has_html,
            has_attachments: summary.has_attachments,
            spam_score: summary.spam_score,
            source_ip: summary.source.unwrap_or(submission.remote_addr),
            size_bytes: submission.data.len(),
            received_at: Utc::now(),
            status: MessageStatus::Unknown,
        };

        if let Err(e) = self.store.insert_message(&message).await {
            if let Err(cleanup) = self.messages.delete(uuid).await {
                internal!(
                    level = WARN,
                    "Unable to remove message {uuid} after failed insert: {cleanup}"
                );
            }

            return Err(match e {
                StoreError::AlreadyExists(_) => IngestError::DuplicateId(uuid),
                other => IngestError::Store(other),
            });
        }

        incoming!(
            level = INFO,
            "Received message from {} ({} bytes)",
            message.from,
            message.size_bytes
        );

        let count = self.counter.increment();
        self.sink
            .publish(Event::ReceivedNewMessage(Box::new(message.clone())));
        self.sink.publish(Event::UpdateMessageCount(count));

        Ok(message)
    }
}
