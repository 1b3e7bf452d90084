//! Records kept by the archive.
//!
//! A [`Message`] is written once at ingestion. The transport daemon then talks
//! about it only in terms of its own queue identifiers, so every queue ID that
//! can be tied back to a `Message-ID` gets a [`QueueRecord`], and every syslog
//! line attributed to that queue ID is kept as a [`DeliveryLogLine`].

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery outcome of a message as reported by the transport daemon
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Nothing has been reconciled for this message yet
    #[default]
    Unknown,
    Queued,
    Sent,
    Deferred,
    Bounced,
    Quarantined,
}

impl MessageStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Deferred => "deferred",
            Self::Bounced => "bounced",
            Self::Quarantined => "quarantined",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown message status: {0}")]
pub struct UnknownStatus(String);

impl FromStr for MessageStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "queued" => Ok(Self::Queued),
            "sent" => Ok(Self::Sent),
            "deferred" => Ok(Self::Deferred),
            "bounced" => Ok(Self::Bounced),
            "quarantined" => Ok(Self::Quarantined),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Metadata of an archived message.
///
/// The raw bytes live in the message store under the same [`Uuid`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub uuid: Uuid,
    /// `Message-ID` header without angle brackets, empty when absent
    pub message_id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub has_plain_text: bool,
    pub has_html: bool,
    pub has_attachments: bool,
    pub spam_score: u32,
    pub source_ip: String,
    pub size_bytes: usize,
    pub received_at: DateTime<Utc>,
    pub status: MessageStatus,
}

/// Identity of a queue ID on a particular transport host.
///
/// Queue IDs are only unique per host, so the pair is the key everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueKey {
    pub hostname: String,
    pub queue_id: String,
}

impl QueueKey {
    pub fn new(hostname: impl Into<String>, queue_id: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            queue_id: queue_id.into(),
        }
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.queue_id, self.hostname)
    }
}

/// Correlation between a transport queue ID and a `Message-ID`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub hostname: String,
    pub queue_id: String,
    pub message_id: String,
    pub status: MessageStatus,
    /// Keeps this queue ID's status away from the message it belongs to
    pub ignore: bool,
}

impl QueueRecord {
    /// A freshly associated queue ID, as seen on its `message-id=<…>` line
    pub fn queued(
        hostname: impl Into<String>,
        queue_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            queue_id: queue_id.into(),
            message_id: message_id.into(),
            status: MessageStatus::Queued,
            ignore: false,
        }
    }

    #[must_use]
    pub fn key(&self) -> QueueKey {
        QueueKey::new(self.hostname.clone(), self.queue_id.clone())
    }
}

/// A syslog line as handed over by the syslog listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyslogLine {
    pub hostname: String,
    pub timestamp: DateTime<Utc>,
    pub tag: String,
    pub content: String,
}

impl SyslogLine {
    pub fn new(
        hostname: impl Into<String>,
        tag: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            timestamp: Utc::now(),
            tag: tag.into(),
            content: content.into(),
        }
    }
}

/// A syslog line attributed to a queue ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryLogLine {
    pub hostname: String,
    pub timestamp: DateTime<Utc>,
    pub tag: String,
    pub queue_id: String,
    pub content: String,
}

impl DeliveryLogLine {
    #[must_use]
    pub fn attribute(line: &SyslogLine, queue_id: &str) -> Self {
        Self {
            hostname: line.hostname.clone(),
            timestamp: line.timestamp,
            tag: line.tag.clone(),
            queue_id: queue_id.to_string(),
            content: line.content.clone(),
        }
    }

    #[must_use]
    pub fn key(&self) -> QueueKey {
        QueueKey::new(self.hostname.clone(), self.queue_id.clone())
    }
}
