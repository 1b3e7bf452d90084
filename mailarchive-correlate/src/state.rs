use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use mailarchive_common::SyslogLine;

/// A connection seen on a host that has not produced a queue ID yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConnection {
    pub source: String,
    pub lines: Vec<SyslogLine>,
}

/// A connection that produced a queue ID and is waiting for its disconnect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlight {
    pub hostname: String,
    pub queue_id: String,
    pub source: String,
    pub started_at: DateTime<Utc>,
}

/// What the engine remembers between lines.
///
/// Only one connection per host can be pending. A second connect on the same
/// host before the first produced a queue ID replaces it.
#[derive(Debug, Default)]
pub struct ConnectionState {
    pending: HashMap<String, PendingConnection>,
    in_flight: Vec<InFlight>,
}

impl ConnectionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a pending connection on `hostname`, discarding any previous one
    pub fn open(&mut self, hostname: &str, source: &str) {
        self.pending.insert(
            hostname.to_string(),
            PendingConnection {
                source: source.to_string(),
                lines: Vec::new(),
            },
        );
    }

    /// Keep `line` for the pending connection of its host.
    ///
    /// Returns `false` when the host has none and the line should be dropped.
    pub fn buffer(&mut self, line: &SyslogLine) -> bool {
        self.pending.get_mut(&line.hostname).is_some_and(|pending| {
            pending.lines.push(line.clone());
            true
        })
    }

    /// Hand the pending connection of `hostname` to `queue_id`.
    ///
    /// The connection moves to the in-flight list and its buffered lines are
    /// returned in arrival order. Without a pending connection nothing
    /// happens and the list is empty.
    pub fn adopt(&mut self, hostname: &str, queue_id: &str, now: DateTime<Utc>) -> Vec<SyslogLine> {
        let Some(pending) = self.pending.remove(hostname) else {
            return Vec::new();
        };

        self.in_flight.push(InFlight {
            hostname: hostname.to_string(),
            queue_id: queue_id.to_string(),
            source: pending.source,
            started_at: now,
        });

        pending.lines
    }

    /// Close every in-flight connection from `source`, returning their queue IDs.
    ///
    /// Entries at least `timeout` old are dropped first, whatever their source.
    pub fn close(&mut self, source: &str, now: DateTime<Utc>, timeout: Duration) -> Vec<String> {
        let mut closed = Vec::new();

        self.in_flight.retain(|entry| {
            // A clock step backwards gives a negative age, which keeps the entry.
            let age = (now - entry.started_at).to_std().unwrap_or_default();

            if age >= timeout {
                return false;
            }

            if entry.source == source {
                closed.push(entry.queue_id.clone());
                return false;
            }

            true
        });

        closed
    }

    #[must_use]
    pub fn pending(&self, hostname: &str) -> Option<&PendingConnection> {
        self.pending.get(hostname)
    }

    #[must_use]
    pub fn in_flight(&self) -> &[InFlight] {
        &self.in_flight
    }
}
