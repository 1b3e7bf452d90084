use serde::Deserialize;

fn default_transport_tags() -> String {
    String::from("(?i)postfix|exim|smtp-filter")
}

const fn default_connection_timeout() -> u64 {
    60
}

const fn default_channel_capacity() -> usize {
    1024
}

const fn default_reconcile_interval() -> u64 {
    5
}

const fn default_max_age() -> u64 {
    1_209_600 // 14 days
}

const fn default_sweep_interval() -> u64 {
    1800 // 30 minutes
}

/// How syslog lines are filtered and attributed
#[derive(Debug, Clone, Deserialize)]
pub struct CorrelationConfig {
    /// Pattern a line's tag must match to be looked at
    ///
    /// Default: `(?i)postfix|exim|smtp-filter`
    #[serde(default = "default_transport_tags")]
    pub transport_tags: String,

    /// Lines containing any of these mark their queue ID as ignored.
    ///
    /// Used for queue IDs that belong to another hop of the same message,
    /// for example the inbound leg or the copy relayed to the archive, whose
    /// status must not overwrite the outbound delivery status.
    #[serde(default)]
    pub ignore_containing: Vec<String>,

    /// How long a connection may wait for its disconnect line (in seconds)
    ///
    /// Default: 60
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Lines that may wait for the worker before senders are held back
    ///
    /// Default: 1024
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            transport_tags: default_transport_tags(),
            ignore_containing: Vec::new(),
            connection_timeout_secs: default_connection_timeout(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    /// How often pending status changes are applied (in seconds)
    #[serde(default = "default_reconcile_interval")]
    pub interval_secs: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reconcile_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Age after which a message is removed (in seconds)
    ///
    /// Default: 1209600 (14 days)
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,

    /// How often expired messages are looked for (in seconds)
    ///
    /// Default: 1800 (30 minutes)
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_max_age(),
            interval_secs: default_sweep_interval(),
        }
    }
}
