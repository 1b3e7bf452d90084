use std::{
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};

use mailarchive_common::{
    BroadcastSink, Event, Message, MessageCounter, Signal, internal, tracing,
};
use mailarchive_correlate::{
    CorrelationConfig, CorrelationEngine, CorrelationWorker, PendingUpdates, Reconciler,
    ReconcilerConfig, RetentionConfig, Sweeper, SyslogSender, channel,
};
use mailarchive_ingest::{IngestConfig, Ingestor};
use mailarchive_store::{
    CorrelationStore, MemoryCorrelationStore, MessageStore, MessageStoreConfig, StoreError,
};
use serde::Deserialize;
use tokio::sync::broadcast;
use uuid::Uuid;

const fn default_event_capacity() -> usize {
    64
}

/// Top-level configuration, read from the RON config file
#[derive(Debug, Deserialize)]
pub struct ArchiveConfig {
    #[serde(alias = "store", default)]
    pub message_store: MessageStoreConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Events a slow subscriber may fall behind by before losing some
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            message_store: MessageStoreConfig::default(),
            ingest: IngestConfig::default(),
            correlation: CorrelationConfig::default(),
            reconciler: ReconcilerConfig::default(),
            retention: RetentionConfig::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "MAILARCHIVE_CONFIG";

/// Where the config file is looked for when [`CONFIG_ENV`] is unset, in order
pub const CONFIG_LOCATIONS: [&str; 2] = [
    "./mailarchive.config.ron",
    "/etc/mailarchive/mailarchive.config.ron",
];

impl ArchiveConfig {
    /// Read and parse a RON config file.
    ///
    /// # Errors
    ///
    /// If the file cannot be read or is not a valid config; the message
    /// names the file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config from {}: {e}", path.display())
        })?;

        ron::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config in {}: {e}", path.display()))
    }

    /// The file named by [`CONFIG_ENV`], or else the first existing entry of
    /// [`CONFIG_LOCATIONS`].
    ///
    /// # Errors
    ///
    /// If [`CONFIG_ENV`] names a missing file, or no candidate exists.
    pub fn locate() -> anyhow::Result<PathBuf> {
        locate_in(
            std::env::var_os(CONFIG_ENV).map(PathBuf::from),
            &CONFIG_LOCATIONS.map(PathBuf::from),
        )
    }
}

fn locate_in(explicit: Option<PathBuf>, candidates: &[PathBuf]) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        anyhow::ensure!(
            path.exists(),
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
        return Ok(path);
    }

    if let Some(path) = candidates.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let tried = candidates
        .iter()
        .map(|path| format!("  - {}", path.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!("No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{tried}")
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[tracing::instrument(level = "trace")]
async fn shutdown_signal() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    Ok(())
}

/// Delete stored messages the correlation store knows nothing about.
///
/// These are left behind when the message store outlives the correlation
/// store, and nothing else would ever list or expire them.
async fn prune_orphans(
    messages: &dyn MessageStore,
    store: &dyn CorrelationStore,
) -> Result<usize, StoreError> {
    let mut pruned = 0;

    for id in messages.list().await? {
        if store.message(id).await?.is_none() {
            messages.delete(id).await?;
            pruned += 1;
        }
    }

    Ok(pruned)
}

/// The running archive: stores, ingestion, and the correlation services.
///
/// Submissions go through [`Archive::ingestor`], syslog lines through
/// [`Archive::syslog_sender`]. Both handles stay usable while
/// [`Archive::run`] drives the background services.
#[derive(Debug)]
pub struct Archive {
    messages: Arc<dyn MessageStore>,
    store: Arc<dyn CorrelationStore>,
    sink: Arc<BroadcastSink>,
    counter: MessageCounter,
    ingestor: Ingestor,
    syslog: SyslogSender,
    worker: CorrelationWorker,
    reconciler: Reconciler,
    sweeper: Sweeper,
}

impl Archive {
    /// Open the configured message store and an empty correlation store.
    ///
    /// # Errors
    ///
    /// If the message store cannot be initialised or the correlation
    /// settings are invalid.
    pub async fn open(config: ArchiveConfig) -> anyhow::Result<Self> {
        Self::open_with(config, Arc::new(MemoryCorrelationStore::new())).await
    }

    /// Open the configured message store alongside an existing correlation
    /// store. Stored messages without metadata are removed, and the live
    /// counter starts from the store's message count.
    ///
    /// # Errors
    ///
    /// If the message store cannot be initialised, the correlation store
    /// cannot be counted, or the correlation settings are invalid.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn open_with(
        config: ArchiveConfig,
        store: Arc<dyn CorrelationStore>,
    ) -> anyhow::Result<Self> {
        let messages = config.message_store.into_store()?;

        let pruned = prune_orphans(messages.as_ref(), store.as_ref()).await?;
        if pruned > 0 {
            internal!(
                level = INFO,
                "Removed {pruned} stored messages without metadata"
            );
        }

        let counter = MessageCounter::new(store.message_count().await?);
        let sink = Arc::new(BroadcastSink::new(config.event_capacity));
        let pending = PendingUpdates::new();

        internal!(
            level = INFO,
            "Archive opened with {} messages",
            counter.get()
        );

        let ingestor = Ingestor::new(
            config.ingest,
            messages.clone(),
            store.clone(),
            sink.clone(),
            counter.clone(),
        );

        let engine = CorrelationEngine::new(&config.correlation, store.clone(), pending.clone())?;
        let (syslog, lines) = channel(config.correlation.channel_capacity);

        let reconciler = Reconciler::new(&config.reconciler, store.clone(), pending, sink.clone());
        let sweeper = Sweeper::new(
            &config.retention,
            store.clone(),
            messages.clone(),
            sink.clone(),
            counter.clone(),
        )?;

        Ok(Self {
            messages,
            store,
            sink,
            counter,
            ingestor,
            syslog,
            worker: CorrelationWorker::new(engine, lines),
            reconciler,
            sweeper,
        })
    }

    #[must_use]
    pub fn ingestor(&self) -> Ingestor {
        self.ingestor.clone()
    }

    /// Where the syslog listener sends transport daemon lines
    #[must_use]
    pub fn syslog_sender(&self) -> SyslogSender {
        self.syslog.clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sink.subscribe()
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn CorrelationStore> {
        self.store.clone()
    }

    #[must_use]
    pub fn message_count(&self) -> u64 {
        self.counter.get()
    }

    /// # Errors
    /// Backend failures only.
    pub async fn message(&self, uuid: Uuid) -> Result<Option<Message>, StoreError> {
        self.store.message(uuid).await
    }

    /// Raw bytes of an archived message
    ///
    /// # Errors
    /// [`StoreError::NotFound`] for an unknown UUID, or backend failures.
    pub async fn message_data(&self, uuid: Uuid) -> Result<Vec<u8>, StoreError> {
        self.messages.get(uuid).await
    }

    /// Run until SIGINT or SIGTERM
    ///
    /// # Errors
    ///
    /// If the signal handlers cannot be installed.
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(&SHUTDOWN_BROADCAST, shutdown_signal()).await
    }

    /// Run the correlation worker, reconciler and sweeper until `trigger`
    /// completes, then broadcast [`Signal::Shutdown`] on `signals` and wait
    /// for them to stop. [`Signal::Finalised`] follows once they have.
    ///
    /// # Errors
    ///
    /// If `trigger` fails, or any of the services does.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run_until<F>(
        self,
        signals: &broadcast::Sender<Signal>,
        trigger: F,
    ) -> anyhow::Result<()>
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        internal!("Archive running");

        let Self {
            worker,
            reconciler,
            sweeper,
            ..
        } = self;

        // Subscribe before the trigger can fire.
        let receivers = (signals.subscribe(), signals.subscribe(), signals.subscribe());

        let services = async move {
            let (worker, reconciler, sweeper) = tokio::join!(
                worker.serve(receivers.0),
                reconciler.serve(receivers.1),
                sweeper.serve(receivers.2),
            );

            worker?;
            reconciler?;
            sweeper?;

            anyhow::Ok(())
        };

        let stop = async {
            let triggered = trigger.await;
            if signals.send(Signal::Shutdown).is_err() {
                tracing::debug!("No services left to stop");
            }
            triggered
        };

        let (triggered, stopped) = tokio::join!(stop, services);
        let ret = triggered.and(stopped);

        internal!("Shutting down...");
        if signals.send(Signal::Finalised).is_err() {
            tracing::trace!("Nobody waiting for finalisation");
        }

        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing.ron");

        let err = locate_in(Some(missing), &[]).expect_err("missing file");

        assert!(err.to_string().contains(CONFIG_ENV));
    }

    #[test]
    fn test_explicit_config_wins_over_candidates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let explicit = dir.path().join("explicit.ron");
        let candidate = dir.path().join("candidate.ron");
        std::fs::write(&explicit, "()").expect("write");
        std::fs::write(&candidate, "()").expect("write");

        assert_eq!(
            locate_in(Some(explicit.clone()), &[candidate]).expect("locate"),
            explicit
        );
    }

    #[test]
    fn test_first_existing_candidate_is_used() {
        let dir = tempfile::tempdir().expect("tempdir");
        let absent = dir.path().join("absent.ron");
        let present = dir.path().join("present.ron");
        std::fs::write(&present, "()").expect("write");

        assert_eq!(
            locate_in(None, &[absent.clone(), present.clone()]).expect("locate"),
            present
        );

        let err = locate_in(None, &[absent]).expect_err("nothing found");
        assert!(err.to_string().contains("absent.ron"));
    }

    #[test]
    fn test_load_names_the_broken_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.ron");
        std::fs::write(&path, "(message_store: Tape())").expect("write");

        let err = ArchiveConfig::load(&path).expect_err("invalid config");

        assert!(err.to_string().contains("broken.ron"));
    }

    #[test]
    fn test_load_applies_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mailarchive.config.ron");
        std::fs::write(&path, "(message_store: Memory(capacity: 3))").expect("write");

        let config = ArchiveConfig::load(&path).expect("load");

        assert_eq!(config.event_capacity, 64);
        assert_eq!(config.reconciler.interval_secs, 5);
    }
}
