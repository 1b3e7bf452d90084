use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use async_trait::async_trait;
use mailarchive_common::internal;
use tokio::fs;
use uuid::Uuid;

use crate::{StoreError, ValidationError, message::MessageStore};

const TEMP_PREFIX: &str = ".tmp_";

/// File-based message store.
///
/// Each message is a single file named after its UUID inside one directory.
/// Writes go to a `.tmp_` file first and are renamed into place, so a crash
/// never leaves a partially written message under its real name.
#[derive(Debug, Clone)]
pub struct FileMessageStore {
    path: PathBuf,
}

impl Default for FileMessageStore {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/mailarchive/messages"),
        }
    }
}

impl FileMessageStore {
    /// Reject relative paths, `..` components and system directories.
    ///
    /// # Errors
    /// The matching [`ValidationError`].
    fn validate_path(path: &Path) -> Result<(), ValidationError> {
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(ValidationError::ParentDirectory(path.display().to_string()));
        }

        if !path.is_absolute() {
            return Err(ValidationError::NotAbsolute(path.display().to_string()));
        }

        let sensitive_prefixes = [
            "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
        ];

        if let Some(prefix) = sensitive_prefixes
            .iter()
            .find(|prefix| path.starts_with(prefix))
        {
            return Err(ValidationError::SystemDirectory {
                prefix: (*prefix).to_string(),
                path: path.display().to_string(),
            });
        }

        Ok(())
    }

    #[must_use]
    pub fn builder() -> FileMessageStoreBuilder {
        FileMessageStoreBuilder::default()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn message_path(&self, id: Uuid) -> PathBuf {
        self.path.join(id.to_string())
    }

    /// Create the directory if needed and drop leftovers of interrupted writes.
    ///
    /// # Errors
    /// If the directory cannot be created or read, or the path exists but is
    /// not a directory.
    pub fn init(&self) -> crate::Result<()> {
        internal!("Initialising message store at {}", self.path.display());

        if !self.path.try_exists()? {
            internal!("{} does not exist, creating...", self.path.display());
            std::fs::create_dir_all(&self.path)?;
        } else if !self.path.is_dir() {
            return Err(ValidationError::NotDirectory(self.path.display().to_string()).into());
        }

        let mut cleaned = 0;
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                std::fs::remove_file(entry.path())?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} interrupted writes from message store"
            );
        }

        Ok(())
    }
}

#[async_trait]
impl MessageStore for FileMessageStore {
    #[tracing::instrument(level = "debug", skip(self, data), fields(size = data.len()))]
    async fn put(&self, id: Uuid, data: &[u8]) -> crate::Result<()> {
        let path = self.message_path(id);

        if fs::try_exists(&path).await? {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }

        let temp_path = self.path.join(format!("{TEMP_PREFIX}{id}"));
        fs::write(&temp_path, data).await?;
        fs::rename(&temp_path, &path).await?;

        internal!(level = DEBUG, "Stored message {id} at {}", path.display());

        Ok(())
    }

    async fn get(&self, id: Uuid) -> crate::Result<Vec<u8>> {
        match fs::read(self.message_path(id)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: Uuid) -> crate::Result<()> {
        match fs::remove_file(self.message_path(id)).await {
            Ok(()) => {
                internal!(level = DEBUG, "Deleted message {id}");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn contains(&self, id: Uuid) -> crate::Result<bool> {
        Ok(fs::try_exists(self.message_path(id)).await?)
    }

    /// Files whose name is not a UUID, such as interrupted writes, are skipped.
    async fn list(&self) -> crate::Result<Vec<Uuid>> {
        let mut entries = fs::read_dir(&self.path).await?;
        let mut ids = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| Uuid::parse_str(name).ok())
            {
                ids.push(id);
            }
        }

        Ok(ids)
    }
}

/// Builder for `FileMessageStore`
#[derive(Debug, Default)]
pub struct FileMessageStoreBuilder {
    path: PathBuf,
}

impl FileMessageStoreBuilder {
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// # Errors
    /// Returns an error if the path is invalid or points into a system directory
    pub fn build(self) -> crate::Result<FileMessageStore> {
        FileMessageStore::validate_path(&self.path)?;
        Ok(FileMessageStore { path: self.path })
    }
}
