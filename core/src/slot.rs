use std::{io::ErrorKind, path::PathBuf};

use async_trait::async_trait;
use tokio::{fs, io::AsyncWriteExt};
use tracing::trace;

use crate::error::StorageError;

/// A single named byte-stream destination.
///
/// `read` of a slot that has never been written must fail with
/// [`StorageError::NotFound`].
#[async_trait]
pub trait StorageSlot: Send + Sync {
    async fn read(&self) -> Result<Vec<u8>, StorageError>;
    async fn can_read(&self) -> Result<(), StorageError>;
    async fn write(&self, data: &[u8]) -> Result<(), StorageError>;
    async fn can_write(&self) -> Result<(), StorageError>;
    fn describe(&self) -> String;
}

pub struct FileSlot {
    path: PathBuf,
    mode: Option<u32>,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: None,
        }
    }

    /// Unix permission bits the file carries before any data lands in it.
    /// Ignored elsewhere.
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    #[cfg(unix)]
    async fn open_for_write(&self) -> Result<fs::File, StorageError> {
        use std::os::unix::fs::PermissionsExt;
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        let Some(mode) = self.mode else {
            return Ok(options.open(&self.path).await?);
        };
        let file = options.mode(mode).open(&self.path).await?;
        // creation mode is masked by the umask and skipped for existing files
        file.set_permissions(std::fs::Permissions::from_mode(mode))
            .await?;
        Ok(file)
    }

    #[cfg(not(unix))]
    async fn open_for_write(&self) -> Result<fs::File, StorageError> {
        Ok(fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .await?)
    }
}

#[async_trait]
impl StorageSlot for FileSlot {
    async fn read(&self) -> Result<Vec<u8>, StorageError> {
        trace!("reading {}", self.path.display());
        fs::read(&self.path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound,
            _ => e.into(),
        })
    }

    async fn can_read(&self) -> Result<(), StorageError> {
        match fs::File::open(&self.path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, data: &[u8]) -> Result<(), StorageError> {
        trace!("writing {} bytes to {}", data.len(), self.path.display());
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut file = self.open_for_write().await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    async fn can_write(&self) -> Result<(), StorageError> {
        if fs::metadata(&self.path).await.is_ok() {
            fs::OpenOptions::new().append(true).open(&self.path).await?;
            return Ok(());
        }
        // walk up to the closest existing ancestor, which must be a writable directory
        let mut dir = self.path.parent();
        while let Some(d) = dir.filter(|p| !p.as_os_str().is_empty()) {
            if let Ok(meta) = fs::metadata(d).await {
                if !meta.is_dir() {
                    return Err(StorageError::Other(format!(
                        "{} is not a directory",
                        d.display()
                    )));
                }
                if meta.permissions().readonly() {
                    return Err(StorageError::Other(format!(
                        "{} is read only",
                        d.display()
                    )));
                }
                return Ok(());
            }
            dir = d.parent();
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unwritten_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let slot = FileSlot::new(dir.path().join("missing.pem"));
        assert!(slot.read().await.unwrap_err().is_not_found());
        assert!(slot.can_read().await.unwrap_err().is_not_found());
        assert!(slot.can_write().await.is_ok());
    }

    #[tokio::test]
    async fn write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let slot = FileSlot::new(dir.path().join("a/b/cert.pem"));
        slot.write(b"CERT\n").await.unwrap();
        assert_eq!(slot.read().await.unwrap(), b"CERT\n");
        assert!(slot.can_read().await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn write_applies_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.pem");
        let slot = FileSlot::new(&path).with_mode(0o600);
        slot.write(b"KEY\n").await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(slot.read().await.unwrap(), b"KEY\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn write_tightens_existing_file_before_replacing_it() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.pem");
        std::fs::write(&path, b"OLD KEY WITH MORE BYTES\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let slot = FileSlot::new(&path).with_mode(0o600);
        slot.write(b"KEY\n").await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read(&path).unwrap(), b"KEY\n");
    }
}
