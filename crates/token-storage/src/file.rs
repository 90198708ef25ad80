//! JSON-file backend.
//!
//! All keys live in one JSON object. Every write replaces the whole file via a
//! temporary sibling and a rename, so a crash mid-write leaves either the old
//! or the new document on disk, never a mix.

use crate::{SecureStorage, StorageError, StorageResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

type Document = BTreeMap<String, String>;

/// File-backed storage. Serializes writers within the process only.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Use `path` as the backing document. Parent directories are created.
    pub fn new(path: PathBuf) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> StorageResult<Document> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Document::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            StorageError::Encoding(format!("{}: {}", self.path.display(), e))
        })
    }

    fn write_document(&self, document: &Document) -> StorageResult<()> {
        if document.is_empty() {
            return match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            };
        }

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, document)?;
        tmp.flush()?;
        restrict_permissions(tmp.path())?;
        tmp.persist(&self.path).map_err(|e| StorageError::Io(e.error))?;

        debug!(path = %self.path.display(), keys = document.len(), "storage file written");
        Ok(())
    }

    /// Document for a read-modify-write. An unreadable file holds nothing
    /// recoverable and is overwritten.
    fn read_document_for_write(&self) -> StorageResult<(Document, bool)> {
        match self.read_document() {
            Ok(document) => Ok((document, false)),
            Err(StorageError::Encoding(reason)) => {
                warn!(path = %self.path.display(), %reason, "replacing unreadable storage file");
                Ok((Document::new(), true))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> StorageResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> StorageResult<()> {
    Ok(())
}

impl SecureStorage for FileStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.write_lock.lock();
        let (mut document, _) = self.read_document_for_write()?;
        document.insert(key.to_string(), value.to_string());
        self.write_document(&document)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.read_document()?.remove(key))
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let _guard = self.write_lock.lock();
        let (mut document, reset) = self.read_document_for_write()?;
        let removed = document.remove(key).is_some();
        if removed || reset {
            self.write_document(&document)?;
        }
        Ok(removed || reset)
    }
}
