//! File catalog
//!
//! JSON-persisted metadata for every uploaded file, independent of which
//! dataset is currently authoritative. The list is reread on access and
//! rewritten wholesale on change; uploads of an existing name replace the
//! entry rather than duplicating it.

use std::path::PathBuf;

use tracing::warn;

use crate::import::error::ImportError;
use crate::models::ImportedFile;

pub struct FileCatalog {
    path: PathBuf,
}

impl FileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// All catalog entries. A missing file is an empty catalog; a corrupt
    /// file is logged and treated the same.
    pub fn list(&self) -> Vec<ImportedFile> {
        match std::fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(files) => files,
                Err(err) => {
                    warn!(error = %err, "Corrupt file catalog, treating as empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        }
    }

    /// Insert an entry, replacing any existing entry with the same name.
    pub fn upsert(&self, entry: ImportedFile) -> Result<(), ImportError> {
        let mut files = self.list();
        files.retain(|f| f.name != entry.name);
        files.push(entry);
        self.write(&files)
    }

    /// Remove the entry for `name`. Returns whether an entry was present.
    pub fn remove(&self, name: &str) -> Result<bool, ImportError> {
        let mut files = self.list();
        let before = files.len();
        files.retain(|f| f.name != name);
        if files.len() == before {
            return Ok(false);
        }
        self.write(&files)?;
        Ok(true)
    }

    fn write(&self, files: &[ImportedFile]) -> Result<(), ImportError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(files)?;
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }
}
