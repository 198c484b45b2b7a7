//! Ingestion pipeline
//!
//! Takes one uploaded file at a time: persists the raw bytes, streams them
//! through the CSV parser, normalizes every row, then installs the result as
//! the new imported batch and records the file in the catalog. A structurally
//! broken document aborts the whole upload with no partial commit; rows that
//! fail normalization are dropped and counted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::import::catalog::FileCatalog;
use crate::import::error::ImportError;
use crate::import::normalizer;
use crate::import::registry::SourceRegistry;
use crate::models::{DataSource, FileStatus, ImportedFile};

/// Upload size cap, enforced at the boundary before any bytes are stored
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub record_count: usize,
    pub filename: String,
}

pub struct ImportEngine {
    upload_dir: PathBuf,
    registry: Arc<SourceRegistry>,
    catalog: FileCatalog,
}

impl ImportEngine {
    pub fn new(
        upload_dir: impl Into<PathBuf>,
        registry: Arc<SourceRegistry>,
    ) -> Result<Self, ImportError> {
        let upload_dir = upload_dir.into();
        std::fs::create_dir_all(&upload_dir)?;
        let catalog = FileCatalog::new(upload_dir.join("files.json"));
        Ok(Self {
            upload_dir,
            registry,
            catalog,
        })
    }

    /// Boundary validation: file type by declared media type or extension,
    /// and the payload size cap. Runs before ingestion starts.
    pub fn validate_upload(
        filename: &str,
        content_type: Option<&str>,
        size: usize,
    ) -> Result<(), ImportError> {
        let type_ok = content_type == Some("text/csv");
        let name_ok = filename.ends_with(".csv");
        if !type_ok && !name_ok {
            return Err(ImportError::InvalidFileType);
        }
        if size > MAX_UPLOAD_BYTES {
            return Err(ImportError::PayloadTooLarge {
                limit: MAX_UPLOAD_BYTES,
            });
        }
        Ok(())
    }

    /// Parse and normalize an uploaded file, then make it the authoritative
    /// dataset. On success the batch and the `csv` selector are durable
    /// before this returns, and the catalog holds an active entry for the
    /// file.
    pub fn ingest(&self, filename: &str, content: &[u8]) -> Result<ImportSummary, ImportError> {
        let filename = sanitize_filename(filename);

        let destination = self.upload_dir.join(filename);
        std::fs::write(&destination, content)?;

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content);

        let headers = reader.headers()?.clone();
        let mut records = Vec::new();
        let mut skipped = 0usize;

        for result in reader.records() {
            let record = result?;
            let row: HashMap<String, String> = headers
                .iter()
                .zip(record.iter())
                .map(|(header, value)| (header.to_string(), value.to_string()))
                .collect();

            match normalizer::normalize(&row) {
                Some(activity) => records.push(activity),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!(skipped, file = filename, "Dropped rows during normalization");
        }

        let record_count = records.len();
        self.registry.install_batch(records, DataSource::Csv)?;

        self.catalog.upsert(ImportedFile {
            name: filename.to_string(),
            size: content.len() as u64,
            record_count,
            uploaded_at: Utc::now(),
            status: FileStatus::Active,
        })?;

        info!(
            file = filename,
            records = record_count,
            "CSV import complete, data source switched to csv"
        );

        Ok(ImportSummary {
            record_count,
            filename: filename.to_string(),
        })
    }

    pub fn uploaded_files(&self) -> Vec<ImportedFile> {
        self.catalog.list()
    }

    /// Delete the stored file and its catalog entry. Does not retract records
    /// from an already-installed batch. Returns whether anything was deleted.
    pub fn delete_file(&self, filename: &str) -> Result<bool, ImportError> {
        let filename = sanitize_filename(filename);

        let path = self.upload_dir.join(filename);
        let raw_existed = path.is_file();
        if raw_existed {
            std::fs::remove_file(&path)?;
        }
        let entry_removed = self.catalog.remove(filename)?;

        if raw_existed || entry_removed {
            info!(file = filename, "Uploaded file deleted");
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Uploads are stored under their final path component only.
fn sanitize_filename(filename: &str) -> &str {
    Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(filename)
}
