//! Source registry
//!
//! Owns the persisted choice between the live store and the imported batch,
//! and the batch itself. The batch is held behind an `ArcSwap` and only ever
//! replaced wholesale, so concurrent readers see either the old batch or the
//! new one, never a torn mix. Selector and batch are written to one metadata
//! file together: a crash after a successful ingest cannot leave the selector
//! pointing at `csv` with no batch on disk.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::import::error::ImportError;
use crate::models::{DataSource, TelecomActivity};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState {
    current_data_source: DataSource,
    #[serde(default)]
    imported_batch: Vec<TelecomActivity>,
    #[allow(dead_code)]
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedStateRef<'a> {
    current_data_source: DataSource,
    imported_batch: &'a [TelecomActivity],
    last_updated: DateTime<Utc>,
}

pub struct SourceRegistry {
    metadata_path: PathBuf,
    source: RwLock<DataSource>,
    batch: ArcSwap<Vec<TelecomActivity>>,
}

impl SourceRegistry {
    /// Load persisted state from the metadata file. A missing or corrupt file
    /// is not fatal: the registry starts on the live store with an empty batch.
    pub fn load(metadata_path: impl Into<PathBuf>) -> Self {
        let metadata_path = metadata_path.into();

        let (source, batch) = match std::fs::read(&metadata_path) {
            Ok(bytes) => match serde_json::from_slice::<PersistedState>(&bytes) {
                Ok(state) => {
                    info!(
                        source = state.current_data_source.as_str(),
                        records = state.imported_batch.len(),
                        "Restored import state from metadata"
                    );
                    (state.current_data_source, state.imported_batch)
                }
                Err(err) => {
                    warn!(error = %err, "Corrupt metadata file, starting from defaults");
                    (DataSource::Database, Vec::new())
                }
            },
            Err(_) => (DataSource::Database, Vec::new()),
        };

        Self {
            metadata_path,
            source: RwLock::new(source),
            batch: ArcSwap::from_pointee(batch),
        }
    }

    pub fn current_source(&self) -> DataSource {
        *self.source.read()
    }

    /// Current imported batch. Cheap clone of the Arc, safe to hold across
    /// an overlapping ingest.
    pub fn batch(&self) -> Arc<Vec<TelecomActivity>> {
        self.batch.load_full()
    }

    /// Switch the authoritative source and persist the choice immediately.
    /// Switching to `csv` with an empty batch is valid.
    pub fn set_source(&self, source: DataSource) -> Result<(), ImportError> {
        let batch = self.batch.load_full();
        self.persist(source, &batch)?;
        *self.source.write() = source;
        info!(source = source.as_str(), "Data source switched");
        Ok(())
    }

    /// Replace the imported batch wholesale and flip the selector, durably,
    /// in a single metadata write. The in-memory state is only updated after
    /// the write succeeds.
    pub fn install_batch(
        &self,
        records: Vec<TelecomActivity>,
        source: DataSource,
    ) -> Result<(), ImportError> {
        let records = Arc::new(records);
        self.persist(source, &records)?;
        self.batch.store(records);
        *self.source.write() = source;
        Ok(())
    }

    fn persist(&self, source: DataSource, batch: &[TelecomActivity]) -> Result<(), ImportError> {
        if let Some(parent) = self.metadata_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let state = PersistedStateRef {
            current_data_source: source,
            imported_batch: batch,
            last_updated: Utc::now(),
        };
        let bytes = serde_json::to_vec_pretty(&state)?;
        std::fs::write(&self.metadata_path, bytes)?;
        Ok(())
    }
}
