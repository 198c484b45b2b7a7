//! Live store collaborator
//!
//! The read target used whenever the imported batch is not authoritative.
//! The contract is fixed and small; the SQLite implementation behind it is
//! deliberately minimal.

pub mod sqlite;

use anyhow::Result;

use crate::models::{ActivityStats, TelecomActivity};
use crate::query::TimeRange;

pub use sqlite::SqliteLiveStore;

/// Fixed read contract of the live store
pub trait LiveStore: Send + Sync {
    fn list_activities(
        &self,
        user_id: Option<&str>,
        limit: Option<usize>,
        range: TimeRange,
    ) -> Result<Vec<TelecomActivity>>;

    fn list_fraud_activities(
        &self,
        user_id: Option<&str>,
        range: TimeRange,
    ) -> Result<Vec<TelecomActivity>>;

    fn compute_stats(&self, range: TimeRange) -> Result<ActivityStats>;
}
