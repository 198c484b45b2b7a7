//! SQLite-backed live store

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::models::{ActivityStats, ActivityType, TelecomActivity};
use crate::query::{aggregate_stats, TimeRange};
use crate::store::LiveStore;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS telecom_activities (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    activity_type TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    duration_sec INTEGER NOT NULL,
    location TEXT NOT NULL,
    network_type TEXT NOT NULL,
    peer_number TEXT NOT NULL,
    is_roaming INTEGER NOT NULL,
    is_spam_or_fraud INTEGER NOT NULL,
    data_usage_mb REAL NOT NULL,
    cost REAL NOT NULL,
    source TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_activities_timestamp
    ON telecom_activities(timestamp DESC);

CREATE INDEX IF NOT EXISTS idx_activities_user
    ON telecom_activities(user_id, timestamp DESC);
"#;

pub struct SqliteLiveStore {
    conn: Mutex<Connection>,
}

impl SqliteLiveStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open live store at {db_path}"))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize live store schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Bulk insert, primarily for seeding and tests.
    pub fn insert_activities(&self, activities: &[TelecomActivity]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO telecom_activities
                 (id, user_id, activity_type, timestamp, duration_sec, location,
                  network_type, peer_number, is_roaming, is_spam_or_fraud,
                  data_usage_mb, cost, source)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for a in activities {
                stmt.execute(params![
                    a.id,
                    a.user_id,
                    a.activity_type.as_str(),
                    a.timestamp.to_rfc3339(),
                    a.duration_sec,
                    a.location,
                    a.network_type,
                    a.peer_number,
                    a.is_roaming as i64,
                    a.is_spam_or_fraud as i64,
                    a.data_usage_mb,
                    a.cost,
                    a.source,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load(&self, user_id: Option<&str>, fraud_only: bool) -> Result<Vec<TelecomActivity>> {
        let conn = self.conn.lock();

        let mut sql = String::from(
            "SELECT id, user_id, activity_type, timestamp, duration_sec, location,
                    network_type, peer_number, is_roaming, is_spam_or_fraud,
                    data_usage_mb, cost, source
             FROM telecom_activities",
        );
        let mut clauses = Vec::new();
        if user_id.is_some() {
            clauses.push("user_id = ?1");
        }
        if fraud_only {
            clauses.push("is_spam_or_fraud = 1");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY timestamp DESC");

        let mut stmt = conn.prepare(&sql)?;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<TelecomActivity> {
            let type_str: String = row.get(2)?;
            let ts_str: String = row.get(3)?;
            Ok(TelecomActivity {
                id: row.get(0)?,
                user_id: row.get(1)?,
                activity_type: ActivityType::from_str(&type_str).unwrap_or(ActivityType::Call),
                timestamp: DateTime::parse_from_rfc3339(&ts_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                duration_sec: row.get(4)?,
                location: row.get(5)?,
                network_type: row.get(6)?,
                peer_number: row.get(7)?,
                is_roaming: row.get::<_, i64>(8)? != 0,
                is_spam_or_fraud: row.get::<_, i64>(9)? != 0,
                data_usage_mb: row.get(10)?,
                cost: row.get(11)?,
                source: row.get(12)?,
            })
        };

        let rows = match user_id {
            Some(user) => stmt.query_map(params![user], map_row)?,
            None => stmt.query_map([], map_row)?,
        };

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl LiveStore for SqliteLiveStore {
    fn list_activities(
        &self,
        user_id: Option<&str>,
        limit: Option<usize>,
        range: TimeRange,
    ) -> Result<Vec<TelecomActivity>> {
        let now = Utc::now();
        let mut activities: Vec<TelecomActivity> = self
            .load(user_id, false)?
            .into_iter()
            .filter(|a| range.contains(a.timestamp, now))
            .collect();
        if let Some(limit) = limit {
            activities.truncate(limit);
        }
        Ok(activities)
    }

    fn list_fraud_activities(
        &self,
        user_id: Option<&str>,
        range: TimeRange,
    ) -> Result<Vec<TelecomActivity>> {
        let now = Utc::now();
        Ok(self
            .load(user_id, true)?
            .into_iter()
            .filter(|a| range.contains(a.timestamp, now))
            .collect())
    }

    fn compute_stats(&self, range: TimeRange) -> Result<ActivityStats> {
        let now = Utc::now();
        let activities: Vec<TelecomActivity> = self
            .load(None, false)?
            .into_iter()
            .filter(|a| range.contains(a.timestamp, now))
            .collect();
        Ok(aggregate_stats(activities.iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn activity(user: &str, kind: ActivityType, age: Duration, fraud: bool) -> TelecomActivity {
        TelecomActivity {
            id: format!("db_{user}_{}", age.num_seconds()),
            user_id: user.to_string(),
            activity_type: kind,
            timestamp: Utc::now() - age,
            duration_sec: 30,
            location: "Oslo".to_string(),
            network_type: "5G".to_string(),
            peer_number: "555-0000".to_string(),
            is_roaming: false,
            is_spam_or_fraud: fraud,
            data_usage_mb: 1.5,
            cost: 0.25,
            source: "database".to_string(),
        }
    }

    fn open_store(dir: &std::path::Path) -> SqliteLiveStore {
        SqliteLiveStore::open(dir.join("live.db").to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_insert_and_list_round_trip() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        store
            .insert_activities(&[
                activity("a", ActivityType::Call, Duration::minutes(5), false),
                activity("b", ActivityType::Sms, Duration::minutes(10), true),
            ])
            .unwrap();

        let all = store.list_activities(None, None, TimeRange::All).unwrap();
        assert_eq!(all.len(), 2);
        // Newest first.
        assert_eq!(all[0].user_id, "a");
        assert_eq!(all[0].activity_type, ActivityType::Call);
    }

    #[test]
    fn test_user_filter_and_limit() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        store
            .insert_activities(&[
                activity("a", ActivityType::Call, Duration::minutes(1), false),
                activity("a", ActivityType::Call, Duration::minutes(2), false),
                activity("b", ActivityType::Call, Duration::minutes(3), false),
            ])
            .unwrap();

        let filtered = store
            .list_activities(Some("a"), Some(1), TimeRange::All)
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].user_id, "a");
    }

    #[test]
    fn test_fraud_listing() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        store
            .insert_activities(&[
                activity("a", ActivityType::Call, Duration::minutes(1), true),
                activity("b", ActivityType::Call, Duration::minutes(2), false),
            ])
            .unwrap();

        let flagged = store.list_fraud_activities(None, TimeRange::All).unwrap();
        assert_eq!(flagged.len(), 1);
        assert!(flagged[0].is_spam_or_fraud);
    }

    #[test]
    fn test_range_filter_applies() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        store
            .insert_activities(&[
                activity("recent", ActivityType::Call, Duration::minutes(10), false),
                activity("old", ActivityType::Call, Duration::days(2), false),
            ])
            .unwrap();

        let recent = store.list_activities(None, None, TimeRange::Hour).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].user_id, "recent");
    }

    #[test]
    fn test_stats_over_store() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        store
            .insert_activities(&[
                activity("a", ActivityType::Call, Duration::minutes(1), true),
                activity("b", ActivityType::Data, Duration::minutes(2), false),
            ])
            .unwrap();

        let stats = store.compute_stats(TimeRange::All).unwrap();
        assert_eq!(stats.total_activities, 2);
        assert_eq!(stats.call_count, 1);
        assert_eq!(stats.data_count, 1);
        assert_eq!(stats.fraud_count, 1);
        assert!((stats.fraud_rate - 0.5).abs() < f64::EPSILON);
    }
}
