//! Query & aggregation layer
//!
//! Answers filtered reads and summary statistics over whichever source the
//! registry currently selects. When the selector is `csv` and the imported
//! batch is non-empty the batch serves the read; otherwise the call is
//! delegated, with identical filter semantics, to the live-store
//! collaborator. An empty imported batch therefore falls back to the live
//! store rather than returning an empty result.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::import::SourceRegistry;
use crate::models::{
    ActivityStats, ActivityType, DataSource, LocationCount, NetworkCount, TelecomActivity,
};
use crate::store::LiveStore;

/// Lookback window tokens accepted by the query endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Hour,
    SixHours,
    Day,
    Week,
    Month,
    All,
}

/// Default window for the telecom activity, fraud, and stats call sites
pub const ACTIVITY_DEFAULT_RANGE: TimeRange = TimeRange::Day;

/// Default window for the dashboard activity feed
pub const DASHBOARD_DEFAULT_RANGE: TimeRange = TimeRange::Hour;

impl TimeRange {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "hour" => Some(TimeRange::Hour),
            "6hours" => Some(TimeRange::SixHours),
            "24hours" => Some(TimeRange::Day),
            "week" => Some(TimeRange::Week),
            "month" => Some(TimeRange::Month),
            "all" => Some(TimeRange::All),
            _ => None,
        }
    }

    /// Absent and unrecognized tokens both resolve to the call site's default.
    pub fn parse_or(token: Option<&str>, default: TimeRange) -> TimeRange {
        token.and_then(TimeRange::parse).unwrap_or(default)
    }

    /// Lookback window ending at the current instant; `None` means unbounded.
    pub fn window(&self) -> Option<Duration> {
        match self {
            TimeRange::Hour => Some(Duration::hours(1)),
            TimeRange::SixHours => Some(Duration::hours(6)),
            TimeRange::Day => Some(Duration::hours(24)),
            TimeRange::Week => Some(Duration::days(7)),
            TimeRange::Month => Some(Duration::days(30)),
            TimeRange::All => None,
        }
    }

    /// Inclusion test: `now - window <= timestamp <= now`, both ends closed.
    pub fn contains(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.window() {
            Some(window) => timestamp >= now - window && timestamp <= now,
            None => true,
        }
    }
}

/// Query service over the active data source
pub struct ActivityQueryService {
    registry: Arc<SourceRegistry>,
    live: Arc<dyn LiveStore>,
}

impl ActivityQueryService {
    pub fn new(registry: Arc<SourceRegistry>, live: Arc<dyn LiveStore>) -> Self {
        Self { registry, live }
    }

    /// The imported batch, but only when it is the authoritative source and
    /// non-empty. Everything else delegates to the live store.
    fn imported_batch(&self) -> Option<Arc<Vec<TelecomActivity>>> {
        if self.registry.current_source() == DataSource::Csv {
            let batch = self.registry.batch();
            if !batch.is_empty() {
                return Some(batch);
            }
        }
        None
    }

    pub fn list_activities(
        &self,
        user_id: Option<&str>,
        limit: Option<usize>,
        range_token: Option<&str>,
    ) -> Result<Vec<TelecomActivity>> {
        let range = TimeRange::parse_or(range_token, ACTIVITY_DEFAULT_RANGE);
        match self.imported_batch() {
            Some(batch) => Ok(filter_activities(&batch, user_id, limit, range)),
            None => self.live.list_activities(user_id, limit, range),
        }
    }

    /// Recent-activity feed for the dashboard. Same read path as
    /// [`list_activities`] but with a one-hour default window.
    pub fn dashboard_activity(&self, range_token: Option<&str>) -> Result<Vec<TelecomActivity>> {
        let range = TimeRange::parse_or(range_token, DASHBOARD_DEFAULT_RANGE);
        match self.imported_batch() {
            Some(batch) => Ok(filter_activities(&batch, None, None, range)),
            None => self.live.list_activities(None, None, range),
        }
    }

    pub fn list_fraud_activities(
        &self,
        user_id: Option<&str>,
        range_token: Option<&str>,
    ) -> Result<Vec<TelecomActivity>> {
        let range = TimeRange::parse_or(range_token, ACTIVITY_DEFAULT_RANGE);
        match self.imported_batch() {
            Some(batch) => {
                let now = Utc::now();
                Ok(batch
                    .iter()
                    .filter(|a| a.is_spam_or_fraud)
                    .filter(|a| range.contains(a.timestamp, now))
                    .filter(|a| user_id.map_or(true, |u| a.user_id == u))
                    .cloned()
                    .collect())
            }
            None => self.live.list_fraud_activities(user_id, range),
        }
    }

    pub fn compute_stats(&self, range_token: Option<&str>) -> Result<ActivityStats> {
        let range = TimeRange::parse_or(range_token, ACTIVITY_DEFAULT_RANGE);
        match self.imported_batch() {
            Some(batch) => {
                let now = Utc::now();
                Ok(aggregate_stats(
                    batch.iter().filter(|a| range.contains(a.timestamp, now)),
                ))
            }
            None => self.live.compute_stats(range),
        }
    }
}

/// Time-range, identity, then limit, in that order.
pub fn filter_activities(
    batch: &[TelecomActivity],
    user_id: Option<&str>,
    limit: Option<usize>,
    range: TimeRange,
) -> Vec<TelecomActivity> {
    let now = Utc::now();
    let mut activities: Vec<TelecomActivity> = batch
        .iter()
        .filter(|a| range.contains(a.timestamp, now))
        .filter(|a| user_id.map_or(true, |u| a.user_id == u))
        .cloned()
        .collect();
    if let Some(limit) = limit {
        activities.truncate(limit);
    }
    activities
}

/// Summary statistics over a set of records. Location ties keep first-seen
/// order: counts accumulate in encounter order and the sort is stable.
pub fn aggregate_stats<'a, I>(activities: I) -> ActivityStats
where
    I: IntoIterator<Item = &'a TelecomActivity>,
{
    let mut total = 0usize;
    let mut call_count = 0usize;
    let mut sms_count = 0usize;
    let mut data_count = 0usize;
    let mut fraud_count = 0usize;
    let mut locations: Vec<LocationCount> = Vec::new();
    let mut networks: Vec<NetworkCount> = Vec::new();

    for activity in activities {
        total += 1;
        match activity.activity_type {
            ActivityType::Call => call_count += 1,
            ActivityType::Sms => sms_count += 1,
            ActivityType::Data => data_count += 1,
        }
        if activity.is_spam_or_fraud {
            fraud_count += 1;
        }

        match locations.iter_mut().find(|l| l.location == activity.location) {
            Some(bucket) => bucket.count += 1,
            None => locations.push(LocationCount {
                location: activity.location.clone(),
                count: 1,
            }),
        }
        match networks
            .iter_mut()
            .find(|n| n.network == activity.network_type)
        {
            Some(bucket) => bucket.count += 1,
            None => networks.push(NetworkCount {
                network: activity.network_type.clone(),
                count: 1,
            }),
        }
    }

    locations.sort_by(|a, b| b.count.cmp(&a.count));
    locations.truncate(5);

    ActivityStats {
        total_activities: total,
        call_count,
        sms_count,
        data_count,
        fraud_count,
        fraud_rate: if total == 0 {
            0.0
        } else {
            fraud_count as f64 / total as f64
        },
        top_locations: locations,
        network_usage: networks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tempfile::tempdir;

    /// Records which calls reached the live store, and answers with a fixed
    /// dataset.
    struct StubLiveStore {
        records: Vec<TelecomActivity>,
        calls: Mutex<usize>,
    }

    impl StubLiveStore {
        fn new(records: Vec<TelecomActivity>) -> Self {
            Self {
                records,
                calls: Mutex::new(0),
            }
        }

        fn call_count(&self) -> usize {
            *self.calls.lock()
        }
    }

    impl LiveStore for StubLiveStore {
        fn list_activities(
            &self,
            user_id: Option<&str>,
            limit: Option<usize>,
            range: TimeRange,
        ) -> Result<Vec<TelecomActivity>> {
            *self.calls.lock() += 1;
            Ok(filter_activities(&self.records, user_id, limit, range))
        }

        fn list_fraud_activities(
            &self,
            _user_id: Option<&str>,
            _range: TimeRange,
        ) -> Result<Vec<TelecomActivity>> {
            *self.calls.lock() += 1;
            Ok(self
                .records
                .iter()
                .filter(|a| a.is_spam_or_fraud)
                .cloned()
                .collect())
        }

        fn compute_stats(&self, _range: TimeRange) -> Result<ActivityStats> {
            *self.calls.lock() += 1;
            Ok(aggregate_stats(self.records.iter()))
        }
    }

    fn activity(user: &str, kind: ActivityType, age: Duration) -> TelecomActivity {
        TelecomActivity {
            id: format!("csv_test_{user}"),
            user_id: user.to_string(),
            activity_type: kind,
            timestamp: Utc::now() - age,
            duration_sec: 10,
            location: "Unknown".to_string(),
            network_type: "4G".to_string(),
            peer_number: "unknown".to_string(),
            is_roaming: false,
            is_spam_or_fraud: false,
            data_usage_mb: 0.0,
            cost: 0.0,
            source: "csv_import".to_string(),
        }
    }

    fn service_with(
        batch: Vec<TelecomActivity>,
        source: DataSource,
        live_records: Vec<TelecomActivity>,
    ) -> (ActivityQueryService, Arc<StubLiveStore>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let registry = Arc::new(SourceRegistry::load(dir.path().join("metadata.json")));
        registry.install_batch(batch, source).unwrap();
        let stub = Arc::new(StubLiveStore::new(live_records));
        let service = ActivityQueryService::new(registry, stub.clone());
        (service, stub, dir)
    }

    #[test]
    fn test_time_range_tokens() {
        assert_eq!(TimeRange::parse("hour"), Some(TimeRange::Hour));
        assert_eq!(TimeRange::parse("6hours"), Some(TimeRange::SixHours));
        assert_eq!(TimeRange::parse("24hours"), Some(TimeRange::Day));
        assert_eq!(TimeRange::parse("week"), Some(TimeRange::Week));
        assert_eq!(TimeRange::parse("month"), Some(TimeRange::Month));
        assert_eq!(TimeRange::parse("all"), Some(TimeRange::All));
        assert_eq!(TimeRange::parse("fortnight"), None);
    }

    #[test]
    fn test_call_site_defaults() {
        assert_eq!(
            TimeRange::parse_or(None, ACTIVITY_DEFAULT_RANGE),
            TimeRange::Day
        );
        assert_eq!(
            TimeRange::parse_or(Some("fortnight"), ACTIVITY_DEFAULT_RANGE),
            TimeRange::Day
        );
        assert_eq!(
            TimeRange::parse_or(None, DASHBOARD_DEFAULT_RANGE),
            TimeRange::Hour
        );
    }

    #[test]
    fn test_window_boundaries_inclusive() {
        let now = Utc::now();
        for range in [
            TimeRange::Hour,
            TimeRange::SixHours,
            TimeRange::Day,
            TimeRange::Week,
            TimeRange::Month,
        ] {
            let window = range.window().unwrap();
            assert!(
                range.contains(now - window, now),
                "{range:?}: timestamp exactly at the window edge must be included"
            );
            assert!(
                !range.contains(now - window - Duration::seconds(1), now),
                "{range:?}: one second past the window must be excluded"
            );
            assert!(!range.contains(now + Duration::seconds(1), now));
        }
        assert!(TimeRange::All.contains(now - Duration::days(3650), now));
    }

    #[test]
    fn test_serves_from_batch_when_csv_selected() {
        let batch = vec![activity("a", ActivityType::Call, Duration::minutes(5))];
        let (service, stub, _dir) = service_with(batch, DataSource::Csv, Vec::new());

        let activities = service.list_activities(None, None, None).unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(stub.call_count(), 0);
    }

    #[test]
    fn test_database_source_delegates_to_live_store() {
        let live = vec![activity("live", ActivityType::Call, Duration::minutes(5))];
        let batch = vec![activity("csv", ActivityType::Call, Duration::minutes(5))];
        let (service, stub, _dir) = service_with(batch, DataSource::Database, live);

        let activities = service.list_activities(None, None, None).unwrap();
        assert_eq!(activities[0].user_id, "live");
        assert_eq!(stub.call_count(), 1);
    }

    #[test]
    fn test_empty_csv_batch_falls_back_to_live_store() {
        let live = vec![activity("live", ActivityType::Call, Duration::minutes(5))];
        let (service, stub, _dir) = service_with(Vec::new(), DataSource::Csv, live);

        let activities = service.list_activities(None, None, None).unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].user_id, "live");
        assert_eq!(stub.call_count(), 1);
    }

    #[test]
    fn test_user_filter_and_limit() {
        let batch = vec![
            activity("a", ActivityType::Call, Duration::minutes(1)),
            activity("b", ActivityType::Call, Duration::minutes(2)),
            activity("a", ActivityType::Sms, Duration::minutes(3)),
            activity("a", ActivityType::Call, Duration::minutes(4)),
        ];
        let (service, _stub, _dir) = service_with(batch, DataSource::Csv, Vec::new());

        let activities = service.list_activities(Some("a"), Some(2), None).unwrap();
        assert_eq!(activities.len(), 2);
        assert!(activities.iter().all(|a| a.user_id == "a"));
    }

    #[test]
    fn test_time_range_excludes_old_records() {
        let batch = vec![
            activity("recent", ActivityType::Call, Duration::minutes(30)),
            activity("old", ActivityType::Call, Duration::days(2)),
        ];
        let (service, _stub, _dir) = service_with(batch, DataSource::Csv, Vec::new());

        let activities = service.list_activities(None, None, Some("hour")).unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].user_id, "recent");

        let all = service.list_activities(None, None, Some("all")).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_fraud_listing_filters_flagged_records() {
        let mut fraud = activity("a", ActivityType::Call, Duration::minutes(1));
        fraud.is_spam_or_fraud = true;
        let batch = vec![fraud, activity("b", ActivityType::Call, Duration::minutes(1))];
        let (service, _stub, _dir) = service_with(batch, DataSource::Csv, Vec::new());

        let flagged = service.list_fraud_activities(None, None).unwrap();
        assert_eq!(flagged.len(), 1);
        assert!(flagged[0].is_spam_or_fraud);
    }

    #[test]
    fn test_stats_partitions_and_fraud_rate() {
        let mut fraud = activity("a", ActivityType::Call, Duration::minutes(1));
        fraud.is_spam_or_fraud = true;
        let batch = vec![
            fraud,
            activity("b", ActivityType::Sms, Duration::minutes(1)),
            activity("c", ActivityType::Data, Duration::minutes(1)),
            activity("d", ActivityType::Call, Duration::minutes(1)),
        ];
        let (service, _stub, _dir) = service_with(batch, DataSource::Csv, Vec::new());

        let stats = service.compute_stats(None).unwrap();
        assert_eq!(stats.total_activities, 4);
        assert_eq!(stats.call_count, 2);
        assert_eq!(stats.sms_count, 1);
        assert_eq!(stats.data_count, 1);
        assert_eq!(stats.fraud_count, 1);
        assert!((stats.fraud_rate - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fraud_rate_zero_when_empty() {
        let stats = aggregate_stats(std::iter::empty::<&TelecomActivity>());
        assert_eq!(stats.total_activities, 0);
        assert_eq!(stats.fraud_rate, 0.0);
    }

    #[test]
    fn test_top_locations_capped_with_stable_ties() {
        let mut batch = Vec::new();
        for (location, copies) in [
            ("Oslo", 3),
            ("Bergen", 2),
            ("Trondheim", 2),
            ("Stavanger", 1),
            ("Tromso", 1),
            ("Drammen", 1),
        ] {
            for _ in 0..copies {
                let mut a = activity("u", ActivityType::Call, Duration::minutes(1));
                a.location = location.to_string();
                batch.push(a);
            }
        }

        let stats = aggregate_stats(batch.iter());
        assert_eq!(stats.top_locations.len(), 5);
        assert_eq!(stats.top_locations[0].location, "Oslo");
        // Bergen and Trondheim tie at 2; first-seen order wins.
        assert_eq!(stats.top_locations[1].location, "Bergen");
        assert_eq!(stats.top_locations[2].location, "Trondheim");
        // Stavanger, Tromso, Drammen tie at 1; only the first two fit.
        assert_eq!(stats.top_locations[3].location, "Stavanger");
        assert_eq!(stats.top_locations[4].location, "Tromso");
    }
}
