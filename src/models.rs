use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of telecom usage event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Call,
    Sms,
    Data,
}

impl ActivityType {
    pub fn as_str(&self) -> &str {
        match self {
            ActivityType::Call => "call",
            ActivityType::Sms => "sms",
            ActivityType::Data => "data",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "call" => Some(ActivityType::Call),
            "sms" => Some(ActivityType::Sms),
            "data" => Some(ActivityType::Data),
            _ => None,
        }
    }
}

/// One normalized usage event. JSON field names follow the wire shape the
/// frontend consumes (`userId`, `activityType`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelecomActivity {
    pub id: String,
    pub user_id: String,
    pub activity_type: ActivityType,
    pub timestamp: DateTime<Utc>,
    pub duration_sec: u32,
    pub location: String,
    pub network_type: String,
    pub peer_number: String,
    pub is_roaming: bool,
    pub is_spam_or_fraud: bool,
    pub data_usage_mb: f64,
    pub cost: f64,
    pub source: String,
}

/// Which dataset answers reads: the live store or the last imported batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Database,
    Csv,
}

impl DataSource {
    pub fn as_str(&self) -> &str {
        match self {
            DataSource::Database => "database",
            DataSource::Csv => "csv",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "database" => Some(DataSource::Database),
            "csv" => Some(DataSource::Csv),
            _ => None,
        }
    }
}

/// Lifecycle flag on a catalog entry. Entries are created `Active`; nothing
/// transitions them to `Inactive` yet, the variant exists for forward
/// compatibility with the stored format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Active,
    Inactive,
}

/// Catalog metadata for one uploaded file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedFile {
    pub name: String,
    pub size: u64,
    pub record_count: usize,
    pub uploaded_at: DateTime<Utc>,
    pub status: FileStatus,
}

/// Per-location frequency bucket in the stats summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationCount {
    pub location: String,
    pub count: usize,
}

/// Per-network-type frequency bucket in the stats summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkCount {
    pub network: String,
    pub count: usize,
}

/// Aggregate statistics over the active dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStats {
    pub total_activities: usize,
    pub call_count: usize,
    pub sms_count: usize,
    pub data_count: usize,
    pub fraud_count: usize,
    pub fraud_rate: f64,
    pub top_locations: Vec<LocationCount>,
    pub network_usage: Vec<NetworkCount>,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub data_dir: String,
    pub database_path: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let bind_addr = std::env::var("TELWATCH_BIND")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir = std::env::var("TELWATCH_DATA_DIR")
            .unwrap_or_else(|_| "./uploaded_data".to_string());

        let database_path = std::env::var("TELWATCH_DB_PATH")
            .unwrap_or_else(|_| "./telwatch.db".to_string());

        Self {
            bind_addr,
            data_dir,
            database_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_type_round_trip() {
        for t in [ActivityType::Call, ActivityType::Sms, ActivityType::Data] {
            assert_eq!(ActivityType::from_str(t.as_str()), Some(t));
        }
        assert_eq!(ActivityType::from_str("voice"), None);
    }

    #[test]
    fn test_data_source_rejects_unknown() {
        assert_eq!(DataSource::from_str("database"), Some(DataSource::Database));
        assert_eq!(DataSource::from_str("csv"), Some(DataSource::Csv));
        assert_eq!(DataSource::from_str("postgres"), None);
    }

    #[test]
    fn test_activity_serializes_camel_case() {
        let activity = TelecomActivity {
            id: "csv_1_abc".to_string(),
            user_id: "555-0100".to_string(),
            activity_type: ActivityType::Call,
            timestamp: Utc::now(),
            duration_sec: 42,
            location: "Unknown".to_string(),
            network_type: "4G".to_string(),
            peer_number: "unknown".to_string(),
            is_roaming: false,
            is_spam_or_fraud: false,
            data_usage_mb: 0.0,
            cost: 0.0,
            source: "csv_import".to_string(),
        };

        let json = serde_json::to_value(&activity).unwrap();
        assert_eq!(json["userId"], "555-0100");
        assert_eq!(json["activityType"], "call");
        assert_eq!(json["durationSec"], 42);
        assert_eq!(json["isSpamOrFraud"], false);
    }
}
