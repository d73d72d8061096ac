//! Persisted record models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One point-in-time viewer observation. Append-only; duplicates by
/// timestamp are acceptable since timestamps carry sub-second precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub viewers: u64,
}

/// Running peak for a `(user_id, platform)` pair. `max_peak` never
/// decreases across the record's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakRecord {
    pub user_id: String,
    pub platform: String,
    pub max_peak: u64,
    pub last_viewers: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_record_serialization() {
        let record = HistoryRecord {
            user_id: "dQw4w9WgXcQ".to_string(),
            timestamp: Utc::now(),
            viewers: 18450,
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("dQw4w9WgXcQ"));
        assert!(json.contains("18450"));
    }

    #[test]
    fn test_peak_record_roundtrip() {
        let record = PeakRecord {
            user_id: "somechannel".to_string(),
            platform: "youtube".to_string(),
            max_peak: 1_200_000,
            last_viewers: 900_000,
        };

        let json = serde_json::to_value(&record).unwrap();
        let back: PeakRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
