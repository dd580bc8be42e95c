//! Last-known-value table built from global broadcasts.

use crate::domain::broadcast::{Broadcast, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Unix seconds
    pub ts: f64,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    entries: BTreeMap<String, SnapshotEntry>,
}

/// The coordinator writes it, the persister reads it
pub type SharedSnapshot = Arc<Mutex<Snapshot>>;

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a global broadcast stamped with the current time.
    /// Returns false (and stores nothing) for targeted messages.
    pub fn record(&mut self, message: &Broadcast) -> bool {
        self.record_at(message, unix_now())
    }

    pub fn record_at(&mut self, message: &Broadcast, ts: f64) -> bool {
        if !message.is_global() {
            return false;
        }
        self.entries.insert(
            message.prop().to_string(),
            SnapshotEntry {
                ts,
                value: message.value().clone(),
            },
        );
        true
    }

    pub fn get(&self, prop: &str) -> Option<&SnapshotEntry> {
        self.entries.get(prop)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins_per_key() {
        let mut snapshot = Snapshot::new();
        snapshot.record_at(&Broadcast::global("Humidity", 40.0), 1.0);
        snapshot.record_at(&Broadcast::global("Temperature", 19.0), 2.0);
        snapshot.record_at(&Broadcast::global("Temperature", 21.7), 3.0);

        let t = snapshot.get("Temperature").unwrap();
        assert_eq!(t.ts, 3.0);
        assert_eq!(t.value, Value::Number(21.7));
        assert_eq!(snapshot.get("Humidity").unwrap().value, Value::Number(40.0));
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_targeted_messages_ignored() {
        let mut snapshot = Snapshot::new();
        assert!(!snapshot.record(&Broadcast::targeted("Locks", "State", "L")));
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_json_document_shape() {
        let mut snapshot = Snapshot::new();
        snapshot.record_at(&Broadcast::global("Temperature", 21.7), 1700000000.5);
        snapshot.record_at(&Broadcast::global("Location", Value::Pair(37.5, -122.25)), 1.0);

        let json: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(json["Temperature"]["ts"], 1700000000.5);
        assert_eq!(json["Temperature"]["value"], 21.7);
        assert_eq!(json["Location"]["value"], serde_json::json!([37.5, -122.25]));
    }
}
