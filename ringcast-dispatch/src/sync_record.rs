use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Write};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
/// A single observation of a sync operation.
pub struct SyncRecord {
    /// Unix timestamp of the observation in seconds.
    pub timestamp: u64,
    /// How long the operation took.
    pub duration_ms: u64,
    /// The number of items involved.
    pub count: usize,
    /// Empty on success, the error otherwise.
    pub message: String,
}

impl SyncRecord {
    pub fn new(timestamp: u64, duration_ms: u64, count: usize, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            duration_ms,
            count,
            message: message.into(),
        }
    }

    /// Creates a record stamped with the current time.
    pub fn now(duration_ms: u64, count: usize, message: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self::new(timestamp, duration_ms, count, message)
    }
}

impl Display for SyncRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ts={} duration_ms={} count={} message={}",
            self.timestamp, self.duration_ms, self.count, self.message
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The two latest observations of a key.
pub struct SyncEntry {
    pub current: SyncRecord,
    pub previous: Option<SyncRecord>,
}

#[derive(Debug, Clone, Default)]
/// A store keeping the two latest sync observations per key.
///
/// Handles are cheap to clone and all share the same state.
pub struct SyncRecords(Arc<RwLock<BTreeMap<String, SyncEntry>>>);

impl SyncRecords {
    /// Records a new observation for the key.
    ///
    /// The current record of the key becomes the previous one.
    pub fn put(&self, key: impl Into<String>, record: SyncRecord) {
        let mut lock = self.0.write();
        match lock.entry(key.into()) {
            Entry::Vacant(entry) => {
                entry.insert(SyncEntry {
                    current: record,
                    previous: None,
                });
            },
            Entry::Occupied(mut entry) => {
                let entry = entry.get_mut();
                let previous = std::mem::replace(&mut entry.current, record);
                entry.previous = Some(previous);
            },
        }
    }

    /// The latest observations of the key.
    pub fn get(&self, key: &str) -> Option<SyncEntry> {
        self.0.read().get(key).cloned()
    }

    /// All keys which have been recorded, in order.
    pub fn keys(&self) -> Vec<String> {
        self.0.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Renders every key with its `last:` and `curr:` rows.
    pub fn report(&self) -> String {
        let lock = self.0.read();
        let mut report = String::new();
        for (key, entry) in lock.iter() {
            let _ = writeln!(report, "{key}");
            match entry.previous.as_ref() {
                Some(previous) => {
                    let _ = writeln!(report, "  last: {previous}");
                },
                None => {
                    let _ = writeln!(report, "  last: null");
                },
            }
            let _ = writeln!(report, "  curr: {}", entry.current);
        }
        report
    }
}
