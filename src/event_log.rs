//! Bounded in-memory event log.
//!
//! Every classified occurrence — chat, gift, status transition, reminder —
//! lands here as an immutable record. The log keeps at most `capacity`
//! records and evicts the oldest first. The browser UI polls a snapshot
//! of the whole thing via `/api/status`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

/// Classification of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Status,
    Comment,
    Gift,
    Join,
    Follow,
    Share,
    Like,
    Subscribe,
    Question,
    Poll,
    Reminder,
    LiveEnd,
}

/// One immutable, classified, timestamped occurrence.
///
/// Field names on the wire match what the control page already polls:
/// `type`, `data`, `timestamp`.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(rename = "data")]
    pub payload: serde_json::Value,
    /// Unix seconds at append time.
    pub timestamp: f64,
    /// Monotonic append sequence, process-wide.
    pub seq: u64,
}

pub struct EventLog {
    entries: Mutex<VecDeque<EventRecord>>,
    capacity: usize,
    next_seq: AtomicU64,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Append a record. Never fails; evicts the oldest entry when full.
    pub fn append(&self, kind: EventKind, payload: serde_json::Value) -> EventRecord {
        let record = EventRecord {
            kind,
            payload,
            timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };

        let mut entries = self.entries.lock().unwrap();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(record.clone());
        record
    }

    /// Owned, ordered copy of the current contents.
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn append_and_snapshot() {
        let log = EventLog::new(10);
        log.append(EventKind::Comment, json!({"user": "ana", "text": "hi"}));
        log.append(EventKind::Gift, json!({"user": "ben"}));

        let snap = log.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].kind, EventKind::Comment);
        assert_eq!(snap[1].kind, EventKind::Gift);
        assert!(snap[0].seq < snap[1].seq);
    }

    #[test]
    fn evicts_oldest_first_at_capacity() {
        let log = EventLog::new(500);
        for i in 0..501 {
            log.append(EventKind::Comment, json!({"i": i}));
        }

        let snap = log.snapshot();
        assert_eq!(snap.len(), 500);
        // Record 0 was evicted; the first survivor is record 1.
        assert_eq!(snap[0].payload["i"], 1);
        assert_eq!(snap[0].seq, 1);
        assert_eq!(snap.last().unwrap().payload["i"], 500);
    }

    #[test]
    fn never_exceeds_capacity() {
        let log = EventLog::new(3);
        for i in 0..20 {
            log.append(EventKind::Like, json!({"i": i}));
            assert!(log.len() <= 3);
        }
        let snap = log.snapshot();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[0].payload["i"], 17);
    }

    #[test]
    fn concurrent_appends_keep_bound_and_unique_seqs() {
        let log = Arc::new(EventLog::new(50));
        let mut handles = Vec::new();
        for t in 0..8 {
            let log = log.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    log.append(EventKind::Status, json!({"t": t, "i": i}));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let snap = log.snapshot();
        assert_eq!(snap.len(), 50);
        for pair in snap.windows(2) {
            assert!(pair[0].seq < pair[1].seq);
        }
    }

    #[test]
    fn serializes_with_ui_field_names() {
        let log = EventLog::new(5);
        let rec = log.append(EventKind::Status, json!({"message": "connected"}));
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["type"], "status");
        assert_eq!(v["data"]["message"], "connected");
        assert!(v["timestamp"].is_f64());
    }
}
