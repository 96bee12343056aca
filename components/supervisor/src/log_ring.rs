//! Bounded log storage for transcoder diagnostic output.
//!
//! Re-expresses the teacher's ambient "push every log record into two
//! concurrent buffers" handler as an explicit, bounded abstraction: every
//! [`crate::transcoder::Handle`] classifies its own stderr lines and fans
//! them out to a per-entity ring and a device-wide ring, both capped so a
//! chattering or wedged transcoder can never grow unbounded memory.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Maximum number of log lines kept per entity.
pub const PER_ENTITY_CAPACITY: usize = 500;

/// Maximum number of log lines kept in the device-wide ring.
pub const DEVICE_WIDE_CAPACITY: usize = 1000;

/// Maximum number of distinct entities the device-wide log keeps separate
/// per-entity rings for. Least-recently-active entity is evicted on
/// overflow.
pub const MAX_LOGGED_ENTITIES: usize = 10;

/// Maximum length, in characters, of a single stored log message.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// Severity of a classified log line.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Routine diagnostic output.
    Info,
    /// Output naming a recoverable anomaly.
    Warning,
    /// Output naming a failure.
    Error,
}

/// Classifies a raw diagnostic line heuristically.
///
/// Lines containing "error"/"fatal"/"failed" (case-insensitive) are
/// [`Level::Error`]; lines containing "warning" are [`Level::Warning`];
/// everything else is [`Level::Info`].
#[must_use]
pub fn classify(line: &str) -> Level {
    let lower = line.to_ascii_lowercase();
    if lower.contains("error") || lower.contains("fatal") || lower.contains("failed") {
        Level::Error
    } else if lower.contains("warning") {
        Level::Warning
    } else {
        Level::Info
    }
}

/// One stored, classified log entry.
#[derive(Clone, Debug, Serialize)]
pub struct Entry {
    /// When this line was observed.
    pub at: DateTime<Utc>,
    /// Classified severity.
    pub level: Level,
    /// The (possibly truncated) message text.
    pub message: String,
}

impl Entry {
    /// Builds a new classified, truncated [`Entry`] from a raw line.
    #[must_use]
    pub fn new(now: DateTime<Utc>, raw: &str) -> Self {
        let level = classify(raw);
        let message = truncate(raw);
        Self {
            at: now,
            level,
            message,
        }
    }
}

/// Truncates `s` to [`MAX_MESSAGE_CHARS`] characters, appending an ellipsis
/// marker when truncation occurred.
fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_MESSAGE_CHARS {
        return s.to_owned();
    }
    let mut out: String = s.chars().take(MAX_MESSAGE_CHARS).collect();
    out.push('…');
    out
}

/// Fixed-capacity FIFO ring of [`Entry`]s.
#[derive(Clone, Debug, Default)]
pub struct Ring {
    capacity: usize,
    entries: VecDeque<Entry>,
}

impl Ring {
    /// Creates a new, empty [`Ring`] bounded at `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(64)),
        }
    }

    /// Pushes a new entry, evicting the oldest one if at capacity.
    pub fn push(&mut self, entry: Entry) {
        if self.entries.len() >= self.capacity {
            let _ = self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Returns the stored entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &VecDeque<Entry> {
        &self.entries
    }

    /// Number of entries currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Device-wide log store: one bounded ring for the whole device, plus a
/// capped set of per-entity rings keyed by an opaque string id (a
/// `CameraId` or `BroadcastId` rendered via `Display`).
#[derive(Debug, Default)]
pub struct DeviceLog {
    device_wide: Ring,
    per_entity: HashMap<String, Ring>,
    /// Most-recently-active entity ids, front = most recent.
    recency: VecDeque<String>,
}

impl DeviceLog {
    /// Creates an empty [`DeviceLog`] with the default capacities.
    #[must_use]
    pub fn new() -> Self {
        Self {
            device_wide: Ring::new(DEVICE_WIDE_CAPACITY),
            per_entity: HashMap::new(),
            recency: VecDeque::new(),
        }
    }

    /// Records a raw log line on behalf of `entity_id`, classifying and
    /// truncating it, and fanning it out to both rings.
    pub fn record(&mut self, entity_id: &str, now: DateTime<Utc>, raw: &str) {
        let entry = Entry::new(now, raw);
        self.device_wide.push(entry.clone());
        self.touch(entity_id);
        self.per_entity
            .entry(entity_id.to_owned())
            .or_insert_with(|| Ring::new(PER_ENTITY_CAPACITY))
            .push(entry);
    }

    /// Returns the per-entity ring for `entity_id`, if any log has been
    /// recorded for it (and it has not since been evicted).
    #[must_use]
    pub fn entity_ring(&self, entity_id: &str) -> Option<&Ring> {
        self.per_entity.get(entity_id)
    }

    /// Returns the device-wide ring.
    #[must_use]
    pub fn device_ring(&self) -> &Ring {
        &self.device_wide
    }

    /// Drops all stored state for `entity_id` (called when the entity is
    /// torn down, so a stale ring doesn't linger under the eviction cap).
    pub fn forget(&mut self, entity_id: &str) {
        let _ = self.per_entity.remove(entity_id);
        self.recency.retain(|id| id != entity_id);
    }

    fn touch(&mut self, entity_id: &str) {
        self.recency.retain(|id| id != entity_id);
        self.recency.push_front(entity_id.to_owned());

        while self.recency.len() > MAX_LOGGED_ENTITIES {
            if let Some(evicted) = self.recency.pop_back() {
                let _ = self.per_entity.remove(&evicted);
            }
        }
    }
}

#[cfg(test)]
mod log_ring_spec {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn classifies_by_keyword() {
        assert_eq!(classify("Connection FAILED to host"), Level::Error);
        assert_eq!(classify("fatal: cannot open stream"), Level::Error);
        assert_eq!(classify("some error occurred"), Level::Error);
        assert_eq!(classify("Warning: deprecated option"), Level::Warning);
        assert_eq!(classify("frame=  120 fps=25"), Level::Info);
    }

    #[test]
    fn truncates_long_messages() {
        let long = "x".repeat(600);
        let entry = Entry::new(t(0), &long);
        assert_eq!(entry.message.chars().count(), MAX_MESSAGE_CHARS + 1);
        assert!(entry.message.ends_with('…'));
    }

    #[test]
    fn ring_evicts_oldest_on_overflow() {
        let mut ring = Ring::new(2);
        ring.push(Entry::new(t(0), "a"));
        ring.push(Entry::new(t(1), "b"));
        ring.push(Entry::new(t(2), "c"));
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.entries()[0].message, "b");
        assert_eq!(ring.entries()[1].message, "c");
    }

    #[test]
    fn device_log_caps_entity_count() {
        let mut log = DeviceLog::new();
        for i in 0..(MAX_LOGGED_ENTITIES + 3) {
            log.record(&format!("cam-{i}"), t(i as i64), "info line");
        }
        assert!(log.per_entity.len() <= MAX_LOGGED_ENTITIES);
        // The earliest-touched entities should have been evicted.
        assert!(log.entity_ring("cam-0").is_none());
        assert!(log.entity_ring(&format!("cam-{}", MAX_LOGGED_ENTITIES + 2)).is_some());
    }

    #[test]
    fn device_log_reactivating_entity_refreshes_recency() {
        let mut log = DeviceLog::new();
        for i in 0..MAX_LOGGED_ENTITIES {
            log.record(&format!("cam-{i}"), t(i as i64), "info line");
        }
        // Touch cam-0 again so it is no longer the least-recently-active.
        log.record("cam-0", t(100), "info line");
        log.record("cam-new", t(101), "info line");

        assert!(log.entity_ring("cam-0").is_some());
        assert!(log.entity_ring("cam-1").is_none());
    }

    #[test]
    fn forget_removes_entity_ring() {
        let mut log = DeviceLog::new();
        log.record("cam-0", t(0), "hello");
        assert!(log.entity_ring("cam-0").is_some());
        log.forget("cam-0");
        assert!(log.entity_ring("cam-0").is_none());
    }
}
