//! Bounded, newest-first event log.
//!
//! Backs the three CPR record lists (`cprLog`, `cprEvents`, `cprTimeline`).
//! Entries are only ever inserted at the head; the sole removal path is
//! tail eviction once the cap is exceeded.

use serde::{Serialize, Serializer};

/// Default cap for the event and timeline logs
pub const DEFAULT_LOG_CAP: usize = 200;

/// Append-only log ordered newest first
#[derive(Clone, Debug, PartialEq)]
pub struct EventLog<T> {
    entries: Vec<T>,
    cap: Option<usize>,
}

impl<T> EventLog<T> {
    /// Create an empty log that keeps at most `cap` entries
    pub fn capped(cap: usize) -> Self {
        Self {
            entries: Vec::new(),
            cap: Some(cap),
        }
    }

    /// Create an empty log with no cap
    pub fn unbounded() -> Self {
        Self {
            entries: Vec::new(),
            cap: None,
        }
    }

    /// Rebuild a log from persisted entries (already newest first)
    ///
    /// Entries beyond the cap are dropped from the tail.
    pub fn from_entries(mut entries: Vec<T>, cap: Option<usize>) -> Self {
        if let Some(cap) = cap {
            if entries.len() > cap {
                tracing::debug!(
                    "Truncating restored log from {} to {} entries",
                    entries.len(),
                    cap
                );
                entries.truncate(cap);
            }
        }
        Self { entries, cap }
    }

    /// Insert an entry at the head, evicting the oldest past the cap
    pub fn append(&mut self, entry: T) {
        self.entries.insert(0, entry);
        if let Some(cap) = self.cap {
            self.entries.truncate(cap);
        }
    }

    /// All entries, newest first
    pub fn all(&self) -> &[T] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    /// Most recently appended entry
    pub fn latest(&self) -> Option<&T> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a, T> IntoIterator for &'a EventLog<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Serialized as a plain JSON array, newest first
impl<T: Serialize> Serialize for EventLog<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_is_newest_first() {
        let mut log = EventLog::capped(DEFAULT_LOG_CAP);
        for i in 0..5 {
            log.append(i);
        }
        assert_eq!(log.all(), &[4, 3, 2, 1, 0]);
        assert_eq!(log.latest(), Some(&4));
    }

    #[test]
    fn test_cap_evicts_oldest() {
        let mut log = EventLog::capped(DEFAULT_LOG_CAP);
        for i in 0..450 {
            log.append(i);
            assert!(log.len() <= DEFAULT_LOG_CAP);
        }

        assert_eq!(log.len(), DEFAULT_LOG_CAP);
        // Strict reverse-insertion order across the surviving window
        let expected: Vec<i32> = (250..450).rev().collect();
        assert_eq!(log.all(), expected.as_slice());
    }

    #[test]
    fn test_unbounded_keeps_everything() {
        let mut log = EventLog::unbounded();
        for i in 0..300 {
            log.append(i);
        }
        assert_eq!(log.len(), 300);
    }

    #[test]
    fn test_from_entries_truncates_tail() {
        let entries: Vec<u32> = (0..10).rev().collect();
        let log = EventLog::from_entries(entries, Some(3));
        assert_eq!(log.all(), &[9, 8, 7]);
    }

    #[test]
    fn test_serializes_as_array() {
        let mut log = EventLog::capped(2);
        log.append("a");
        log.append("b");
        log.append("c");
        assert_eq!(serde_json::to_string(&log).unwrap(), r#"["c","b"]"#);
    }
}
