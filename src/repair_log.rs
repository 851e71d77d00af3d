use std::collections::VecDeque;

use crate::types::repair::{RepairAction, RepairLogEntry};

/// Bounded FIFO of repair actions. Appending past capacity evicts the oldest
/// entry.
#[derive(Debug)]
pub struct RepairLog {
    entries: VecDeque<RepairLogEntry>,
    capacity: usize,
    next_seq: u64,
}

impl RepairLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            next_seq: 1,
        }
    }

    /// Append an entry stamped with `timestamp` and return a copy of it.
    pub fn push(&mut self, action: RepairAction, success: bool, timestamp: u64) -> RepairLogEntry {
        let entry = RepairLogEntry {
            seq: self.next_seq,
            action,
            timestamp,
            success,
        };
        self.next_seq += 1;
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.clone());
        entry
    }

    /// The most recent `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<RepairLogEntry> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(log: &mut RepairLog, n: u64) {
        for i in 0..n {
            log.push(RepairAction::AutoReconnect(format!("feed-{}", i)), true, 1_000 + i);
        }
    }

    #[test]
    fn new_log_is_empty() {
        let log = RepairLog::new(100);
        assert!(log.is_empty());
        assert_eq!(log.capacity(), 100);
        assert!(log.recent(10).is_empty());
    }

    #[test]
    fn huge_capacity_allocates_lazily() {
        let mut log = RepairLog::new(usize::MAX);
        fill(&mut log, 3);
        assert_eq!(log.len(), 3);
        assert_eq!(log.capacity(), usize::MAX);
    }

    #[test]
    fn append_past_capacity_evicts_oldest() {
        let mut log = RepairLog::new(100);
        fill(&mut log, 100);
        assert_eq!(log.recent(1)[0].seq, 100);
        assert_eq!(log.recent(100)[0].seq, 1);

        fill(&mut log, 1);
        assert_eq!(log.len(), 100);
        assert_eq!(log.recent(100)[0].seq, 2);
    }

    #[test]
    fn holds_last_hundred_after_150_appends() {
        let mut log = RepairLog::new(100);
        fill(&mut log, 150);
        assert_eq!(log.len(), 100);
        let all = log.recent(usize::MAX);
        assert_eq!(all.len(), 100);
        assert_eq!(all[0].seq, 51);
        assert_eq!(all[0].action, RepairAction::AutoReconnect("feed-50".to_string()));
        assert_eq!(all[99].seq, 150);
    }

    #[test]
    fn recent_is_most_recent_last() {
        let mut log = RepairLog::new(10);
        log.push(RepairAction::Optimization, true, 1);
        log.push(RepairAction::HandleError("okx".to_string()), false, 2);
        log.push(RepairAction::ForceReconnectAll, true, 3);

        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action, RepairAction::HandleError("okx".to_string()));
        assert!(!recent[0].success);
        assert_eq!(recent[1].action, RepairAction::ForceReconnectAll);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut log = RepairLog::new(0);
        log.push(RepairAction::Optimization, true, 1);
        log.push(RepairAction::Optimization, true, 2);
        assert_eq!(log.len(), 1);
        assert_eq!(log.recent(5)[0].seq, 2);
    }
}
