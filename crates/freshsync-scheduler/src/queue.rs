//! Versioned schedule queue with lazy invalidation
//!
//! A min-priority queue of `(next_execute_time, rule)` entries backed by a
//! side map holding the authoritative current schedule per rule. The heap
//! has no arbitrary-removal operation, so rescheduling a rule inserts a new
//! entry and leaves the old one behind; every entry carries a version stamp,
//! and a popped entry whose `(rule, version)` no longer matches the map is
//! discarded as stale.
//!
//! The queue is plain data: the scheduler loop is its only owner, and all
//! methods are synchronous.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use chrono::{DateTime, Utc};

use freshsync_core::domain::newtypes::RuleId;
use freshsync_core::domain::ScheduleReason;

// ============================================================================
// ScheduledRule - the authoritative schedule per rule
// ============================================================================

/// The scheduler's working copy of "when will I next look at this rule"
///
/// In-memory only; rebuilt from persisted rules and states at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledRule {
    /// The scheduled rule
    pub rule_id: RuleId,
    /// When the rule is next evaluated
    pub next_at: DateTime<Utc>,
    /// Why that time was chosen
    pub reason: ScheduleReason,
    /// Version stamp matching the live heap entry; older entries are stale
    version: u64,
}

// ============================================================================
// Heap entry
// ============================================================================

/// One heap entry; may be stale if its rule was rescheduled after insertion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueEntry {
    at: DateTime<Utc>,
    rule_id: RuleId,
    version: u64,
    /// Insertion sequence, tie-breaks equal times deterministically (FIFO)
    seq: u64,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.cmp(&other.at).then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ============================================================================
// ScheduleQueue
// ============================================================================

/// Min-priority queue of pending rule evaluations with a staleness map
#[derive(Debug, Default)]
pub struct ScheduleQueue {
    heap: BinaryHeap<Reverse<QueueEntry>>,
    entries: HashMap<RuleId, ScheduledRule>,
    next_seq: u64,
}

impl ScheduleQueue {
    /// Creates an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules (or reschedules) a rule
    ///
    /// Bumps the rule's version so any earlier heap entry for it becomes
    /// stale and will be discarded when dequeued.
    pub fn schedule(&mut self, rule_id: RuleId, next_at: DateTime<Utc>, reason: ScheduleReason) {
        let version = self
            .entries
            .get(&rule_id)
            .map(|e| e.version + 1)
            .unwrap_or(1);

        self.entries.insert(
            rule_id,
            ScheduledRule {
                rule_id,
                next_at,
                reason,
                version,
            },
        );

        self.next_seq += 1;
        self.heap.push(Reverse(QueueEntry {
            at: next_at,
            rule_id,
            version,
            seq: self.next_seq,
        }));
    }

    /// Forgets a rule entirely
    ///
    /// Heap entries for it become stale and are silently dropped later.
    pub fn remove(&mut self, rule_id: &RuleId) {
        self.entries.remove(rule_id);
    }

    /// The authoritative schedule for a rule, if any
    #[must_use]
    pub fn get(&self, rule_id: &RuleId) -> Option<&ScheduledRule> {
        self.entries.get(rule_id)
    }

    /// The earliest non-stale due time, if the queue holds anything
    ///
    /// Stale entries encountered at the top are dropped as a side effect.
    pub fn next_due_at(&mut self) -> Option<DateTime<Utc>> {
        while let Some(Reverse(top)) = self.heap.peek() {
            if self.is_current(top) {
                return Some(top.at);
            }
            self.heap.pop();
        }
        None
    }

    /// Pops every entry due at `now`, discarding stale ones
    ///
    /// Returns the due rules in due-time order together with the reason
    /// they were scheduled. Popped rules stay in the map so in-flight
    /// evaluation can still consult (and reschedule over) them.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<ScheduledRule> {
        let mut due = Vec::new();

        while let Some(Reverse(top)) = self.heap.peek() {
            if top.at > now {
                break;
            }
            let entry = self.heap.pop().expect("peeked entry must pop").0;
            if self.is_current(&entry) {
                due.push(self.entries[&entry.rule_id]);
            }
        }

        due
    }

    /// Number of rules with an authoritative schedule
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no rule is scheduled
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_current(&self, entry: &QueueEntry) -> bool {
        self.entries
            .get(&entry.rule_id)
            .is_some_and(|current| current.version == entry.version)
    }
}

// ============================================================================
// Tests
// ============================================================================
