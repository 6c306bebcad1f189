//! Bounded FIFO of recently broadcast envelopes.

use std::collections::VecDeque;

use relay_core::Envelope;

/// Append-only ring of the last `capacity` envelopes, oldest first.
///
/// Used for diagnostics only; clients never receive history on connect.
#[derive(Debug)]
pub struct MessageHistory {
    entries: VecDeque<Envelope>,
    capacity: usize,
}

impl MessageHistory {
    /// Create an empty history. A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest entry when full.
    pub fn push(&mut self, envelope: Envelope) {
        if self.entries.len() == self.capacity {
            let _ = self.entries.pop_front();
        }
        self.entries.push_back(envelope);
    }

    /// The last `min(limit, len)` entries in chronological order.
    pub fn recent(&self, limit: usize) -> Vec<Envelope> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been retained yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of retained entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use relay_core::Event;
    use serde_json::json;

    fn env(n: usize) -> Envelope {
        Event::new("item:created", json!({ "n": n })).stamp(i64::try_from(n).unwrap())
    }

    #[test]
    fn starts_empty() {
        let h = MessageHistory::new(3);
        assert!(h.is_empty());
        assert_eq!(h.capacity(), 3);
        assert!(h.recent(10).is_empty());
    }

    #[test]
    fn zero_capacity_clamped() {
        let mut h = MessageHistory::new(0);
        h.push(env(1));
        h.push(env(2));
        assert_eq!(h.len(), 1);
        assert_eq!(h.recent(5)[0].data["n"], 2);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut h = MessageHistory::new(1000);
        for n in 0..1001 {
            h.push(env(n));
        }
        assert_eq!(h.len(), 1000);
        let all = h.recent(1000);
        assert_eq!(all[0].data["n"], 1);
        assert_eq!(all[999].data["n"], 1000);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let mut h = MessageHistory::new(10);
        for n in 0..5 {
            h.push(env(n));
        }
        let tail: Vec<_> = h.recent(2).iter().map(|e| e.data["n"].clone()).collect();
        assert_eq!(tail, vec![json!(3), json!(4)]);
        assert_eq!(h.recent(0).len(), 0);
        assert_eq!(h.recent(50).len(), 5);
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity(cap in 1usize..64, inserts in 0usize..256, limit in 0usize..128) {
            let mut h = MessageHistory::new(cap);
            for n in 0..inserts {
                h.push(env(n));
            }
            prop_assert!(h.len() <= cap);
            prop_assert_eq!(h.len(), inserts.min(cap));

            let recent = h.recent(limit);
            prop_assert_eq!(recent.len(), limit.min(h.len()));
            // chronological and ending at the newest insert
            for pair in recent.windows(2) {
                prop_assert!(pair[0].timestamp < pair[1].timestamp);
            }
            if let Some(last) = recent.last() {
                prop_assert_eq!(last.timestamp, i64::try_from(inserts - 1).unwrap());
            }
        }
    }
}
